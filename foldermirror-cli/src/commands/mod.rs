pub mod daemon;
pub mod init;
pub mod push;
pub mod status;
