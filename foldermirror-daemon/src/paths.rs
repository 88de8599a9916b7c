use std::path::{Path, PathBuf};

use foldermirror_core::config::mirror_dir_at;

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn socket_path(home: &Path) -> PathBuf {
    mirror_dir_at(home).join(DAEMON_SOCKET)
}
