//! Folder mirror daemon: debounced change coalescing, filesystem watching,
//! and the control socket.

pub mod engine;
mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod scheduler;
pub mod watcher;

pub use engine::{ChangeCoalescingEngine, EngineStatus, FlushSummary, FlushTrigger, ReportSink};
pub use error::DaemonError;
pub use protocol::{request, send_request, ControlCommand, DaemonRequest, DaemonResponse};
pub use runtime::{build_engine, run, serve, start_blocking};
pub use scheduler::DebounceScheduler;
