//! Control-socket protocol: one JSON object per line in each direction.
//!
//! ```text
//! → {"cmd":"status"}            ← {"ok":true,"data":{"running":true,...}}
//! → {"cmd":"flush"}             ← {"ok":true,"data":{"flushed":true,"summary":{...},"results":[...]}}
//! → {"cmd":"stop"}              ← {"ok":true,"data":{"stopping":true}}
//! ```

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

const STARTUP_ATTEMPTS: u32 = 5;
const STARTUP_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Status,
    /// Apply the pending batch without waiting for the quiet period.
    Flush,
    /// Final flush, then exit.
    Stop,
}

impl ControlCommand {
    /// Status is polled right after `daemon start`, so it tolerates a socket
    /// that is not bound yet. Flush and stop must not be sent twice.
    fn attempts(self) -> u32 {
        match self {
            ControlCommand::Status => STARTUP_ATTEMPTS,
            ControlCommand::Flush | ControlCommand::Stop => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: ControlCommand,
}

impl From<ControlCommand> for DaemonRequest {
    fn from(cmd: ControlCommand) -> Self {
        Self { cmd }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// The `data` payload of a successful response, or the daemon's error.
    pub fn into_data(self) -> Result<Value, DaemonError> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(DaemonError::Protocol(
                self.error
                    .unwrap_or_else(|| "unknown daemon error".to_string()),
            ))
        }
    }
}

/// One round trip on the daemon socket, no retry.
pub fn send_request(home: &Path, request: DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound
        | std::io::ErrorKind::ConnectionRefused
        | std::io::ErrorKind::ConnectionReset => DaemonError::DaemonNotRunning {
            socket: socket.clone(),
        },
        _ => io_err(&socket, err),
    })?;

    let mut payload = serde_json::to_vec(&request)?;
    payload.push(b'\n');
    stream
        .write_all(&payload)
        .and_then(|()| stream.flush())
        .map_err(|e| io_err(&socket, e))?;

    let mut line = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(format!(
            "daemon closed the connection before answering {:?}",
            request.cmd
        )));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Send `command` and return its `data` payload.
pub fn request(home: &Path, command: ControlCommand) -> Result<Value, DaemonError> {
    let attempts = command.attempts();
    let mut attempt = 1;
    loop {
        match send_request(home, command.into()) {
            Ok(response) => return response.into_data(),
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < attempts => {
                attempt += 1;
                sleep(STARTUP_BACKOFF);
            }
            Err(err) => return Err(err),
        }
    }
}
