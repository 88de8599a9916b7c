//! `foldermirror daemon` — run the watcher and talk to it over its socket.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;

use foldermirror_daemon::paths::socket_path;
use foldermirror_daemon::{request, start_blocking, ControlCommand, DaemonError};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (watcher + control socket).
    Start,
    /// Request graceful shutdown; pending changes are pushed first.
    Stop,
    /// Query daemon runtime status over the control socket.
    Status,
    /// Push pending changes now instead of waiting for the quiet period.
    Flush,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request(&home, ControlCommand::Stop) {
            Ok(_) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request(&home, ControlCommand::Status) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Flush => match request(&home, ControlCommand::Flush) {
            Ok(payload) => print_flush(&payload),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running; use `foldermirror push` instead");
            }
            Err(err) => return Err(err).context("failed to flush through daemon"),
        },
    }

    Ok(())
}

fn print_flush(payload: &Value) {
    if payload["flushed"] != Value::Bool(true) {
        println!("✓ nothing pending");
        return;
    }
    let summary = &payload["summary"];
    println!(
        "✓ flushed {} path(s): {} ok, {} skipped, {} failed",
        summary["total"], summary["succeeded"], summary["skipped"], summary["failed"]
    );
    for result in payload["results"].as_array().into_iter().flatten() {
        let path = result["path"].as_str().unwrap_or("?");
        let status = result["outcome"]["status"].as_str().unwrap_or("?");
        let line = format!("  {status:<14} {path}");
        if status == "failed" {
            let reason = result["outcome"]["error"]["message"]
                .as_str()
                .or_else(|| result["outcome"]["error"]["kind"].as_str())
                .unwrap_or("unknown error");
            println!("{} ({reason})", line.red());
        } else {
            println!("{line}");
        }
    }
}
