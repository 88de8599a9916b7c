//! `foldermirror status` — configuration, sync history, and daemon state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use foldermirror_core::config::{self, MirrorConfig};
use foldermirror_daemon::{send_request, ControlCommand};
use foldermirror_sync::state_store::{self, MirrorState};

/// Arguments for `foldermirror status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let cfg = config::load_at(&home).context("failed to load mirror config")?;
        let state = state_store::load_at(&home).context("failed to load mirror state")?;
        let daemon = daemon_status(&home);

        if self.json {
            let payload = StatusJson {
                config: &cfg,
                synced_at: state.synced_at,
                files: &state.files,
                daemon,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
            );
            return Ok(());
        }

        print_human(&cfg, &state, daemon.as_ref());
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    config: &'a MirrorConfig,
    synced_at: Option<DateTime<Utc>>,
    files: &'a std::collections::BTreeMap<String, String>,
    daemon: Option<Value>,
}

#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "sha256")]
    digest: String,
}

/// One attempt, no retry: a missing socket simply means no daemon.
fn daemon_status(home: &Path) -> Option<Value> {
    send_request(home, ControlCommand::Status.into())
        .and_then(|response| response.into_data())
        .ok()
}

fn print_human(cfg: &MirrorConfig, state: &MirrorState, daemon: Option<&Value>) {
    println!("{} {}", "folder:".bold(), cfg.local_root.display());
    println!("{} {}@{}", "remote:".bold(), cfg.repository, cfg.branch);
    println!("{} {}s", "quiet period:".bold(), cfg.quiet_period_secs);

    let last_sync = match state.synced_at {
        Some(at) => format!("{} ({})", format_age(Utc::now(), at), at.to_rfc3339()),
        None => "never".to_string(),
    };
    println!("{} {last_sync}", "last sync:".bold());

    match daemon {
        Some(status) => println!(
            "{} {} (pending {}, timer {})",
            "daemon:".bold(),
            "running".green(),
            status["pending"],
            if status["timer_armed"].as_bool().unwrap_or(false) { "armed" } else { "idle" }
        ),
        None => println!("{} {}", "daemon:".bold(), "not running".yellow()),
    }

    if state.files.is_empty() {
        println!("\nNo files synced yet. Run `foldermirror push` or start the daemon.");
        return;
    }

    let rows: Vec<FileRow> = state
        .files
        .iter()
        .map(|(path, digest)| FileRow {
            path: path.clone(),
            digest: digest.chars().take(12).collect(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("\n{table}");
}

fn format_age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn age_uses_the_largest_whole_unit() {
        let now = Utc::now();
        assert_eq!(format_age(now, now - Duration::seconds(5)), "5s ago");
        assert_eq!(format_age(now, now - Duration::minutes(3)), "3m ago");
        assert_eq!(format_age(now, now - Duration::hours(5)), "5h ago");
        assert_eq!(format_age(now, now - Duration::days(2)), "2d ago");
        assert_eq!(format_age(now, now + Duration::seconds(9)), "0s ago", "clock skew clamps to zero");
    }
}
