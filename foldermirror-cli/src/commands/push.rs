//! `foldermirror push` — one-shot upload of everything that differs from the
//! mirror state, without starting the watcher.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use foldermirror_core::{config, types::ActionKind};
use foldermirror_daemon::paths::socket_path;
use foldermirror_sync::{
    github::GithubStore, scan, state_store, Batch, FlushReport, LocalDisk, Outcome, SyncExecutor,
};

/// Arguments for `foldermirror push`.
#[derive(Args, Debug)]
pub struct PushArgs {
    /// List what would be uploaded or deleted without contacting the remote.
    #[arg(long)]
    pub dry_run: bool,
}

impl PushArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let cfg = config::load_at(&home).context("failed to load mirror config")?;
        let state = state_store::load_at(&home).context("failed to load mirror state")?;

        let batch: Batch = scan::plan_initial_sync(&cfg.local_root, &state)
            .with_context(|| format!("failed to scan '{}'", cfg.local_root.display()))?
            .into_iter()
            .collect();

        let target = format!("{}@{}", cfg.repository, cfg.branch);
        if batch.is_empty() {
            println!("✓ nothing to push — '{}' matches {target}", cfg.local_root.display());
            return Ok(());
        }

        if self.dry_run {
            println!("[dry-run] {} change(s) for {target}", batch.len());
            for action in batch.iter() {
                let marker = match action.kind {
                    ActionKind::Upload => "↑",
                    ActionKind::Delete => "✗",
                };
                println!("  {marker}  {}", action.path);
            }
            return Ok(());
        }

        if socket_path(&home).exists() {
            println!(
                "{} a daemon may be running; `foldermirror daemon flush` pushes through it instead",
                "!".yellow()
            );
        }

        let remote = GithubStore::from_config(&cfg).context("cannot reach the remote")?;
        let executor = SyncExecutor::new(
            Arc::new(remote),
            Arc::new(LocalDisk::new(cfg.local_root.clone())),
        );
        let report = executor.apply(batch);
        state_store::record_flush_at(&home, &report).context("failed to save mirror state")?;

        print_report(&report, &target);
        if report.failed() > 0 {
            bail!("{} path(s) failed to sync", report.failed());
        }
        Ok(())
    }
}

/// One summary line, then one line per path.
fn print_report(report: &FlushReport, target: &str) {
    println!(
        "✓ pushed to {target} ({} ok, {} skipped, {} failed, {} ms)",
        report.succeeded(),
        report.skipped(),
        report.failed(),
        report.duration_ms
    );
    for result in &report.results {
        let line = match &result.outcome {
            Outcome::Created { .. } => format!("  +  {}", result.path).green(),
            Outcome::Updated { .. } => format!("  ✎  {}", result.path).green(),
            Outcome::Unchanged { .. } => format!("  ·  {}", result.path).normal(),
            Outcome::Deleted => format!("  ✗  {}", result.path).green(),
            Outcome::AlreadyAbsent => format!("  ·  {} (already absent)", result.path).normal(),
            Outcome::Skipped { reason } => {
                format!("  ~  {} (skipped: {reason:?})", result.path).yellow()
            }
            Outcome::Failed { error } => format!("  !  {}: {error}", result.path).red(),
        };
        println!("{line}");
    }
}
