//! `foldermirror init <path> --repo <owner/name> [--branch] [--quiet-secs] [--token-env]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use foldermirror_core::{
    config,
    types::{BranchName, RepoSlug},
};

/// Point the mirror at a local folder and a remote repository.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Folder to mirror. Created if it does not exist.
    pub path: PathBuf,

    /// Target repository as `owner/name`.
    #[arg(long, short = 'r', value_name = "OWNER/NAME")]
    pub repo: RepoSlug,

    /// Branch every change is committed to.
    #[arg(long, short = 'b', default_value = "main")]
    pub branch: String,

    /// Seconds without filesystem activity before pending changes are pushed.
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub quiet_secs: Option<u64>,

    /// Environment variable that holds the API token.
    #[arg(long, value_name = "VAR")]
    pub token_env: Option<String>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        let mut cfg = config::init_at(
            &home,
            &self.path,
            self.repo,
            BranchName::from(self.branch),
        )
        .with_context(|| format!("failed to init mirror for '{}'", self.path.display()))?;

        if self.quiet_secs.is_some() || self.token_env.is_some() {
            if let Some(secs) = self.quiet_secs {
                cfg.quiet_period_secs = secs;
            }
            if let Some(var) = self.token_env {
                cfg.token_env = var;
            }
            config::save_at(&home, &cfg).context("failed to save config")?;
        }

        println!(
            "{} Mirroring '{}' → {}@{}",
            "✓".green(),
            cfg.local_root.display(),
            cfg.repository,
            cfg.branch
        );
        println!(
            "  quiet period {}s, token from ${}",
            cfg.quiet_period_secs, cfg.token_env
        );
        println!("  Saved to: {}", config::config_path_at(&home).display());
        Ok(())
    }
}
