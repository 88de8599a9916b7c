//! Mirror configuration persisted as YAML.
//!
//! # Storage layout
//!
//! ```text
//! ~/.foldermirror/
//!   config.yaml   (mode 0600)
//!   state.json    (mirror state, owned by foldermirror-sync)
//!   daemon.sock   (control socket while the daemon runs)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! The API token itself is never written here, only the name of the
//! environment variable that holds it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{BranchName, RepoSlug};

pub const DEFAULT_QUIET_PERIOD_SECS: u64 = 30;
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Everything the daemon needs to mirror one folder to one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Absolute, canonical path of the monitored folder.
    pub local_root: PathBuf,
    pub repository: RepoSlug,
    #[serde(default)]
    pub branch: BranchName,
    #[serde(default = "default_quiet_period_secs")]
    pub quiet_period_secs: u64,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_quiet_period_secs() -> u64 {
    DEFAULT_QUIET_PERIOD_SECS
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl MirrorConfig {
    pub fn new(local_root: PathBuf, repository: RepoSlug, branch: BranchName) -> Self {
        Self {
            local_root,
            repository,
            branch,
            quiet_period_secs: DEFAULT_QUIET_PERIOD_SECS,
            token_env: default_token_env(),
            api_base: default_api_base(),
        }
    }

    pub fn quiet_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.quiet_period_secs)
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.foldermirror/`
pub fn mirror_dir_at(home: &Path) -> PathBuf {
    home.join(".foldermirror")
}

/// `<home>/.foldermirror/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    mirror_dir_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the config from `<home>/.foldermirror/config.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<MirrorConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<MirrorConfig, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &MirrorConfig) -> Result<(), ConfigError> {
    let dir = mirror_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &MirrorConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Point the mirror at `local_root` and `repository`.
///
/// Creates the local folder if it does not exist yet, canonicalizes it, and
/// overwrites any previous config.
pub fn init_at(
    home: &Path,
    local_root: &Path,
    repository: RepoSlug,
    branch: BranchName,
) -> Result<MirrorConfig, ConfigError> {
    if !local_root.exists() {
        std::fs::create_dir_all(local_root)?;
    }
    let local_root = local_root.canonicalize()?;
    let config = MirrorConfig::new(local_root, repository, branch);
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(
    local_root: &Path,
    repository: RepoSlug,
    branch: BranchName,
) -> Result<MirrorConfig, ConfigError> {
    init_at(&home()?, local_root, repository, branch)
}

// ---------------------------------------------------------------------------
// 5. Credentials
// ---------------------------------------------------------------------------

/// Read the API token from the env var named in `config.token_env`.
pub fn resolve_token(config: &MirrorConfig) -> Result<String, ConfigError> {
    match std::env::var(&config.token_env) {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(ConfigError::MissingToken {
            var: config.token_env.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
