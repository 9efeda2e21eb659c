//! Storage locations and tool configuration
//!
//! Resolution order (later wins):
//! 1. Built-in default: `~/.local/share/opencode`
//! 2. `~/.retrace/config.toml`
//! 3. `RETRACE_DATA_DIR` environment variable
//! 4. Explicit overrides from the caller (CLI flags)

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable overriding the agent data directory.
pub const DATA_DIR_ENV: &str = "RETRACE_DATA_DIR";

const DEFAULT_GIT: &str = "git";

/// Where the session log and snapshot repositories live, and which git to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root holding `message/`, `part/` and `session/`.
    pub storage_root: PathBuf,
    /// Root holding one snapshot git directory per project.
    pub snapshot_root: PathBuf,
    /// Version control executable.
    pub git_binary: String,
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    storage_root: Option<PathBuf>,
    snapshot_root: Option<PathBuf>,
    git_binary: Option<String>,
}

impl Config {
    /// Build a config from a single agent data directory.
    pub fn from_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            storage_root: data_dir.join("storage"),
            snapshot_root: data_dir.join("snapshot"),
            git_binary: DEFAULT_GIT.to_string(),
        }
    }

    /// Default data directory used by the agent.
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".local/share/opencode"))
            .unwrap_or_else(|| PathBuf::from("/tmp/.local/share/opencode"))
    }

    /// Default location of the Retrace config file.
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".retrace/config.toml"))
            .unwrap_or_else(|| PathBuf::from("/tmp/.retrace/config.toml"))
    }

    /// Load the effective configuration from the default config file and environment.
    ///
    /// # Errors
    /// Returns `Error::Config` if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let env_data_dir = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        Self::load_from(&Self::default_config_path(), env_data_dir)
    }

    /// Load configuration from an explicit file path, with an optional
    /// data-dir override taking precedence over the file.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    /// Returns `Error::Config` if the file exists but is unreadable or malformed.
    pub fn load_from(config_path: &Path, data_dir_override: Option<PathBuf>) -> Result<Self> {
        let file = match std::fs::read_to_string(config_path) {
            Ok(content) => toml::from_str::<ConfigFile>(&content)
                .map_err(|e| Error::Config(format!("{}: {}", config_path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {}", config_path.display());
                ConfigFile::default()
            }
            Err(e) => {
                return Err(Error::Config(format!("{}: {}", config_path.display(), e)));
            }
        };

        let data_dir = data_dir_override
            .or(file.data_dir)
            .unwrap_or_else(Self::default_data_dir);
        let mut config = Self::from_data_dir(&data_dir);

        if let Some(root) = file.storage_root {
            config.storage_root = root;
        }
        if let Some(root) = file.snapshot_root {
            config.snapshot_root = root;
        }
        if let Some(git) = file.git_binary.filter(|g| !g.trim().is_empty()) {
            config.git_binary = git;
        }

        debug!(
            "Config: storage={} snapshot={} git={}",
            config.storage_root.display(),
            config.snapshot_root.display(),
            config.git_binary
        );
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_data_dir(Self::default_data_dir())
    }
}
