//! The store directory and its `config.json`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{JobDbError, Result};
use crate::retry::RetryPolicy;
use crate::scheduler::Dialect;

/// Name of the store directory under `$HOME`
pub const DEFAULT_DIR_NAME: &str = ".seuranta";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler command dialect
    pub software: Dialect,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// How long to wait for another process's write lock
    ///
    /// Transitions hold the lock while a submit or cancel runs, so this
    /// should be longer than `command_timeout_secs`.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_busy_timeout_ms() -> u64 {
    (default_command_timeout_secs() + 15) * 1000
}

impl Config {
    pub fn new(software: Dialect) -> Self {
        Config {
            software,
            command_timeout_secs: default_command_timeout_secs(),
            busy_timeout_ms: default_busy_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|err| JobDbError::Config(format!("{}: {err}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Read `path`, writing it first with a detected dialect if it doesn't exist
    pub fn load_or_init(path: &Path) -> Result<Self> {
        Self::load_or_init_with(path, Dialect::detect)
    }

    fn load_or_init_with(path: &Path, detect: impl FnOnce() -> Dialect) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Config::new(detect());
        info!("Writing new config {}", path.display());
        config.save(path)?;
        Ok(config)
    }
}

/// Files inside the store directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorePaths {
    pub dir: PathBuf,
    pub db: PathBuf,
    pub config: PathBuf,
}

impl StorePaths {
    pub fn new(dir: &Path) -> Self {
        StorePaths {
            dir: dir.to_path_buf(),
            db: dir.join("jobs.db"),
            config: dir.join("config.json"),
        }
    }

    /// Make sure the directory exists
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}

/// `$HOME/.seuranta`
pub fn default_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_DIR_NAME))
        .ok_or_else(|| JobDbError::Config("can't find a home directory".to_string()))
}
