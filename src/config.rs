use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{ENV_DATA_DIR, ENV_LOG_DIR, ENV_MIGRATIONS_DIR};
use crate::error::{ImportError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the unlinked-data store
    pub data_dir: PathBuf,
    /// Directory of migration rule files (`*.json`)
    pub migrations_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Database name used when linking exchanges inside a batch
    pub database_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            migrations_dir: PathBuf::from("migrations"),
            log_dir: PathBuf::from("logs"),
            database_name: "imported".to_string(),
        }
    }
}

impl Config {
    /// Read `path` (defaults when it does not exist), then apply environment
    /// overrides. Call `dotenv` first if a `.env` file should count.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                ImportError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_MIGRATIONS_DIR) {
            self.migrations_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = PathBuf::from(dir);
        }
    }
}
