//! AirQuery Configuration Module
//! Handles loading and validating airquery.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::adapter::dialect::SqlDialect;

pub const CONFIG_FILE: &str = "airquery.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub sql: SqlConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlConfig {
    #[serde(default)]
    pub dialect: SqlDialect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    #[serde(default)]
    pub max_page_size: Option<u64>,
    /// Append an ascending identifier order to unordered pages
    #[serde(default = "default_true")]
    pub order_by_identifier: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Let update/delete run without a filter and without an explicit opt-in
    #[serde(default)]
    pub allow_full_table_mutation: bool,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_page_size() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            sql: SqlConfig::default(),
            pagination: PaginationConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: None,
            order_by_identifier: true,
        }
    }
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Project config, then the user-level config, then built-in defaults.
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(project_dir: &Path) -> Result<Self, ConfigError> {
        match Self::load(project_dir) {
            Err(ConfigError::NotFound(_)) => {}
            other => return other,
        }
        if let Some(user_dir) = Self::user_config_dir() {
            match Self::load(&user_dir) {
                Err(ConfigError::NotFound(_)) => {}
                other => return other,
            }
        }
        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// `<config dir>/airquery`
    pub fn user_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("airquery"))
    }
}
