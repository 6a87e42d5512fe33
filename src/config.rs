//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - doctable.toml (default configuration)
//! - doctable.local.toml (git-ignored local overrides)
//! - Environment variables (DOCTABLE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # doctable.toml
//! [store]
//! uri = "mongodb://localhost:27017/trading"
//! collection_name = "stock_quotes"
//! ordered_writes = true
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! DOCTABLE_STORE__URI=mongodb://db.internal:27017/trading
//! DOCTABLE_LOGGING__LEVEL=warn
//! ```

use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{TableError, TableResult};

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backing store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection URI, passed to the store connector untouched
    #[serde(default)]
    pub uri: String,

    /// Physical collection name; defaults to the table id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,

    /// Stop each bulk round trip at the first rejected item and resume after
    /// it; unordered writes attempt every item in a single round trip
    #[serde(default = "default_true")]
    pub ordered_writes: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. doctable.toml (base configuration)
    /// 2. doctable.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (DOCTABLE_* prefix)
    pub fn load() -> TableResult<Self> {
        let config: Config = Figment::new()
            .merge(Toml::file("doctable.toml"))
            .merge(Toml::file("doctable.local.toml"))
            .merge(Env::prefixed("DOCTABLE_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from specific file path
    pub fn from_file(path: impl AsRef<Path>) -> TableResult<Self> {
        let config: Config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DOCTABLE_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no table could run with
    pub fn validate(&self) -> TableResult<()> {
        if self.store.uri.trim().is_empty() {
            return Err(TableError::Config("store.uri must be set".to_string()));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(TableError::Config(format!(
                "unknown logging.format '{}', expected text or json",
                self.logging.format
            )));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            uri: String::new(),
            collection_name: None,
            ordered_writes: true,
        }
    }
}

impl StoreConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        StoreConfig {
            uri: uri.into(),
            ..Default::default()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
