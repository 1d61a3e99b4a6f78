//! Migration configuration.
//!
//! Loaded from a TOML file named by `COLSHIFT_CONFIG` (or an explicit path),
//! then overridden from the environment:
//! - `COLSHIFT_KEYSPACE`: target keyspace
//! - `COLSHIFT_LOG`: tracing filter directive

use crate::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Keyspace holding the store's own metadata. Tasks never target it.
pub const SYSTEM_KEYSPACE: &str = "system";

pub const CONFIG_PATH_ENV: &str = "COLSHIFT_CONFIG";
pub const KEYSPACE_ENV: &str = "COLSHIFT_KEYSPACE";
pub const LOG_FILTER_ENV: &str = "COLSHIFT_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    pub keyspace: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "colshift_tasks=info,warn".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl MigrationConfig {
    /// Config for a keyspace with default logging.
    pub fn for_keyspace(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load from the path in `COLSHIFT_CONFIG`, apply env overrides, validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingConfigPath)?;
        let mut config = Self::from_path(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: MigrationConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(keyspace) = std::env::var(KEYSPACE_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            self.keyspace = keyspace;
        }
        if let Some(filter) = std::env::var(LOG_FILTER_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            self.logging.filter = filter;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keyspace.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "keyspace",
                reason: "must not be empty".to_string(),
            });
        }
        if self.keyspace == SYSTEM_KEYSPACE {
            return Err(ConfigError::InvalidValue {
                field: "keyspace",
                reason: format!("'{}' is reserved", SYSTEM_KEYSPACE),
            });
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
