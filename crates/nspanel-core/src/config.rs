//! Connector configuration.
//!
//! Configuration is read from a JSON file and/or environment variables.
//! Environment variables always win over file values so a deployment can
//! override a single setting without editing the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Environment variable names
pub mod env_vars {
    pub const CONNECTOR_ID: &str = "NSPANEL_CONNECTOR_ID";
    pub const CATEGORIES_MAPPING: &str = "NSPANEL_CATEGORIES_MAPPING";
    pub const CAPABILITIES_MAPPING: &str = "NSPANEL_CAPABILITIES_MAPPING";
    pub const LOG_LEVEL: &str = "NSPANEL_LOG_LEVEL";
    pub const LOG_JSON: &str = "NSPANEL_LOG_JSON";
    pub const STATE_CHANNEL_CAPACITY: &str = "NSPANEL_STATE_CHANNEL_CAPACITY";
}

/// Default values
pub mod defaults {
    pub const LOG_LEVEL: &str = "info";
    pub const STATE_CHANNEL_CAPACITY: usize = 1000;
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of the compact human format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    defaults::LOG_LEVEL.to_string()
}

fn default_state_channel_capacity() -> usize {
    defaults::STATE_CHANNEL_CAPACITY
}

/// Configuration of one connector instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector identifier, used on every outbound notification
    #[serde(default = "Uuid::new_v4")]
    pub connector: Uuid,

    /// Categories catalog overriding the embedded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories_mapping: Option<PathBuf>,

    /// Capabilities catalog overriding the embedded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities_mapping: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Buffer size of the state notification bus
    #[serde(default = "default_state_channel_capacity")]
    pub state_channel_capacity: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connector: Uuid::new_v4(),
            categories_mapping: None,
            capabilities_mapping: None,
            logging: LoggingConfig::default(),
            state_channel_capacity: defaults::STATE_CHANNEL_CAPACITY,
        }
    }
}

impl ConnectorConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build configuration from defaults and environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields with any environment variables that are set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env_vars::CONNECTOR_ID) {
            self.connector = Uuid::parse_str(value.trim()).map_err(|_| ConfigError::InvalidValue {
                key: env_vars::CONNECTOR_ID,
                value,
            })?;
        }

        if let Some(value) = lookup(env_vars::CATEGORIES_MAPPING) {
            self.categories_mapping = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup(env_vars::CAPABILITIES_MAPPING) {
            self.capabilities_mapping = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup(env_vars::LOG_LEVEL) {
            self.logging.level = value;
        }

        if let Some(value) = lookup(env_vars::LOG_JSON) {
            self.logging.json = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: env_vars::LOG_JSON,
                value,
            })?;
        }

        if let Some(value) = lookup(env_vars::STATE_CHANNEL_CAPACITY) {
            self.state_channel_capacity = value
                .trim()
                .parse()
                .ok()
                .filter(|capacity| *capacity > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: env_vars::STATE_CHANNEL_CAPACITY,
                    value,
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::default();
        assert!(config.categories_mapping.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.state_channel_capacity, 1000);
    }

    #[test]
    fn test_env_overrides() {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let vars = HashMap::from([
            (env_vars::CONNECTOR_ID, id_str.as_str()),
            (env_vars::CAPABILITIES_MAPPING, "/etc/nspanel/capabilities.json"),
            (env_vars::LOG_LEVEL, "debug"),
            (env_vars::LOG_JSON, "true"),
        ]);

        let mut config = ConnectorConfig::default();
        config.apply_vars(lookup(&vars)).unwrap();

        assert_eq!(config.connector, id);
        assert_eq!(
            config.capabilities_mapping,
            Some(PathBuf::from("/etc/nspanel/capabilities.json"))
        );
        assert!(config.categories_mapping.is_none());
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_env_invalid_values() {
        let vars = HashMap::from([(env_vars::CONNECTOR_ID, "not-a-uuid")]);
        let mut config = ConnectorConfig::default();
        assert!(matches!(
            config.apply_vars(lookup(&vars)),
            Err(ConfigError::InvalidValue { key, .. }) if key == env_vars::CONNECTOR_ID
        ));

        let vars = HashMap::from([(env_vars::STATE_CHANNEL_CAPACITY, "0")]);
        assert!(config.apply_vars(lookup(&vars)).is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: ConnectorConfig =
            serde_json::from_str(r#"{"logging": {"json": true}}"#).unwrap();
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.state_channel_capacity, 1000);
    }
}
