//! Configuration file tests.

use nspanel_core::{ConfigError, ConnectorConfig};
use std::path::PathBuf;
use uuid::Uuid;

#[test]
fn test_load_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connector.json");
    let connector = Uuid::new_v4();

    std::fs::write(
        &path,
        format!(
            r#"{{
                "connector": "{}",
                "categories_mapping": "/etc/nspanel/categories.json",
                "logging": {{"level": "debug", "json": false}},
                "state_channel_capacity": 64
            }}"#,
            connector
        ),
    )
    .unwrap();

    let config = ConnectorConfig::from_file(&path).unwrap();
    assert_eq!(config.connector, connector);
    assert_eq!(
        config.categories_mapping,
        Some(PathBuf::from("/etc/nspanel/categories.json"))
    );
    assert!(config.capabilities_mapping.is_none());
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.state_channel_capacity, 64);
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = ConnectorConfig::from_file(dir.path().join("missing.json"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_malformed_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("connector.json");
    std::fs::write(&path, "{\"connector\": 42").unwrap();

    let err = ConnectorConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("connector.json"));
}

#[test]
fn test_config_round_trip() {
    let config = ConnectorConfig::default();
    let raw = serde_json::to_string(&config).unwrap();
    let parsed: ConnectorConfig = serde_json::from_str(&raw).unwrap();

    assert_eq!(parsed.connector, config.connector);
    assert_eq!(parsed.logging, config.logging);
    assert!(!raw.contains("categories_mapping"));
}
