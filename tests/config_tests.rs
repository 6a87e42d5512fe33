//! Config loading, TOML parsing, and table construction from config.
//!
//! Some tests are `#[ignore]` (they chdir or set env vars and conflict in parallel).
//! Run them with: `cargo test --test config_tests -- --ignored --test-threads=1`

use doctable::{
    AttributeSchema, AttributeType, Config, MemoryConnector, MemoryStore, StoreConfig,
    TableConnector, TableDefinition, TableError,
};
use std::env;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

// Test Helpers
fn write_config(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn definition() -> TableDefinition {
    let schema = AttributeSchema::new(vec![("symbol", AttributeType::String)]).unwrap();
    TableDefinition::new("StockTable", schema)
}

// Default Configuration Tests
#[test]
fn test_config_default_ordered_writes() {
    let config = Config::default();
    assert!(config.store.ordered_writes);
}

#[test]
fn test_config_default_logging() {
    let config = Config::default();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "text");
}

// TOML File Parsing Tests
#[test]
fn test_from_file_reads_all_sections() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        "doctable.toml",
        r#"
[store]
uri = "mongodb://localhost:27017/trading"
collection_name = "stock_quotes"
ordered_writes = false

[logging]
level = "debug"
format = "json"
"#,
    );

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.store.uri, "mongodb://localhost:27017/trading");
    assert_eq!(config.store.collection_name.as_deref(), Some("stock_quotes"));
    assert!(!config.store.ordered_writes);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_from_file_partial_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "doctable.toml", "[store]\nuri = \"memory://x\"\n");

    let config = Config::from_file(&path).unwrap();
    assert!(config.store.collection_name.is_none());
    assert!(config.store.ordered_writes);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_from_file_without_uri_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "doctable.toml", "[logging]\nlevel = \"warn\"\n");

    let err = Config::from_file(&path).unwrap_err();
    assert!(matches!(err, TableError::Config(ref m) if m.contains("store.uri")));
}

#[test]
fn test_from_file_unknown_format_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        "doctable.toml",
        "[store]\nuri = \"memory://x\"\n\n[logging]\nformat = \"xml\"\n",
    );

    assert!(matches!(
        Config::from_file(&path),
        Err(TableError::Config(_))
    ));
}

#[test]
fn test_from_file_malformed_toml() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "doctable.toml", "[store\nuri = ");

    assert!(matches!(
        Config::from_file(&path),
        Err(TableError::Config(_))
    ));
}

#[test]
fn test_from_file_wrong_value_type() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        "doctable.toml",
        "[store]\nuri = \"memory://x\"\nordered_writes = \"sometimes\"\n",
    );

    assert!(Config::from_file(&path).is_err());
}

// Local Override and Env Tests
#[test]
#[ignore = "Requires --test-threads=1 due to directory change"]
fn test_load_merges_local_override() {
    let temp = TempDir::new().unwrap();
    write_config(
        &temp,
        "doctable.toml",
        "[store]\nuri = \"memory://base\"\ncollection_name = \"quotes\"\n",
    );
    write_config(&temp, "doctable.local.toml", "[store]\nuri = \"memory://local\"\n");

    let original_dir = env::current_dir().unwrap();
    env::set_current_dir(temp.path()).unwrap();
    let config = Config::load();
    env::set_current_dir(original_dir).unwrap();

    let config = config.unwrap();
    assert_eq!(config.store.uri, "memory://local");
    assert_eq!(config.store.collection_name.as_deref(), Some("quotes"));
}

#[test]
#[ignore = "Requires --test-threads=1 due to env var mutation"]
fn test_env_overrides_file() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "doctable.toml", "[store]\nuri = \"memory://file\"\n");

    env::set_var("DOCTABLE_STORE__URI", "memory://env");
    env::set_var("DOCTABLE_LOGGING__LEVEL", "warn");
    let config = Config::from_file(&path);
    env::remove_var("DOCTABLE_STORE__URI");
    env::remove_var("DOCTABLE_LOGGING__LEVEL");

    let config = config.unwrap();
    assert_eq!(config.store.uri, "memory://env");
    assert_eq!(config.logging.level, "warn");
}

// Connector Construction Tests
#[test]
fn test_connector_uses_configured_collection() {
    let connector = Arc::new(MemoryConnector::new(MemoryStore::new()));
    let mut config = StoreConfig::new("memory://x");
    config.collection_name = Some("stock_quotes".to_string());

    let table = TableConnector::new(definition(), &config, connector).unwrap();
    assert_eq!(table.collection_name(), "stock_quotes");
}

#[test]
fn test_connector_blank_collection_falls_back_to_table_id() {
    let connector = Arc::new(MemoryConnector::new(MemoryStore::new()));
    let mut config = StoreConfig::new("memory://x");
    config.collection_name = Some("   ".to_string());

    let table = TableConnector::new(definition(), &config, connector).unwrap();
    assert_eq!(table.collection_name(), "StockTable");
}

#[test]
fn test_connector_requires_uri() {
    let connector = Arc::new(MemoryConnector::new(MemoryStore::new()));
    let err = TableConnector::new(definition(), &StoreConfig::default(), connector).unwrap_err();
    assert!(matches!(err, TableError::Config(_)));
}
