//! Tests for configuration module

use super::*;
use crate::error::{Error, Result};
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

fn create_temp_config_file(content: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .map_err(|e| Error::config(format!("Failed to create temp file: {e}")))?;
    file.write_all(content.as_bytes())
        .map_err(|e| Error::config(format!("Failed to write temp file: {e}")))?;
    file.flush()
        .map_err(|e| Error::config(format!("Failed to flush temp file: {e}")))?;
    Ok(file)
}

#[test]
fn test_from_toml_str_valid() {
    let toml = r#"
        [watch]
        restart_interval_ms = 5000
        wait_timeout_ms = 2000
    "#;

    let config = Config::from_toml_str(toml).expect("Failed to parse valid TOML");
    assert_eq!(config.watch.restart_interval_ms, 5000);
    assert_eq!(config.watch.wait_timeout_ms, 2000);
    assert_eq!(config.watch.drain_interval_ms, 1000);
}

#[test]
fn test_from_toml_str_empty_uses_defaults() {
    let config = Config::from_toml_str("").expect("Failed to parse empty TOML");
    assert_eq!(config, Config::default());
    assert_eq!(config.watch.restart_interval(), Duration::from_secs(60));
    assert_eq!(config.watch.wait_timeout(), Duration::from_secs(10));
}

#[test]
fn test_from_toml_str_invalid() {
    let result = Config::from_toml_str("[watch\nrestart_interval_ms = ");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_from_file_reads_values() {
    let file = create_temp_config_file(
        r#"
        [watch]
        coalesce_window_ms = 250
        max_queue_size = 64
        "#,
    )
    .expect("test setup failed");

    let config = Config::from_file(file.path()).expect("Failed to load config");
    assert_eq!(config.watch.coalesce_window_ms, 250);
    assert_eq!(config.watch.max_queue_size, 64);
    assert_eq!(config.watch.restart_interval_ms, 60_000);
}

#[test]
fn test_from_file_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("test setup failed");
    let config =
        Config::from_file(&dir.path().join("absent.toml")).expect("Failed to load config");
    assert_eq!(config.watch.wait_timeout_ms, 10_000);
    assert_eq!(config.watch.rename_pair_window_ms, 50);
}

#[test]
fn test_validate_default_ok() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_validate_rejects_zero_restart_interval() {
    let mut config = Config::default();
    config.watch.restart_interval_ms = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("restart_interval_ms"));
}

#[test]
fn test_validate_rejects_zero_queue() {
    let mut config = Config::default();
    config.watch.max_queue_size = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_drain_longer_than_wait() {
    let mut config = Config::default();
    config.watch.drain_interval_ms = 20_000;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("drain_interval_ms"));
}
