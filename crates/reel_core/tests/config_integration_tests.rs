//! Integration tests for workspace configuration.

use std::fs;
use tempfile::tempdir;

use reel_core::{ConfigError, ReelConfig};

/// A workspace without settings falls back to the defaults.
#[test]
fn test_discover_without_settings_file() {
    let temp = tempdir().unwrap();

    let config = ReelConfig::discover(temp.path()).unwrap();
    let defaults = ReelConfig::default();

    assert_eq!(config.render, defaults.render);
    assert_eq!(config.correction, defaults.correction);
}

/// Saved settings are read back on discovery.
#[test]
fn test_save_then_discover() {
    let temp = tempdir().unwrap();
    let mut config = ReelConfig::default();
    config.render.deadline_secs = 120;
    config.render.max_consecutive_failures = 3;
    config.correction.max_attempts = 2;

    config.save(&ReelConfig::path_for(temp.path())).unwrap();

    let loaded = ReelConfig::load(&ReelConfig::path_for(temp.path())).unwrap();
    assert_eq!(loaded.render.deadline_secs, 120);
    assert_eq!(loaded.render.max_consecutive_failures, 3);
    assert_eq!(loaded.correction.max_attempts, 2);
}

/// Invalid values in the file are rejected with the offending field.
#[test]
fn test_invalid_settings_rejected() {
    let temp = tempdir().unwrap();
    let path = ReelConfig::path_for(temp.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "[render]\nfailure_backoff_factor = 1\n").unwrap();

    match ReelConfig::load(&path) {
        Err(ConfigError::Invalid { field, .. }) => {
            assert_eq!(field, "render.failure_backoff_factor");
        }
        other => panic!("expected invalid config, got {:?}", other),
    }
}

/// Malformed TOML surfaces as a parse error.
#[test]
fn test_malformed_settings() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "[render\ndeadline_secs = ").unwrap();

    assert!(matches!(ReelConfig::load(&path), Err(ConfigError::Parse(_))));
}
