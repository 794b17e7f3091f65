// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn test_load_missing_file_writes_defaults_with_key() {
    let dir = tempdir().unwrap();
    let data_dir = DataDir::new(dir.path());

    let config = load_or_init(&data_dir).unwrap();
    assert_eq!(config.server.port, 19532);
    assert_eq!(config.auth.api_key.len(), 64);
    assert!(data_dir.config_file().exists());

    // Second load returns the same key, not a fresh one
    let again = load_or_init(&data_dir).unwrap();
    assert_eq!(again.auth.api_key, config.auth.api_key);
}

#[test]
fn test_partial_config_overrides_only_named_fields() {
    let dir = tempdir().unwrap();
    let data_dir = DataDir::new(dir.path());
    std::fs::write(
        data_dir.config_file(),
        "server:\n  port: 4242\nauth:\n  apiKey: abc123\n",
    )
    .unwrap();

    let config = load_or_init(&data_dir).unwrap();
    assert_eq!(config.server.port, 4242);
    assert_eq!(config.auth.api_key, "abc123");
    // Untouched sections keep defaults
    assert_eq!(config.execution.max_concurrent, 10);
    assert!(config.discovery.enabled);
}

#[test]
fn test_save_round_trip_preserves_allowed_keys() {
    let dir = tempdir().unwrap();
    let data_dir = DataDir::new(dir.path());

    let mut config = load_or_init(&data_dir).unwrap();
    config
        .auth
        .allowed_keys
        .insert("devbox".to_string(), "KB".to_string());
    config
        .tls
        .pinned_certs
        .insert("devbox".to_string(), "deadbeef".to_string());
    save(&data_dir, &config).unwrap();

    let back = load_or_init(&data_dir).unwrap();
    assert_eq!(back.auth.allowed_keys.get("devbox").unwrap(), "KB");
    assert_eq!(back.tls.pinned_certs.get("devbox").unwrap(), "deadbeef");
}

#[test]
fn test_generate_api_key_is_hex() {
    let key = generate_api_key();
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(key, generate_api_key());
}
