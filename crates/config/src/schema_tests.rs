// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn test_defaults_match_catalog() {
    let config = Config::default();
    assert_eq!(config.server.port, 19532);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.execution.max_concurrent, 10);
    assert_eq!(config.execution.default_timeout, 300_000);
    assert!(config.execution.allowlist.is_none());
    assert_eq!(
        config.execution.denylist,
        vec!["rm", "rmdir", "format", "mkfs", "dd", "shutdown", "reboot"]
    );
    assert_eq!(config.transfer.max_file_size, 1024 * 1024 * 1024);
    assert_eq!(config.rate_limits.execute, 30);
    assert_eq!(config.rate_limits.transfer, 10);
    assert_eq!(config.rate_limits.context, 60);
    assert!(config.discovery.enabled);
    assert_eq!(config.logging.level, "info");
    assert!(!config.tls.enabled);
}

#[test]
fn test_transfer_defaults_deny_key_material() {
    let transfer = TransferConfig::default();
    let denied: Vec<String> = transfer
        .denied_paths
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(denied, vec![".ssh", ".gnupg"]);
    assert_eq!(transfer.allowed_paths.len(), 1);
}

#[test]
fn test_yaml_keys_are_camel_case() {
    let mut config = Config::default();
    config.auth.api_key = "k".into();
    let yaml = serde_yaml::to_string(&config).unwrap();
    assert!(yaml.contains("apiKey:"), "yaml was:\n{yaml}");
    assert!(yaml.contains("maxConcurrent:"));
    assert!(yaml.contains("rateLimits:"));
    assert!(yaml.contains("manualPeers:"));
    assert!(yaml.contains("defaultTimeout:"));
}

#[test]
fn test_is_allowed_checks_own_and_peer_keys() {
    let mut auth = AuthConfig {
        api_key: "own".into(),
        ..Default::default()
    };
    auth.allowed_keys.insert("peer".into(), "KB".into());
    assert!(auth.is_allowed("own"));
    assert!(auth.is_allowed("KB"));
    assert!(!auth.is_allowed("nope"));
}

#[test]
fn test_manual_peers_parse() {
    let yaml = "discovery:\n  manualPeers:\n    - address: 10.0.0.5\n      port: 19532\n      hostname: lab\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.discovery.manual_peers.len(), 1);
    assert_eq!(config.discovery.manual_peers[0].address, "10.0.0.5");
    assert_eq!(
        config.discovery.manual_peers[0].hostname.as_deref(),
        Some("lab")
    );
}
