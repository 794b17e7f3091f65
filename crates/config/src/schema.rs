// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config schema: the recognized option set with defaults.
//!
//! Every section is optional in the file; `#[serde(default)]` at each
//! level means a partial config overrides only what it names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default API port.
pub const DEFAULT_PORT: u16 = 19532;

/// Default execution denylist (matched against the command basename).
pub const DEFAULT_DENYLIST: &[&str] =
    &["rm", "rmdir", "format", "mkfs", "dd", "shutdown", "reboot"];

/// Top-level config tree, serialized as YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub tls: TlsConfig,
    pub execution: ExecutionConfig,
    pub transfer: TransferConfig,
    pub rate_limits: RateLimitsConfig,
    pub discovery: DiscoveryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Defaults to the OS hostname when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: "0.0.0.0".to_string(),
            hostname: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    /// Our own bearer key. Generated (32-byte hex) when empty.
    pub api_key: String,
    /// Keys of paired peers, hostname → key.
    pub allowed_keys: BTreeMap<String, String>,
}

impl AuthConfig {
    /// True when `key` is our own key or a paired peer's.
    pub fn is_allowed(&self, key: &str) -> bool {
        key == self.api_key || self.allowed_keys.values().any(|k| k == key)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsConfig {
    pub enabled: bool,
    /// Pinned peer certificates, hostname → SHA-256 hex fingerprint.
    pub pinned_certs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionConfig {
    pub denylist: Vec<String>,
    /// Absent means allow-all (subject to the denylist).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowlist: Option<Vec<String>>,
    pub max_concurrent: usize,
    /// Default wall-clock timeout in milliseconds.
    pub default_timeout: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            allowlist: None,
            max_concurrent: 10,
            default_timeout: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferConfig {
    pub allowed_paths: Vec<PathBuf>,
    pub denied_paths: Vec<PathBuf>,
    /// Per-file byte cap (default 1 GiB).
    pub max_file_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        Self {
            allowed_paths: vec![home.clone()],
            denied_paths: vec![home.join(".ssh"), home.join(".gnupg")],
            max_file_size: 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitsConfig {
    /// Requests per minute per endpoint family.
    pub execute: u32,
    pub transfer: u32,
    pub context: u32,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            execute: 30,
            transfer: 10,
            context: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub manual_peers: Vec<ManualPeer>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manual_peers: Vec::new(),
        }
    }
}

/// Statically-configured peer address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualPeer {
    pub address: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log to this file instead of stderr when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
