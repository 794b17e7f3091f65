// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loopsy-config: YAML configuration and data-directory layout.
//!
//! The config file lives at `<dataDir>/config.yaml`. A missing file
//! yields defaults; a missing `auth.apiKey` is generated and written
//! back so the key survives restarts. Saves are atomic (tmp + rename)
//! because pairing mutates the file while the daemon is live.

mod paths;
mod schema;

pub use paths::DataDir;
pub use schema::{
    AuthConfig, Config, DiscoveryConfig, ExecutionConfig, LoggingConfig, ManualPeer,
    RateLimitsConfig, ServerConfig, TlsConfig, TransferConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Load the config, creating it with defaults when absent.
///
/// A freshly-generated `auth.apiKey` is persisted immediately so peers
/// paired against this daemon keep working across restarts.
pub fn load_or_init(data_dir: &DataDir) -> Result<Config, ConfigError> {
    let path = data_dir.config_file();
    let mut config = if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&raw)?
    } else {
        Config::default()
    };

    let mut dirty = !path.exists();
    if config.auth.api_key.is_empty() {
        config.auth.api_key = generate_api_key();
        dirty = true;
    }

    if dirty {
        save(data_dir, &config)?;
        tracing::info!(path = %path.display(), "wrote initial config");
    }

    Ok(config)
}

/// Atomically rewrite the config file.
pub fn save(data_dir: &DataDir, config: &Config) -> Result<(), ConfigError> {
    let path = data_dir.config_file();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// Random 32-byte lowercase-hex API key.
pub fn generate_api_key() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
