// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared handler state.

use loopsy_agents::{AiTaskManager, ProcessLauncher};
use loopsy_config::{Config, DataDir};
use loopsy_core::{NodeIdentity, SystemClock};
use loopsy_exec::JobManager;
use loopsy_mesh::PairingManager;
use loopsy_storage::{AuditWriter, ContextStore, PeerRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Everything the HTTP handlers touch.
///
/// Generic over the process launcher so handler tests run against
/// scripted agents; production uses [`loopsy_agents::NativeLauncher`].
pub struct AppState<L: ProcessLauncher> {
    pub identity: NodeIdentity,
    pub data_dir: DataDir,
    /// Mutated at runtime by pairing confirmation.
    pub config: Mutex<Config>,
    pub registry: Arc<PeerRegistry<SystemClock>>,
    pub context: Arc<ContextStore<SystemClock>>,
    pub jobs: Arc<JobManager<SystemClock>>,
    pub tasks: Arc<AiTaskManager<L, SystemClock>>,
    pub pairing: Arc<PairingManager<SystemClock>>,
    pub audit: Arc<AuditWriter>,
    pub client: reqwest::Client,
    /// Working API key per remote endpoint, learned by the aggregator.
    pub key_cache: Mutex<std::collections::HashMap<String, String>>,
    pub started: Instant,
}

impl<L: ProcessLauncher> AppState<L> {
    /// Uptime in whole seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Bearer keys this daemon will present outbound: its own first,
    /// then every paired peer's.
    pub fn known_keys(&self) -> Vec<String> {
        let config = self.config.lock();
        let mut keys = vec![config.auth.api_key.clone()];
        keys.extend(config.auth.allowed_keys.values().cloned());
        keys
    }
}
