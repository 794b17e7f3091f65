// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health checker: periodic liveness probes over the peer registry.
//!
//! Every tick, each probeable peer gets an independent GET against its
//! `/api/v1/health`. Probes run concurrently; the tick waits for all of
//! them, which also serializes probes per peer. A peer is probeable
//! until it is offline with three or more consecutive failures - after
//! that only discovery or a manual touch brings it back into rotation.

use loopsy_core::{Clock, Peer, PeerStatus};
use loopsy_storage::registry::{PeerRegistry, OFFLINE_FAILURE_THRESHOLD};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Probe interval.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(15);

/// Per-probe timeout.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback fired when a peer is demoted to offline.
pub type OfflineCallback = Arc<dyn Fn(&Peer) + Send + Sync>;

/// Periodic liveness prober.
pub struct HealthChecker<C: Clock> {
    registry: Arc<PeerRegistry<C>>,
    client: reqwest::Client,
    interval: Duration,
    on_offline: Option<OfflineCallback>,
}

impl<C: Clock> HealthChecker<C> {
    pub fn new(registry: Arc<PeerRegistry<C>>) -> Self {
        Self {
            registry,
            client: reqwest::Client::new(),
            interval: HEALTH_INTERVAL,
            on_offline: None,
        }
    }

    /// Override the probe interval (tests).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Register a callback for offline demotions.
    pub fn with_offline_callback(mut self, callback: OfflineCallback) -> Self {
        self.on_offline = Some(callback);
        self
    }

    /// Start the probe loop. Returns a shutdown sender; dropping it or
    /// sending stops the loop after the current tick.
    pub fn spawn(self) -> oneshot::Sender<()> {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::debug!("health checker stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.probe_all().await;
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Probe every probeable peer once, concurrently.
    pub async fn probe_all(&self) {
        let peers: Vec<Peer> = self
            .registry
            .get_all()
            .into_iter()
            .filter(|p| p.status != PeerStatus::Offline || p.failure_count < OFFLINE_FAILURE_THRESHOLD)
            .collect();

        let probes = peers.into_iter().map(|peer| self.probe_one(peer));
        futures::future::join_all(probes).await;
    }

    async fn probe_one(&self, peer: Peer) {
        let url = format!("http://{}:{}/api/v1/health", peer.address, peer.port);
        let healthy = match self
            .client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::trace!(peer = %peer.node_id, error = %e, "health probe failed");
                false
            }
        };

        if healthy {
            self.registry.mark_online(&peer.node_id);
            return;
        }

        let failures = self.registry.mark_failure(&peer.node_id);
        if failures >= OFFLINE_FAILURE_THRESHOLD && peer.status != PeerStatus::Offline {
            self.registry.mark_offline(&peer.node_id);
            tracing::info!(peer = %peer.node_id, failures, "peer demoted to offline");
            if let Some(callback) = &self.on_offline {
                if let Some(demoted) = self.registry.get(&peer.node_id) {
                    callback(&demoted);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
