// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer registry: the in-memory table of known daemons.
//!
//! All mutations go through this type and are serialized behind one
//! mutex, so check-then-mutate operations (upsert merge, failure
//! promotion) are atomic. Persistence is a JSON array at `peers.json`;
//! saves copy the table under the lock and write outside it.

use loopsy_core::{manual_node_id, Clock, NodeId, Peer, PeerStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::snapshot::{load_json, save_json, SnapshotError};

/// Number of consecutive probe failures that demotes a peer to offline.
pub const OFFLINE_FAILURE_THRESHOLD: u32 = 3;

/// Field-wise update applied by [`PeerRegistry::upsert`].
///
/// `None` fields preserve the existing record; `Some` fields overwrite.
/// Unknown nodeIds insert a new record built from the present fields.
#[derive(Debug, Clone, Default)]
pub struct PeerUpsert {
    pub node_id: NodeId,
    pub hostname: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub platform: Option<String>,
    pub version: Option<String>,
    pub capabilities: Option<Vec<String>>,
    pub status: Option<PeerStatus>,
    pub last_seen: Option<u64>,
    pub trusted: Option<bool>,
    pub manually_added: Option<bool>,
}

impl PeerUpsert {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    fn apply_to(&self, peer: &mut Peer) {
        if let Some(v) = &self.hostname {
            peer.hostname = v.clone();
        }
        if let Some(v) = &self.address {
            peer.address = v.clone();
        }
        if let Some(v) = self.port {
            peer.port = v;
        }
        if let Some(v) = &self.platform {
            peer.platform = v.clone();
        }
        if let Some(v) = &self.version {
            peer.version = v.clone();
        }
        if let Some(v) = &self.capabilities {
            peer.capabilities = v.clone();
        }
        if let Some(v) = self.status {
            peer.status = v;
        }
        if let Some(v) = self.last_seen {
            peer.last_seen = v;
        }
        if let Some(v) = self.trusted {
            peer.trusted = v;
        }
        if let Some(v) = self.manually_added {
            peer.manually_added = v;
        }
    }

    fn into_new_peer(self, now_ms: u64) -> Peer {
        Peer {
            node_id: self.node_id,
            hostname: self.hostname.unwrap_or_default(),
            address: self.address.unwrap_or_default(),
            port: self.port.unwrap_or(0),
            platform: self.platform.unwrap_or_default(),
            version: self.version.unwrap_or_default(),
            capabilities: self.capabilities.unwrap_or_default(),
            status: self.status.unwrap_or(PeerStatus::Unknown),
            last_seen: self.last_seen.unwrap_or(now_ms),
            failure_count: 0,
            trusted: self.trusted.unwrap_or(false),
            manually_added: self.manually_added.unwrap_or(false),
        }
    }
}

/// Registry of known peers, keyed by nodeId.
pub struct PeerRegistry<C: Clock> {
    peers: Mutex<HashMap<NodeId, Peer>>,
    path: PathBuf,
    clock: C,
}

impl<C: Clock> PeerRegistry<C> {
    pub fn new(path: PathBuf, clock: C) -> Arc<Self> {
        Arc::new(Self {
            peers: Mutex::new(HashMap::new()),
            path,
            clock,
        })
    }

    pub fn get(&self, node_id: &NodeId) -> Option<Peer> {
        self.peers.lock().get(node_id).cloned()
    }

    pub fn get_by_address(&self, address: &str, port: u16) -> Option<Peer> {
        self.peers
            .lock()
            .values()
            .find(|p| p.address == address && p.port == port)
            .cloned()
    }

    pub fn get_all(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.lock().values().cloned().collect();
        peers.sort_by(|a, b| a.node_id.as_str().cmp(b.node_id.as_str()));
        peers
    }

    pub fn get_online(&self) -> Vec<Peer> {
        self.peers
            .lock()
            .values()
            .filter(|p| p.status == PeerStatus::Online)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Merge an update into the table (insert when the nodeId is new).
    ///
    /// When a real identity arrives for an endpoint that was manually
    /// added under a synthetic `manual-*` id, the synthetic record is
    /// replaced, carrying its `trusted` / `manuallyAdded` flags over.
    pub fn upsert(&self, update: PeerUpsert) -> Peer {
        let mut peers = self.peers.lock();

        // Absorb a synthetic manual record for the same endpoint.
        let mut inherited: Option<Peer> = None;
        if !update.node_id.as_str().starts_with("manual-") {
            if let (Some(address), Some(port)) = (&update.address, update.port) {
                let manual_id = manual_node_id(address, port);
                if manual_id != update.node_id {
                    inherited = peers.remove(&manual_id);
                }
            }
        }

        let entry = peers.entry(update.node_id.clone()).or_insert_with(|| {
            let mut peer = update.clone().into_new_peer(self.clock.now_ms());
            if let Some(old) = &inherited {
                peer.trusted = old.trusted;
                peer.manually_added = old.manually_added;
            }
            peer
        });
        update.apply_to(entry);
        entry.clone()
    }

    pub fn remove(&self, node_id: &NodeId) -> Option<Peer> {
        self.peers.lock().remove(node_id)
    }

    /// Mark a probe success: online, failure count reset, lastSeen now.
    pub fn mark_online(&self, node_id: &NodeId) {
        let mut peers = self.peers.lock();
        if let Some(peer) = peers.get_mut(node_id) {
            peer.status = PeerStatus::Online;
            peer.failure_count = 0;
            peer.last_seen = self.clock.now_ms();
        }
    }

    /// Record a probe failure; returns the new consecutive-failure count.
    pub fn mark_failure(&self, node_id: &NodeId) -> u32 {
        let mut peers = self.peers.lock();
        match peers.get_mut(node_id) {
            Some(peer) => {
                peer.failure_count = peer.failure_count.saturating_add(1);
                peer.failure_count
            }
            None => 0,
        }
    }

    pub fn mark_offline(&self, node_id: &NodeId) {
        let mut peers = self.peers.lock();
        if let Some(peer) = peers.get_mut(node_id) {
            peer.status = PeerStatus::Offline;
        }
    }

    /// Load the snapshot. Missing or malformed files yield an empty
    /// registry. Persisted status fields come back as saved; the health
    /// checker re-proves liveness on its first tick.
    pub fn load(&self) -> Result<usize, SnapshotError> {
        let loaded: Vec<Peer> = load_json(&self.path)?.unwrap_or_default();
        let count = loaded.len();
        let mut peers = self.peers.lock();
        peers.clear();
        for peer in loaded {
            peers.insert(peer.node_id.clone(), peer);
        }
        Ok(count)
    }

    /// Write the snapshot. The table is copied under the lock; the file
    /// write happens outside it.
    pub fn save(&self) -> Result<(), SnapshotError> {
        let peers = self.get_all();
        save_json(&self.path, &peers)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
