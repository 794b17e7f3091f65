// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer model: one record per known daemon, local or remote.

use crate::id::NodeId;
use serde::{Deserialize, Serialize};

/// Liveness status of a peer as judged by the health checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Online,
    Offline,
    Unknown,
}

/// A known peer daemon.
///
/// Created by mDNS discovery, manual add, handshake, or dashboard
/// fan-out; mutated only through the registry's upsert/mark* operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub node_id: NodeId,
    pub hostname: String,
    pub address: String,
    pub port: u16,
    pub platform: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub status: PeerStatus,
    /// Epoch ms of the last successful contact. Stale when not online.
    pub last_seen: u64,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub trusted: bool,
    #[serde(default)]
    pub manually_added: bool,
}

impl Peer {
    /// Peer record for a manually-added address with no known identity.
    pub fn manual(address: String, port: u16, hostname: Option<String>, now_ms: u64) -> Self {
        Self {
            node_id: manual_node_id(&address, port),
            hostname: hostname.unwrap_or_else(|| address.clone()),
            address,
            port,
            platform: String::new(),
            version: String::new(),
            capabilities: Vec::new(),
            status: PeerStatus::Unknown,
            last_seen: now_ms,
            failure_count: 0,
            trusted: false,
            manually_added: true,
        }
    }

    /// `address:port` key used for merge-by-endpoint operations.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Synthetic node id for manually-added peers: `manual-<address>:<port>`.
pub fn manual_node_id(address: &str, port: u16) -> NodeId {
    NodeId::new(format!("manual-{address}:{port}"))
}

#[cfg(test)]
#[path = "peer_tests.rs"]
mod tests;
