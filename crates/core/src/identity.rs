// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node identity: who this daemon is on the mesh.

use crate::id::NodeId;
use serde::{Deserialize, Serialize};

/// Protocol version exchanged in handshakes and mDNS TXT records.
/// Only the major component participates in compatibility checks.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Fixed capability set every daemon advertises.
pub const CAPABILITIES: &[&str] = &["execute", "transfer", "context", "ai-tasks"];

/// Identity generated at startup; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIdentity {
    pub node_id: NodeId,
    pub hostname: String,
    pub platform: String,
    pub version: String,
    pub port: u16,
    pub capabilities: Vec<String>,
}

impl NodeIdentity {
    /// Build the identity for this process.
    pub fn generate(hostname: String, port: u16) -> Self {
        Self {
            node_id: NodeId::generate(),
            hostname,
            platform: std::env::consts::OS.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            port,
            capabilities: CAPABILITIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// mDNS instance name: `loopsy-<first 8 of nodeId>`.
    pub fn instance_name(&self) -> String {
        format!("loopsy-{}", self.node_id.short(8))
    }
}

/// Compare protocol versions on their major component only.
pub fn versions_compatible(a: &str, b: &str) -> bool {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    major(a).is_some() && major(a) == major(b)
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
