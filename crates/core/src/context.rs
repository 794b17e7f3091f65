// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context entry model: TTL-bounded shared key/value state.

use crate::id::NodeId;
use serde::{Deserialize, Serialize};

/// Maximum key length in characters.
pub const MAX_KEY_LEN: usize = 256;

/// Maximum value size in bytes (1 MiB).
pub const MAX_VALUE_BYTES: usize = 1024 * 1024;

/// Maximum number of entries per daemon.
pub const MAX_ENTRIES: usize = 1000;

/// One entry in the context store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    pub key: String,
    pub value: String,
    pub from_node_id: NodeId,
    pub created_at: u64,
    pub updated_at: u64,
    /// TTL in seconds; `None` means the entry never expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Expiry instant, `updated_at + ttl * 1000`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl ContextEntry {
    /// True when the entry has an expiry in the past.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| now_ms >= at)
    }
}
