// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context store: TTL-bounded shared key/value state.
//!
//! Bounded at 1000 entries and 1 MiB per value. Expiry is enforced
//! lazily on `get` and by a periodic sweep the daemon drives; both paths
//! go through the same mutex so expire-then-read races cannot observe a
//! dead entry.

use loopsy_core::context::{MAX_ENTRIES, MAX_KEY_LEN, MAX_VALUE_BYTES};
use loopsy_core::{Clock, ContextEntry, ErrorCode, NodeId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::snapshot::{load_json, save_json, SnapshotError};

/// Context store errors
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("context key not found: {0}")]
    KeyNotFound(String),

    #[error("value is {size} bytes (max {MAX_VALUE_BYTES})")]
    ValueTooLarge { size: usize },

    #[error("store is full ({MAX_ENTRIES} entries)")]
    MaxEntries,

    #[error("key is {len} chars (max {MAX_KEY_LEN})")]
    KeyTooLong { len: usize },
}

impl ContextError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::KeyNotFound(_) => ErrorCode::ContextKeyNotFound,
            Self::ValueTooLarge { .. } => ErrorCode::ContextValueTooLarge,
            Self::MaxEntries => ErrorCode::ContextMaxEntries,
            Self::KeyTooLong { .. } => ErrorCode::InvalidRequest,
        }
    }
}

/// TTL-bounded K/V store with snapshot persistence.
pub struct ContextStore<C: Clock> {
    entries: Mutex<BTreeMap<String, ContextEntry>>,
    path: PathBuf,
    clock: C,
}

impl<C: Clock> ContextStore<C> {
    pub fn new(path: PathBuf, clock: C) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(BTreeMap::new()),
            path,
            clock,
        })
    }

    /// Insert or overwrite an entry.
    ///
    /// Overwrites preserve `createdAt`; the TTL window restarts from
    /// `updatedAt` either way.
    pub fn set(
        &self,
        key: String,
        value: String,
        from_node_id: NodeId,
        ttl: Option<u64>,
    ) -> Result<ContextEntry, ContextError> {
        if key.chars().count() > MAX_KEY_LEN {
            return Err(ContextError::KeyTooLong {
                len: key.chars().count(),
            });
        }
        if value.len() > MAX_VALUE_BYTES {
            return Err(ContextError::ValueTooLarge { size: value.len() });
        }

        let now = self.clock.now_ms();
        let expires_at = ttl.map(|t| now + t * 1000);

        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get_mut(&key) {
            existing.value = value;
            existing.from_node_id = from_node_id;
            existing.updated_at = now;
            existing.ttl = ttl;
            existing.expires_at = expires_at;
            return Ok(existing.clone());
        }

        if entries.len() >= MAX_ENTRIES {
            return Err(ContextError::MaxEntries);
        }

        let entry = ContextEntry {
            key: key.clone(),
            value,
            from_node_id,
            created_at: now,
            updated_at: now,
            ttl,
            expires_at,
        };
        entries.insert(key, entry.clone());
        Ok(entry)
    }

    /// Fetch an entry, lazily deleting it when expired.
    pub fn get(&self, key: &str) -> Option<ContextEntry> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    pub fn delete(&self, key: &str) -> Result<(), ContextError> {
        let mut entries = self.entries.lock();
        entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ContextError::KeyNotFound(key.to_string()))
    }

    /// List live entries, optionally filtered by key prefix.
    pub fn list(&self, prefix: Option<&str>) -> Vec<ContextEntry> {
        let now = self.clock.now_ms();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .filter(|e| prefix.is_none_or(|p| e.key.starts_with(p)))
            .cloned()
            .collect()
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// Remove expired entries; returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    /// Load the snapshot, dropping entries that expired while the
    /// daemon was down.
    pub fn load(&self) -> Result<usize, SnapshotError> {
        let loaded: Vec<ContextEntry> = load_json(&self.path)?.unwrap_or_default();
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        entries.clear();
        for entry in loaded {
            if !entry.is_expired(now) {
                entries.insert(entry.key.clone(), entry);
            }
        }
        Ok(entries.len())
    }

    /// Write the snapshot (live entries only).
    pub fn save(&self) -> Result<(), SnapshotError> {
        let entries = self.list(None);
        save_json(&self.path, &entries)
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
