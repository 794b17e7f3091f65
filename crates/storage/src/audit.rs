// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only audit log.
//!
//! One JSON line per completed API request. Write failures are
//! swallowed so the audit path can never block or fail a response.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// One audit line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub from_ip: String,
    pub status_code: u16,
    /// Request duration in milliseconds.
    pub duration: u64,
    pub timestamp: DateTime<Utc>,
}

/// Appender for `<dataDir>/logs/audit.jsonl`.
pub struct AuditWriter {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl AuditWriter {
    pub fn new(path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            path,
            file: Mutex::new(None),
        })
    }

    /// Append one record. Errors are logged at debug and dropped.
    pub fn append(&self, record: &AuditRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, "failed to serialize audit record");
                return;
            }
        };

        let mut guard = self.file.lock();
        if guard.is_none() {
            *guard = self.open();
        }
        let Some(file) = guard.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(file, "{line}") {
            tracing::debug!(error = %e, "audit append failed");
            // Drop the handle so the next append retries the open
            *guard = None;
        }
    }

    fn open(&self) -> Option<File> {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::debug!(error = %e, path = %self.path.display(), "audit log open failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
