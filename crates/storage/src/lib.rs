// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loopsy-storage: persisted daemon state.
//!
//! Owns the two snapshot files (`peers.json`, `context.json`), the
//! in-memory stores they mirror, and the append-only audit log.
//! Snapshots may lag the in-memory state but are always internally
//! consistent: mutations are serialized behind a mutex and saves write
//! a full copy atomically (tmp + rename).

pub mod audit;
pub mod context;
pub mod registry;
pub mod snapshot;

pub use audit::{AuditRecord, AuditWriter};
pub use context::{ContextError, ContextStore};
pub use registry::{PeerRegistry, PeerUpsert};
pub use snapshot::{load_json, save_json, SnapshotError};
