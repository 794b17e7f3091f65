// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loopsy-daemon: the per-node engine.
//!
//! One process per data directory. Startup wires the peer registry,
//! context store, job manager, AI task manager, pairing manager and
//! discovery together, binds the HTTP API, and supervises the
//! background loops (health checks, context expiry sweeps, mDNS).
//! Shutdown tears them down in reverse order and flushes snapshots.

pub mod aggregate;
pub mod http;
pub mod lifecycle;
pub mod state;
pub mod tls;

pub use lifecycle::{Daemon, LifecycleError, StartupOptions};
pub use state::AppState;

#[cfg(test)]
pub(crate) mod test_support;
