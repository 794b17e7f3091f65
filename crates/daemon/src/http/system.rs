// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node-level endpoints: health, identity, status.

use axum::extract::State;
use axum::Json;
use loopsy_agents::ProcessLauncher;
use loopsy_core::PeerStatus;
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

/// `GET /health` (unauthenticated).
pub async fn health<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "nodeId": state.identity.node_id,
        "uptime": state.uptime_secs(),
        "version": state.identity.version,
    }))
}

/// `GET /identity`.
pub async fn identity<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<loopsy_core::NodeIdentity> {
    Json(state.identity.clone())
}

/// `GET /status`: node summary plus per-subsystem counters.
pub async fn status<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<serde_json::Value> {
    let peers = state.registry.get_all();
    let online = peers
        .iter()
        .filter(|p| p.status == PeerStatus::Online)
        .count();

    Json(json!({
        "node": state.identity,
        "uptime": state.uptime_secs(),
        "peers": { "total": peers.len(), "online": online },
        "activeJobs": state.jobs.active_count(),
        "activeTasks": state.tasks.active_count(),
        "contextEntries": state.context.size(),
    }))
}
