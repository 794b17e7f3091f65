// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer registry endpoints.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::Json;
use loopsy_agents::ProcessLauncher;
use loopsy_core::identity::versions_compatible;
use loopsy_core::{ErrorCode, NodeId, Peer, PeerStatus, SystemClock};
use loopsy_storage::registry::PeerUpsert;
use loopsy_core::Clock;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::state::AppState;

use super::error::{ApiError, ApiJson};

/// `GET /peers`.
pub async fn list<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<serde_json::Value> {
    Json(json!({ "peers": state.registry.get_all() }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddPeerRequest {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub hostname: Option<String>,
}

/// `POST /peers`: upsert a manually-added peer.
pub async fn add_manual<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    ApiJson(request): ApiJson<AddPeerRequest>,
) -> Result<Json<Peer>, ApiError> {
    let manual = Peer::manual(
        request.address,
        request.port,
        request.hostname,
        SystemClock.now_ms(),
    );

    let mut update = PeerUpsert::new(manual.node_id.clone());
    update.hostname = Some(manual.hostname.clone());
    update.address = Some(manual.address.clone());
    update.port = Some(manual.port);
    update.manually_added = Some(true);
    update.status = Some(PeerStatus::Unknown);

    let peer = state.registry.upsert(update);
    save_registry(&state);
    Ok(Json(peer))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HandshakeRequest {
    pub node_id: String,
    pub hostname: String,
    pub platform: String,
    pub version: String,
    pub port: u16,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// `POST /peers/handshake`: bidirectional identity exchange. The
/// caller's address comes from the connection, its port from the body.
pub async fn handshake<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ApiJson(request): ApiJson<HandshakeRequest>,
) -> Result<Json<loopsy_core::NodeIdentity>, ApiError> {
    if !versions_compatible(&request.version, &state.identity.version) {
        return Err(ApiError::new(
            ErrorCode::PeerVersionMismatch,
            format!(
                "protocol version {} is incompatible with {}",
                request.version, state.identity.version
            ),
        ));
    }

    let mut update = PeerUpsert::new(NodeId::new(request.node_id));
    update.hostname = Some(request.hostname);
    update.address = Some(addr.ip().to_string());
    update.port = Some(request.port);
    update.platform = Some(request.platform);
    update.version = Some(request.version);
    update.capabilities = Some(request.capabilities);
    update.status = Some(PeerStatus::Online);
    update.last_seen = Some(SystemClock.now_ms());

    let peer = state.registry.upsert(update);
    save_registry(&state);
    tracing::info!(peer = %peer.node_id, address = %peer.address, "handshake completed");

    Ok(Json(state.identity.clone()))
}

/// `DELETE /peers/:nodeId`.
pub async fn remove<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(node_id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    match state.registry.remove(&NodeId::new(node_id.clone())) {
        Some(_) => {
            save_registry(&state);
            Ok((StatusCode::OK, Json(json!({ "removed": true }))))
        }
        None => Err(ApiError::new(
            ErrorCode::PeerNotFound,
            format!("unknown peer: {node_id}"),
        )),
    }
}

fn save_registry<L: ProcessLauncher>(state: &AppState<L>) {
    if let Err(e) = state.registry.save() {
        tracing::warn!(error = %e, "peer snapshot save failed");
    }
}
