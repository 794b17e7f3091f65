// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pairing endpoints (all unauthenticated; the exchange is its own
//! authentication).

use axum::extract::State;
use axum::Json;
use loopsy_agents::ProcessLauncher;
use loopsy_mesh::{InitiateRequest, InitiateResponse, PairingStatus, StartResponse};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

use super::error::{ApiError, ApiJson};

/// `POST /pair/start`.
pub async fn start<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<Json<StartResponse>, ApiError> {
    Ok(Json(state.pairing.start()?))
}

/// `POST /pair/initiate`.
pub async fn initiate<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    ApiJson(request): ApiJson<InitiateRequest>,
) -> Result<Json<InitiateResponse>, ApiError> {
    Ok(Json(state.pairing.initiate(request)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfirmRequest {
    pub confirmed: bool,
}

/// `POST /pair/confirm`: a confirmed peer lands in
/// `auth.allowedKeys` (and `tls.pinnedCerts` when it sent a
/// fingerprint); the config file is rewritten immediately.
pub async fn confirm<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    ApiJson(request): ApiJson<ConfirmRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let admitted = state.pairing.confirm(request.confirmed)?;

    if let Some(peer) = admitted {
        let snapshot = {
            let mut config = state.config.lock();
            config
                .auth
                .allowed_keys
                .insert(peer.hostname.clone(), peer.api_key.clone());
            if let Some(fingerprint) = &peer.cert_fingerprint {
                config
                    .tls
                    .pinned_certs
                    .insert(peer.hostname.clone(), fingerprint.clone());
            }
            config.clone()
        };
        loopsy_config::save(&state.data_dir, &snapshot)
            .map_err(|e| ApiError::internal(format!("config save failed: {e}")))?;
        tracing::info!(peer = %peer.hostname, "peer admitted to allowed keys");
    }

    Ok(Json(json!({ "success": true })))
}

/// `GET /pair/status`.
pub async fn status<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<PairingStatus> {
    Json(state.pairing.status())
}
