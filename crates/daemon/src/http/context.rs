// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context store endpoints.
//!
//! The snapshot is rewritten after every mutating request so a daemon
//! restart loses at most what was in flight.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use loopsy_agents::ProcessLauncher;
use loopsy_core::{ContextEntry, ErrorCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

use super::{caller_node_id, error::{ApiError, ApiJson}};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetContextRequest {
    pub value: String,
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// `PUT /context/:key`.
pub async fn set<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<SetContextRequest>,
) -> Result<Json<ContextEntry>, ApiError> {
    let entry = state
        .context
        .set(key, request.value, caller_node_id(&headers), request.ttl)?;
    save_context(&state);
    Ok(Json(entry))
}

/// `GET /context/:key`.
pub async fn get_one<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(key): Path<String>,
) -> Result<Json<ContextEntry>, ApiError> {
    state
        .context
        .get(&key)
        .map(Json)
        .ok_or_else(|| ApiError::new(ErrorCode::ContextKeyNotFound, format!("no such key: {key}")))
}

/// `DELETE /context/:key`.
pub async fn remove<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.context.delete(&key)?;
    save_context(&state);
    Ok(Json(json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub prefix: Option<String>,
}

/// `GET /context?prefix=`.
pub async fn list<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Query(params): Query<ListParams>,
) -> Json<serde_json::Value> {
    let entries = state.context.list(params.prefix.as_deref());
    Json(json!({ "count": entries.len(), "entries": entries }))
}

fn save_context<L: ProcessLauncher>(state: &AppState<L>) {
    if let Err(e) = state.context.save() {
        tracing::warn!(error = %e, "context snapshot save failed");
    }
}
