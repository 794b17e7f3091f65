// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer auth and audit middleware.
//!
//! Auth runs before every handler except `/health`, `/pair/*` and the
//! dashboard surface. Audit wraps everything: one JSON line per
//! response, append failures swallowed.

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use loopsy_agents::ProcessLauncher;
use loopsy_core::ErrorCode;
use loopsy_storage::AuditRecord;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::state::AppState;

use super::error::ApiError;

/// Paths served without a bearer token.
fn is_public(path: &str) -> bool {
    path == "/api/v1/health"
        || path.starts_with("/api/v1/pair/")
        || path.starts_with("/dashboard/")
}

/// Bearer validation: 401 when missing, 403 when unknown.
pub async fn require_bearer<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return ApiError::new(ErrorCode::AuthMissing, "missing bearer token").into_response();
    };

    let allowed = state.config.lock().auth.is_allowed(token);
    if !allowed {
        return ApiError::new(ErrorCode::AuthInvalid, "unknown bearer token").into_response();
    }

    next.run(request).await
}

/// Append one audit line per completed request.
pub async fn audit<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    state.audit.append(&AuditRecord {
        request_id: uuid::Uuid::new_v4().to_string(),
        method,
        path,
        from_ip: addr.ip().to_string(),
        status_code: response.status().as_u16(),
        duration: started.elapsed().as_millis() as u64,
        timestamp: chrono::Utc::now(),
    });

    response
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
