// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP API: the wire surface.
//!
//! All component endpoints live under `/api/v1`; the dashboard
//! aggregation surface lives under `/dashboard/api`. Every request
//! passes the audit layer; everything except `/health`, `/pair/*` and
//! the dashboard passes bearer auth first.

pub mod ai_tasks;
pub mod auth;
pub mod context;
pub mod error;
pub mod execute;
pub mod pair;
pub mod peers;
pub mod system;
pub mod transfer;

pub use error::ApiError;

use axum::http::HeaderMap;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use loopsy_agents::ProcessLauncher;
use loopsy_core::NodeId;
use std::sync::Arc;

use crate::aggregate;
use crate::state::AppState;

/// Build the complete router.
pub fn router<L: ProcessLauncher>(state: Arc<AppState<L>>) -> Router {
    let api = Router::new()
        .route("/health", get(system::health::<L>))
        .route("/identity", get(system::identity::<L>))
        .route("/status", get(system::status::<L>))
        .route("/peers", get(peers::list::<L>).post(peers::add_manual::<L>))
        .route("/peers/handshake", post(peers::handshake::<L>))
        .route("/peers/{node_id}", delete(peers::remove::<L>))
        .route("/execute", post(execute::run::<L>))
        .route("/execute/stream", post(execute::run_stream::<L>))
        .route("/execute/jobs", get(execute::jobs::<L>))
        .route("/execute/{job_id}", delete(execute::cancel::<L>))
        .route("/context", get(context::list::<L>))
        .route(
            "/context/{key}",
            put(context::set::<L>)
                .get(context::get_one::<L>)
                .delete(context::remove::<L>),
        )
        .route(
            "/ai-tasks",
            post(ai_tasks::dispatch::<L>).get(ai_tasks::list::<L>),
        )
        .route(
            "/ai-tasks/{task_id}",
            get(ai_tasks::get_one::<L>).delete(ai_tasks::cancel::<L>),
        )
        .route("/ai-tasks/{task_id}/stream", get(ai_tasks::stream::<L>))
        .route("/ai-tasks/{task_id}/events", get(ai_tasks::events::<L>))
        .route(
            "/ai-tasks/{task_id}/permission-request",
            post(ai_tasks::permission_request::<L>),
        )
        .route(
            "/ai-tasks/{task_id}/permission-response",
            get(ai_tasks::permission_response::<L>),
        )
        .route("/ai-tasks/{task_id}/approve", post(ai_tasks::approve::<L>))
        .route("/pair/start", post(pair::start::<L>))
        .route("/pair/initiate", post(pair::initiate::<L>))
        .route("/pair/confirm", post(pair::confirm::<L>))
        .route("/pair/status", get(pair::status::<L>))
        .merge(transfer::routes::<L>(&state));

    // TODO: mount a rate-limit layer here once enforcement lands;
    // config.rateLimits is parsed and carried but nothing consumes it yet.
    Router::new()
        .nest("/api/v1", api)
        .nest("/dashboard/api", aggregate::routes::<L>())
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_bearer::<L>,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::audit::<L>,
        ))
        .with_state(state)
}

/// Requester identity, when the caller declares one.
///
/// Peer daemons stamp their nodeId on outbound requests; human tools
/// usually do not, which records the work as locally-initiated.
pub fn caller_node_id(headers: &HeaderMap) -> NodeId {
    headers
        .get("x-loopsy-node-id")
        .and_then(|v| v.to_str().ok())
        .map(NodeId::new)
        .unwrap_or_else(|| NodeId::new("local"))
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
