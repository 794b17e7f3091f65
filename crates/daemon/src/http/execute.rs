// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command execution endpoints.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use loopsy_agents::ProcessLauncher;
use loopsy_core::{ExecuteParams, ExecuteResult, JobId, JobStreamEvent};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;

use crate::state::AppState;

use super::{caller_node_id, error::{ApiError, ApiJson}};

/// `POST /execute`: run to completion, return the accumulated result.
pub async fn run<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    headers: HeaderMap,
    ApiJson(params): ApiJson<ExecuteParams>,
) -> Result<Json<ExecuteResult>, ApiError> {
    let result = state
        .jobs
        .execute(params, caller_node_id(&headers))
        .await?;
    Ok(Json(result))
}

/// `POST /execute/stream`: stdout/stderr/exit as SSE frames. Client
/// disconnect drops the receiver, which terminates the child.
pub async fn run_stream<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    headers: HeaderMap,
    ApiJson(params): ApiJson<ExecuteParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job = state
        .jobs
        .execute_stream(params, caller_node_id(&headers))?;

    let stream = futures::stream::unfold(job.events, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok::<_, Infallible>(stream_frame(&event)), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `GET /execute/jobs`.
pub async fn jobs<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<serde_json::Value> {
    Json(json!({ "jobs": state.jobs.jobs() }))
}

/// `DELETE /execute/:jobId`.
pub async fn cancel<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.jobs.cancel(&JobId::new(job_id))?;
    Ok(Json(json!({ "cancelled": true })))
}

fn stream_frame(event: &JobStreamEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(data) => Event::default().data(data),
        Err(e) => Event::default().data(format!("{{\"type\":\"error\",\"data\":\"{e}\"}}")),
    }
}
