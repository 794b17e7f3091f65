// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AI task endpoints, including the hook-facing permission pair.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use loopsy_agents::ProcessLauncher;
use loopsy_core::{AiTaskInfo, DispatchParams, PermissionRequest, TaskEvent, TaskId};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;

use crate::state::AppState;

use super::{caller_node_id, error::{ApiError, ApiJson}};

/// `POST /ai-tasks` → 201 + task info.
pub async fn dispatch<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    headers: HeaderMap,
    ApiJson(params): ApiJson<DispatchParams>,
) -> Result<(StatusCode, Json<AiTaskInfo>), ApiError> {
    let info = state
        .tasks
        .dispatch(params, caller_node_id(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(info)))
}

/// `GET /ai-tasks`.
pub async fn list<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<serde_json::Value> {
    Json(json!({ "tasks": state.tasks.list() }))
}

/// `GET /ai-tasks/:taskId`.
pub async fn get_one<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(task_id): Path<String>,
) -> Result<Json<AiTaskInfo>, ApiError> {
    state
        .tasks
        .get(&TaskId::new(task_id.clone()))
        .map(Json)
        .ok_or_else(|| {
            ApiError::new(
                loopsy_core::ErrorCode::AiTaskNotFound,
                format!("no such task: {task_id}"),
            )
        })
}

/// `DELETE /ai-tasks/:taskId`.
pub async fn cancel<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.tasks.cancel(&TaskId::new(task_id))?;
    Ok(Json(json!({ "cancelled": true })))
}

/// `GET /ai-tasks/:taskId/events`.
pub async fn events<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .tasks
        .events(&TaskId::new(task_id.clone()))
        .map(|events| Json(json!({ "events": events })))
        .ok_or_else(|| {
            ApiError::new(
                loopsy_core::ErrorCode::AiTaskNotFound,
                format!("no such task: {task_id}"),
            )
        })
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Replay events with timestamp > since (epoch ms).
    #[serde(default)]
    pub since: u64,
}

/// `GET /ai-tasks/:taskId/stream?since=`: replayed history, then live
/// events, one JSON event per SSE `data:` line.
pub async fn stream<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(task_id): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Some((replay, subscription)) = state
        .tasks
        .subscribe(&TaskId::new(task_id.clone()), params.since)
    else {
        return Err(ApiError::new(
            loopsy_core::ErrorCode::AiTaskNotFound,
            format!("no such task: {task_id}"),
        ));
    };

    let replayed = stream::iter(
        replay
            .into_iter()
            .map(|e| Ok::<_, Infallible>(event_frame(&e))),
    );
    let live = match subscription {
        Some(subscription) => stream::unfold(subscription, |mut sub| async move {
            let event = sub.receiver.recv().await?;
            Some((Ok::<_, Infallible>(event_frame(&event)), sub))
        })
        .left_stream(),
        // Recent task: history only, then the stream ends
        None => stream::empty().right_stream(),
    };

    Ok(Sse::new(replayed.chain(live)).keep_alive(KeepAlive::default()))
}

/// `POST /ai-tasks/:taskId/permission-request` (hook-facing: the agent
/// is about to invoke a tool).
pub async fn permission_request<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(task_id): Path<String>,
    ApiJson(request): ApiJson<PermissionRequest>,
) -> Result<Json<AiTaskInfo>, ApiError> {
    let info = state
        .tasks
        .register_permission(&TaskId::new(task_id), request)?;
    Ok(Json(info))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseParams {
    pub request_id: String,
}

/// `GET /ai-tasks/:taskId/permission-response?requestId=` (hook-facing:
/// polled until the decision lands).
pub async fn permission_response<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(task_id): Path<String>,
    Query(params): Query<ResponseParams>,
) -> Result<Response, ApiError> {
    let response = state
        .tasks
        .permission_response(&TaskId::new(task_id), &params.request_id)?;

    let body = match response {
        Some(response) => json!({
            "resolved": true,
            "approved": response.approved,
            "message": response.message,
        }),
        None => json!({ "resolved": false }),
    };
    Ok(Json(body).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApproveRequest {
    pub request_id: String,
    pub approved: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// `POST /ai-tasks/:taskId/approve`: the human decision.
pub async fn approve<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path(task_id): Path<String>,
    ApiJson(request): ApiJson<ApproveRequest>,
) -> Result<Json<AiTaskInfo>, ApiError> {
    let info = state.tasks.approve(
        &TaskId::new(task_id),
        &request.request_id,
        request.approved,
        request.message,
    )?;
    Ok(Json(info))
}

fn event_frame(event: &TaskEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(data) => Event::default().data(data),
        Err(e) => Event::default().data(format!("{{\"type\":\"error\",\"message\":\"{e}\"}}")),
    }
}
