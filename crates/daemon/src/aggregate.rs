// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dashboard aggregator: one view over many daemons.
//!
//! A machine can run several sibling daemons (sessions) plus remote
//! peers. The aggregator fans read requests out to every live sibling,
//! merges by endpoint, then walks one hop further to each online
//! remote peer so the dashboard sees the whole neighborhood. Requests
//! across trust domains try every known API key; the working key per
//! endpoint is cached to avoid repeated 401 probes.

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use loopsy_agents::ProcessLauncher;
use loopsy_config::DataDir;
use loopsy_core::{Peer, PeerStatus};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::http::ApiError;
use crate::state::AppState;

/// Probe timeout for sibling/remote fan-out reads.
const FANOUT_TIMEOUT: Duration = Duration::from_secs(3);

/// Ceiling on proxied requests; covers long SSE relays.
const PROXY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub fn routes<L: ProcessLauncher>() -> Router<Arc<AppState<L>>> {
    Router::new()
        .route("/peers/all", get(peers_all::<L>))
        .route("/ai-tasks/all", get(ai_tasks_all::<L>))
        .route("/proxy/{port}/{*path}", any(proxy::<L>))
}

/// A sibling daemon found via its pid file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sibling {
    pub name: String,
    pub pid: u32,
    pub port: u16,
}

/// Enumerate sibling daemons from `<dataDir>/sessions/*/daemon.pid`.
///
/// Pid files carry `<pid>\n<port>`; entries whose process is gone are
/// skipped (stale files from crashed sessions are common).
pub fn discover_siblings(data_dir: &DataDir) -> Vec<Sibling> {
    let sessions = data_dir.sessions_dir();
    let Ok(entries) = std::fs::read_dir(&sessions) else {
        return Vec::new();
    };

    let mut siblings = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let pid_file = entry.path().join("daemon.pid");
        let Ok(raw) = std::fs::read_to_string(&pid_file) else {
            continue;
        };
        let mut lines = raw.lines();
        let Some(pid) = lines.next().and_then(|l| l.trim().parse::<u32>().ok()) else {
            continue;
        };
        let Some(port) = lines.next().and_then(|l| l.trim().parse::<u16>().ok()) else {
            continue;
        };
        if !process_alive(pid) {
            tracing::debug!(session = %name, pid, "skipping dead sibling");
            continue;
        }
        siblings.push(Sibling { name, pid, port });
    }
    siblings
}

fn process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        match i32::try_from(pid) {
            Ok(pid) => kill(Pid::from_raw(pid), None).is_ok(),
            Err(_) => false,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

/// `GET /dashboard/api/peers/all`: own registry + live siblings +
/// one transitive hop to each online remote peer.
pub async fn peers_all<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<serde_json::Value> {
    let mut merged: HashMap<String, Peer> = HashMap::new();
    for peer in state.registry.get_all() {
        merge_peer(&mut merged, peer);
    }

    // Fan out to live sibling daemons on this machine
    for sibling in discover_siblings(&state.data_dir) {
        if sibling.port == state.identity.port {
            continue;
        }
        let url = format!("http://127.0.0.1:{}/api/v1/peers", sibling.port);
        if let Some(body) = fetch_json(&state, &url).await {
            for peer in parse_peers(&body) {
                merge_peer(&mut merged, peer);
            }
        }
    }

    // One transitive hop: ask each online remote peer for its peers,
    // rewriting loopback entries to the peer's own address
    let remotes: Vec<Peer> = merged
        .values()
        .filter(|p| p.status == PeerStatus::Online)
        .cloned()
        .collect();
    for remote in remotes {
        let url = format!("http://{}:{}/api/v1/peers", remote.address, remote.port);
        if let Some(body) = fetch_json(&state, &url).await {
            for mut peer in parse_peers(&body) {
                if peer.address == "127.0.0.1" || peer.address == "localhost" {
                    peer.address = remote.address.clone();
                }
                if peer.node_id == state.identity.node_id {
                    continue;
                }
                merge_peer(&mut merged, peer);
            }
        }
    }

    let mut peers: Vec<Peer> = merged.into_values().collect();
    peers.sort_by(|a, b| a.node_id.as_str().cmp(b.node_id.as_str()));
    Json(json!({ "peers": peers }))
}

/// `GET /dashboard/api/ai-tasks/all`: every sibling's tasks, deduped
/// by taskId.
pub async fn ai_tasks_all<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<serde_json::Value> {
    let mut by_id: HashMap<String, serde_json::Value> = HashMap::new();
    for task in state.tasks.list() {
        if let Ok(value) = serde_json::to_value(&task) {
            by_id.insert(task.task_id.to_string(), value);
        }
    }

    for sibling in discover_siblings(&state.data_dir) {
        if sibling.port == state.identity.port {
            continue;
        }
        let url = format!("http://127.0.0.1:{}/api/v1/ai-tasks", sibling.port);
        if let Some(body) = fetch_json(&state, &url).await {
            for task in body
                .get("tasks")
                .and_then(|t| t.as_array())
                .into_iter()
                .flatten()
            {
                if let Some(id) = task.get("taskId").and_then(|v| v.as_str()) {
                    by_id.entry(id.to_string()).or_insert_with(|| task.clone());
                }
            }
        }
    }

    let tasks: Vec<serde_json::Value> = by_id.into_values().collect();
    Json(json!({ "tasks": tasks }))
}

/// `/dashboard/api/proxy/:port/api/v1/*`: relay an arbitrary request
/// to a sibling daemon, streaming the response body (SSE included)
/// until the upstream ends.
pub async fn proxy<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    Path((port, path)): Path<(u16, String)>,
    request: Request<Body>,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let query = parts
        .uri
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    let url = format!("http://127.0.0.1:{port}/{path}{query}");

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|_| ApiError::invalid("unsupported method"))?;

    let mut upstream = state
        .client
        .request(method, &url)
        .timeout(PROXY_TIMEOUT)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()));

    // Forward the caller's token when present, otherwise present ours
    if let Some(auth) = parts.headers.get(header::AUTHORIZATION) {
        upstream = upstream.header(header::AUTHORIZATION, auth.clone());
    } else {
        let key = state.config.lock().auth.api_key.clone();
        upstream = upstream.bearer_auth(key);
    }
    if let Some(content_type) = parts.headers.get(header::CONTENT_TYPE) {
        upstream = upstream.header(header::CONTENT_TYPE, content_type.clone());
    }

    let response = upstream
        .send()
        .await
        .map_err(|e| ApiError::new(loopsy_core::ErrorCode::PeerUnreachable, e.to_string()))?;

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    // SSE and regular bodies relay the same way: bytes until EOF
    let body = Body::from_stream(response.bytes_stream());
    Ok((status, [(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Fetch JSON from another daemon, cycling through known API keys.
///
/// 401/403 means "wrong trust domain, try the next key"; the working
/// key is remembered per endpoint.
async fn fetch_json<L: ProcessLauncher>(
    state: &AppState<L>,
    url: &str,
) -> Option<serde_json::Value> {
    let mut keys = state.known_keys();

    // Move the cached working key to the front
    if let Some(cached) = state.key_cache.lock().get(url).cloned() {
        keys.retain(|k| k != &cached);
        keys.insert(0, cached);
    }

    for key in keys {
        let response = state
            .client
            .get(url)
            .bearer_auth(&key)
            .timeout(FANOUT_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(response) if response.status() == 401 || response.status() == 403 => continue,
            Ok(response) if response.status().is_success() => {
                state.key_cache.lock().insert(url.to_string(), key);
                return response.json().await.ok();
            }
            Ok(_) | Err(_) => return None,
        }
    }
    None
}

fn parse_peers(body: &serde_json::Value) -> Vec<Peer> {
    body.get("peers")
        .and_then(|p| p.as_array())
        .map(|peers| {
            peers
                .iter()
                .filter_map(|p| serde_json::from_value(p.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Merge by endpoint, preferring online status and the freshest
/// lastSeen.
fn merge_peer(merged: &mut HashMap<String, Peer>, candidate: Peer) {
    let key = candidate.endpoint();
    match merged.get(&key) {
        Some(existing) => {
            let candidate_wins = match (candidate.status, existing.status) {
                (PeerStatus::Online, other) if other != PeerStatus::Online => true,
                (other, PeerStatus::Online) if other != PeerStatus::Online => false,
                _ => candidate.last_seen > existing.last_seen,
            };
            if candidate_wins {
                merged.insert(key, candidate);
            }
        }
        None => {
            merged.insert(key, candidate);
        }
    }
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod tests;
