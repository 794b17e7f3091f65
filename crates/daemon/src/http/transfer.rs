// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File transfer endpoints.
//!
//! Every path is normalized and resolved before the policy check:
//! denied roots always win, and when an allowlist is configured the
//! path must fall under one of its roots. Pushes stream through a temp
//! file and are hashed on the way in; the SHA-256 lands in the
//! response so callers can verify end to end.

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use loopsy_agents::ProcessLauncher;
use loopsy_core::ErrorCode;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;

use crate::state::AppState;

use super::error::{ApiError, ApiJson};

/// Transfer routes carry their own body limit (uploads up to the
/// configured max file size, default 1 GiB).
pub fn routes<L: ProcessLauncher>(state: &Arc<AppState<L>>) -> Router<Arc<AppState<L>>> {
    let limit = state.config.lock().transfer.max_file_size as usize + 1024 * 1024;
    Router::new()
        .route("/transfer/push", post(push::<L>))
        .route("/transfer/pull", post(pull::<L>))
        .route("/transfer/list", post(list_dir::<L>))
        .layer(DefaultBodyLimit::max(limit))
}

/// `POST /transfer/push` (multipart: `destPath` text field + `file`).
pub async fn push<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let started = Instant::now();
    let max_size = state.config.lock().transfer.max_file_size;

    let staging = std::env::temp_dir().join(format!("loopsy-push-{}", uuid::Uuid::new_v4()));
    let mut dest_path: Option<String> = None;
    let mut staged: Option<(u64, String)> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("destPath") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::invalid(format!("bad destPath field: {e}")))?;
                dest_path = Some(text);
            }
            Some("file") => {
                let mut file = tokio::fs::File::create(&staging)
                    .await
                    .map_err(|e| transfer_failed(format!("staging file: {e}")))?;
                let mut hasher = Sha256::new();
                let mut size: u64 = 0;

                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::invalid(format!("upload interrupted: {e}")))?
                {
                    size += chunk.len() as u64;
                    if size > max_size {
                        let _ = tokio::fs::remove_file(&staging).await;
                        return Err(ApiError::new(
                            ErrorCode::TransferTooLarge,
                            format!("file exceeds {max_size} bytes"),
                        ));
                    }
                    hasher.update(&chunk);
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| transfer_failed(format!("staging write: {e}")))?;
                }
                file.flush()
                    .await
                    .map_err(|e| transfer_failed(format!("staging flush: {e}")))?;
                staged = Some((size, hex::encode(hasher.finalize())));
            }
            _ => {}
        }
    }

    let dest = dest_path.ok_or_else(|| ApiError::invalid("missing destPath field"))?;
    let (size, checksum) = staged.ok_or_else(|| ApiError::invalid("missing file field"))?;

    let dest = checked_path(&state, Path::new(&dest))?;
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| transfer_failed(format!("creating {}: {e}", parent.display())))?;
    }

    // Rename within a filesystem, copy across
    if tokio::fs::rename(&staging, &dest).await.is_err() {
        tokio::fs::copy(&staging, &dest)
            .await
            .map_err(|e| transfer_failed(format!("writing {}: {e}", dest.display())))?;
        let _ = tokio::fs::remove_file(&staging).await;
    }

    tracing::info!(path = %dest.display(), size, "file received");
    Ok(Json(json!({
        "path": dest.display().to_string(),
        "size": size,
        "checksum": checksum,
        "duration": started.elapsed().as_millis() as u64,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PullRequest {
    pub source_path: String,
}

/// `POST /transfer/pull`: raw file bytes.
pub async fn pull<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    ApiJson(request): ApiJson<PullRequest>,
) -> Result<Response, ApiError> {
    let path = checked_path(&state, Path::new(&request.source_path))?;
    let max_size = state.config.lock().transfer.max_file_size;

    let metadata = tokio::fs::metadata(&path).await.map_err(|_| {
        ApiError::new(
            ErrorCode::TransferFileNotFound,
            format!("no such file: {}", path.display()),
        )
    })?;
    if !metadata.is_file() {
        return Err(ApiError::new(
            ErrorCode::TransferFileNotFound,
            format!("not a file: {}", path.display()),
        ));
    }
    if metadata.len() > max_size {
        return Err(ApiError::new(
            ErrorCode::TransferTooLarge,
            format!("file exceeds {max_size} bytes"),
        ));
    }

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| transfer_failed(format!("opening {}: {e}", path.display())))?;
    let body = Body::from_stream(tokio_util::io::ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListRequest {
    pub path: String,
}

/// `POST /transfer/list`.
pub async fn list_dir<L: ProcessLauncher>(
    State(state): State<Arc<AppState<L>>>,
    ApiJson(request): ApiJson<ListRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let path = checked_path(&state, Path::new(&request.path))?;

    let mut dir = tokio::fs::read_dir(&path).await.map_err(|_| {
        ApiError::new(
            ErrorCode::TransferFileNotFound,
            format!("no such directory: {}", path.display()),
        )
    })?;

    let mut files = Vec::new();
    while let Ok(Some(entry)) = dir.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        files.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "path": entry.path().display().to_string(),
            "type": if metadata.is_dir() { "directory" } else { "file" },
            "size": metadata.len(),
            "modified": modified,
        }));
    }

    Ok(Json(json!({ "files": files })))
}

/// Normalize and policy-check a requested path.
fn checked_path<L: ProcessLauncher>(
    state: &AppState<L>,
    path: &Path,
) -> Result<PathBuf, ApiError> {
    let (allowed, denied) = {
        let config = state.config.lock();
        (
            config.transfer.allowed_paths.clone(),
            config.transfer.denied_paths.clone(),
        )
    };

    let normalized = normalize_path(path);
    if is_path_allowed(&normalized, &allowed, &denied) {
        Ok(normalized)
    } else {
        Err(ApiError::new(
            ErrorCode::TransferPathDenied,
            format!("path not permitted: {}", path.display()),
        ))
    }
}

/// Policy: denied roots always win; an empty allowlist allows all.
pub fn is_path_allowed(path: &Path, allowed: &[PathBuf], denied: &[PathBuf]) -> bool {
    let path = normalize_path(path);
    if !path.is_absolute() {
        return false;
    }
    if denied.iter().any(|d| path.starts_with(normalize_path(d))) {
        return false;
    }
    allowed.is_empty() || allowed.iter().any(|a| path.starts_with(normalize_path(a)))
}

/// Lexically clean a path (`.` and `..` resolved), then resolve
/// symlinks through the longest existing prefix so a link cannot hop
/// out of an allowed root.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }

    // Resolve through the deepest ancestor that exists
    let mut existing = cleaned.clone();
    let mut tail = Vec::new();
    while !existing.exists() {
        let Some(name) = existing.file_name().map(|n| n.to_owned()) else {
            return cleaned;
        };
        tail.push(name);
        if !existing.pop() {
            return cleaned;
        }
    }

    match existing.canonicalize() {
        Ok(mut resolved) => {
            for name in tail.into_iter().rev() {
                resolved.push(name);
            }
            resolved
        }
        Err(_) => cleaned,
    }
}

fn transfer_failed(message: String) -> ApiError {
    ApiError::new(ErrorCode::TransferFailed, message)
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
