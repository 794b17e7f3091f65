// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API error type: one envelope shape for every failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use loopsy_core::{ErrorCode, ErrorEnvelope};

/// A wire-mappable API error.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
    /// HTTP status override; defaults to the code's mapping.
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            status: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status.unwrap_or_else(|| self.code.http_status()))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut envelope = ErrorEnvelope::new(self.code, self.message);
        if let Some(details) = self.details {
            envelope = envelope.with_details(details);
        }
        (status, Json(envelope)).into_response()
    }
}

/// JSON body extractor whose rejection speaks the wire error envelope
/// (400 + INVALID_REQUEST) instead of axum's default 422.
pub struct ApiJson<T>(pub T);

impl<S, T> axum::extract::FromRequest<S> for ApiJson<T>
where
    axum::Json<T>:
        axum::extract::FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        use axum::extract::FromRequest;
        match <axum::Json<T> as FromRequest<S>>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::invalid(rejection.body_text())),
        }
    }
}

impl From<loopsy_exec::ExecError> for ApiError {
    fn from(e: loopsy_exec::ExecError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<loopsy_agents::AgentError> for ApiError {
    fn from(e: loopsy_agents::AgentError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<loopsy_storage::ContextError> for ApiError {
    fn from(e: loopsy_storage::ContextError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

impl From<loopsy_mesh::PairingError> for ApiError {
    fn from(e: loopsy_mesh::PairingError) -> Self {
        let status = e.http_status();
        Self::new(e.code(), e.to_string()).with_status(status)
    }
}
