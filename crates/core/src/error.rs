// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire error catalog.
//!
//! Every API error carries one code from this table. Domain error enums
//! in other crates map to a code via a `code()` accessor; the HTTP layer
//! turns the code into an HTTP status and the JSON envelope
//! `{"error":{"code":<int>,"message":<str>,"details":<any?>}}`.

use serde::{Deserialize, Serialize};

/// Typed error codes for the wire protocol.
///
/// Ranges: 1xxx auth, 2xxx peers, 3xxx execution, 4xxx transfer,
/// 5xxx context, 6xxx AI tasks, 9xxx internal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum ErrorCode {
    AuthMissing,
    AuthInvalid,
    AuthExpired,
    PeerNotFound,
    PeerOffline,
    PeerUnreachable,
    PeerHandshakeFailed,
    PeerVersionMismatch,
    ExecCommandDenied,
    ExecTimeout,
    ExecMaxConcurrent,
    ExecFailed,
    ExecCancelled,
    ExecJobNotFound,
    TransferPathDenied,
    TransferFileNotFound,
    TransferTooLarge,
    TransferChecksumMismatch,
    TransferFailed,
    ContextKeyNotFound,
    ContextValueTooLarge,
    ContextMaxEntries,
    AiTaskNotFound,
    AiTaskMaxConcurrent,
    AiTaskFailed,
    AiTaskAlreadyCompleted,
    AiTaskNoPendingApproval,
    AiTaskClaudeNotFound,
    AiTaskAgentNotFound,
    Internal,
    RateLimited,
    InvalidRequest,
}

impl ErrorCode {
    /// Numeric wire value.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::AuthMissing => 1001,
            Self::AuthInvalid => 1002,
            Self::AuthExpired => 1003,
            Self::PeerNotFound => 2001,
            Self::PeerOffline => 2002,
            Self::PeerUnreachable => 2003,
            Self::PeerHandshakeFailed => 2004,
            Self::PeerVersionMismatch => 2005,
            Self::ExecCommandDenied => 3001,
            Self::ExecTimeout => 3002,
            Self::ExecMaxConcurrent => 3003,
            Self::ExecFailed => 3004,
            Self::ExecCancelled => 3005,
            Self::ExecJobNotFound => 3006,
            Self::TransferPathDenied => 4001,
            Self::TransferFileNotFound => 4002,
            Self::TransferTooLarge => 4003,
            Self::TransferChecksumMismatch => 4004,
            Self::TransferFailed => 4005,
            Self::ContextKeyNotFound => 5001,
            Self::ContextValueTooLarge => 5002,
            Self::ContextMaxEntries => 5003,
            Self::AiTaskNotFound => 6001,
            Self::AiTaskMaxConcurrent => 6002,
            Self::AiTaskFailed => 6003,
            Self::AiTaskAlreadyCompleted => 6004,
            Self::AiTaskNoPendingApproval => 6005,
            Self::AiTaskClaudeNotFound => 6006,
            Self::AiTaskAgentNotFound => 6007,
            Self::Internal => 9001,
            Self::RateLimited => 9002,
            Self::InvalidRequest => 9003,
        }
    }

    /// HTTP status the code maps to.
    pub fn http_status(self) -> u16 {
        match self {
            Self::AuthMissing => 401,
            Self::AuthInvalid | Self::AuthExpired => 403,
            Self::PeerNotFound
            | Self::ExecJobNotFound
            | Self::TransferFileNotFound
            | Self::ContextKeyNotFound
            | Self::AiTaskNotFound => 404,
            Self::ExecMaxConcurrent | Self::AiTaskMaxConcurrent | Self::RateLimited => 429,
            Self::Internal => 500,
            _ => 400,
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code.as_u16()
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        const ALL: &[ErrorCode] = &[
            ErrorCode::AuthMissing,
            ErrorCode::AuthInvalid,
            ErrorCode::AuthExpired,
            ErrorCode::PeerNotFound,
            ErrorCode::PeerOffline,
            ErrorCode::PeerUnreachable,
            ErrorCode::PeerHandshakeFailed,
            ErrorCode::PeerVersionMismatch,
            ErrorCode::ExecCommandDenied,
            ErrorCode::ExecTimeout,
            ErrorCode::ExecMaxConcurrent,
            ErrorCode::ExecFailed,
            ErrorCode::ExecCancelled,
            ErrorCode::ExecJobNotFound,
            ErrorCode::TransferPathDenied,
            ErrorCode::TransferFileNotFound,
            ErrorCode::TransferTooLarge,
            ErrorCode::TransferChecksumMismatch,
            ErrorCode::TransferFailed,
            ErrorCode::ContextKeyNotFound,
            ErrorCode::ContextValueTooLarge,
            ErrorCode::ContextMaxEntries,
            ErrorCode::AiTaskNotFound,
            ErrorCode::AiTaskMaxConcurrent,
            ErrorCode::AiTaskFailed,
            ErrorCode::AiTaskAlreadyCompleted,
            ErrorCode::AiTaskNoPendingApproval,
            ErrorCode::AiTaskClaudeNotFound,
            ErrorCode::AiTaskAgentNotFound,
            ErrorCode::Internal,
            ErrorCode::RateLimited,
            ErrorCode::InvalidRequest,
        ];
        ALL.iter()
            .copied()
            .find(|c| c.as_u16() == value)
            .ok_or_else(|| format!("unknown error code: {value}"))
    }
}

/// Body of the wire error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// The `{"error": {...}}` wire envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
