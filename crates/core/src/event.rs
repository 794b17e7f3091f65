// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical task-event alphabet.
//!
//! Agent CLIs speak their own line-JSON dialects; the agent profiles
//! translate everything into these ten event kinds. Subscribers (SSE
//! clients, the dashboard aggregator) only ever see canonical events.

use crate::task::TaskStatus;
use serde::{Deserialize, Serialize};

/// One event on a task's stream.
///
/// Timestamps are stamped by the event bus and are monotonically
/// non-decreasing within a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub timestamp: u64,
    #[serde(flatten)]
    pub payload: TaskEventPayload,
}

/// The ten canonical event kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEventPayload {
    Text {
        text: String,
    },
    Thinking {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolUse {
        tool_name: String,
        #[serde(default)]
        tool_input: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename_all = "camelCase")]
    PermissionRequest {
        request_id: String,
        tool_name: String,
        #[serde(default)]
        tool_input: serde_json::Value,
        #[serde(default)]
        description: String,
    },
    Status {
        status: TaskStatus,
    },
    Error {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename_all = "camelCase")]
    Exit {
        exit_code: Option<i32>,
        #[serde(default)]
        signal: bool,
    },
    System {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        #[serde(default)]
        raw: serde_json::Value,
    },
}

impl TaskEventPayload {
    /// Wire name of the event kind (the `type` field).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Thinking { .. } => "thinking",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::PermissionRequest { .. } => "permission_request",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
            Self::Result { .. } => "result",
            Self::Exit { .. } => "exit",
            Self::System { .. } => "system",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
