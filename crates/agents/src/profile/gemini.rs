// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gemini profile: argv construction and stream-json mapping.

use loopsy_core::{DispatchParams, PermissionMode, TaskEventPayload};
use serde_json::Value;

use super::opt_str;

pub(super) fn args(params: &DispatchParams) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        params.prompt.clone(),
        "--output-format".to_string(),
        "stream-json".to_string(),
    ];

    match params.permission_mode.unwrap_or_default() {
        PermissionMode::BypassPermissions => args.push("--yolo".to_string()),
        PermissionMode::AcceptEdits => {
            args.push("--approval-mode".to_string());
            args.push("auto_edit".to_string());
        }
        PermissionMode::Default | PermissionMode::Plan => {}
    }

    if let Some(model) = &params.model {
        args.push("-m".to_string());
        args.push(model.clone());
    }

    args
}

pub(super) fn map_record(value: &Value) -> Vec<TaskEventPayload> {
    match value.get("type").and_then(|t| t.as_str()) {
        Some("content") | Some("text") | Some("assistant") => text_of(value)
            .map(|text| vec![TaskEventPayload::Text { text }])
            .unwrap_or_default(),
        Some("thought") | Some("thinking") => text_of(value)
            .map(|text| vec![TaskEventPayload::Thinking { text }])
            .unwrap_or_default(),
        Some("tool_call") | Some("tool_use") => {
            let name = opt_str(value, "name").or_else(|| opt_str(value, "tool_name"));
            name.map(|tool_name| {
                vec![TaskEventPayload::ToolUse {
                    tool_name,
                    tool_input: value
                        .get("args")
                        .or_else(|| value.get("input"))
                        .cloned()
                        .unwrap_or(Value::Null),
                }]
            })
            .unwrap_or_default()
        }
        Some("tool_result") => vec![TaskEventPayload::ToolResult {
            content: value.get("result").cloned().unwrap_or(Value::Null),
            is_error: value
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }],
        Some("result") | Some("stats") => vec![TaskEventPayload::Result {
            result: opt_str(value, "response"),
            session_id: opt_str(value, "session_id"),
            total_cost_usd: None,
            duration_ms: value.get("duration_ms").and_then(|v| v.as_u64()),
            is_error: false,
        }],
        Some("error") => vec![TaskEventPayload::Error {
            message: opt_str(value, "message").unwrap_or_else(|| value.to_string()),
        }],
        other => {
            tracing::trace!(record_type = ?other, "dropping unmapped gemini record");
            Vec::new()
        }
    }
}

fn text_of(value: &Value) -> Option<String> {
    opt_str(value, "content").or_else(|| opt_str(value, "text"))
}
