// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex profile: argv construction and `--json` event mapping.

use loopsy_core::{DispatchParams, PermissionMode, TaskEventPayload};
use serde_json::Value;

use super::{display_path, opt_str, LaunchContext};

pub(super) fn args(params: &DispatchParams, ctx: &LaunchContext) -> Vec<String> {
    let mut args = vec![
        "exec".to_string(),
        params.prompt.clone(),
        "--json".to_string(),
        "--skip-git-repo-check".to_string(),
    ];

    match params.permission_mode.unwrap_or_default() {
        PermissionMode::BypassPermissions | PermissionMode::AcceptEdits => {
            args.push("--full-auto".to_string());
        }
        PermissionMode::Default | PermissionMode::Plan => {}
    }

    if let Some(model) = &params.model {
        args.push("-m".to_string());
        args.push(model.clone());
    }

    args.push("--cd".to_string());
    args.push(display_path(&ctx.real_cwd));

    args
}

/// Codex wraps every event in `{"id":..,"msg":{"type":...}}`.
pub(super) fn map_record(value: &Value) -> Vec<TaskEventPayload> {
    let Some(msg) = value.get("msg") else {
        return Vec::new();
    };

    match msg.get("type").and_then(|t| t.as_str()) {
        Some("agent_message") => opt_str(msg, "message")
            .map(|text| vec![TaskEventPayload::Text { text }])
            .unwrap_or_default(),
        Some("agent_reasoning") => opt_str(msg, "text")
            .map(|text| vec![TaskEventPayload::Thinking { text }])
            .unwrap_or_default(),
        Some("exec_command_begin") => vec![TaskEventPayload::ToolUse {
            tool_name: "exec".to_string(),
            tool_input: msg.get("command").cloned().unwrap_or(Value::Null),
        }],
        Some("exec_command_end") => vec![TaskEventPayload::ToolResult {
            content: msg.get("stdout").cloned().unwrap_or(Value::Null),
            is_error: msg
                .get("exit_code")
                .and_then(|v| v.as_i64())
                .is_some_and(|code| code != 0),
        }],
        Some("task_complete") => vec![TaskEventPayload::Result {
            result: opt_str(msg, "last_agent_message"),
            session_id: opt_str(value, "id"),
            total_cost_usd: None,
            duration_ms: None,
            is_error: false,
        }],
        Some("error") => vec![TaskEventPayload::Error {
            message: opt_str(msg, "message").unwrap_or_else(|| msg.to_string()),
        }],
        other => {
            tracing::trace!(record_type = ?other, "dropping unmapped codex record");
            Vec::new()
        }
    }
}
