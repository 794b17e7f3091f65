// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude profile: argv construction and stream-json mapping.

use loopsy_core::{DispatchParams, PermissionMode, TaskEventPayload};
use serde_json::Value;

use super::{display_path, opt_str, LaunchContext};

pub(super) fn args(params: &DispatchParams, ctx: &LaunchContext) -> Vec<String> {
    let mode = params.permission_mode.unwrap_or_default();

    let mut args = vec![
        "-p".to_string(),
        params.prompt.clone(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
        "--permission-mode".to_string(),
        mode.as_flag().to_string(),
    ];

    if mode == PermissionMode::BypassPermissions {
        args.push("--dangerously-skip-permissions".to_string());
    }
    if let Some(model) = &params.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    if let Some(budget) = params.max_budget_usd {
        args.push("--max-budget-usd".to_string());
        args.push(budget.to_string());
    }
    if !params.allowed_tools.is_empty() {
        args.push("--allowedTools".to_string());
        args.push(params.allowed_tools.join(" "));
    }
    if !params.disallowed_tools.is_empty() {
        args.push("--disallowedTools".to_string());
        args.push(params.disallowed_tools.join(" "));
    }
    // When the agent starts in a scratch workspace, grant it the real
    // working directory through --add-dir.
    if ctx.start_dir != ctx.real_cwd {
        args.push("--add-dir".to_string());
        args.push(display_path(&ctx.real_cwd));
    }

    args
}

/// Map one claude stream-json record.
///
/// `permission_request` / `input_request` records are intentionally
/// ignored: the PreToolUse hook is the only authoritative source of
/// approval prompts, and stream-side prompts carry request ids the
/// daemon cannot resolve.
pub(super) fn map_record(value: &Value) -> Vec<TaskEventPayload> {
    match value.get("type").and_then(|t| t.as_str()) {
        Some("assistant") => value
            .pointer("/message/content")
            .and_then(|c| c.as_array())
            .map(|blocks| blocks.iter().filter_map(map_content_block).collect())
            .unwrap_or_default(),
        Some("content_block_delta") => map_delta(value.get("delta")),
        Some("tool_result") => vec![TaskEventPayload::ToolResult {
            content: value.get("content").cloned().unwrap_or(Value::Null),
            is_error: value
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }],
        Some("result") => vec![TaskEventPayload::Result {
            result: opt_str(value, "result"),
            session_id: opt_str(value, "session_id"),
            total_cost_usd: value.get("total_cost_usd").and_then(|v| v.as_f64()),
            duration_ms: value.get("duration_ms").and_then(|v| v.as_u64()),
            is_error: value
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }],
        Some("system") => vec![TaskEventPayload::System {
            subtype: opt_str(value, "subtype"),
            raw: value.clone(),
        }],
        // Echoes of our own input and agent-side permission prompts
        Some("user") | Some("rate_limit_event") | Some("permission_request")
        | Some("input_request") => Vec::new(),
        other => {
            tracing::trace!(record_type = ?other, "dropping unmapped claude record");
            Vec::new()
        }
    }
}

fn map_content_block(block: &Value) -> Option<TaskEventPayload> {
    match block.get("type").and_then(|t| t.as_str()) {
        Some("text") => Some(TaskEventPayload::Text {
            text: opt_str(block, "text")?,
        }),
        Some("thinking") => Some(TaskEventPayload::Thinking {
            text: opt_str(block, "thinking")?,
        }),
        Some("tool_use") => Some(TaskEventPayload::ToolUse {
            tool_name: opt_str(block, "name")?,
            tool_input: block.get("input").cloned().unwrap_or(Value::Null),
        }),
        Some("tool_result") => Some(TaskEventPayload::ToolResult {
            content: block.get("content").cloned().unwrap_or(Value::Null),
            is_error: block
                .get("is_error")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }),
        _ => None,
    }
}

fn map_delta(delta: Option<&Value>) -> Vec<TaskEventPayload> {
    let Some(delta) = delta else {
        return Vec::new();
    };
    match delta.get("type").and_then(|t| t.as_str()) {
        Some("text_delta") => opt_str(delta, "text")
            .map(|text| vec![TaskEventPayload::Text { text }])
            .unwrap_or_default(),
        Some("thinking_delta") => opt_str(delta, "thinking")
            .map(|text| vec![TaskEventPayload::Thinking { text }])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
