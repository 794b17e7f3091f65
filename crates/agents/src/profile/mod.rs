// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent launch profiles.
//!
//! Each agent CLI gets three things here: its argv construction, its
//! environment (parent env scrubbed of credential-leak vectors, plus
//! the LOOPSY_* callbacks the permission hook needs), and its
//! stream-JSON → canonical-event mapping.

mod claude;
mod codex;
mod gemini;

use loopsy_core::{AgentKind, DispatchParams, TaskEventPayload, TaskId};
use std::path::{Path, PathBuf};

/// Everything arg/env construction needs beyond the dispatch params.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub task_id: TaskId,
    pub daemon_port: u16,
    pub api_key: String,
    /// Directory the agent process starts in.
    pub start_dir: PathBuf,
    /// The directory the caller actually wants worked on.
    pub real_cwd: PathBuf,
}

/// Build the argv for an agent run.
pub fn build_args(agent: AgentKind, params: &DispatchParams, ctx: &LaunchContext) -> Vec<String> {
    let mut args = match agent {
        AgentKind::Claude => claude::args(params, ctx),
        AgentKind::Gemini => gemini::args(params),
        AgentKind::Codex => codex::args(params, ctx),
    };
    args.extend(params.additional_args.iter().cloned());
    args
}

/// Build the child environment: parent env minus the agent's
/// credential-leak vectors, plus the hook callback variables.
pub fn build_env(agent: AgentKind, ctx: &LaunchContext) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = std::env::vars()
        .filter(|(key, _)| keep_var(agent, key))
        .collect();

    env.push(("LOOPSY_TASK_ID".into(), ctx.task_id.to_string()));
    env.push(("LOOPSY_DAEMON_PORT".into(), ctx.daemon_port.to_string()));
    env.push(("LOOPSY_API_KEY".into(), ctx.api_key.clone()));
    env
}

/// Whether the agent may see this parent-environment variable.
fn keep_var(agent: AgentKind, key: &str) -> bool {
    match agent {
        AgentKind::Claude => {
            !(key.starts_with("CLAUDE")
                || key.starts_with("ANTHROPIC_")
                || key.starts_with("OTEL_")
                || key.starts_with("MCP_"))
        }
        AgentKind::Gemini => key == "GEMINI_API_KEY" || !key.starts_with("GEMINI_"),
        AgentKind::Codex => key == "CODEX_API_KEY" || !key.starts_with("CODEX_"),
    }
}

/// Whether this agent needs a pseudo-terminal.
pub fn needs_pty(agent: AgentKind) -> bool {
    matches!(agent, AgentKind::Claude)
}

/// Parse one output line into canonical events.
///
/// Non-JSON lines become a `text` event with the raw line; parsed
/// records go through the agent-specific mapper, which may emit zero
/// events (echoes and agent-side permission prompts are dropped).
pub fn parse_line(agent: AgentKind, line: &str) -> Vec<TaskEventPayload> {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => {
            return vec![TaskEventPayload::Text {
                text: line.to_string(),
            }]
        }
    };
    map_record(agent, &value)
}

/// Map one parsed record into canonical events.
pub fn map_record(agent: AgentKind, value: &serde_json::Value) -> Vec<TaskEventPayload> {
    match agent {
        AgentKind::Claude => claude::map_record(value),
        AgentKind::Gemini => gemini::map_record(value),
        AgentKind::Codex => codex::map_record(value),
    }
}

pub(crate) fn opt_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

pub(crate) fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
