// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn test_find_on_path_finds_sh() {
    // /bin/sh exists on every unix box this runs on
    assert!(find_on_path("sh").is_some());
}

#[test]
fn test_find_on_path_misses_nonsense() {
    assert!(find_on_path("definitely-not-a-binary-7781").is_none());
}

#[test]
fn test_resolve_concrete_missing_agent() {
    // None of the agent CLIs are installed in CI
    if find_on_path("gemini").is_some() {
        return; // environment has a real agent; nothing to assert
    }
    let err = resolve_agent(AgentChoice::Gemini).unwrap_err();
    assert!(matches!(err, AgentError::AgentNotFound(name) if name == "gemini"));
}

#[test]
fn test_resolve_auto_with_no_agents() {
    if AgentKind::PROBE_ORDER
        .iter()
        .any(|k| find_on_path(k.binary()).is_some())
    {
        return; // environment has a real agent; nothing to assert
    }
    let err = resolve_agent(AgentChoice::Auto).unwrap_err();
    assert!(matches!(err, AgentError::NoAgentFound));
    assert_eq!(err.code(), loopsy_core::ErrorCode::AiTaskAgentNotFound);
}

#[test]
fn test_claude_not_found_has_dedicated_code() {
    let err = AgentError::AgentNotFound("claude".to_string());
    assert_eq!(err.code(), loopsy_core::ErrorCode::AiTaskClaudeNotFound);
}
