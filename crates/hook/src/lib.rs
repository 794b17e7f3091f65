// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loopsy-hook: the PreToolUse permission helper.
//!
//! The agent runs this before every tool use. It reads the tool
//! invocation JSON from stdin, registers a permission request with the
//! local daemon, polls for the human's decision, and prints the hook
//! decision JSON. It always exits 0 with a decision on stdout - a hook
//! that errors or hangs would wedge the agent, so every failure path
//! degrades to an explicit deny.

use serde_json::{json, Value};
use std::time::Duration;

/// Poll cadence against the daemon.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Give up (and deny) after this long without a decision.
pub const POLL_DEADLINE: Duration = Duration::from_secs(300);

/// Per-request HTTP timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// The decision printed to stdout for the agent.
pub fn decision_json(allow: bool, reason: &str) -> Value {
    json!({
        "hookSpecificOutput": {
            "hookEventName": "PreToolUse",
            "permissionDecision": if allow { "allow" } else { "deny" },
            "permissionDecisionReason": reason,
        }
    })
}

/// requestId format: `<epoch-ms>-<4 random hex>`.
pub fn generate_request_id() -> String {
    use rand::Rng;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: u16 = rand::thread_rng().gen();
    format!("{now}-{suffix:04x}")
}

/// Pull the fields the daemon wants out of the PreToolUse payload.
pub fn permission_request_body(request_id: &str, tool_payload: &Value) -> Value {
    let tool_name = tool_payload
        .get("tool_name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let tool_input = tool_payload.get("tool_input").cloned().unwrap_or(Value::Null);
    let description = format!("Agent wants to use {tool_name}");

    json!({
        "requestId": request_id,
        "toolName": tool_name,
        "toolInput": tool_input,
        "description": description,
    })
}

/// Run the full register-then-poll exchange. Returns the decision to print.
pub async fn resolve_permission(
    base_url: &str,
    api_key: &str,
    task_id: &str,
    tool_payload: &Value,
) -> Value {
    let client = match reqwest::Client::builder().timeout(HTTP_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => return decision_json(false, &format!("hook http client failed: {e}")),
    };

    let request_id = generate_request_id();
    let body = permission_request_body(&request_id, tool_payload);

    // Register the request with the daemon
    let register = client
        .post(format!("{base_url}/api/v1/ai-tasks/{task_id}/permission-request"))
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await;
    match register {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => {
            return decision_json(
                false,
                &format!("daemon rejected permission request: {}", response.status()),
            );
        }
        Err(e) => return decision_json(false, &format!("daemon unreachable: {e}")),
    }

    // Poll for the human decision
    let poll_url = format!(
        "{base_url}/api/v1/ai-tasks/{task_id}/permission-response?requestId={request_id}"
    );
    let deadline = std::time::Instant::now() + POLL_DEADLINE;
    while std::time::Instant::now() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;

        let response = match client.get(&poll_url).bearer_auth(api_key).send().await {
            Ok(response) => response,
            Err(_) => continue,
        };
        let Ok(body) = response.json::<Value>().await else {
            continue;
        };

        if body.get("resolved").and_then(|v| v.as_bool()) == Some(true) {
            let approved = body.get("approved").and_then(|v| v.as_bool()) == Some(true);
            let reason = body
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    if approved {
                        "approved by operator".to_string()
                    } else {
                        "denied by operator".to_string()
                    }
                });
            return decision_json(approved, &reason);
        }
    }

    decision_json(false, "no decision within 5 minutes")
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
