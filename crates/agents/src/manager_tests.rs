// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::session::{FakeLauncher, ScriptedProcess};
use loopsy_core::{AgentChoice, SystemClock};
use serde_json::json;

fn test_config(dir: &std::path::Path) -> ManagerConfig {
    let mut config = ManagerConfig::new(
        19532,
        "KEY".into(),
        dir.to_path_buf(),
        PathBuf::from("/usr/local/bin/loopsy-hook"),
    );
    // Tests should not sit out production retention windows
    config.recent_retention = Duration::from_millis(100);
    config.response_retention = Duration::from_millis(100);
    config
}

fn manager_with(
    launcher: FakeLauncher,
    dir: &std::path::Path,
) -> Arc<AiTaskManager<FakeLauncher, SystemClock>> {
    AiTaskManager::new(launcher, SystemClock, test_config(dir))
}

fn params(prompt: &str) -> DispatchParams {
    DispatchParams {
        prompt: prompt.to_string(),
        cwd: None,
        permission_mode: None,
        model: None,
        agent: AgentChoice::Claude,
        max_budget_usd: None,
        allowed_tools: Vec::new(),
        disallowed_tools: Vec::new(),
        additional_args: Vec::new(),
    }
}

fn node() -> NodeId {
    NodeId::new("requester")
}

fn result_line(session_id: &str) -> String {
    json!({"type": "result", "result": "done", "session_id": session_id}).to_string()
}

fn text_line(text: &str) -> String {
    json!({"type": "assistant", "message": {"content": [{"type": "text", "text": text}]}})
        .to_string()
}

async fn wait_until<F: Fn() -> bool>(predicate: F, what: &str) {
    for _ in 0..300 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_dispatch_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess::emitting_lines(&[
        &text_line("hello"),
        &result_line("sess-1"),
    ]));
    let manager = manager_with(launcher, dir.path());

    let info = manager.dispatch(params("do a thing"), node()).await.unwrap();
    assert_eq!(info.status, TaskStatus::Running);
    assert_eq!(info.prompt, "do a thing");

    let task_id = info.task_id.clone();
    wait_until(
        || {
            manager
                .get(&task_id)
                .is_some_and(|t| t.status == TaskStatus::Completed)
        },
        "task completion",
    )
    .await;

    let done = manager.get(&task_id).unwrap();
    assert_eq!(done.exit_code, Some(0));
    assert_eq!(done.session_id.as_deref(), Some("sess-1"));
    assert!(done.completed_at.is_some());
    assert_eq!(manager.active_count(), 0);

    // Buffer survives into the recent table, exit event last
    let events = manager.events(&task_id).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.payload.kind()).collect();
    assert!(kinds.contains(&"text"));
    assert!(kinds.contains(&"result"));
    assert_eq!(kinds.last(), Some(&"exit"));
}

#[tokio::test]
async fn test_failed_exit_records_error() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess {
        exit: crate::session::ExitOutcome {
            exit_code: Some(2),
            signaled: false,
            stderr_tail: "model unavailable\n".into(),
        },
        ..Default::default()
    });
    let manager = manager_with(launcher, dir.path());

    let info = manager.dispatch(params("x"), node()).await.unwrap();
    let task_id = info.task_id.clone();
    wait_until(
        || {
            manager
                .get(&task_id)
                .is_some_and(|t| t.status == TaskStatus::Failed)
        },
        "task failure",
    )
    .await;

    let failed = manager.get(&task_id).unwrap();
    assert_eq!(failed.exit_code, Some(2));
    assert_eq!(failed.error.as_deref(), Some("model unavailable"));

    let events = manager.events(&task_id).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.payload.kind()).collect();
    assert!(kinds.contains(&"error"));
    assert!(kinds.contains(&"exit"));
}

#[tokio::test]
async fn test_max_concurrent_enforced_and_released() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    for _ in 0..MAX_ACTIVE_TASKS {
        launcher.push_script(ScriptedProcess {
            hang: true,
            ..Default::default()
        });
    }
    let manager = manager_with(launcher.clone(), dir.path());

    for i in 0..MAX_ACTIVE_TASKS {
        manager
            .dispatch(params(&format!("task {i}")), node())
            .await
            .unwrap();
    }
    assert_eq!(manager.active_count(), MAX_ACTIVE_TASKS);

    let err = manager.dispatch(params("one too many"), node()).await.unwrap_err();
    assert!(matches!(err, AgentError::MaxConcurrent { limit: 3 }));

    // Finish one; capacity frees once it is finalized
    launcher.finish(crate::session::ExitOutcome {
        exit_code: Some(0),
        signaled: false,
        stderr_tail: String::new(),
    });
    wait_until(|| manager.active_count() == MAX_ACTIVE_TASKS - 1, "slot release").await;

    launcher.push_script(ScriptedProcess::default());
    manager.dispatch(params("fits now"), node()).await.unwrap();

    manager.cancel_all();
}

#[tokio::test]
async fn test_permission_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess {
        hang: true,
        ..Default::default()
    });
    let manager = manager_with(launcher.clone(), dir.path());

    let info = manager.dispatch(params("guarded"), node()).await.unwrap();
    let task_id = info.task_id.clone();

    // Hook registers a request: status flips to waiting_approval
    let request = PermissionRequest {
        request_id: "r1".into(),
        tool_name: "Write".into(),
        tool_input: json!({"path": "/x"}),
        description: "write a file".into(),
    };
    let waiting = manager.register_permission(&task_id, request).unwrap();
    assert_eq!(waiting.status, TaskStatus::WaitingApproval);
    let pending = waiting.pending_approval.unwrap();
    assert_eq!(pending.request_id, "r1");
    assert_eq!(pending.tool_name, "Write");

    // Unresolved yet
    assert!(manager.permission_response(&task_id, "r1").unwrap().is_none());

    // Human approves: status back to running, response stored
    let running = manager
        .approve(&task_id, "r1", true, Some("go ahead".into()))
        .unwrap();
    assert_eq!(running.status, TaskStatus::Running);
    assert!(running.pending_approval.is_none());

    let response = manager.permission_response(&task_id, "r1").unwrap().unwrap();
    assert!(response.approved);
    assert_eq!(response.message.as_deref(), Some("go ahead"));

    // The bus carried both the prompt and the status transitions
    let events = manager.events(&task_id).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.payload.kind()).collect();
    assert!(kinds.contains(&"permission_request"));

    // Response evicted after the retention window
    wait_until(
        || {
            manager
                .permission_response(&task_id, "r1")
                .map(|r| r.is_none())
                .unwrap_or(false)
        },
        "response eviction",
    )
    .await;

    manager.cancel_all();
    launcher.finish(crate::session::ExitOutcome {
        exit_code: None,
        signaled: true,
        stderr_tail: String::new(),
    });
}

#[tokio::test]
async fn test_approve_without_pending_fails() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess {
        hang: true,
        ..Default::default()
    });
    let manager = manager_with(launcher.clone(), dir.path());

    let info = manager.dispatch(params("x"), node()).await.unwrap();
    let err = manager.approve(&info.task_id, "ghost", true, None).unwrap_err();
    assert!(matches!(err, AgentError::NoPendingApproval(_)));

    launcher.finish(crate::session::ExitOutcome {
        exit_code: Some(0),
        signaled: false,
        stderr_tail: String::new(),
    });
}

#[tokio::test]
async fn test_cancel_marks_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess {
        hang: true,
        ..Default::default()
    });
    let manager = manager_with(launcher.clone(), dir.path());

    let info = manager.dispatch(params("cancel me"), node()).await.unwrap();
    let task_id = info.task_id.clone();

    manager.cancel(&task_id).unwrap();
    assert_eq!(manager.get(&task_id).unwrap().status, TaskStatus::Cancelled);
    // Cancelled tasks no longer count against the cap
    assert_eq!(manager.active_count(), 0);

    // Child exits (as the TERM/KILL would force); task lands in recent
    launcher.finish(crate::session::ExitOutcome {
        exit_code: None,
        signaled: true,
        stderr_tail: String::new(),
    });
    wait_until(
        || {
            manager
                .events(&task_id)
                .is_some_and(|events| events.iter().any(|e| e.payload.kind() == "exit"))
        },
        "cancelled task finalization",
    )
    .await;

    let done = manager.get(&task_id).unwrap();
    assert_eq!(done.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_unknown_and_completed() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess::default());
    let manager = manager_with(launcher, dir.path());

    let err = manager.cancel(&TaskId::new("ghost")).unwrap_err();
    assert!(matches!(err, AgentError::NotFound(_)));

    let info = manager.dispatch(params("quick"), node()).await.unwrap();
    let task_id = info.task_id.clone();
    wait_until(
        || {
            manager
                .get(&task_id)
                .is_some_and(|t| t.status == TaskStatus::Completed)
        },
        "completion",
    )
    .await;

    let err = manager.cancel(&task_id).unwrap_err();
    assert!(matches!(err, AgentError::AlreadyCompleted(_)));
}

#[tokio::test]
async fn test_timeout_cancels_task() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess {
        hang: true,
        ..Default::default()
    });
    let mut config = test_config(dir.path());
    config.task_timeout = Duration::from_millis(100);
    let manager = AiTaskManager::new(launcher.clone(), SystemClock, config);

    let info = manager.dispatch(params("slow"), node()).await.unwrap();
    let task_id = info.task_id.clone();

    wait_until(
        || {
            manager
                .get(&task_id)
                .is_some_and(|t| t.status == TaskStatus::Cancelled)
        },
        "timeout cancellation",
    )
    .await;

    let events = manager.events(&task_id).unwrap();
    assert!(events.iter().any(
        |e| matches!(&e.payload, TaskEventPayload::Error { message } if message.contains("timed out"))
    ));

    launcher.finish(crate::session::ExitOutcome {
        exit_code: None,
        signaled: true,
        stderr_tail: String::new(),
    });
}

#[tokio::test]
async fn test_subscribe_replays_then_streams() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess {
        chunks: vec![format!("{}\n", text_line("early")).into_bytes()],
        chunk_delay: Duration::from_millis(50),
        hang: true,
        ..Default::default()
    });
    let manager = manager_with(launcher.clone(), dir.path());

    let info = manager.dispatch(params("stream"), node()).await.unwrap();
    let task_id = info.task_id.clone();

    wait_until(
        || {
            manager
                .events(&task_id)
                .is_some_and(|events| events.iter().any(|e| e.payload.kind() == "text"))
        },
        "first event",
    )
    .await;

    let (replay, subscription) = manager.subscribe(&task_id, 0).unwrap();
    assert!(replay.iter().any(|e| e.payload.kind() == "text"));
    let mut subscription = subscription.unwrap();

    // A live event arrives through the subscription
    let request = PermissionRequest {
        request_id: "r9".into(),
        tool_name: "Bash".into(),
        tool_input: serde_json::Value::Null,
        description: String::new(),
    };
    manager.register_permission(&task_id, request).unwrap();

    let live = subscription.receiver.recv().await.unwrap();
    assert_eq!(live.payload.kind(), "permission_request");

    launcher.finish(crate::session::ExitOutcome {
        exit_code: Some(0),
        signaled: false,
        stderr_tail: String::new(),
    });
}

#[tokio::test]
async fn test_recent_task_evicted_after_retention() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess::default());
    let manager = manager_with(launcher, dir.path());

    let info = manager.dispatch(params("brief"), node()).await.unwrap();
    let task_id = info.task_id.clone();

    wait_until(|| manager.get(&task_id).is_some_and(|t| t.status.is_terminal()), "finalize").await;
    wait_until(|| manager.get(&task_id).is_none(), "recent eviction").await;
    assert!(manager.events(&task_id).is_none());
}

#[tokio::test]
async fn test_scratch_workspace_for_hooked_claude() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess {
        hang: true,
        ..Default::default()
    });
    let manager = manager_with(launcher.clone(), dir.path());

    let mut dispatch = params("guarded run");
    dispatch.cwd = Some("/home/me/project".into());
    let info = manager.dispatch(dispatch, node()).await.unwrap();

    let spawns = launcher.spawns();
    assert_eq!(spawns.len(), 1);
    let spec = &spawns[0];

    // Starts in the scratch dir, with pty, hook settings on disk
    let scratch_dir = dir.path().join(info.task_id.as_str());
    assert_eq!(spec.cwd, scratch_dir);
    assert!(spec.use_pty);
    assert!(scratch_dir.join(".claude/settings.local.json").exists());
    assert!(scratch_dir.join("CLAUDE.md").exists());

    // The real cwd is granted back via --add-dir
    let joined = spec.args.join(" ");
    assert!(joined.contains("--add-dir /home/me/project"));

    // Hook callback env vars injected
    assert!(spec
        .env
        .iter()
        .any(|(k, v)| k == "LOOPSY_TASK_ID" && v == info.task_id.as_str()));

    // Cancel and let it exit; the scratch dir is cleaned up
    manager.cancel(&info.task_id).unwrap();
    launcher.finish(crate::session::ExitOutcome {
        exit_code: None,
        signaled: true,
        stderr_tail: String::new(),
    });
    let task_id = info.task_id.clone();
    wait_until(|| !scratch_dir.exists(), "scratch cleanup").await;
    assert_eq!(manager.get(&task_id).unwrap().status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn test_bypass_claude_skips_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.push_script(ScriptedProcess::default());
    let manager = manager_with(launcher.clone(), dir.path());

    let mut dispatch = params("unguarded");
    dispatch.permission_mode = Some(loopsy_core::PermissionMode::BypassPermissions);
    dispatch.cwd = Some("/tmp".into());
    manager.dispatch(dispatch, node()).await.unwrap();

    let spec = &launcher.spawns()[0];
    assert_eq!(spec.cwd, PathBuf::from("/tmp"));
    assert!(spec.args.contains(&"--dangerously-skip-permissions".to_string()));
}

#[tokio::test]
async fn test_spawn_failure_surfaces_and_frees_slot() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = FakeLauncher::new();
    launcher.fail_next("binary exploded");
    let manager = manager_with(launcher, dir.path());

    let err = manager.dispatch(params("x"), node()).await.unwrap_err();
    assert!(matches!(err, AgentError::SpawnFailed(_)));
    assert_eq!(err.code(), loopsy_core::ErrorCode::AiTaskFailed);
    assert_eq!(manager.active_count(), 0);
    assert!(manager.list().is_empty());
}
