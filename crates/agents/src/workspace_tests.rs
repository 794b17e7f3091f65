// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn test_prepare_scratch_layout() {
    let dir = tempfile::tempdir().unwrap();
    let task_id = TaskId::new("task-abc");

    let workspace = prepare_scratch(
        dir.path(),
        &task_id,
        "/usr/local/bin/loopsy-hook task-abc 19532 KEY",
        Path::new("/home/me/project"),
    )
    .await
    .unwrap();

    assert_eq!(workspace.dir, dir.path().join("task-abc"));

    let settings_raw =
        std::fs::read_to_string(workspace.dir.join(".claude/settings.local.json")).unwrap();
    let settings: serde_json::Value = serde_json::from_str(&settings_raw).unwrap();
    let hook = &settings["hooks"]["PreToolUse"][0]["hooks"][0];
    assert_eq!(hook["type"], "command");
    assert_eq!(
        hook["command"],
        "/usr/local/bin/loopsy-hook task-abc 19532 KEY"
    );
    assert_eq!(settings["hooks"]["PreToolUse"][0]["matcher"], "*");

    let briefing = std::fs::read_to_string(workspace.dir.join("CLAUDE.md")).unwrap();
    assert!(briefing.contains("/home/me/project"));
    assert!(briefing.contains("absolute paths"));
}

#[tokio::test]
async fn test_remove_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let task_id = TaskId::new("gone");
    let workspace = prepare_scratch(dir.path(), &task_id, "hook", Path::new("/p"))
        .await
        .unwrap();

    assert!(workspace.dir.exists());
    remove_scratch(&workspace).await;
    assert!(!workspace.dir.exists());
}

#[tokio::test]
async fn test_remove_missing_scratch_is_quiet() {
    let workspace = ScratchWorkspace {
        dir: PathBuf::from("/nonexistent/loopsy-test-xyz"),
    };
    remove_scratch(&workspace).await;
}
