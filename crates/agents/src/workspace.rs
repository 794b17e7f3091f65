// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scratch workspace preparation for hooked claude runs.
//!
//! A claude task that is subject to approval starts in a per-task
//! scratch directory whose `.claude/settings.local.json` registers the
//! bundled permission hook as a PreToolUse hook. A CLAUDE.md in the
//! scratch dir steers the agent toward absolute paths, since its cwd is
//! not the directory the caller asked it to work on (that one is
//! granted via `--add-dir`).

use loopsy_core::TaskId;
use std::path::{Path, PathBuf};

/// A prepared per-task scratch directory.
#[derive(Debug, Clone)]
pub struct ScratchWorkspace {
    pub dir: PathBuf,
}

/// Create the scratch directory for a task.
///
/// `hook_command` is the full invocation registered as the PreToolUse
/// hook, e.g. `/path/to/loopsy-hook <taskId> <port> <apiKey>`.
pub async fn prepare_scratch(
    workspaces_dir: &Path,
    task_id: &TaskId,
    hook_command: &str,
    real_cwd: &Path,
) -> std::io::Result<ScratchWorkspace> {
    let dir = workspaces_dir.join(task_id.as_str());
    let claude_dir = dir.join(".claude");
    tokio::fs::create_dir_all(&claude_dir).await?;

    let settings = serde_json::json!({
        "hooks": {
            "PreToolUse": [
                {
                    "matcher": "*",
                    "hooks": [
                        { "type": "command", "command": hook_command }
                    ]
                }
            ]
        }
    });
    tokio::fs::write(
        claude_dir.join("settings.local.json"),
        serde_json::to_vec_pretty(&settings)?,
    )
    .await?;

    let briefing = format!(
        "# Working directory\n\n\
         Your working directory is a scratch area. The project you are\n\
         working on lives at `{}` - always use absolute paths under that\n\
         directory when reading or writing files.\n",
        real_cwd.display()
    );
    tokio::fs::write(dir.join("CLAUDE.md"), briefing).await?;

    Ok(ScratchWorkspace { dir })
}

/// Best-effort removal of a task's scratch directory.
pub async fn remove_scratch(workspace: &ScratchWorkspace) {
    if let Err(e) = tokio::fs::remove_dir_all(&workspace.dir).await {
        tracing::debug!(dir = %workspace.dir.display(), error = %e, "scratch cleanup failed");
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
