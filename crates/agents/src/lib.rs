// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loopsy-agents: supervision of long-lived AI agent subprocesses.
//!
//! An AI task wraps one run of an external agent CLI (claude, gemini or
//! codex). The agent's line-delimited JSON output is normalized into the
//! canonical event alphabet, buffered per task, and broadcast to live
//! subscribers. Human approval flows through an out-of-band hook
//! subprocess: stream-JSON permission events from the agent itself are
//! deliberately ignored, because only the PreToolUse hook carries
//! request ids the daemon can resolve.
//!
//! # Structure
//!
//! - [`session`] — process launching (pipes or PTY) behind a trait
//! - [`line`] — byte stream → trimmed lines, with ANSI stripping
//! - [`profile`] — per-agent args, environment, and event mapping
//! - [`bus`] — per-task event ring + subscriber fan-out
//! - [`manager`] — dispatch, lifecycle, permission tables

pub mod ansi;
pub mod bus;
pub mod line;
pub mod manager;
pub mod profile;
pub mod resolve;
pub mod session;
pub mod workspace;

pub use bus::EVENT_RING_CAPACITY;
pub use manager::{AiTaskManager, ManagerConfig, MAX_ACTIVE_TASKS};
pub use session::{ExitOutcome, NativeLauncher, ProcessLauncher, SessionHandle, SpawnSpec};

#[cfg(any(test, feature = "test-support"))]
pub use session::{FakeLauncher, ScriptedProcess};

use loopsy_core::ErrorCode;
use thiserror::Error;

/// AI task manager errors
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("too many concurrent tasks (max {limit})")]
    MaxConcurrent { limit: usize },

    #[error("no agent CLI found on PATH (tried claude, gemini, codex)")]
    NoAgentFound,

    #[error("agent binary not found on PATH: {0}")]
    AgentNotFound(String),

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("no pending approval for request {0}")]
    NoPendingApproval(String),

    #[error("task already completed: {0}")]
    AlreadyCompleted(String),

    #[error("workspace error: {0}")]
    Workspace(String),
}

impl AgentError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::AiTaskNotFound,
            Self::MaxConcurrent { .. } => ErrorCode::AiTaskMaxConcurrent,
            Self::NoAgentFound => ErrorCode::AiTaskAgentNotFound,
            Self::AgentNotFound(name) if name == "claude" => ErrorCode::AiTaskClaudeNotFound,
            Self::AgentNotFound(_) => ErrorCode::AiTaskAgentNotFound,
            Self::SpawnFailed(_) | Self::Workspace(_) => ErrorCode::AiTaskFailed,
            Self::NoPendingApproval(_) => ErrorCode::AiTaskNoPendingApproval,
            Self::AlreadyCompleted(_) => ErrorCode::AiTaskAlreadyCompleted,
        }
    }
}
