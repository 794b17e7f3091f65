// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process session adapters.
//!
//! An agent run needs a child process whose stdout can be consumed as a
//! byte stream and whose exit can be awaited. Two stdio shapes exist:
//! plain pipes (gemini, codex) and a pseudo-terminal (claude's runtime
//! buffers aggressively on pipes and only streams when it sees a TTY).
//! [`NativeLauncher`] picks the shape from the spawn spec; the manager
//! is generic over [`ProcessLauncher`] so tests substitute
//! [`FakeLauncher`] and never spawn real binaries.

mod pipe;
mod pty;
pub(crate) mod signal;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLauncher, ScriptedProcess};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("pty error: {0}")]
    Pty(String),
}

/// What to launch and how.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Complete child environment (the parent's is not inherited).
    pub env: Vec<(String, String)>,
    /// Attach a pseudo-terminal instead of pipes.
    pub use_pty: bool,
}

/// How the child ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    pub exit_code: Option<i32>,
    /// True when the child died to a signal (pipes only; PTY exits
    /// report a code and rely on the manager's cancel flag).
    pub signaled: bool,
    /// Tail of stderr, for failure diagnostics. Empty for PTY runs.
    pub stderr_tail: String,
}

/// A running agent process.
///
/// `output` yields stdout bytes in arrival order and closes at EOF;
/// `exit` resolves exactly once. Termination is signal-based via `pid`.
#[derive(Debug)]
pub struct SessionHandle {
    pub pid: Option<u32>,
    pub output: mpsc::Receiver<Vec<u8>>,
    pub exit: oneshot::Receiver<ExitOutcome>,
}

/// Launches agent processes.
#[async_trait]
pub trait ProcessLauncher: Clone + Send + Sync + 'static {
    async fn launch(&self, spec: SpawnSpec) -> Result<SessionHandle, SessionError>;

    /// Resolve the agent for a dispatch. The default probes PATH;
    /// fakes override so tests run without agent binaries installed.
    fn resolve(
        &self,
        choice: loopsy_core::AgentChoice,
    ) -> Result<loopsy_core::AgentKind, crate::AgentError> {
        crate::resolve::resolve_agent(choice)
    }
}

/// Real launcher: pipes or PTY per the spawn spec.
#[derive(Debug, Clone, Default)]
pub struct NativeLauncher;

#[async_trait]
impl ProcessLauncher for NativeLauncher {
    async fn launch(&self, spec: SpawnSpec) -> Result<SessionHandle, SessionError> {
        if spec.use_pty {
            pty::launch(spec)
        } else {
            pipe::launch(spec)
        }
    }
}

/// Send SIGTERM to a session's process.
pub fn terminate(pid: u32) {
    signal::send_term(pid);
}

/// Send SIGKILL to a session's process.
pub fn kill(pid: u32) {
    signal::send_kill(pid);
}
