// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loopsy-exec: bounded-concurrency supervisor for short-lived child
//! processes.
//!
//! Commands run with shell interpretation disabled: the command string
//! is the program, args are passed verbatim. Admission is gated by a
//! basename deny/allow policy and a concurrency cap; the cap check and
//! slot reservation are one atomic step so racing dispatches cannot
//! both land on the last slot.

mod manager;
mod policy;
mod signal;

pub use manager::{JobManager, StreamingJob};
pub use policy::{command_basename, JobPolicy};

use loopsy_core::ErrorCode;
use thiserror::Error;

/// Job manager errors
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command denied: {0}")]
    CommandDenied(String),

    #[error("too many concurrent jobs (max {limit})")]
    MaxConcurrent { limit: usize },

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("job not found: {0}")]
    JobNotFound(String),
}

impl ExecError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CommandDenied(_) => ErrorCode::ExecCommandDenied,
            Self::MaxConcurrent { .. } => ErrorCode::ExecMaxConcurrent,
            Self::SpawnFailed(_) => ErrorCode::ExecFailed,
            Self::JobNotFound(_) => ErrorCode::ExecJobNotFound,
        }
    }
}
