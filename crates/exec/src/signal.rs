// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful termination helper.
//!
//! TERM first so the child can clean up; the caller escalates to KILL
//! after a grace period.

/// Send SIGTERM to a process by pid. No-op on non-unix targets, where
/// the KILL escalation is the only termination path.
pub(crate) fn send_term(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Ok(pid) = i32::try_from(pid) {
            if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                tracing::debug!(pid, error = %e, "SIGTERM failed");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

/// Send SIGKILL to a process by pid. No-op on non-unix targets.
pub(crate) fn send_kill(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Ok(pid) = i32::try_from(pid) {
            if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGKILL) {
                tracing::debug!(pid, error = %e, "SIGKILL failed");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}
