// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal-based process termination, by pid.

/// Send SIGTERM. No-op on non-unix targets.
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

/// Send SIGKILL. No-op on non-unix targets.
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
