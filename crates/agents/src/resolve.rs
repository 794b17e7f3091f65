// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent binary resolution.
//!
//! `auto` dispatch probes PATH for claude, then gemini, then codex; the
//! first hit wins. A concrete agent request fails fast when its binary
//! is missing.

use loopsy_core::{AgentChoice, AgentKind};
use std::path::{Path, PathBuf};

use crate::AgentError;

/// Find an executable on PATH.
pub fn find_on_path(binary: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| is_executable(candidate))
}

/// Resolve the agent for a dispatch.
pub fn resolve_agent(choice: AgentChoice) -> Result<AgentKind, AgentError> {
    match choice.requested() {
        Some(kind) => {
            if find_on_path(kind.binary()).is_some() {
                Ok(kind)
            } else {
                Err(AgentError::AgentNotFound(kind.binary().to_string()))
            }
        }
        None => AgentKind::PROBE_ORDER
            .iter()
            .copied()
            .find(|kind| find_on_path(kind.binary()).is_some())
            .ok_or(AgentError::NoAgentFound),
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
