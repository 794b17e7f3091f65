// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command admission policy.
//!
//! Matching is on the command's basename (last path segment), so
//! `/bin/rm`, `./rm` and `rm` are all the same command to the policy.

use crate::ExecError;

/// Execution limits and command policy, derived from config.
#[derive(Debug, Clone)]
pub struct JobPolicy {
    /// Basenames that are never allowed.
    pub denylist: Vec<String>,
    /// When set, only these basenames are allowed.
    pub allowlist: Option<Vec<String>>,
    /// Maximum concurrently-running jobs.
    pub max_concurrent: usize,
    /// Default wall-clock timeout in milliseconds.
    pub default_timeout_ms: u64,
}

impl Default for JobPolicy {
    fn default() -> Self {
        Self {
            denylist: Vec::new(),
            allowlist: None,
            max_concurrent: 10,
            default_timeout_ms: 300_000,
        }
    }
}

impl JobPolicy {
    /// Check whether `command` may run.
    pub fn check(&self, command: &str) -> Result<(), ExecError> {
        let base = command_basename(command);

        if self.denylist.iter().any(|d| d == base) {
            return Err(ExecError::CommandDenied(base.to_string()));
        }

        if let Some(allow) = &self.allowlist {
            if !allow.iter().any(|a| a == base) {
                return Err(ExecError::CommandDenied(base.to_string()));
            }
        }

        Ok(())
    }
}

/// Extract the basename (last path segment) of a command.
///
/// Handles absolute paths (`/usr/bin/rm` → `rm`), relative paths
/// (`./rm` → `rm`), and plain names. Windows separators are treated as
/// path separators too.
pub fn command_basename(command: &str) -> &str {
    command
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(command)
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
