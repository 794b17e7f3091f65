// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data-directory layout.
//!
//! ```text
//! <dataDir>/
//!   config.yaml
//!   peers.json
//!   context.json
//!   daemon.pid
//!   logs/
//!     daemon.log
//!     audit.jsonl
//!   tls/
//!     cert.pem
//!     key.pem
//!   sessions/<name>/      # sibling daemons, same layout
//! ```

use std::path::{Path, PathBuf};

/// Root of one daemon's on-disk state.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location: `~/.loopsy` (override with `LOOPSY_DATA_DIR`).
    pub fn default_root() -> Self {
        if let Ok(dir) = std::env::var("LOOPSY_DATA_DIR") {
            return Self::new(dir);
        }
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".loopsy"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn peers_file(&self) -> PathBuf {
        self.root.join("peers.json")
    }

    pub fn context_file(&self) -> PathBuf {
        self.root.join("context.json")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.root.join("daemon.pid")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn daemon_log(&self) -> PathBuf {
        self.logs_dir().join("daemon.log")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir().join("audit.jsonl")
    }

    pub fn tls_dir(&self) -> PathBuf {
        self.root.join("tls")
    }

    pub fn tls_cert(&self) -> PathBuf {
        self.tls_dir().join("cert.pem")
    }

    pub fn tls_key(&self) -> PathBuf {
        self.tls_dir().join("key.pem")
    }

    /// Directory holding sibling-session data dirs.
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Data dir of a named sibling session.
    pub fn session(&self, name: &str) -> DataDir {
        DataDir::new(self.sessions_dir().join(name))
    }

    /// Scratch workspaces for AI tasks.
    pub fn workspaces_dir(&self) -> PathBuf {
        self.root.join("workspaces")
    }

    /// Create the directories the daemon writes into.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.workspaces_dir())?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
