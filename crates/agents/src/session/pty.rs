// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY-backed process session.
//!
//! Claude's runtime buffers stream-json on pipes and only flushes per
//! line when attached to a terminal, so claude runs get a pty (openpty
//! on unix, ConPTY on windows, via portable-pty). Reads are blocking;
//! both the output pump and the wait run on blocking threads and feed
//! async channels.

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::sync::{mpsc, oneshot};

use super::{ExitOutcome, SessionError, SessionHandle, SpawnSpec};

const CHUNK: usize = 8192;

pub(super) fn launch(spec: SpawnSpec) -> Result<SessionHandle, SessionError> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 40,
            cols: 200,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| SessionError::Pty(e.to_string()))?;

    let mut cmd = CommandBuilder::new(&spec.program);
    cmd.args(&spec.args);
    cmd.cwd(&spec.cwd);
    cmd.env_clear();
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    // The pty provides TERM; claude misbehaves without one
    cmd.env("TERM", "xterm-256color");

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
    // Close our copy of the slave so reader EOF tracks child exit
    drop(pair.slave);

    let pid = child.process_id();

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| SessionError::Pty(e.to_string()))?;

    let (output_tx, output_rx) = mpsc::channel(256);
    let (exit_tx, exit_rx) = oneshot::channel();

    // Output pump: blocking reads off the pty master
    tokio::task::spawn_blocking(move || {
        use std::io::Read;
        let mut chunk = vec![0u8; CHUNK];
        loop {
            match reader.read(&mut chunk) {
                // EIO on a closed pty is the normal exit path
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if output_tx.blocking_send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Wait thread: owns the master so the pty outlives the child
    let master = pair.master;
    tokio::task::spawn_blocking(move || {
        let outcome = match child.wait() {
            Ok(status) => ExitOutcome {
                exit_code: Some(status.exit_code() as i32),
                signaled: false,
                stderr_tail: String::new(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "wait on pty child failed");
                ExitOutcome {
                    exit_code: None,
                    signaled: false,
                    stderr_tail: String::new(),
                }
            }
        };
        drop(master);
        let _ = exit_tx.send(outcome);
    });

    Ok(SessionHandle {
        pid,
        output: output_rx,
        exit: exit_rx,
    })
}
