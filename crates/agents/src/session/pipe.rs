// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipe-backed process session.
//!
//! stdout is pumped to the output channel; stderr is accumulated (tail
//! only) for failure diagnostics; exit is reported once both the wait
//! and the stdout pump finish.

use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

use super::{ExitOutcome, SessionError, SessionHandle, SpawnSpec};

/// Bytes of stderr kept for diagnostics.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

const CHUNK: usize = 8192;

pub(super) fn launch(spec: SpawnSpec) -> Result<SessionHandle, SessionError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .env_clear()
        .envs(spec.env.iter().cloned())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (output_tx, output_rx) = mpsc::channel(256);
    let (exit_tx, exit_rx) = oneshot::channel();

    tokio::spawn(async move {
        let stdout_pump = async {
            let Some(mut stdout) = stdout else { return };
            let mut chunk = vec![0u8; CHUNK];
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if output_tx.send(chunk[..n].to_vec()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        };

        let stderr_pump = async {
            let Some(mut stderr) = stderr else {
                return String::new();
            };
            let mut tail: Vec<u8> = Vec::new();
            let mut chunk = vec![0u8; CHUNK];
            loop {
                match stderr.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        tail.extend_from_slice(&chunk[..n]);
                        if tail.len() > STDERR_TAIL_BYTES {
                            let cut = tail.len() - STDERR_TAIL_BYTES;
                            tail.drain(..cut);
                        }
                    }
                }
            }
            String::from_utf8_lossy(&tail).into_owned()
        };

        let (_, stderr_tail, status) = tokio::join!(stdout_pump, stderr_pump, child.wait());

        let outcome = match status {
            Ok(status) => ExitOutcome {
                exit_code: status.code(),
                signaled: signaled(&status),
                stderr_tail,
            },
            Err(e) => {
                tracing::warn!(error = %e, "wait on child failed");
                ExitOutcome {
                    exit_code: None,
                    signaled: false,
                    stderr_tail,
                }
            }
        };
        let _ = exit_tx.send(outcome);
    });

    Ok(SessionHandle {
        pid,
        output: output_rx,
        exit: exit_rx,
    })
}

fn signaled(status: &std::process::ExitStatus) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal().is_some()
    }
    #[cfg(not(unix))]
    {
        status.code().is_none()
    }
}

#[cfg(test)]
#[path = "pipe_tests.rs"]
mod tests;
