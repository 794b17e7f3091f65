// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake launcher for tests: scripted output, no real processes.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::{ExitOutcome, ProcessLauncher, SessionError, SessionHandle, SpawnSpec};

/// One scripted agent run.
#[derive(Debug, Clone)]
pub struct ScriptedProcess {
    /// Chunks delivered on the output channel, in order.
    pub chunks: Vec<Vec<u8>>,
    /// Delay between chunks (lets tests interleave other calls).
    pub chunk_delay: Duration,
    /// Exit delivered after the last chunk, unless `hang` is set.
    pub exit: ExitOutcome,
    /// Keep the process "running" until `FakeLauncher::finish` is called.
    pub hang: bool,
}

impl Default for ScriptedProcess {
    fn default() -> Self {
        Self {
            chunks: Vec::new(),
            chunk_delay: Duration::ZERO,
            exit: ExitOutcome {
                exit_code: Some(0),
                signaled: false,
                stderr_tail: String::new(),
            },
            hang: false,
        }
    }
}

impl ScriptedProcess {
    /// Script that emits the given lines and exits 0.
    pub fn emitting_lines(lines: &[&str]) -> Self {
        let mut text = lines.join("\n");
        text.push('\n');
        Self {
            chunks: vec![text.into_bytes()],
            ..Default::default()
        }
    }
}

struct HangingRun {
    finish_tx: oneshot::Sender<ExitOutcome>,
}

#[derive(Default)]
struct Inner {
    scripts: VecDeque<ScriptedProcess>,
    spawns: Vec<SpawnSpec>,
    hanging: Vec<HangingRun>,
    fail_next: Option<String>,
}

/// Launcher that replays scripted processes.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    inner: Arc<Mutex<Inner>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next scripted run.
    pub fn push_script(&self, script: ScriptedProcess) {
        self.inner.lock().scripts.push_back(script);
    }

    /// Make the next launch fail with the given message.
    pub fn fail_next(&self, message: &str) {
        self.inner.lock().fail_next = Some(message.to_string());
    }

    /// Specs of every spawn so far.
    pub fn spawns(&self) -> Vec<SpawnSpec> {
        self.inner.lock().spawns.clone()
    }

    /// Finish the oldest hanging run with the given outcome.
    pub fn finish(&self, outcome: ExitOutcome) {
        let run = {
            let mut inner = self.inner.lock();
            if inner.hanging.is_empty() {
                None
            } else {
                Some(inner.hanging.remove(0))
            }
        };
        if let Some(run) = run {
            let _ = run.finish_tx.send(outcome);
        }
    }
}

#[async_trait::async_trait]
impl ProcessLauncher for FakeLauncher {
    fn resolve(
        &self,
        choice: loopsy_core::AgentChoice,
    ) -> Result<loopsy_core::AgentKind, crate::AgentError> {
        Ok(choice.requested().unwrap_or(loopsy_core::AgentKind::Claude))
    }

    async fn launch(&self, spec: SpawnSpec) -> Result<SessionHandle, SessionError> {
        let (script, finish_rx) = {
            let mut inner = self.inner.lock();
            if let Some(message) = inner.fail_next.take() {
                return Err(SessionError::SpawnFailed(message));
            }
            inner.spawns.push(spec);
            let script = inner.scripts.pop_front().unwrap_or_default();
            let finish_rx = if script.hang {
                let (tx, rx) = oneshot::channel();
                inner.hanging.push(HangingRun { finish_tx: tx });
                Some(rx)
            } else {
                None
            };
            (script, finish_rx)
        };

        let (output_tx, output_rx) = mpsc::channel(256);
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(async move {
            for chunk in script.chunks {
                if !script.chunk_delay.is_zero() {
                    tokio::time::sleep(script.chunk_delay).await;
                }
                if output_tx.send(chunk).await.is_err() {
                    break;
                }
            }

            let outcome = match finish_rx {
                Some(rx) => rx.await.unwrap_or(ExitOutcome {
                    exit_code: None,
                    signaled: true,
                    stderr_tail: String::new(),
                }),
                None => script.exit,
            };
            drop(output_tx);
            let _ = exit_tx.send(outcome);
        });

        // No pid: signal-based termination must never hit a real process
        Ok(SessionHandle {
            pid: None,
            output: output_rx,
            exit: exit_rx,
        })
    }
}
