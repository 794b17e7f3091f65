// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job manager: spawn, supervise, and terminate child processes.
//!
//! Two execution shapes share the same admission and spawn path:
//! buffered (`execute`, accumulate output, return one result) and
//! streaming (`execute_stream`, forward output chunks as they arrive).
//! Admission reserves a slot under the jobs mutex before spawning, so
//! the concurrency cap holds even under racing dispatches.

use loopsy_core::{Clock, ExecuteParams, ExecuteResult, JobId, JobInfo, JobStreamEvent, NodeId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::policy::JobPolicy;
use crate::{signal, ExecError};

/// Grace period between TERM and KILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Per-stream capture cap for buffered execution (8 MiB).
const MAX_CAPTURE_BYTES: usize = 8 * 1024 * 1024;

/// Chunk size for streaming reads.
const STREAM_CHUNK: usize = 8192;

struct JobHandle {
    info: JobInfo,
    pid: Option<u32>,
    killed: Arc<AtomicBool>,
}

/// A streaming job: the id plus the event channel the supervisor feeds.
pub struct StreamingJob {
    pub job_id: JobId,
    pub events: mpsc::Receiver<JobStreamEvent>,
}

/// Bounded-concurrency supervisor for short-lived child processes.
pub struct JobManager<C: Clock> {
    jobs: Mutex<HashMap<JobId, JobHandle>>,
    policy: JobPolicy,
    clock: C,
}

impl<C: Clock> JobManager<C> {
    pub fn new(policy: JobPolicy, clock: C) -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(HashMap::new()),
            policy,
            clock,
        })
    }

    /// Number of currently-running jobs.
    pub fn active_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Summaries of currently-running jobs.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.jobs.lock().values().map(|h| h.info.clone()).collect()
    }

    /// Run a command to completion, accumulating output.
    pub async fn execute(
        &self,
        params: ExecuteParams,
        from_node_id: NodeId,
    ) -> Result<ExecuteResult, ExecError> {
        let (job_id, killed) = self.admit(&params, from_node_id)?;
        let result = self.run_buffered(&job_id, params, killed).await;
        self.jobs.lock().remove(&job_id);
        result
    }

    /// Run a command, forwarding stdout/stderr/exit as stream events.
    ///
    /// Dropping the receiver terminates the child: the supervisor TERMs
    /// it on the first failed send.
    pub fn execute_stream(
        self: &Arc<Self>,
        params: ExecuteParams,
        from_node_id: NodeId,
    ) -> Result<StreamingJob, ExecError> {
        let (job_id, killed) = self.admit(&params, from_node_id)?;
        let (tx, rx) = mpsc::channel(256);

        let manager = Arc::clone(self);
        let id = job_id.clone();
        tokio::spawn(async move {
            manager.run_streaming(&id, params, killed, tx).await;
            manager.jobs.lock().remove(&id);
        });

        Ok(StreamingJob { job_id, events: rx })
    }

    /// Cancel a job: TERM now, KILL after the grace period if it is
    /// still running.
    pub fn cancel(self: &Arc<Self>, job_id: &JobId) -> Result<(), ExecError> {
        let pid = {
            let jobs = self.jobs.lock();
            let handle = jobs
                .get(job_id)
                .ok_or_else(|| ExecError::JobNotFound(job_id.to_string()))?;
            handle.killed.store(true, Ordering::SeqCst);
            handle.pid
        };

        if let Some(pid) = pid {
            signal::send_term(pid);
        }

        let manager = Arc::clone(self);
        let job_id = job_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(KILL_GRACE).await;
            let survivor = manager.jobs.lock().get(&job_id).and_then(|h| h.pid);
            if let Some(pid) = survivor {
                tracing::warn!(job_id = %job_id, pid, "job ignored TERM, sending KILL");
                signal::send_kill(pid);
            }
        });

        Ok(())
    }

    /// KILL every running child. Used at shutdown.
    pub fn kill_all(&self) {
        let jobs = self.jobs.lock();
        for handle in jobs.values() {
            handle.killed.store(true, Ordering::SeqCst);
            if let Some(pid) = handle.pid {
                signal::send_kill(pid);
            }
        }
    }

    /// Check policy and reserve a slot. One atomic step under the lock.
    fn admit(
        &self,
        params: &ExecuteParams,
        from_node_id: NodeId,
    ) -> Result<(JobId, Arc<AtomicBool>), ExecError> {
        self.policy.check(&params.command)?;

        let job_id = JobId::new(uuid::Uuid::new_v4().to_string());
        let killed = Arc::new(AtomicBool::new(false));
        let info = JobInfo {
            job_id: job_id.clone(),
            command: params.command.clone(),
            args: params.args.clone(),
            started_at: self.clock.now_ms(),
            from_node_id,
            pid: None,
        };

        let mut jobs = self.jobs.lock();
        if jobs.len() >= self.policy.max_concurrent {
            return Err(ExecError::MaxConcurrent {
                limit: self.policy.max_concurrent,
            });
        }
        jobs.insert(
            job_id.clone(),
            JobHandle {
                info,
                pid: None,
                killed: killed.clone(),
            },
        );

        Ok((job_id, killed))
    }

    fn spawn_child(&self, job_id: &JobId, params: &ExecuteParams) -> Result<Child, ExecError> {
        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &params.cwd {
            cmd.current_dir(cwd);
        }

        let child = cmd
            .spawn()
            .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

        let pid = child.id();
        {
            let mut jobs = self.jobs.lock();
            if let Some(handle) = jobs.get_mut(job_id) {
                handle.pid = pid;
                handle.info.pid = pid;
            }
        }
        tracing::debug!(job_id = %job_id, command = %params.command, pid, "job spawned");

        Ok(child)
    }

    async fn run_buffered(
        &self,
        job_id: &JobId,
        params: ExecuteParams,
        killed: Arc<AtomicBool>,
    ) -> Result<ExecuteResult, ExecError> {
        let timeout_ms = params.timeout.unwrap_or(self.policy.default_timeout_ms);
        let started = Instant::now();

        let mut child = self.spawn_child(job_id, &params)?;
        let pid = child.id();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(read_capped(stdout));
        let stderr_task = tokio::spawn(read_capped(stderr));

        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| ExecError::SpawnFailed(e.to_string()))?
            }
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                tracing::warn!(job_id = %job_id, timeout_ms, "job timed out, terminating");
                killed.store(true, Ordering::SeqCst);
                terminate(&mut child, pid).await
                    .map_err(|e| ExecError::SpawnFailed(e.to_string()))?
            }
        };

        let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
        let (stderr, stderr_truncated) = stderr_task.await.unwrap_or_default();

        let signaled = exit_signaled(&status);
        Ok(ExecuteResult {
            job_id: job_id.clone(),
            exit_code: status.code(),
            stdout,
            stderr,
            duration: started.elapsed().as_millis() as u64,
            killed: killed.load(Ordering::SeqCst) || signaled,
            truncated: stdout_truncated || stderr_truncated,
        })
    }

    async fn run_streaming(
        &self,
        job_id: &JobId,
        params: ExecuteParams,
        killed: Arc<AtomicBool>,
        tx: mpsc::Sender<JobStreamEvent>,
    ) {
        let timeout_ms = params.timeout.unwrap_or(self.policy.default_timeout_ms);

        let mut child = match self.spawn_child(job_id, &params) {
            Ok(child) => child,
            Err(e) => {
                let _ = tx
                    .send(JobStreamEvent::Error {
                        job_id: job_id.clone(),
                        data: e.to_string(),
                        timestamp: self.clock.now_ms(),
                    })
                    .await;
                return;
            }
        };
        let pid = child.id();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let out_pump = pump_stream(stdout, tx.clone(), job_id.clone(), self.clock.clone(), false);
        let err_pump = pump_stream(stderr, tx.clone(), job_id.clone(), self.clock.clone(), true);

        let status = tokio::select! {
            (out_ok, err_ok) = async { tokio::join!(out_pump, err_pump) } => {
                // Client went away: terminate instead of draining to nowhere
                if !out_ok || !err_ok {
                    tracing::debug!(job_id = %job_id, "stream client disconnected, terminating job");
                    killed.store(true, Ordering::SeqCst);
                    let _ = terminate(&mut child, pid).await;
                    return;
                }
                // Streams are closed; the wait itself stays bounded by
                // the job timeout in case the child lingers
                let bounded = tokio::time::timeout(
                    Duration::from_millis(timeout_ms),
                    child.wait(),
                );
                match bounded.await {
                    Ok(Ok(status)) => status,
                    Ok(Err(e)) => {
                        let _ = tx.send(JobStreamEvent::Error {
                            job_id: job_id.clone(),
                            data: e.to_string(),
                            timestamp: self.clock.now_ms(),
                        }).await;
                        return;
                    }
                    Err(_elapsed) => {
                        killed.store(true, Ordering::SeqCst);
                        match terminate(&mut child, pid).await {
                            Ok(status) => status,
                            Err(_) => return,
                        }
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                killed.store(true, Ordering::SeqCst);
                match terminate(&mut child, pid).await {
                    Ok(status) => status,
                    Err(_) => return,
                }
            }
        };

        let signaled = exit_signaled(&status);
        let _ = tx
            .send(JobStreamEvent::Exit {
                job_id: job_id.clone(),
                exit_code: status.code(),
                killed: killed.load(Ordering::SeqCst) || signaled,
                timestamp: self.clock.now_ms(),
            })
            .await;
    }
}

/// TERM, wait out the grace period, then KILL.
async fn terminate(child: &mut Child, pid: Option<u32>) -> std::io::Result<std::process::ExitStatus> {
    if let Some(pid) = pid {
        signal::send_term(pid);
    }
    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(status) => status,
        Err(_elapsed) => {
            child.start_kill()?;
            child.wait().await
        }
    }
}

/// True when the child died to a signal.
fn exit_signaled(status: &std::process::ExitStatus) -> bool {
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

/// Accumulate a stream up to the capture cap, draining the rest so the
/// child never blocks on a full pipe. Returns (text, truncated).
async fn read_capped<R>(reader: Option<R>) -> (String, bool)
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    let Some(mut reader) = reader else {
        return (String::new(), false);
    };

    let mut buf = Vec::new();
    let mut chunk = vec![0u8; STREAM_CHUNK];
    let mut truncated = false;
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_CAPTURE_BYTES.saturating_sub(buf.len());
                let take = n.min(room);
                buf.extend_from_slice(&chunk[..take]);
                if take < n {
                    truncated = true;
                }
            }
        }
    }
    (String::from_utf8_lossy(&buf).into_owned(), truncated)
}

/// Forward a stream as events. Returns false when the receiver is gone.
async fn pump_stream<R, C>(
    reader: Option<R>,
    tx: mpsc::Sender<JobStreamEvent>,
    job_id: JobId,
    clock: C,
    is_stderr: bool,
) -> bool
where
    R: tokio::io::AsyncRead + Unpin + Send,
    C: Clock,
{
    let Some(mut reader) = reader else {
        return true;
    };

    let mut chunk = vec![0u8; STREAM_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return true,
            Ok(n) => {
                let data = String::from_utf8_lossy(&chunk[..n]).into_owned();
                let timestamp = clock.now_ms();
                let event = if is_stderr {
                    JobStreamEvent::Stderr {
                        job_id: job_id.clone(),
                        data,
                        timestamp,
                    }
                } else {
                    JobStreamEvent::Stdout {
                        job_id: job_id.clone(),
                        data,
                        timestamp,
                    }
                };
                if tx.send(event).await.is_err() {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
