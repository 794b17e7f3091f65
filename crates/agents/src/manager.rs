// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AI task manager: dispatch, lifecycle, permission tables.
//!
//! Tasks live in two tables. `active` holds running and
//! waiting-approval tasks together with their event bus and process
//! handle state; `recent` holds terminal tasks, with a frozen copy of
//! their event buffer, for five minutes. Permission responses live in
//! their own table keyed by (task, request) so the hook can poll them
//! after the pending entry is cleared.
//!
//! State machine:
//!
//! ```text
//!            dispatch                hook-register                approve
//!   ∅ ─────────────► running ──────────────────► waiting_approval ──────┐
//!                      │ ▲                                              │
//!                      │ └──────────────────────────────────────────────┘
//!                      │ exit(0) / exit(≠0) / signal / cancel / timeout
//!                      ▼
//!                  completed | failed | cancelled  (recent, 5 min)
//! ```

use loopsy_core::{
    AiTaskInfo, Clock, DispatchParams, NodeId, PendingApproval, PermissionMode, PermissionRequest,
    PermissionResponse, TaskEvent, TaskEventPayload, TaskId, TaskStatus,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::bus::{Subscription, TaskBus};
use crate::profile::{self, LaunchContext};
use crate::session::{self, ExitOutcome, ProcessLauncher, SpawnSpec};
use crate::workspace::{self, ScratchWorkspace};
use crate::AgentError;

/// Concurrency cap: running + waiting_approval tasks.
pub const MAX_ACTIVE_TASKS: usize = 3;

/// Default wall-clock ceiling on one task.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How long terminal tasks stay queryable.
const DEFAULT_RECENT_RETENTION: Duration = Duration::from_secs(300);

/// How long resolved permission responses stay pollable.
const DEFAULT_RESPONSE_RETENTION: Duration = Duration::from_secs(60);

/// Grace between TERM and KILL on cancel.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Manager wiring, mostly destined for hook callbacks.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub daemon_port: u16,
    pub api_key: String,
    pub workspaces_dir: PathBuf,
    /// Path of the bundled `loopsy-hook` binary.
    pub hook_path: PathBuf,
    pub task_timeout: Duration,
    pub recent_retention: Duration,
    pub response_retention: Duration,
}

impl ManagerConfig {
    pub fn new(daemon_port: u16, api_key: String, workspaces_dir: PathBuf, hook_path: PathBuf) -> Self {
        Self {
            daemon_port,
            api_key,
            workspaces_dir,
            hook_path,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            recent_retention: DEFAULT_RECENT_RETENTION,
            response_retention: DEFAULT_RESPONSE_RETENTION,
        }
    }
}

struct ActiveTask {
    info: AiTaskInfo,
    bus: Arc<TaskBus>,
    pid: Option<u32>,
    killed: Arc<AtomicBool>,
    scratch: Option<ScratchWorkspace>,
}

struct RecentTask {
    info: AiTaskInfo,
    events: Vec<TaskEvent>,
}

/// Supervisor for AI agent subprocesses.
pub struct AiTaskManager<L: ProcessLauncher, C: Clock> {
    active: Mutex<HashMap<TaskId, ActiveTask>>,
    recent: Mutex<HashMap<TaskId, RecentTask>>,
    responses: Mutex<HashMap<TaskId, HashMap<String, PermissionResponse>>>,
    launcher: L,
    clock: C,
    config: ManagerConfig,
}

impl<L: ProcessLauncher, C: Clock> AiTaskManager<L, C> {
    pub fn new(launcher: L, clock: C, config: ManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            active: Mutex::new(HashMap::new()),
            recent: Mutex::new(HashMap::new()),
            responses: Mutex::new(HashMap::new()),
            launcher,
            clock,
            config,
        })
    }

    /// Tasks counting against the concurrency cap.
    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .values()
            .filter(|t| t.info.status.is_active())
            .count()
    }

    /// Start a task. Rejects past the cap, resolves the agent, prepares
    /// the scratch workspace when the run is subject to approval, and
    /// spawns the subprocess plus its supervision and timeout tasks.
    pub async fn dispatch(
        self: &Arc<Self>,
        params: DispatchParams,
        from_node_id: NodeId,
    ) -> Result<AiTaskInfo, AgentError> {
        let agent = self.launcher.resolve(params.agent)?;

        let task_id = TaskId::new(uuid::Uuid::new_v4().to_string());
        let now = self.clock.now_ms();
        let info = AiTaskInfo {
            task_id: task_id.clone(),
            prompt: params.prompt.clone(),
            status: TaskStatus::Running,
            agent,
            started_at: now,
            updated_at: now,
            completed_at: None,
            from_node_id,
            pid: None,
            exit_code: None,
            error: None,
            model: params.model.clone(),
            pending_approval: None,
            session_id: None,
        };

        // Admission and slot reservation are one atomic step
        {
            let mut active = self.active.lock();
            let live = active.values().filter(|t| t.info.status.is_active()).count();
            if live >= MAX_ACTIVE_TASKS {
                return Err(AgentError::MaxConcurrent {
                    limit: MAX_ACTIVE_TASKS,
                });
            }
            active.insert(
                task_id.clone(),
                ActiveTask {
                    info: info.clone(),
                    bus: Arc::new(TaskBus::new()),
                    pid: None,
                    killed: Arc::new(AtomicBool::new(false)),
                    scratch: None,
                },
            );
        }

        match self.launch_task(&task_id, agent, &params).await {
            Ok(info) => Ok(info),
            Err(e) => {
                self.active.lock().remove(&task_id);
                Err(e)
            }
        }
    }

    async fn launch_task(
        self: &Arc<Self>,
        task_id: &TaskId,
        agent: loopsy_core::AgentKind,
        params: &DispatchParams,
    ) -> Result<AiTaskInfo, AgentError> {
        let real_cwd = params
            .cwd
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));

        // Hooked claude runs start in a scratch dir that registers the
        // permission hook; everything else starts in the real cwd.
        let hooked = agent == loopsy_core::AgentKind::Claude
            && params.permission_mode.unwrap_or_default() != PermissionMode::BypassPermissions;
        let scratch = if hooked {
            let hook_command = format!(
                "{} {} {} {}",
                self.config.hook_path.display(),
                task_id,
                self.config.daemon_port,
                self.config.api_key,
            );
            let workspace = workspace::prepare_scratch(
                &self.config.workspaces_dir,
                task_id,
                &hook_command,
                &real_cwd,
            )
            .await
            .map_err(|e| AgentError::Workspace(e.to_string()))?;
            Some(workspace)
        } else {
            None
        };

        let ctx = LaunchContext {
            task_id: task_id.clone(),
            daemon_port: self.config.daemon_port,
            api_key: self.config.api_key.clone(),
            start_dir: scratch
                .as_ref()
                .map(|w| w.dir.clone())
                .unwrap_or_else(|| real_cwd.clone()),
            real_cwd,
        };

        let spec = SpawnSpec {
            program: agent.binary().to_string(),
            args: profile::build_args(agent, params, &ctx),
            cwd: ctx.start_dir.clone(),
            env: profile::build_env(agent, &ctx),
            use_pty: profile::needs_pty(agent),
        };

        let handle = match self.launcher.launch(spec).await {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(workspace) = &scratch {
                    workspace::remove_scratch(workspace).await;
                }
                return Err(AgentError::SpawnFailed(e.to_string()));
            }
        };

        let info = {
            let mut active = self.active.lock();
            let Some(task) = active.get_mut(task_id) else {
                return Err(AgentError::NotFound(task_id.to_string()));
            };
            task.pid = handle.pid;
            task.info.pid = handle.pid;
            task.scratch = scratch;
            task.info.clone()
        };

        tracing::info!(
            task_id = %task_id,
            agent = %agent,
            pid = info.pid,
            "ai task dispatched"
        );
        self.emit(task_id, TaskEventPayload::Status {
            status: TaskStatus::Running,
        });

        // Supervision: pump output through the line parser, then finalize
        let manager = Arc::clone(self);
        let id = task_id.clone();
        tokio::spawn(async move {
            manager.supervise(id, agent, handle).await;
        });

        // Timeout: cancel and record the error if still active at the
        // ceiling
        let manager = Arc::clone(self);
        let id = task_id.clone();
        let timeout = self.config.task_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            manager.handle_timeout(&id, timeout);
        });

        Ok(info)
    }

    async fn supervise(self: &Arc<Self>, task_id: TaskId, agent: loopsy_core::AgentKind, mut handle: session::SessionHandle) {
        let mut assembler = if profile::needs_pty(agent) {
            crate::line::LineAssembler::stripping_ansi()
        } else {
            crate::line::LineAssembler::new()
        };

        while let Some(chunk) = handle.output.recv().await {
            for line in assembler.push(&chunk) {
                self.handle_line(&task_id, agent, &line);
            }
        }
        // Flush the final partial line
        if let Some(line) = assembler.flush() {
            self.handle_line(&task_id, agent, &line);
        }

        let outcome = handle.exit.await.unwrap_or(ExitOutcome {
            exit_code: None,
            signaled: false,
            stderr_tail: String::new(),
        });
        self.finalize(&task_id, outcome).await;
    }

    fn handle_line(&self, task_id: &TaskId, agent: loopsy_core::AgentKind, line: &str) {
        for payload in profile::parse_line(agent, line) {
            // The result record carries the agent-side session id
            if let TaskEventPayload::Result {
                session_id: Some(session_id),
                ..
            } = &payload
            {
                let mut active = self.active.lock();
                if let Some(task) = active.get_mut(task_id) {
                    task.info.session_id = Some(session_id.clone());
                }
            }
            self.emit(task_id, payload);
        }
    }

    async fn finalize(self: &Arc<Self>, task_id: &TaskId, outcome: ExitOutcome) {
        let Some(mut task) = self.active.lock().remove(task_id) else {
            return;
        };

        let now = self.clock.now_ms();
        let was_cancelled = task.killed.load(Ordering::SeqCst)
            || outcome.signaled
            || task.info.status == TaskStatus::Cancelled;
        let status = if was_cancelled {
            TaskStatus::Cancelled
        } else if outcome.exit_code == Some(0) {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };

        task.info.status = status;
        task.info.exit_code = outcome.exit_code;
        task.info.updated_at = now;
        task.info.completed_at = Some(now);
        task.info.pending_approval = None;
        if status == TaskStatus::Failed {
            let message = if outcome.stderr_tail.trim().is_empty() {
                match outcome.exit_code {
                    Some(code) => format!("agent exited with code {code}"),
                    None => "agent exited abnormally".to_string(),
                }
            } else {
                outcome.stderr_tail.trim().to_string()
            };
            task.info.error = Some(message.clone());
            task.bus
                .emit(TaskEventPayload::Error { message }, self.clock.now_ms());
        }

        task.bus
            .emit(TaskEventPayload::Status { status }, self.clock.now_ms());
        task.bus.emit(
            TaskEventPayload::Exit {
                exit_code: outcome.exit_code,
                signal: outcome.signaled || was_cancelled,
            },
            self.clock.now_ms(),
        );

        tracing::info!(
            task_id = %task_id,
            status = ?status,
            exit_code = outcome.exit_code,
            "ai task finished"
        );

        if let Some(workspace) = &task.scratch {
            workspace::remove_scratch(workspace).await;
        }

        self.recent.lock().insert(
            task_id.clone(),
            RecentTask {
                info: task.info,
                events: task.bus.snapshot(),
            },
        );

        // Evict from the recent table after the retention window
        let manager = Arc::clone(self);
        let id = task_id.clone();
        let retention = self.config.recent_retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            manager.recent.lock().remove(&id);
            manager.responses.lock().remove(&id);
        });
    }

    fn handle_timeout(self: &Arc<Self>, task_id: &TaskId, timeout: Duration) {
        let still_active = {
            let active = self.active.lock();
            active
                .get(task_id)
                .map(|t| t.info.status.is_active())
                .unwrap_or(false)
        };
        if !still_active {
            return;
        }

        tracing::warn!(task_id = %task_id, timeout_secs = timeout.as_secs(), "ai task timed out");
        self.emit(
            task_id,
            TaskEventPayload::Error {
                message: format!("task timed out after {}s", timeout.as_secs()),
            },
        );
        let _ = self.cancel(task_id);
    }

    /// Cancel a task: mark it cancelled, TERM the child, KILL after the
    /// grace period.
    pub fn cancel(self: &Arc<Self>, task_id: &TaskId) -> Result<(), AgentError> {
        let pid = {
            let mut active = self.active.lock();
            match active.get_mut(task_id) {
                Some(task) => {
                    task.killed.store(true, Ordering::SeqCst);
                    task.info.status = TaskStatus::Cancelled;
                    task.info.updated_at = self.clock.now_ms();
                    task.pid
                }
                None => {
                    return if self.recent.lock().contains_key(task_id) {
                        Err(AgentError::AlreadyCompleted(task_id.to_string()))
                    } else {
                        Err(AgentError::NotFound(task_id.to_string()))
                    };
                }
            }
        };

        self.emit(task_id, TaskEventPayload::Status {
            status: TaskStatus::Cancelled,
        });

        if let Some(pid) = pid {
            session::terminate(pid);
        }

        let manager = Arc::clone(self);
        let id = task_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(KILL_GRACE).await;
            let survivor = manager.active.lock().get(&id).and_then(|t| t.pid);
            if let Some(pid) = survivor {
                tracing::warn!(task_id = %id, pid, "task ignored TERM, sending KILL");
                session::kill(pid);
            }
        });

        Ok(())
    }

    /// KILL every child. Used at shutdown.
    pub fn cancel_all(&self) {
        let active = self.active.lock();
        for task in active.values() {
            task.killed.store(true, Ordering::SeqCst);
            if let Some(pid) = task.pid {
                session::kill(pid);
            }
        }
    }

    /// Register a hook permission request: the task
    /// moves to waiting_approval and subscribers learn about the prompt.
    pub fn register_permission(
        &self,
        task_id: &TaskId,
        request: PermissionRequest,
    ) -> Result<AiTaskInfo, AgentError> {
        let now = self.clock.now_ms();
        let info = {
            let mut active = self.active.lock();
            let task = match active.get_mut(task_id) {
                Some(task) if task.info.status.is_active() => task,
                Some(_) | None => {
                    return if self.recent.lock().contains_key(task_id) {
                        Err(AgentError::AlreadyCompleted(task_id.to_string()))
                    } else {
                        Err(AgentError::NotFound(task_id.to_string()))
                    };
                }
            };

            // A task blocks on one hook at a time; a newer request
            // supersedes a stale pending entry.
            task.info.pending_approval = Some(PendingApproval {
                request_id: request.request_id.clone(),
                tool_name: request.tool_name.clone(),
                tool_input: request.tool_input.clone(),
                description: request.description.clone(),
                timestamp: now,
            });
            task.info.status = TaskStatus::WaitingApproval;
            task.info.updated_at = now;
            task.info.clone()
        };

        self.emit(
            task_id,
            TaskEventPayload::PermissionRequest {
                request_id: request.request_id,
                tool_name: request.tool_name,
                tool_input: request.tool_input,
                description: request.description,
            },
        );
        self.emit(task_id, TaskEventPayload::Status {
            status: TaskStatus::WaitingApproval,
        });

        Ok(info)
    }

    /// Record a human decision: store the response for
    /// the polling hook, flip the task back to running.
    pub fn approve(
        self: &Arc<Self>,
        task_id: &TaskId,
        request_id: &str,
        approved: bool,
        message: Option<String>,
    ) -> Result<AiTaskInfo, AgentError> {
        let info = {
            let mut active = self.active.lock();
            let task = match active.get_mut(task_id) {
                Some(task) => task,
                None => {
                    return if self.recent.lock().contains_key(task_id) {
                        Err(AgentError::AlreadyCompleted(task_id.to_string()))
                    } else {
                        Err(AgentError::NotFound(task_id.to_string()))
                    };
                }
            };

            let pending_matches = task
                .info
                .pending_approval
                .as_ref()
                .is_some_and(|p| p.request_id == request_id);
            if !pending_matches {
                return Err(AgentError::NoPendingApproval(request_id.to_string()));
            }

            task.info.pending_approval = None;
            task.info.status = TaskStatus::Running;
            task.info.updated_at = self.clock.now_ms();
            task.info.clone()
        };

        self.responses.lock().entry(task_id.clone()).or_default().insert(
            request_id.to_string(),
            PermissionResponse {
                approved,
                message,
                resolved_at: self.clock.now_ms(),
            },
        );

        tracing::info!(task_id = %task_id, request_id, approved, "permission resolved");
        self.emit(task_id, TaskEventPayload::Status {
            status: TaskStatus::Running,
        });

        // Responses are only pollable for a bounded window
        let manager = Arc::clone(self);
        let id = task_id.clone();
        let request_id = request_id.to_string();
        let retention = self.config.response_retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            let mut responses = manager.responses.lock();
            if let Some(for_task) = responses.get_mut(&id) {
                for_task.remove(&request_id);
                if for_task.is_empty() {
                    responses.remove(&id);
                }
            }
        });

        Ok(info)
    }

    /// Look up a stored decision (the hook's poll).
    ///
    /// `Ok(None)` means unresolved-yet; unknown tasks are an error.
    pub fn permission_response(
        &self,
        task_id: &TaskId,
        request_id: &str,
    ) -> Result<Option<PermissionResponse>, AgentError> {
        if let Some(response) = self
            .responses
            .lock()
            .get(task_id)
            .and_then(|m| m.get(request_id))
        {
            return Ok(Some(response.clone()));
        }

        let known =
            self.active.lock().contains_key(task_id) || self.recent.lock().contains_key(task_id);
        if known {
            Ok(None)
        } else {
            Err(AgentError::NotFound(task_id.to_string()))
        }
    }

    /// Task info, active or recent.
    pub fn get(&self, task_id: &TaskId) -> Option<AiTaskInfo> {
        if let Some(task) = self.active.lock().get(task_id) {
            return Some(task.info.clone());
        }
        self.recent.lock().get(task_id).map(|t| t.info.clone())
    }

    /// All known tasks, newest first.
    pub fn list(&self) -> Vec<AiTaskInfo> {
        let mut tasks: Vec<AiTaskInfo> = self
            .active
            .lock()
            .values()
            .map(|t| t.info.clone())
            .chain(self.recent.lock().values().map(|t| t.info.clone()))
            .collect();
        tasks.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        tasks
    }

    /// Copy of a task's event buffer, active or recent.
    pub fn events(&self, task_id: &TaskId) -> Option<Vec<TaskEvent>> {
        if let Some(task) = self.active.lock().get(task_id) {
            return Some(task.bus.snapshot());
        }
        self.recent.lock().get(task_id).map(|t| t.events.clone())
    }

    /// Replay events newer than `since` and, for active tasks, attach a
    /// live subscriber. Recent tasks replay their frozen buffer only.
    pub fn subscribe(
        &self,
        task_id: &TaskId,
        since: u64,
    ) -> Option<(Vec<TaskEvent>, Option<Subscription>)> {
        if let Some(task) = self.active.lock().get(task_id) {
            let (replay, subscription) = task.bus.subscribe_since(since);
            return Some((replay, Some(subscription)));
        }
        self.recent.lock().get(task_id).map(|t| {
            let replay = t
                .events
                .iter()
                .filter(|e| e.timestamp > since)
                .cloned()
                .collect();
            (replay, None)
        })
    }

    fn emit(&self, task_id: &TaskId, payload: TaskEventPayload) {
        let bus = self.active.lock().get(task_id).map(|t| Arc::clone(&t.bus));
        if let Some(bus) = bus {
            bus.emit(payload, self.clock.now_ms());
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
