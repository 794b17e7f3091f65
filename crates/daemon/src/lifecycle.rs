// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, background loops.

use loopsy_agents::{AiTaskManager, ManagerConfig, NativeLauncher};
use loopsy_config::{Config, DataDir};
use loopsy_core::{NodeIdentity, SystemClock};
use loopsy_exec::{JobManager, JobPolicy};
use loopsy_mesh::pairing::LocalPairingIdentity;
use loopsy_mesh::{Discovery, HealthChecker, PairingManager};
use loopsy_storage::{AuditWriter, ContextStore, PeerRegistry};
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;

use fs2::FileExt;

use crate::state::AppState;
use crate::tls::{self, TlsMaterial};

/// Context expiry sweep interval.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Daemon state used by handlers in production.
pub type DaemonState = AppState<NativeLauncher>;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] loopsy_config::ConfigError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] loopsy_storage::SnapshotError),

    #[error("TLS error: {0}")]
    Tls(#[from] tls::TlsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Startup knobs beyond the config file.
#[derive(Debug, Clone)]
pub struct StartupOptions {
    pub data_dir: DataDir,
    /// Sibling sessions disable mDNS to avoid advertising twice.
    pub disable_mdns: bool,
}

/// A started daemon: bound listener plus everything shutdown must
/// tear down in order.
pub struct Daemon {
    pub state: Arc<DaemonState>,
    listener: Option<std::net::TcpListener>,
    pub port: u16,
    pub tls: Option<TlsMaterial>,
    // NOTE(lifetime): held to maintain the exclusive pid-file lock
    #[allow(dead_code)]
    lock_file: File,
    health_shutdown: Option<oneshot::Sender<()>>,
    sweep_shutdown: Option<oneshot::Sender<()>>,
    discovery: Option<Discovery>,
}

/// Start the daemon: lock, load state, bind, wire subsystems, spawn
/// background loops.
pub async fn startup(options: StartupOptions, config: Config) -> Result<Daemon, LifecycleError> {
    let data_dir = options.data_dir;
    data_dir.ensure_layout()?;

    // Exclusive lock first - prevents two daemons on one data dir.
    // Opened without truncation so a failed lock leaves the running
    // daemon's pid file intact.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(data_dir.pid_file())?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    // Bind before anything irreversible; port 0 means ephemeral
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = std::net::TcpListener::bind(&bind_addr)
        .map_err(|e| LifecycleError::BindFailed(bind_addr.clone(), e))?;
    listener.set_nonblocking(true)?;
    let port = listener.local_addr()?.port();

    // Pid file carries "<pid>\n<port>" for sibling discovery
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    writeln!(lock_file, "{port}")?;
    let lock_file = lock_file;

    let hostname = config
        .server
        .hostname
        .clone()
        .or_else(|| hostname::get().ok().map(|h| h.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "loopsy".to_string());
    let identity = NodeIdentity::generate(hostname.clone(), port);
    tracing::info!(node_id = %identity.node_id, port, "node identity generated");

    // TLS material is fatal when enabled and unobtainable
    let tls_material = if config.tls.enabled {
        Some(tls::ensure_material(&data_dir, &hostname)?)
    } else {
        None
    };

    // Persisted stores
    let registry = PeerRegistry::new(data_dir.peers_file(), SystemClock);
    let loaded = registry.load()?;
    tracing::info!(peers = loaded, "peer snapshot loaded");

    let context = ContextStore::new(data_dir.context_file(), SystemClock);
    let loaded = context.load()?;
    tracing::info!(entries = loaded, "context snapshot loaded");

    // Managers
    let jobs = JobManager::new(
        JobPolicy {
            denylist: config.execution.denylist.clone(),
            allowlist: config.execution.allowlist.clone(),
            max_concurrent: config.execution.max_concurrent,
            default_timeout_ms: config.execution.default_timeout,
        },
        SystemClock,
    );

    let tasks = AiTaskManager::new(
        NativeLauncher,
        SystemClock,
        ManagerConfig::new(
            port,
            config.auth.api_key.clone(),
            data_dir.workspaces_dir(),
            hook_path(),
        ),
    );

    let pairing = PairingManager::new(
        LocalPairingIdentity {
            hostname: hostname.clone(),
            api_key: config.auth.api_key.clone(),
            cert_fingerprint: tls_material.as_ref().map(|t| t.fingerprint.clone()),
        },
        SystemClock,
    );

    let audit = AuditWriter::new(data_dir.audit_log());

    // Manual peers from config join the registry up front
    for manual in &config.discovery.manual_peers {
        let peer = loopsy_core::Peer::manual(
            manual.address.clone(),
            manual.port,
            manual.hostname.clone(),
            loopsy_core::Clock::now_ms(&SystemClock),
        );
        let mut update = loopsy_storage::PeerUpsert::new(peer.node_id.clone());
        update.hostname = Some(peer.hostname);
        update.address = Some(peer.address);
        update.port = Some(peer.port);
        update.manually_added = Some(true);
        registry.upsert(update);
    }

    let discovery_enabled = config.discovery.enabled && !options.disable_mdns;

    let state = Arc::new(AppState {
        identity: identity.clone(),
        data_dir,
        config: Mutex::new(config),
        registry: Arc::clone(&registry),
        context: Arc::clone(&context),
        jobs,
        tasks,
        pairing,
        audit,
        client: reqwest::Client::new(),
        key_cache: Mutex::new(Default::default()),
        started: Instant::now(),
    });

    // Background loops
    let health_shutdown = HealthChecker::new(Arc::clone(&registry)).spawn();
    let sweep_shutdown = spawn_context_sweeper(Arc::clone(&context));

    let discovery = if discovery_enabled {
        match Discovery::start(&identity, Arc::clone(&registry)) {
            Ok(discovery) => Some(discovery),
            Err(e) => {
                // mDNS is best-effort; manual peers still work
                tracing::warn!(error = %e, "mDNS discovery unavailable");
                None
            }
        }
    } else {
        tracing::info!("mDNS discovery disabled");
        None
    };

    tracing::info!(port, "daemon started");
    Ok(Daemon {
        state,
        listener: Some(listener),
        port,
        tls: tls_material,
        lock_file,
        health_shutdown: Some(health_shutdown),
        sweep_shutdown: Some(sweep_shutdown),
        discovery,
    })
}

impl Daemon {
    /// Take the bound listener for the serve loop. Panic-free: returns
    /// an error when called twice.
    pub fn take_listener(&mut self) -> Result<std::net::TcpListener, LifecycleError> {
        self.listener.take().ok_or_else(|| {
            LifecycleError::Io(std::io::Error::other("listener already taken"))
        })
    }

    /// Ordered teardown: health checker, mDNS, jobs, AI tasks, expiry
    /// sweeper, context snapshot, registry snapshot. The HTTP listener
    /// closes when the serve loop observes shutdown, after this runs.
    pub fn shutdown(&mut self) {
        tracing::info!("shutting down daemon");

        if let Some(tx) = self.health_shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(discovery) = self.discovery.take() {
            discovery.shutdown();
        }
        self.state.jobs.kill_all();
        self.state.tasks.cancel_all();
        if let Some(tx) = self.sweep_shutdown.take() {
            let _ = tx.send(());
        }

        if let Err(e) = self.state.context.save() {
            tracing::warn!(error = %e, "context snapshot save failed at shutdown");
        }
        if let Err(e) = self.state.registry.save() {
            tracing::warn!(error = %e, "peer snapshot save failed at shutdown");
        }

        if let Err(e) = std::fs::remove_file(self.state.data_dir.pid_file()) {
            tracing::debug!(error = %e, "pid file removal failed");
        }

        tracing::info!("daemon shutdown complete");
    }
}

/// Periodic context-expiry sweep. Errors cannot occur; a tick only
/// drops entries whose expiry passed.
fn spawn_context_sweeper(context: Arc<ContextStore<SystemClock>>) -> oneshot::Sender<()> {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    let swept = context.sweep_expired();
                    if swept > 0 {
                        tracing::debug!(swept, "expired context entries removed");
                    }
                }
            }
        }
    });
    shutdown_tx
}

/// The permission hook ships next to the daemon binary.
fn hook_path() -> std::path::PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("loopsy-hook")))
        .unwrap_or_else(|| std::path::PathBuf::from("loopsy-hook"))
}
