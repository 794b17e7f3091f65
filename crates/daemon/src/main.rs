// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopsy Daemon (loopsyd)
//!
//! Per-node mesh engine: peer registry, health checks, mDNS discovery,
//! command execution, context store, AI task supervision, pairing, and
//! the HTTP API that exposes all of it.
//!
//! Architecture:
//! - HTTP handlers: request/response work against shared state
//! - Background tasks: health ticks, context expiry sweeps, mDNS,
//!   per-child output pumps

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::net::SocketAddr;
use std::sync::Arc;

use loopsy_config::DataDir;
use loopsy_daemon::lifecycle::{self, LifecycleError, StartupOptions};
use loopsy_daemon::{http, tls};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Rotate the daemon log when it crosses this size at startup.
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("loopsyd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("loopsyd {}", env!("CARGO_PKG_VERSION"));
                println!("Loopsy daemon - LAN mesh for execution, context and AI tasks");
                println!();
                println!("USAGE:");
                println!("    loopsyd");
                println!();
                println!("Configuration lives at <dataDir>/config.yaml; the data dir");
                println!("defaults to ~/.loopsy and is overridden by LOOPSY_DATA_DIR.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -V, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: loopsyd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let data_dir = DataDir::default_root();
    data_dir.ensure_layout()?;
    let config = loopsy_config::load_or_init(&data_dir)?;

    rotate_log_if_needed(&data_dir, &config);
    let _log_guard = setup_logging(&data_dir, &config)?;

    info!("starting loopsyd");

    let options = StartupOptions {
        data_dir: data_dir.clone(),
        disable_mdns: std::env::var("LOOPSY_DISABLE_MDNS").is_ok(),
    };

    let mut daemon = match lifecycle::startup(options, config).await {
        Ok(daemon) => daemon,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(data_dir.pid_file())
                .ok()
                .and_then(|raw| raw.lines().next().map(str::to_string))
                .unwrap_or_default();
            eprintln!("loopsyd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start daemon: {e}");
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let state = Arc::clone(&daemon.state);
    let router = http::router(state);
    let port = daemon.port;
    let std_listener = daemon.take_listener()?;
    let tls_material = daemon.tls.clone();

    // Signal ready for supervisors and tests
    println!("READY {port}");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown_signal = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received"),
            _ = sigint.recv() => info!("SIGINT received"),
        }
        // Ordered teardown happens before the listener closes
        daemon.shutdown();
    };

    match tls_material {
        Some(material) => {
            let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &material.cert_path,
                &material.key_path,
            )
            .await
            .map_err(|e| tls::TlsError::Io(e))?;

            let handle = axum_server::Handle::new();
            let watcher = handle.clone();
            tokio::spawn(async move {
                shutdown_signal.await;
                watcher.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
            });

            info!(port, "serving HTTPS");
            axum_server::from_tcp_rustls(std_listener, rustls)
                .handle(handle)
                .serve(router.into_make_service_with_connect_info::<SocketAddr>())
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::from_std(std_listener)?;
            info!(port, "serving HTTP");
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_signal)
            .await?;
        }
    }

    info!("loopsyd exited cleanly");
    Ok(())
}

/// Roll an oversized log aside at startup (single `.old` generation).
fn rotate_log_if_needed(data_dir: &DataDir, config: &loopsy_config::Config) {
    let path = config
        .logging
        .file
        .clone()
        .unwrap_or_else(|| data_dir.daemon_log());
    let Ok(metadata) = std::fs::metadata(&path) else {
        return;
    };
    if metadata.len() > MAX_LOG_BYTES {
        let old = path.with_extension("log.old");
        if let Err(e) = std::fs::rename(&path, &old) {
            eprintln!("warning: log rotation failed: {e}");
        }
    }
}

/// Logging goes to the configured file (non-blocking appender) or to
/// stderr when no file is configured.
fn setup_logging(
    data_dir: &DataDir,
    config: &loopsy_config::Config,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    match &config.logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .map(std::path::Path::to_path_buf)
                .unwrap_or_else(|| data_dir.logs_dir());
            std::fs::create_dir_all(&dir)?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "daemon.log".to_string());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}
