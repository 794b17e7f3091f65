// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared scaffolding for handler tests: an AppState wired to fakes,
//! served on an ephemeral port.

use loopsy_agents::{AiTaskManager, FakeLauncher, ManagerConfig};
use loopsy_config::{Config, DataDir};
use loopsy_core::{NodeIdentity, SystemClock};
use loopsy_exec::{JobManager, JobPolicy};
use loopsy_mesh::pairing::LocalPairingIdentity;
use loopsy_mesh::PairingManager;
use loopsy_storage::{AuditWriter, ContextStore, PeerRegistry};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::state::AppState;

pub const TEST_KEY: &str = "test-api-key";

/// Build an AppState over a temp directory and a scripted launcher.
pub fn test_state(root: &Path, launcher: FakeLauncher) -> Arc<AppState<FakeLauncher>> {
    let data_dir = DataDir::new(root);
    data_dir.ensure_layout().unwrap();

    let mut config = Config::default();
    config.auth.api_key = TEST_KEY.to_string();
    config.transfer.allowed_paths = vec![root.to_path_buf()];
    config.transfer.denied_paths = vec![root.join("secret")];

    let mut task_config = ManagerConfig::new(
        0,
        TEST_KEY.to_string(),
        data_dir.workspaces_dir(),
        root.join("loopsy-hook"),
    );
    task_config.recent_retention = Duration::from_secs(30);
    task_config.response_retention = Duration::from_secs(30);

    Arc::new(AppState {
        identity: NodeIdentity::generate("test-node".into(), 0),
        registry: PeerRegistry::new(data_dir.peers_file(), SystemClock),
        context: ContextStore::new(data_dir.context_file(), SystemClock),
        jobs: JobManager::new(
            JobPolicy {
                denylist: vec!["rm".into()],
                ..Default::default()
            },
            SystemClock,
        ),
        tasks: AiTaskManager::new(launcher, SystemClock, task_config),
        pairing: PairingManager::new(
            LocalPairingIdentity {
                hostname: "test-node".into(),
                api_key: TEST_KEY.to_string(),
                cert_fingerprint: None,
            },
            SystemClock,
        ),
        audit: AuditWriter::new(data_dir.audit_log()),
        client: reqwest::Client::new(),
        key_cache: Mutex::new(Default::default()),
        started: Instant::now(),
        config: Mutex::new(config),
        data_dir,
    })
}

/// Serve a state's router on 127.0.0.1, returning the bound address.
pub async fn serve(state: Arc<AppState<FakeLauncher>>) -> SocketAddr {
    let router = crate::http::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    addr
}

/// reqwest client with the test bearer pre-set.
pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}/api/v1{path}")
}
