// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn test_layout() {
    let dd = DataDir::new("/data");
    assert_eq!(dd.config_file(), Path::new("/data/config.yaml"));
    assert_eq!(dd.peers_file(), Path::new("/data/peers.json"));
    assert_eq!(dd.context_file(), Path::new("/data/context.json"));
    assert_eq!(dd.pid_file(), Path::new("/data/daemon.pid"));
    assert_eq!(dd.audit_log(), Path::new("/data/logs/audit.jsonl"));
    assert_eq!(dd.tls_cert(), Path::new("/data/tls/cert.pem"));
    assert_eq!(dd.session("s1").root(), Path::new("/data/sessions/s1"));
}

#[test]
fn test_ensure_layout_creates_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let dd = DataDir::new(dir.path().join("node-a"));
    dd.ensure_layout().unwrap();
    assert!(dd.logs_dir().is_dir());
    assert!(dd.workspaces_dir().is_dir());
}
