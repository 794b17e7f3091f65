// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn test_material_generated_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = DataDir::new(dir.path());

    let material = ensure_material(&data_dir, "testhost").unwrap();
    assert!(material.cert_path.exists());
    assert!(material.key_path.exists());
    assert_eq!(material.fingerprint.len(), 64);
    assert!(material.fingerprint.chars().all(|c| c.is_ascii_hexdigit()));

    let cert = std::fs::read_to_string(&material.cert_path).unwrap();
    assert!(cert.contains("BEGIN CERTIFICATE"));
    let key = std::fs::read_to_string(&material.key_path).unwrap();
    assert!(key.contains("PRIVATE KEY"));
}

#[test]
fn test_existing_material_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = DataDir::new(dir.path());

    let first = ensure_material(&data_dir, "testhost").unwrap();
    let second = ensure_material(&data_dir, "testhost").unwrap();
    // Same files, same fingerprint: no regeneration
    assert_eq!(first.fingerprint, second.fingerprint);
}

#[test]
fn test_garbage_cert_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = DataDir::new(dir.path());
    std::fs::create_dir_all(data_dir.tls_dir()).unwrap();
    std::fs::write(data_dir.tls_cert(), "not a pem").unwrap();
    std::fs::write(data_dir.tls_key(), "not a key").unwrap();

    let err = ensure_material(&data_dir, "testhost").unwrap_err();
    assert!(matches!(err, TlsError::BadCertificate(_)));
}
