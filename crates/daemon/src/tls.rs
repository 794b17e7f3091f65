// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Self-signed TLS material.
//!
//! When `tls.enabled` is set and no cert/key exist, a self-signed
//! certificate is generated in-process (no openssl shell-out) into
//! `<dataDir>/tls/`. The SHA-256 fingerprint of the DER certificate is
//! what pairing offers to peers for pinning.

use loopsy_config::DataDir;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

/// TLS setup errors. All fatal: a daemon asked to serve TLS without
/// usable material must not start.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("certificate generation failed: {0}")]
    Generation(String),

    #[error("unreadable certificate at {0}")]
    BadCertificate(PathBuf),
}

/// On-disk TLS material, ready to serve.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// SHA-256 of the DER certificate, lowercase hex.
    pub fingerprint: String,
}

/// Ensure cert and key exist, generating a self-signed pair when
/// either is missing.
pub fn ensure_material(data_dir: &DataDir, hostname: &str) -> Result<TlsMaterial, TlsError> {
    let cert_path = data_dir.tls_cert();
    let key_path = data_dir.tls_key();

    if !cert_path.exists() || !key_path.exists() {
        let certified = rcgen::generate_simple_self_signed(vec![hostname.to_string()])
            .map_err(|e| TlsError::Generation(e.to_string()))?;

        std::fs::create_dir_all(data_dir.tls_dir())?;
        std::fs::write(&cert_path, certified.cert.pem())?;
        std::fs::write(&key_path, certified.key_pair.serialize_pem())?;
        tracing::info!(
            cert = %cert_path.display(),
            "generated self-signed certificate"
        );
    }

    let pem = std::fs::read_to_string(&cert_path)?;
    let der = pem_to_der(&pem).ok_or_else(|| TlsError::BadCertificate(cert_path.clone()))?;
    let fingerprint = hex::encode(Sha256::digest(&der));
    tracing::info!(fingerprint = %fingerprint, "TLS certificate fingerprint");

    Ok(TlsMaterial {
        cert_path,
        key_path,
        fingerprint,
    })
}

/// Decode the first certificate block of a PEM file.
fn pem_to_der(pem: &str) -> Option<Vec<u8>> {
    use base64::Engine;

    let mut in_block = false;
    let mut collected = String::new();
    for line in pem.lines() {
        let line = line.trim();
        if line == "-----BEGIN CERTIFICATE-----" {
            in_block = true;
        } else if line == "-----END CERTIFICATE-----" {
            break;
        } else if in_block {
            collected.push_str(line);
        }
    }
    if collected.is_empty() {
        return None;
    }
    base64::engine::general_purpose::STANDARD.decode(collected).ok()
}

#[cfg(test)]
#[path = "tls_tests.rs"]
mod tests;
