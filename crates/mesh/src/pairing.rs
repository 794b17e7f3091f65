// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pairing state machine: out-of-band ECDH + SAS key exchange.
//!
//! One session at a time. The initiator daemon (A) starts a session and
//! reads a 6-digit invite code to its human; the responder (B) posts
//! its ephemeral public key with that code; both sides derive the same
//! short authentication string from the shared secret and the humans
//! compare it out of band before A confirms. Sessions expire after
//! five minutes; expiry is checked on every touch.
//!
//! ```text
//!   start ──► waiting ──initiate──► key_exchanged ──confirm(true)──► completed
//!                │                        │
//!                └──── 300 s / confirm(false) ────► (cleared)
//! ```

use loopsy_core::{Clock, ErrorCode};
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::rand_core::OsRng;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Session lifetime.
pub const PAIRING_TIMEOUT_MS: u64 = 300_000;

/// Pairing errors
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("a pairing session is already active")]
    SessionActive,

    #[error("no pairing session is active")]
    NoSession,

    #[error("invite code does not match")]
    InvalidCode,

    #[error("pairing session expired")]
    Expired,

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("pairing session is in the wrong state")]
    WrongState,
}

impl PairingError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SessionActive => ErrorCode::InvalidRequest,
            Self::NoSession | Self::Expired => ErrorCode::PeerHandshakeFailed,
            Self::InvalidCode | Self::InvalidKey(_) | Self::WrongState => {
                ErrorCode::PeerHandshakeFailed
            }
        }
    }

    /// HTTP status: 409 for the single-flight conflict, 410 for expiry.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::SessionActive => 409,
            Self::Expired => 410,
            Self::NoSession => 404,
            _ => 400,
        }
    }
}

/// Session state, as reported by `GET /pair/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingState {
    Waiting,
    KeyExchanged,
    Completed,
    Expired,
}

/// The peer a confirmed session admits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPeer {
    pub hostname: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_fingerprint: Option<String>,
}

/// `POST /pair/start` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub invite_code: String,
    pub expires_at: u64,
}

/// `POST /pair/initiate` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InitiateRequest {
    /// Uncompressed SEC1 point, lowercase hex.
    pub public_key: String,
    pub invite_code: String,
    pub hostname: String,
    pub api_key: String,
    #[serde(default)]
    pub cert_fingerprint: Option<String>,
}

/// `POST /pair/initiate` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub public_key: String,
    pub hostname: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_fingerprint: Option<String>,
    pub sas: String,
}

/// `GET /pair/status` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PairingState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas: Option<String>,
}

struct Session {
    invite_code: String,
    secret: EphemeralSecret,
    public_hex: String,
    expires_at: u64,
    state: PairingState,
    sas: Option<String>,
    pending_peer: Option<PendingPeer>,
}

/// What this daemon hands to a paired peer.
#[derive(Debug, Clone)]
pub struct LocalPairingIdentity {
    pub hostname: String,
    pub api_key: String,
    pub cert_fingerprint: Option<String>,
}

/// Single-flight pairing manager.
pub struct PairingManager<C: Clock> {
    session: Mutex<Option<Session>>,
    identity: LocalPairingIdentity,
    clock: C,
}

impl<C: Clock> PairingManager<C> {
    pub fn new(identity: LocalPairingIdentity, clock: C) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(None),
            identity,
            clock,
        })
    }

    /// Open a session: fresh P-256 keypair plus a 6-digit invite code.
    pub fn start(&self) -> Result<StartResponse, PairingError> {
        let now = self.clock.now_ms();
        let mut guard = self.session.lock();

        if let Some(session) = guard.as_ref() {
            if now < session.expires_at {
                return Err(PairingError::SessionActive);
            }
        }

        let secret = EphemeralSecret::random(&mut OsRng);
        let public_hex = hex::encode(
            secret
                .public_key()
                .to_encoded_point(false)
                .as_bytes(),
        );
        let invite_code = generate_invite_code();
        let expires_at = now + PAIRING_TIMEOUT_MS;

        tracing::info!(expires_at, "pairing session opened");
        *guard = Some(Session {
            invite_code: invite_code.clone(),
            secret,
            public_hex,
            expires_at,
            state: PairingState::Waiting,
            sas: None,
            pending_peer: None,
        });

        Ok(StartResponse {
            invite_code,
            expires_at,
        })
    }

    /// Responder's key arrives: validate the invite, run ECDH, derive
    /// the SAS, and remember the candidate peer until confirmation.
    pub fn initiate(&self, request: InitiateRequest) -> Result<InitiateResponse, PairingError> {
        let now = self.clock.now_ms();
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(PairingError::NoSession)?;

        if now >= session.expires_at {
            session.state = PairingState::Expired;
            return Err(PairingError::Expired);
        }
        if session.state != PairingState::Waiting {
            return Err(PairingError::WrongState);
        }
        if session.invite_code != request.invite_code {
            return Err(PairingError::InvalidCode);
        }

        let their_bytes =
            hex::decode(&request.public_key).map_err(|e| PairingError::InvalidKey(e.to_string()))?;
        let their_key = PublicKey::from_sec1_bytes(&their_bytes)
            .map_err(|e| PairingError::InvalidKey(e.to_string()))?;

        let shared = session.secret.diffie_hellman(&their_key);
        let sas = derive_sas(shared.raw_secret_bytes().as_slice());

        session.state = PairingState::KeyExchanged;
        session.sas = Some(sas.clone());
        session.pending_peer = Some(PendingPeer {
            hostname: request.hostname,
            api_key: request.api_key,
            cert_fingerprint: request.cert_fingerprint,
        });

        tracing::info!(sas = %sas, "pairing key exchange complete");
        Ok(InitiateResponse {
            public_key: session.public_hex.clone(),
            hostname: self.identity.hostname.clone(),
            api_key: self.identity.api_key.clone(),
            cert_fingerprint: self.identity.cert_fingerprint.clone(),
            sas,
        })
    }

    /// Close the session. `confirmed` returns the candidate peer for
    /// the caller to persist into the allowed-keys config.
    pub fn confirm(&self, confirmed: bool) -> Result<Option<PendingPeer>, PairingError> {
        let now = self.clock.now_ms();
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(PairingError::NoSession)?;

        if !confirmed {
            tracing::info!("pairing rejected by operator");
            *guard = None;
            return Ok(None);
        }

        if now >= session.expires_at {
            *guard = None;
            return Err(PairingError::Expired);
        }
        if session.state != PairingState::KeyExchanged {
            return Err(PairingError::WrongState);
        }

        let peer = session.pending_peer.take();
        tracing::info!(
            peer = peer.as_ref().map(|p| p.hostname.as_str()).unwrap_or(""),
            "pairing confirmed"
        );
        *guard = None;
        Ok(peer)
    }

    /// Current session state for `GET /pair/status`.
    pub fn status(&self) -> PairingStatus {
        let now = self.clock.now_ms();
        let guard = self.session.lock();
        match guard.as_ref() {
            Some(session) => {
                let state = if now >= session.expires_at {
                    PairingState::Expired
                } else {
                    session.state
                };
                PairingStatus {
                    active: state == PairingState::Waiting || state == PairingState::KeyExchanged,
                    state: Some(state),
                    expires_at: Some(session.expires_at),
                    sas: session.sas.clone(),
                }
            }
            None => PairingStatus {
                active: false,
                state: None,
                expires_at: None,
                sas: None,
            },
        }
    }
}

/// Derive the 6-digit SAS from an ECDH shared secret.
///
/// `SHA-256(secret || "loopsy-sas")`, first four bytes as a big-endian
/// u32, mod 10^6, zero-padded. Both sides hash the same x-coordinate
/// bytes, so the strings match iff the exchange was not tampered with.
pub fn derive_sas(shared_secret: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret);
    hasher.update(b"loopsy-sas");
    let digest = hasher.finalize();
    let word = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    format!("{:06}", word % 1_000_000)
}

/// Uniform 6-digit invite code.
fn generate_invite_code() -> String {
    use rand::Rng;
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[cfg(test)]
#[path = "pairing_tests.rs"]
mod tests;
