//! Enrollment protocol messages and per-alias state.
//!
//! Three opaque byte streams travel between requester and certifier:
//! request, response, ack. Transport is the caller's problem; each message
//! serializes to JSON bytes and parses back with a protocol version check.
//!
//! Per-alias state advances
//! `Requested -> ResponseReceived -> Acknowledged`, with `Aborted` terminal
//! from any non-terminal state. An absent entry means enrollment has not
//! started.

use serde::{Deserialize, Serialize};

use tresslock_core::{Error, Result};

use crate::certificate::Certificate;

/// Version carried by every enrollment message.
pub const PROTOCOL_VERSION: u32 = 1;

/// Step 1: self-signed request binding an alias to its public key.
///
/// `proof` is the requester's signature over the binding, demonstrating
/// possession of the private key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub version: u32,
    pub alias: String,
    pub public_key: Vec<u8>,
    pub proof: Vec<u8>,
}

/// Step 2: issued chain, leaf first, rooted at the certifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateResponse {
    pub version: u32,
    pub response_id: u64,
    pub alias: String,
    pub chain: Vec<Certificate>,
}

/// Step 3: acknowledgement referencing the response that was accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateAck {
    pub version: u32,
    pub response_id: u64,
    pub alias: String,
}

/// Enrollment progress for one alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentState {
    /// Request emitted, awaiting the issued chain.
    Requested,
    /// Chain validated and committed, ack emitted.
    ResponseReceived { response_id: u64 },
    /// Terminal success.
    Acknowledged,
    /// Terminal failure; staged state was discarded.
    Aborted,
}

impl EnrollmentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Acknowledged | Self::Aborted)
    }
}

pub(crate) fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

pub(crate) fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8], what: &str) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|_| Error::ProtocolAbort(format!("malformed {}", what)))
}

pub(crate) fn check_version(version: u32, what: &str) -> Result<()> {
    if version != PROTOCOL_VERSION {
        return Err(Error::ProtocolAbort(format!(
            "{} version mismatch: expected {}, got {}",
            what, PROTOCOL_VERSION, version
        )));
    }
    Ok(())
}
