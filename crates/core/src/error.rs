//! Core error types
//!
//! One taxonomy shared by every TressLock crate. Callers are expected to
//! match on the variant class rather than parse display strings.

use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for TressLock.
#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported backend or invalid factory parameters. Fatal to
    /// factory construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested algorithm or spec is not supported by the active backend.
    /// The operation was never attempted.
    #[error("Capability error: {0}")]
    Capability(String),

    /// Type or state mismatch: wrong keypair family for a wrapper, unknown
    /// or duplicate alias, message arriving in the wrong protocol state.
    #[error("Data error: {0}")]
    Data(String),

    /// Lock or keyset resolution failed. Carries no detail at all: a caller
    /// (or attacker) must not be able to distinguish a wrong password from
    /// corrupted ciphertext.
    #[error("Security failure")]
    Security,

    /// Enrollment protocol failure. The affected alias's staged state has
    /// been discarded and the keystore is exactly as it was before the call.
    #[error("Enrollment aborted: {0}")]
    ProtocolAbort(String),

    /// A registered credential resolver declined to supply a credential.
    /// Distinct from [`Error::Security`] so callers can tell "user
    /// cancelled" apart from "password wrong".
    #[error("Credential resolution cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Message or header (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
