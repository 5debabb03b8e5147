//! Password locks over keysets.
//!
//! A keyset lock wraps a keyset's master secret under a password: the
//! password is stretched with PBKDF2-HMAC-SHA256, the stretched bytes feed a
//! locking cascade, and that cascade encrypts the wrapped keyset. The lock
//! envelope carries everything needed to repeat the stretch (iteration
//! factor, salt, locking diversifier) but nothing that helps without the
//! password.
//!
//! All resolution failures collapse to [`Error::Security`]: a wrong
//! password, a tampered envelope and a truncated envelope are
//! indistinguishable to the caller.

use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

use tresslock_core::{Error, Result};

use crate::keyset::{KeySet, KeySetSpec};
use crate::provider::Provider;
use crate::random::DiversifierSource;

/// Minimum password-stretch factor.
pub const MIN_K_ITERATIONS: u32 = 1;

/// Maximum password-stretch factor.
pub const MAX_K_ITERATIONS: u32 = 64;

const ITERATION_UNIT: u32 = 1024;

/// Shape of a password lock: stretch factor plus the locking cascade's spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordLockSpec {
    /// Stretch factor in units of 1024 PBKDF2 iterations.
    pub k_iterations: u32,
    /// Spec of the cascade that wraps the locked keyset.
    pub keyset_spec: KeySetSpec,
}

impl PasswordLockSpec {
    pub fn new(k_iterations: u32, keyset_spec: KeySetSpec) -> Self {
        Self {
            k_iterations,
            keyset_spec,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.k_iterations >= MIN_K_ITERATIONS
            && self.k_iterations <= MAX_K_ITERATIONS
            && self.keyset_spec.is_valid()
    }

    /// Concrete PBKDF2 iteration count: `k_iterations * 1024`.
    pub fn num_iterations(&self) -> u32 {
        self.k_iterations * ITERATION_UNIT
    }
}

/// Plaintext lock parameters, stored beside the wrapped keyset.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockHeader {
    k_iterations: u32,
    keyset_spec: KeySetSpec,
    salt: [u8; 16],
    diversifier: [u8; 16],
}

/// Serialized form of a keyset lock: header in the clear, keyset wrapped
/// under the locking cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockEnvelope {
    header: LockHeader,
    wrapped: Vec<u8>,
}

/// What the locking cascade actually encrypts. Also the payload sealed to a
/// recipient key by keypair-based archive locks.
#[derive(Serialize, Deserialize)]
pub(crate) struct WrappedKeySet {
    pub(crate) master: Vec<u8>,
    pub(crate) spec: KeySetSpec,
    pub(crate) diversifier: [u8; 16],
}

/// A resolved (or freshly created) password lock over a keyset.
///
/// Retains the verified password so a similar lock over the same keyset can
/// be minted without prompting again.
pub struct KeySetLock {
    bytes: Vec<u8>,
    keyset: KeySet,
    password: Zeroizing<String>,
    source: String,
}

impl std::fmt::Debug for KeySetLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySetLock")
            .field("bytes", &self.bytes.len())
            .field("keyset", &self.keyset)
            .field("password", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

impl KeySetLock {
    /// Serialized envelope, suitable for storage or transport.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The keyset this lock protects.
    pub fn keyset(&self) -> &KeySet {
        &self.keyset
    }

    /// Caller-supplied label describing where the lock came from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Creates and resolves locks for one provider.
pub struct LockFactory {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) diversifiers: Arc<DiversifierSource>,
}

impl LockFactory {
    pub(crate) fn new(provider: Arc<dyn Provider>, diversifiers: Arc<DiversifierSource>) -> Self {
        Self {
            provider,
            diversifiers,
        }
    }

    /// Create a lock over a freshly generated keyset.
    pub fn new_keyset_lock(
        &self,
        spec: &PasswordLockSpec,
        source: &str,
        password: &str,
    ) -> Result<KeySetLock> {
        let keyset = KeySet::generate(
            Arc::clone(&self.provider),
            spec.keyset_spec,
            self.diversifiers.next(),
        )?;
        self.new_keyset_lock_for(spec, source, password, &keyset)
    }

    /// Create a lock over an existing keyset.
    pub fn new_keyset_lock_for(
        &self,
        spec: &PasswordLockSpec,
        source: &str,
        password: &str,
        keyset: &KeySet,
    ) -> Result<KeySetLock> {
        if !spec.is_valid() {
            return Err(Error::Data(format!(
                "invalid lock spec: k={}",
                spec.k_iterations
            )));
        }
        if password.is_empty() {
            return Err(Error::Data("empty password".to_string()));
        }

        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let header = LockHeader {
            k_iterations: spec.k_iterations,
            keyset_spec: spec.keyset_spec,
            salt,
            diversifier: self.diversifiers.next(),
        };

        let bytes = self.seal(&header, password, keyset)?;
        debug!(source, steps = keyset.spec().cipher_steps, "created keyset lock");

        // Rebuild from the same material so the lock owns its keyset
        let keyset = KeySet::derive(
            Arc::clone(&self.provider),
            keyset.spec(),
            keyset.master(),
            keyset.diversifier(),
        )?;
        Ok(KeySetLock {
            bytes,
            keyset,
            password: Zeroizing::new(password.to_string()),
            source: source.to_string(),
        })
    }

    /// Resolve a serialized lock with a password.
    ///
    /// Any failure, from malformed bytes to a wrong password, is reported
    /// uniformly as [`Error::Security`].
    pub fn resolve_keyset_lock(
        &self,
        bytes: &[u8],
        source: &str,
        password: &str,
    ) -> Result<KeySetLock> {
        let envelope: LockEnvelope =
            serde_json::from_slice(bytes).map_err(|_| Error::Security)?;
        let spec = PasswordLockSpec::new(envelope.header.k_iterations, envelope.header.keyset_spec);
        if !spec.is_valid() {
            return Err(Error::Security);
        }

        let locking = self
            .locking_keyset(&envelope.header, password)
            .map_err(|_| Error::Security)?;
        let plain = Zeroizing::new(locking.decrypt(&envelope.wrapped)?);
        let wrapped: WrappedKeySet =
            serde_json::from_slice(&plain).map_err(|_| Error::Security)?;

        let keyset = KeySet::derive(
            Arc::clone(&self.provider),
            wrapped.spec,
            &wrapped.master,
            wrapped.diversifier,
        )
        .map_err(|_| Error::Security)?;
        debug!(source, "resolved keyset lock");

        Ok(KeySetLock {
            bytes: bytes.to_vec(),
            keyset,
            password: Zeroizing::new(password.to_string()),
            source: source.to_string(),
        })
    }

    /// Mint a new lock over the same keyset with fresh salt, diversifier and
    /// nonces, reusing the lock's retained password.
    ///
    /// The resulting bytes share no randomness with the original, yet both
    /// resolve to the identical keyset.
    pub fn similar_keyset_lock(&self, lock: &KeySetLock) -> Result<KeySetLock> {
        let envelope: LockEnvelope =
            serde_json::from_slice(&lock.bytes).map_err(|_| Error::Security)?;
        let spec = PasswordLockSpec::new(envelope.header.k_iterations, envelope.header.keyset_spec);
        self.new_keyset_lock_for(&spec, lock.source(), &lock.password, &lock.keyset)
    }

    fn seal(&self, header: &LockHeader, password: &str, keyset: &KeySet) -> Result<Vec<u8>> {
        let locking = self.locking_keyset(header, password)?;
        let plain = Zeroizing::new(serde_json::to_vec(&WrappedKeySet {
            master: keyset.master().to_vec(),
            spec: keyset.spec(),
            diversifier: keyset.diversifier(),
        })?);
        let wrapped = locking.encrypt(&plain)?;
        Ok(serde_json::to_vec(&LockEnvelope {
            header: header.clone(),
            wrapped,
        })?)
    }

    fn locking_keyset(&self, header: &LockHeader, password: &str) -> Result<KeySet> {
        let iterations = header.k_iterations * ITERATION_UNIT;
        let mut stretched = Zeroizing::new([0u8; 32]);
        pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            &header.salt,
            iterations,
            stretched.as_mut(),
        );
        KeySet::derive(
            Arc::clone(&self.provider),
            header.keyset_spec,
            stretched.as_ref(),
            header.diversifier,
        )
    }
}
