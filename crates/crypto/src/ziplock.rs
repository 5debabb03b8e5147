//! Archive entry locks with deferred credential resolution.
//!
//! A [`ZipLock`] is the lock descriptor embedded alongside a protected
//! archive entry. It comes in two variants: password-based, reusing the
//! keyset lock envelope, and keypair-based, sealing the entry keyset to a
//! recipient's X25519 public key.
//!
//! Resolution never prompts. Credentials come from resolver callbacks
//! registered up front in [`ZipLockResolvers`]; a resolver that declines
//! surfaces as [`Error::Cancelled`], distinct from the uniform
//! [`Error::Security`] raised when a supplied credential turns out wrong.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

use tresslock_core::{Error, Result};

use crate::encryptor;
use crate::keypair::KeyPair;
use crate::keyset::{KeySet, KeySetSpec};
use crate::lock::{LockFactory, PasswordLockSpec, WrappedKeySet};

/// Supplies a password for the named source, or `None` to decline.
pub type PasswordResolver = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Supplies the private keypair for the named source, or `None` to decline.
pub type KeyPairResolver = Box<dyn Fn(&str) -> Option<KeyPair> + Send + Sync>;

/// Registered credential callbacks consulted during lock resolution.
///
/// No ambient credential state: an unregistered resolver behaves exactly
/// like one that declines.
#[derive(Default)]
pub struct ZipLockResolvers {
    password: Option<PasswordResolver>,
    keypair: Option<KeyPairResolver>,
}

impl ZipLockResolvers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_password_resolver(&mut self, resolver: PasswordResolver) {
        self.password = Some(resolver);
    }

    pub fn set_keypair_resolver(&mut self, resolver: KeyPairResolver) {
        self.keypair = Some(resolver);
    }

    fn password_for(&self, source: &str) -> Result<String> {
        self.password
            .as_ref()
            .and_then(|resolve| resolve(source))
            .ok_or(Error::Cancelled)
    }

    fn keypair_for(&self, source: &str) -> Result<KeyPair> {
        self.keypair
            .as_ref()
            .and_then(|resolve| resolve(source))
            .ok_or(Error::Cancelled)
    }
}

/// Lock descriptor for one protected archive entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ZipLock {
    /// Password-based: a keyset lock envelope, resolvable via the password
    /// resolver.
    Password { lock_bytes: Vec<u8> },
    /// Keypair-based: the entry keyset sealed to `recipient`'s X25519 public
    /// key, resolvable via the keypair resolver.
    KeyPair {
        recipient: Vec<u8>,
        sealed: Vec<u8>,
    },
}

impl ZipLock {
    /// Serialize for embedding in an archive entry header.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|_| Error::Data("malformed zip lock".to_string()))
    }
}

/// A freshly created lock together with the keyset it protects.
///
/// The keyset encrypts the entry payload; the lock travels with it.
#[derive(Debug)]
pub struct ResolvedZipLock {
    lock: ZipLock,
    keyset: KeySet,
}

impl ResolvedZipLock {
    pub fn lock(&self) -> &ZipLock {
        &self.lock
    }

    pub fn keyset(&self) -> &KeySet {
        &self.keyset
    }

    pub fn into_parts(self) -> (ZipLock, KeySet) {
        (self.lock, self.keyset)
    }
}

impl LockFactory {
    /// Create a password-based archive lock over a fresh keyset.
    pub fn new_password_zip_lock(
        &self,
        spec: &PasswordLockSpec,
        source: &str,
        password: &str,
    ) -> Result<ResolvedZipLock> {
        let lock = self.new_keyset_lock(spec, source, password)?;
        let keyset = self.rebuild(lock.keyset())?;
        Ok(ResolvedZipLock {
            lock: ZipLock::Password {
                lock_bytes: lock.bytes().to_vec(),
            },
            keyset,
        })
    }

    /// Create a keypair-based archive lock over a fresh keyset, sealed to
    /// the recipient's X25519 public key.
    pub fn new_keypair_zip_lock(
        &self,
        spec: KeySetSpec,
        recipient: &KeyPair,
    ) -> Result<ResolvedZipLock> {
        let recipient_key = recipient.agreement_public()?;
        let keyset = KeySet::generate(
            Arc::clone(&self.provider),
            spec,
            self.diversifiers.next(),
        )?;

        let plain = Zeroizing::new(serde_json::to_vec(&WrappedKeySet {
            master: keyset.master().to_vec(),
            spec: keyset.spec(),
            diversifier: keyset.diversifier(),
        })?);
        let sealed = encryptor::seal(&self.provider, &recipient_key, &plain)?;
        debug!(steps = spec.cipher_steps, "created keypair zip lock");

        Ok(ResolvedZipLock {
            lock: ZipLock::KeyPair {
                recipient: recipient.public_bytes().to_vec(),
                sealed,
            },
            keyset,
        })
    }

    /// Resolve an archive lock through the registered resolvers.
    ///
    /// A declining resolver yields [`Error::Cancelled`]; a wrong or stale
    /// credential yields [`Error::Security`].
    pub fn resolve_zip_lock(
        &self,
        lock: &ZipLock,
        source: &str,
        resolvers: &ZipLockResolvers,
    ) -> Result<KeySet> {
        match lock {
            ZipLock::Password { lock_bytes } => {
                let password = resolvers.password_for(source)?;
                let resolved = self.resolve_keyset_lock(lock_bytes, source, &password)?;
                self.rebuild(resolved.keyset())
            }
            ZipLock::KeyPair { recipient, sealed } => {
                let keypair = resolvers.keypair_for(source)?;
                if keypair.public_bytes() != recipient.as_slice() {
                    return Err(Error::Security);
                }
                let secret = keypair.agreement_secret().map_err(|_| Error::Security)?;
                let plain = Zeroizing::new(encryptor::open(&self.provider, &secret, sealed)?);
                let wrapped: WrappedKeySet =
                    serde_json::from_slice(&plain).map_err(|_| Error::Security)?;
                KeySet::derive(
                    Arc::clone(&self.provider),
                    wrapped.spec,
                    &wrapped.master,
                    wrapped.diversifier,
                )
                .map_err(|_| Error::Security)
            }
        }
    }

    fn rebuild(&self, keyset: &KeySet) -> Result<KeySet> {
        KeySet::derive(
            Arc::clone(&self.provider),
            keyset.spec(),
            keyset.master(),
            keyset.diversifier(),
        )
    }
}
