//! Mode-as-type signature wrappers.
//!
//! Instead of an init-then-check mode flag, signing and verifying are two
//! distinct types: a [`Signer`] can only be built from an Ed25519 keypair
//! that carries its private half, a [`Verifier`] from any Ed25519 public
//! key. Once constructed, no illegal (spec, mode, key-presence) combination
//! is representable.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};

use tresslock_core::{Error, Result};

use crate::keypair::KeyPair;

/// Signs messages with a private Ed25519 key.
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    /// Fails with a data error if the keypair is not Ed25519 or is
    /// public-only.
    pub fn new(keypair: &KeyPair) -> Result<Self> {
        Ok(Self {
            key: keypair.signing_key()?,
        })
    }

    /// Sign a message, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key.sign(message).to_bytes().to_vec()
    }
}

/// Verifies signatures against an Ed25519 public key.
pub struct Verifier {
    key: VerifyingKey,
}

impl Verifier {
    /// Accepts public-only keypairs; fails with a data error if the keypair
    /// is not Ed25519.
    pub fn new(keypair: &KeyPair) -> Result<Self> {
        Ok(Self {
            key: keypair.verifying_key()?,
        })
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let signature = Signature::from_slice(signature)
            .map_err(|_| Error::Data("malformed signature".to_string()))?;
        self.key
            .verify(message, &signature)
            .map_err(|_| Error::Data("signature verification failed".to_string()))
    }
}
