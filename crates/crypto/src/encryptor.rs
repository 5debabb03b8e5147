//! Mode-as-type hybrid encryption wrappers.
//!
//! [`Encryptor`] seals data for an X25519 public key using an ephemeral
//! keypair and the backend's hybrid AEAD; [`Decryptor`] opens with the
//! matching private key. As with the signature wrappers, the legal mode and
//! key-presence combination is encoded in the type: an encryptor accepts
//! public-only keypairs, a decryptor cannot be built without the private
//! half.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use tresslock_core::{Error, Result};

use crate::keypair::KeyPair;
use crate::provider::Provider;

const HYBRID_KEY_CONTEXT: &str = "tresslock v1 hybrid key";

/// Sealed hybrid box: ephemeral DH half, AEAD nonce and ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedBox {
    ephemeral_public: [u8; 32],
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

pub(crate) fn seal(
    provider: &Arc<dyn Provider>,
    recipient: &X25519PublicKey,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);

    let algorithm = provider.hybrid_algorithm();
    let key = Zeroizing::new(provider.derive_subkey(
        shared.as_bytes(),
        HYBRID_KEY_CONTEXT,
        algorithm.key_len(),
    ));
    let mut nonce = vec![0u8; algorithm.nonce_len()];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = provider.seal_step(algorithm, &key, &nonce, plaintext)?;
    let boxed = SealedBox {
        ephemeral_public: *ephemeral_public.as_bytes(),
        nonce,
        ciphertext,
    };
    Ok(serde_json::to_vec(&boxed)?)
}

pub(crate) fn open(
    provider: &Arc<dyn Provider>,
    secret: &StaticSecret,
    blob: &[u8],
) -> Result<Vec<u8>> {
    let boxed: SealedBox = serde_json::from_slice(blob).map_err(|_| Error::Security)?;
    let ephemeral_public = X25519PublicKey::from(boxed.ephemeral_public);
    let shared = secret.diffie_hellman(&ephemeral_public);

    let algorithm = provider.hybrid_algorithm();
    let key = Zeroizing::new(provider.derive_subkey(
        shared.as_bytes(),
        HYBRID_KEY_CONTEXT,
        algorithm.key_len(),
    ));
    provider
        .open_step(algorithm, &key, &boxed.nonce, &boxed.ciphertext)
        .map_err(|_| Error::Security)
}

/// Encrypts for one recipient's X25519 public key.
pub struct Encryptor {
    provider: Arc<dyn Provider>,
    recipient: X25519PublicKey,
}

impl Encryptor {
    /// Accepts public-only keypairs; fails with a data error if the keypair
    /// is not X25519.
    pub fn new(provider: Arc<dyn Provider>, keypair: &KeyPair) -> Result<Self> {
        Ok(Self {
            recipient: keypair.agreement_public()?,
            provider,
        })
    }

    /// Seal `plaintext` under a fresh ephemeral exchange. Each call produces
    /// an independent blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        seal(&self.provider, &self.recipient, plaintext)
    }
}

/// Decrypts blobs sealed for the bound X25519 keypair.
pub struct Decryptor {
    provider: Arc<dyn Provider>,
    secret: StaticSecret,
}

impl Decryptor {
    /// Fails with a data error if the keypair is not X25519 or is
    /// public-only.
    pub fn new(provider: Arc<dyn Provider>, keypair: &KeyPair) -> Result<Self> {
        Ok(Self {
            secret: keypair.agreement_secret()?,
            provider,
        })
    }

    /// Open a blob produced by [`Encryptor::encrypt`]. Tampered or
    /// wrong-recipient blobs fail uniformly.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        open(&self.provider, &self.secret, blob)
    }
}
