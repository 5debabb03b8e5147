//! Provider backends supplying cryptographic primitives.
//!
//! A [`Provider`] bundles the digest, MAC, key-derivation and AEAD step
//! cipher primitives of one backend family. The factory selects exactly one
//! provider at construction time and holds it immutably; no other component
//! switches on the backend type at runtime.
//!
//! Two backends are available:
//!
//! - **Backend A**: BLAKE3 digest/keyed MAC/derivation with the
//!   ChaCha20-Poly1305 family of step ciphers
//! - **Backend B**: SHA-256 digest, HMAC-SHA256, HKDF-SHA256 derivation with
//!   the AES-GCM family of step ciphers

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use tresslock_core::{Error, FactoryType, Result};

type HmacSha256 = Hmac<Sha256>;

/// Symmetric AEAD step cipher identifiers carried in keyset blob metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepAlgorithm {
    ChaCha20Poly1305,
    XChaCha20Poly1305,
    Aes128Gcm,
    Aes256Gcm,
}

impl StepAlgorithm {
    /// Stable single-byte identifier used in the wire blob.
    pub fn id(self) -> u8 {
        match self {
            StepAlgorithm::ChaCha20Poly1305 => 1,
            StepAlgorithm::XChaCha20Poly1305 => 2,
            StepAlgorithm::Aes128Gcm => 3,
            StepAlgorithm::Aes256Gcm => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(StepAlgorithm::ChaCha20Poly1305),
            2 => Some(StepAlgorithm::XChaCha20Poly1305),
            3 => Some(StepAlgorithm::Aes128Gcm),
            4 => Some(StepAlgorithm::Aes256Gcm),
            _ => None,
        }
    }

    /// Nonce size in bytes for this cipher.
    pub fn nonce_len(self) -> usize {
        match self {
            StepAlgorithm::XChaCha20Poly1305 => 24,
            _ => 12,
        }
    }

    /// Native key size in bytes for this cipher.
    pub fn key_len(self) -> usize {
        match self {
            StepAlgorithm::Aes128Gcm => 16,
            _ => 32,
        }
    }
}

/// Primitive surface of one backend family.
///
/// Selected once per factory and shared by reference afterward. All methods
/// are pure over their inputs; providers hold no mutable state.
pub trait Provider: Send + Sync {
    /// Which backend this provider implements.
    fn factory_type(&self) -> FactoryType;

    /// Unkeyed digest of `data` (32 bytes).
    fn digest(&self, data: &[u8]) -> Vec<u8>;

    /// Keyed MAC over `data` (32 bytes).
    fn mac(&self, key: &[u8], data: &[u8]) -> Vec<u8>;

    /// Derive `out_len` bytes of subkey material from `master`, separated by
    /// `context`. Same inputs always produce the same output.
    fn derive_subkey(&self, master: &[u8], context: &str, out_len: usize) -> Vec<u8>;

    /// Step ciphers this backend can run, in preference order.
    fn step_algorithms(&self) -> &'static [StepAlgorithm];

    /// The AEAD used for hybrid (keypair-based) sealing.
    fn hybrid_algorithm(&self) -> StepAlgorithm;

    /// AEAD-seal one cascade step.
    fn seal_step(
        &self,
        algorithm: StepAlgorithm,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>>;

    /// AEAD-open one cascade step. Any failure is a security failure.
    fn open_step(
        &self,
        algorithm: StepAlgorithm,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>>;

    fn supports_step(&self, algorithm: StepAlgorithm) -> bool {
        self.step_algorithms().contains(&algorithm)
    }
}

fn seal_with(algorithm: StepAlgorithm, key: &[u8], nonce: &[u8], pt: &[u8]) -> Result<Vec<u8>> {
    if key.len() != algorithm.key_len() || nonce.len() != algorithm.nonce_len() {
        return Err(Error::Data(format!(
            "bad key or nonce length for {:?}",
            algorithm
        )));
    }
    let out = match algorithm {
        StepAlgorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
            cipher.encrypt(chacha20poly1305::Nonce::from_slice(nonce), pt)
        }
        StepAlgorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
            cipher.encrypt(chacha20poly1305::XNonce::from_slice(nonce), pt)
        }
        StepAlgorithm::Aes128Gcm => {
            let cipher = Aes128Gcm::new_from_slice(key)
                .map_err(|_| Error::Data("bad AES-128 key".to_string()))?;
            cipher.encrypt(aes_gcm::Nonce::from_slice(nonce), pt)
        }
        StepAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|_| Error::Data("bad AES-256 key".to_string()))?;
            cipher.encrypt(aes_gcm::Nonce::from_slice(nonce), pt)
        }
    };
    out.map_err(|_| Error::Data("step encryption failed".to_string()))
}

fn open_with(algorithm: StepAlgorithm, key: &[u8], nonce: &[u8], ct: &[u8]) -> Result<Vec<u8>> {
    if key.len() != algorithm.key_len() || nonce.len() != algorithm.nonce_len() {
        return Err(Error::Security);
    }
    let out = match algorithm {
        StepAlgorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
            cipher.decrypt(chacha20poly1305::Nonce::from_slice(nonce), ct)
        }
        StepAlgorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
            cipher.decrypt(chacha20poly1305::XNonce::from_slice(nonce), ct)
        }
        StepAlgorithm::Aes128Gcm => {
            let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| Error::Security)?;
            cipher.decrypt(aes_gcm::Nonce::from_slice(nonce), ct)
        }
        StepAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::Security)?;
            cipher.decrypt(aes_gcm::Nonce::from_slice(nonce), ct)
        }
    };
    // Uniform failure: no distinction between bad key, bad nonce or tag mismatch
    out.map_err(|_| Error::Security)
}

/// Backend A: BLAKE3 + ChaCha20-Poly1305 family.
#[derive(Debug, Default)]
pub struct BackendA;

impl BackendA {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for BackendA {
    fn factory_type(&self) -> FactoryType {
        FactoryType::BackendA
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        blake3::hash(data).as_bytes().to_vec()
    }

    fn mac(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        // Keyed BLAKE3 requires exactly 32 key bytes; shorter or longer
        // secrets are first compressed through the derivation path.
        let key_bytes: [u8; 32] = if key.len() == 32 {
            let mut k = [0u8; 32];
            k.copy_from_slice(key);
            k
        } else {
            blake3::derive_key("tresslock v1 mac key", key)
        };
        blake3::keyed_hash(&key_bytes, data).as_bytes().to_vec()
    }

    fn derive_subkey(&self, master: &[u8], context: &str, out_len: usize) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new_derive_key(context);
        hasher.update(master);
        let mut out = vec![0u8; out_len];
        hasher.finalize_xof().fill(&mut out);
        out
    }

    fn step_algorithms(&self) -> &'static [StepAlgorithm] {
        &[
            StepAlgorithm::ChaCha20Poly1305,
            StepAlgorithm::XChaCha20Poly1305,
        ]
    }

    fn hybrid_algorithm(&self) -> StepAlgorithm {
        StepAlgorithm::ChaCha20Poly1305
    }

    fn seal_step(
        &self,
        algorithm: StepAlgorithm,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        seal_with(algorithm, key, nonce, plaintext)
    }

    fn open_step(
        &self,
        algorithm: StepAlgorithm,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        open_with(algorithm, key, nonce, ciphertext)
    }
}

/// Backend B: SHA-256/HMAC/HKDF + AES-GCM family.
#[derive(Debug, Default)]
pub struct BackendB;

impl BackendB {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for BackendB {
    fn factory_type(&self) -> FactoryType {
        FactoryType::BackendB
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    fn mac(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn derive_subkey(&self, master: &[u8], context: &str, out_len: usize) -> Vec<u8> {
        let hk = Hkdf::<Sha256>::new(None, master);
        let mut out = vec![0u8; out_len];
        hk.expand(context.as_bytes(), &mut out)
            .expect("HKDF output length within bounds");
        out
    }

    fn step_algorithms(&self) -> &'static [StepAlgorithm] {
        &[StepAlgorithm::Aes256Gcm, StepAlgorithm::Aes128Gcm]
    }

    fn hybrid_algorithm(&self) -> StepAlgorithm {
        StepAlgorithm::Aes256Gcm
    }

    fn seal_step(
        &self,
        algorithm: StepAlgorithm,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        seal_with(algorithm, key, nonce, plaintext)
    }

    fn open_step(
        &self,
        algorithm: StepAlgorithm,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        open_with(algorithm, key, nonce, ciphertext)
    }
}
