//! Layered symmetric-encryption keysets.
//!
//! A keyset is a cascade of independently-keyed AEAD ciphers derived from one
//! master secret: defense in depth against a single broken algorithm. The
//! cascade is applied in forward order on encryption with a fresh nonce per
//! step, and a keyed MAC over the whole output is verified before any
//! decryption work starts.
//!
//! # Wire blob layout
//!
//! ```text
//! [version u8][step_count u8]
//! per step: [alg_id u8][nonce_len u8][nonce bytes]
//! [ct_len u32 le][ciphertext]
//! [32-byte MAC tag]
//! ```
//!
//! The layout is this implementation's own; no compatibility with any prior
//! container format is attempted.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use tresslock_core::{Error, Result};

use crate::provider::{Provider, StepAlgorithm};

/// Key lengths (bits) a keyset spec may request.
pub const KEYSET_KEY_LENGTHS: [u32; 3] = [128, 192, 256];

/// Maximum number of cascade steps.
pub const MAX_CIPHER_STEPS: u8 = 4;

/// MAC tag length appended to every blob.
pub const TAG_LEN: usize = 32;

const BLOB_VERSION: u8 = 1;

/// Shape of a keyset: key material size and cascade depth.
///
/// Immutable value type; appears verbatim inside lock headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySetSpec {
    /// Per-step key material length in bits.
    pub key_len_bits: u32,
    /// Number of cascade steps.
    pub cipher_steps: u8,
}

impl KeySetSpec {
    pub fn new(key_len_bits: u32, cipher_steps: u8) -> Self {
        Self {
            key_len_bits,
            cipher_steps,
        }
    }

    /// Valid iff the key length is one of the allowed sizes and the step
    /// count is within `[1, MAX_CIPHER_STEPS]`.
    pub fn is_valid(&self) -> bool {
        KEYSET_KEY_LENGTHS.contains(&self.key_len_bits)
            && self.cipher_steps >= 1
            && self.cipher_steps <= MAX_CIPHER_STEPS
    }
}

/// One cascade step: algorithm plus its independently derived key.
struct CipherStep {
    algorithm: StepAlgorithm,
    key: Zeroizing<Vec<u8>>,
}

/// A derived cipher cascade bound to one provider.
///
/// Owns its key material exclusively; master secret and step keys are
/// zeroized on drop. Encryption and decryption are pure over explicit inputs
/// and may run concurrently as long as each call uses its own instance.
pub struct KeySet {
    spec: KeySetSpec,
    provider: Arc<dyn Provider>,
    master: Zeroizing<Vec<u8>>,
    diversifier: [u8; 16],
    steps: Vec<CipherStep>,
    mac_key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("spec", &self.spec)
            .field("provider", &self.provider.factory_type())
            .field("master", &"<redacted>")
            .field("diversifier", &self.diversifier)
            .field("steps", &self.steps.len())
            .field("mac_key", &"<redacted>")
            .finish()
    }
}

impl KeySet {
    /// Derive a keyset from an existing master secret.
    ///
    /// Step algorithms are picked from the provider's family using bytes
    /// derived from the master and the diversifier, so the same inputs
    /// always rebuild the identical cascade.
    pub fn derive(
        provider: Arc<dyn Provider>,
        spec: KeySetSpec,
        master: &[u8],
        diversifier: [u8; 16],
    ) -> Result<Self> {
        if !spec.is_valid() {
            return Err(Error::Data(format!(
                "invalid keyset spec: {} bits / {} steps",
                spec.key_len_bits, spec.cipher_steps
            )));
        }
        if master.is_empty() {
            return Err(Error::Data("empty master secret".to_string()));
        }

        let algorithms = provider.step_algorithms();
        let select_ctx = format!(
            "tresslock v1 keyset step select {}",
            hex::encode(diversifier)
        );
        let selector = provider.derive_subkey(master, &select_ctx, spec.cipher_steps as usize);

        let mut steps = Vec::with_capacity(spec.cipher_steps as usize);
        for (index, pick) in selector.iter().enumerate() {
            let algorithm = algorithms[*pick as usize % algorithms.len()];
            // Two-stage derivation: spec-sized step material first, then
            // expansion to the cipher's native key size.
            let material_ctx = format!("tresslock v1 keyset step {} material", index);
            let material = Zeroizing::new(provider.derive_subkey(
                master,
                &material_ctx,
                (spec.key_len_bits / 8) as usize,
            ));
            let key_ctx = format!("tresslock v1 keyset step {} key {}", index, algorithm.id());
            let key = Zeroizing::new(provider.derive_subkey(
                &material,
                &key_ctx,
                algorithm.key_len(),
            ));
            steps.push(CipherStep { algorithm, key });
        }

        let mac_key = Zeroizing::new(provider.derive_subkey(
            master,
            "tresslock v1 keyset integrity",
            TAG_LEN,
        ));

        Ok(Self {
            spec,
            provider,
            master: Zeroizing::new(master.to_vec()),
            diversifier,
            steps,
            mac_key,
        })
    }

    /// Generate a keyset with a fresh random master secret.
    pub fn generate(
        provider: Arc<dyn Provider>,
        spec: KeySetSpec,
        diversifier: [u8; 16],
    ) -> Result<Self> {
        let mut master = Zeroizing::new(vec![0u8; 32]);
        OsRng.fill_bytes(&mut master);
        Self::derive(provider, spec, &master, diversifier)
    }

    pub fn spec(&self) -> KeySetSpec {
        self.spec
    }

    /// Algorithms of the cascade in forward (encryption) order.
    pub fn step_algorithms(&self) -> Vec<StepAlgorithm> {
        self.steps.iter().map(|s| s.algorithm).collect()
    }

    pub(crate) fn master(&self) -> &[u8] {
        &self.master
    }

    pub(crate) fn diversifier(&self) -> [u8; 16] {
        self.diversifier
    }

    /// Encrypt `plaintext` through the cascade.
    ///
    /// Every call draws fresh nonces, so two encryptions of the same
    /// plaintext never produce the same blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut header = Vec::with_capacity(2 + self.steps.len() * 26);
        header.push(BLOB_VERSION);
        header.push(self.steps.len() as u8);

        let mut nonces = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let mut nonce = vec![0u8; step.algorithm.nonce_len()];
            OsRng.fill_bytes(&mut nonce);
            header.push(step.algorithm.id());
            header.push(nonce.len() as u8);
            header.extend_from_slice(&nonce);
            nonces.push(nonce);
        }

        let mut data = plaintext.to_vec();
        for (step, nonce) in self.steps.iter().zip(&nonces) {
            data = self
                .provider
                .seal_step(step.algorithm, &step.key, nonce, &data)?;
        }

        let mut blob = header;
        blob.extend_from_slice(&(data.len() as u32).to_le_bytes());
        blob.extend_from_slice(&data);
        let tag = self.provider.mac(&self.mac_key, &blob);
        blob.extend_from_slice(&tag);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`KeySet::encrypt`] on the same keyset.
    ///
    /// The MAC tag is verified in constant time before any cipher step runs;
    /// every failure mode collapses to [`Error::Security`] and no partial
    /// plaintext escapes.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        let parsed = self.parse_blob(blob).ok_or(Error::Security)?;

        let expected = self.provider.mac(&self.mac_key, parsed.authenticated);
        if !bool::from(expected.as_slice().ct_eq(parsed.tag)) {
            return Err(Error::Security);
        }

        let mut data = parsed.ciphertext.to_vec();
        for (step, nonce) in self.steps.iter().zip(&parsed.nonces).rev() {
            data = self
                .provider
                .open_step(step.algorithm, &step.key, nonce, &data)
                .map_err(|_| Error::Security)?;
        }
        Ok(data)
    }

    fn parse_blob<'a>(&self, blob: &'a [u8]) -> Option<ParsedBlob<'a>> {
        let mut pos = 0usize;
        let version = *blob.get(pos)?;
        pos += 1;
        if version != BLOB_VERSION {
            return None;
        }
        let step_count = *blob.get(pos)? as usize;
        pos += 1;
        if step_count != self.steps.len() {
            return None;
        }

        let mut nonces = Vec::with_capacity(step_count);
        for step in &self.steps {
            let alg_id = *blob.get(pos)?;
            pos += 1;
            let algorithm = StepAlgorithm::from_id(alg_id)?;
            if algorithm != step.algorithm {
                return None;
            }
            let nonce_len = *blob.get(pos)? as usize;
            pos += 1;
            if nonce_len != algorithm.nonce_len() {
                return None;
            }
            let nonce = blob.get(pos..pos + nonce_len)?;
            pos += nonce_len;
            nonces.push(nonce.to_vec());
        }

        let len_bytes = blob.get(pos..pos + 4)?;
        let ct_len = u32::from_le_bytes(len_bytes.try_into().ok()?) as usize;
        pos += 4;
        let ciphertext = blob.get(pos..pos + ct_len)?;
        pos += ct_len;
        let tag = blob.get(pos..)?;
        if tag.len() != TAG_LEN {
            return None;
        }

        Some(ParsedBlob {
            authenticated: &blob[..blob.len() - TAG_LEN],
            nonces,
            ciphertext,
            tag,
        })
    }
}

struct ParsedBlob<'a> {
    /// Everything the MAC covers: header, length prefix and ciphertext.
    authenticated: &'a [u8],
    nonces: Vec<Vec<u8>>,
    ciphertext: &'a [u8],
    tag: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{BackendA, BackendB};

    fn keyset(provider: Arc<dyn Provider>, spec: KeySetSpec) -> KeySet {
        KeySet::derive(provider, spec, b"a master secret for testing", [9u8; 16]).unwrap()
    }

    #[test]
    fn test_spec_validity_bounds() {
        assert!(KeySetSpec::new(128, 1).is_valid());
        assert!(KeySetSpec::new(192, 2).is_valid());
        assert!(KeySetSpec::new(256, MAX_CIPHER_STEPS).is_valid());
        assert!(!KeySetSpec::new(256, 0).is_valid());
        assert!(!KeySetSpec::new(256, MAX_CIPHER_STEPS + 1).is_valid());
        assert!(!KeySetSpec::new(512, 1).is_valid());
        assert!(!KeySetSpec::new(0, 1).is_valid());
    }

    #[test]
    fn test_round_trip_all_valid_specs_both_backends() {
        let providers: [Arc<dyn Provider>; 2] =
            [Arc::new(BackendA::new()), Arc::new(BackendB::new())];
        for provider in providers {
            for bits in KEYSET_KEY_LENGTHS {
                for steps in 1..=MAX_CIPHER_STEPS {
                    let ks = keyset(Arc::clone(&provider), KeySetSpec::new(bits, steps));
                    for payload in [&b""[..], b"x", b"the quick brown fox"] {
                        let blob = ks.encrypt(payload).unwrap();
                        assert_eq!(ks.decrypt(&blob).unwrap(), payload);
                    }
                }
            }
        }
    }

    #[test]
    fn test_same_inputs_rebuild_identical_cascade() {
        let provider: Arc<dyn Provider> = Arc::new(BackendA::new());
        let spec = KeySetSpec::new(256, 3);
        let a = KeySet::derive(Arc::clone(&provider), spec, b"master", [1u8; 16]).unwrap();
        let b = KeySet::derive(Arc::clone(&provider), spec, b"master", [1u8; 16]).unwrap();
        assert_eq!(a.step_algorithms(), b.step_algorithms());
        let blob = a.encrypt(b"cross-instance").unwrap();
        assert_eq!(b.decrypt(&blob).unwrap(), b"cross-instance");
    }

    #[test]
    fn test_different_diversifier_may_change_algorithms_but_not_break() {
        let provider: Arc<dyn Provider> = Arc::new(BackendA::new());
        let spec = KeySetSpec::new(256, 4);
        let a = KeySet::derive(Arc::clone(&provider), spec, b"master", [1u8; 16]).unwrap();
        let b = KeySet::derive(Arc::clone(&provider), spec, b"master", [2u8; 16]).unwrap();
        // Blobs from one cascade must not resolve under another diversifier
        let blob = a.encrypt(b"payload").unwrap();
        assert!(b.decrypt(&blob).is_err() || a.step_algorithms() == b.step_algorithms());
    }

    #[test]
    fn test_encrypt_is_randomized_per_call() {
        let provider: Arc<dyn Provider> = Arc::new(BackendB::new());
        let ks = keyset(provider, KeySetSpec::new(256, 2));
        let one = ks.encrypt(b"same payload").unwrap();
        let two = ks.encrypt(b"same payload").unwrap();
        assert_ne!(one, two);
        assert_eq!(ks.decrypt(&one).unwrap(), b"same payload");
        assert_eq!(ks.decrypt(&two).unwrap(), b"same payload");
    }

    #[test]
    fn test_single_bit_flip_anywhere_fails_closed() {
        let provider: Arc<dyn Provider> = Arc::new(BackendA::new());
        let ks = keyset(provider, KeySetSpec::new(192, 2));
        let blob = ks.encrypt(b"tamper target").unwrap();

        for index in 0..blob.len() {
            let mut tampered = blob.clone();
            tampered[index] ^= 0x01;
            let err = ks.decrypt(&tampered).unwrap_err();
            assert!(
                matches!(err, Error::Security),
                "byte {} produced a non-security failure",
                index
            );
        }
    }

    #[test]
    fn test_truncated_and_garbage_blobs_fail_closed() {
        let provider: Arc<dyn Provider> = Arc::new(BackendB::new());
        let ks = keyset(provider, KeySetSpec::new(128, 1));
        let blob = ks.encrypt(b"payload").unwrap();

        assert!(matches!(ks.decrypt(&[]).unwrap_err(), Error::Security));
        assert!(matches!(
            ks.decrypt(&blob[..blob.len() - 1]).unwrap_err(),
            Error::Security
        ));
        assert!(matches!(
            ks.decrypt(&vec![0u8; 64]).unwrap_err(),
            Error::Security
        ));
    }

    #[test]
    fn test_wrong_keyset_cannot_decrypt() {
        let provider: Arc<dyn Provider> = Arc::new(BackendA::new());
        let spec = KeySetSpec::new(256, 2);
        let a = KeySet::derive(Arc::clone(&provider), spec, b"master one", [5u8; 16]).unwrap();
        let b = KeySet::derive(Arc::clone(&provider), spec, b"master two", [5u8; 16]).unwrap();
        let blob = a.encrypt(b"secret").unwrap();
        assert!(matches!(b.decrypt(&blob).unwrap_err(), Error::Security));
    }

    #[test]
    fn test_invalid_spec_rejected_at_derive() {
        let provider: Arc<dyn Provider> = Arc::new(BackendA::new());
        let err =
            KeySet::derive(provider, KeySetSpec::new(512, 1), b"master", [0u8; 16]).unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }
}
