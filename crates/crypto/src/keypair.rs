//! Asymmetric keypairs for signing and hybrid encryption.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use tresslock_core::{Error, Result};

/// Algorithm family of a keypair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPairSpec {
    /// Ed25519: sign / verify.
    Ed25519,
    /// X25519: hybrid encrypt / decrypt.
    X25519,
}

/// A public key with optionally-present private half.
///
/// Public-only keypairs can verify and encrypt but never sign or decrypt.
/// The private half, when present, is zeroized on drop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPair {
    spec: KeyPairSpec,
    public: Vec<u8>,
    private: Option<Vec<u8>>,
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        if let Some(private) = &mut self.private {
            private.zeroize();
        }
    }
}

impl KeyPair {
    /// Generate a fresh keypair of the given family.
    pub fn generate(spec: KeyPairSpec) -> Self {
        match spec {
            KeyPairSpec::Ed25519 => {
                let mut secret = [0u8; 32];
                OsRng.fill_bytes(&mut secret);
                let signing = SigningKey::from_bytes(&secret);
                let keypair = Self {
                    spec,
                    public: signing.verifying_key().to_bytes().to_vec(),
                    private: Some(secret.to_vec()),
                };
                secret.zeroize();
                keypair
            }
            KeyPairSpec::X25519 => {
                let secret = StaticSecret::random_from_rng(OsRng);
                let public = X25519PublicKey::from(&secret);
                Self {
                    spec,
                    public: public.as_bytes().to_vec(),
                    private: Some(secret.to_bytes().to_vec()),
                }
            }
        }
    }

    /// Rebuild a keypair from its raw public bytes (no private half).
    pub fn from_public(spec: KeyPairSpec, public: &[u8]) -> Result<Self> {
        if public.len() != 32 {
            return Err(Error::Data(format!(
                "public key must be 32 bytes, got {}",
                public.len()
            )));
        }
        if spec == KeyPairSpec::Ed25519 {
            // Reject points that are not valid Ed25519 public keys up front
            let bytes: [u8; 32] = public
                .try_into()
                .map_err(|_| Error::Data("malformed Ed25519 public key".to_string()))?;
            VerifyingKey::from_bytes(&bytes)
                .map_err(|_| Error::Data("malformed Ed25519 public key".to_string()))?;
        }
        Ok(Self {
            spec,
            public: public.to_vec(),
            private: None,
        })
    }

    pub fn spec(&self) -> KeyPairSpec {
        self.spec
    }

    pub fn public_bytes(&self) -> &[u8] {
        &self.public
    }

    pub fn has_private(&self) -> bool {
        self.private.is_some()
    }

    /// A copy with the private half stripped.
    pub fn public_only(&self) -> Self {
        Self {
            spec: self.spec,
            public: self.public.clone(),
            private: None,
        }
    }

    pub(crate) fn signing_key(&self) -> Result<SigningKey> {
        if self.spec != KeyPairSpec::Ed25519 {
            return Err(Error::Data(
                "signing requires an Ed25519 keypair".to_string(),
            ));
        }
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| Error::Data("keypair is public-only".to_string()))?;
        let bytes: [u8; 32] = private
            .as_slice()
            .try_into()
            .map_err(|_| Error::Data("malformed Ed25519 private key".to_string()))?;
        Ok(SigningKey::from_bytes(&bytes))
    }

    pub(crate) fn verifying_key(&self) -> Result<VerifyingKey> {
        if self.spec != KeyPairSpec::Ed25519 {
            return Err(Error::Data(
                "verification requires an Ed25519 keypair".to_string(),
            ));
        }
        let bytes: [u8; 32] = self
            .public
            .as_slice()
            .try_into()
            .map_err(|_| Error::Data("malformed Ed25519 public key".to_string()))?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|_| Error::Data("malformed Ed25519 public key".to_string()))
    }

    pub(crate) fn agreement_secret(&self) -> Result<StaticSecret> {
        if self.spec != KeyPairSpec::X25519 {
            return Err(Error::Data(
                "decryption requires an X25519 keypair".to_string(),
            ));
        }
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| Error::Data("keypair is public-only".to_string()))?;
        let bytes: [u8; 32] = private
            .as_slice()
            .try_into()
            .map_err(|_| Error::Data("malformed X25519 private key".to_string()))?;
        Ok(StaticSecret::from(bytes))
    }

    pub(crate) fn agreement_public(&self) -> Result<X25519PublicKey> {
        if self.spec != KeyPairSpec::X25519 {
            return Err(Error::Data(
                "encryption requires an X25519 keypair".to_string(),
            ));
        }
        let bytes: [u8; 32] = self
            .public
            .as_slice()
            .try_into()
            .map_err(|_| Error::Data("malformed X25519 public key".to_string()))?;
        Ok(X25519PublicKey::from(bytes))
    }
}
