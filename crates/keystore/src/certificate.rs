//! Certificates and trust chain validation.
//!
//! A certificate binds an alias to an Ed25519 public key, signed by an
//! issuer. The signed portion is a canonical JSON encoding of the
//! to-be-signed fields; signatures are real Ed25519 signatures verified
//! during chain validation, not placeholders.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use tresslock_core::{Error, Result};
use tresslock_crypto::{KeyPair, KeyPairSpec, Signer, Verifier};

/// The signed portion of a certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TbsCertificate {
    serial: u64,
    subject: String,
    issuer: String,
    public_key: Vec<u8>,
    issued_at: u64,
}

/// An alias-to-public-key binding signed by an issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub serial: u64,
    pub subject: String,
    pub issuer: String,
    pub public_key: Vec<u8>,
    pub issued_at: u64,
    pub signature: Vec<u8>,
}

impl Certificate {
    /// Create a self-signed certificate, used for trust roots.
    pub fn self_signed(alias: &str, keypair: &KeyPair, serial: u64, issued_at: u64) -> Result<Self> {
        Self::issued(alias, keypair.public_bytes(), alias, keypair, serial, issued_at)
    }

    /// Issue a certificate for `subject` signed by the issuer's keypair.
    pub fn issued(
        subject: &str,
        subject_public: &[u8],
        issuer: &str,
        issuer_keypair: &KeyPair,
        serial: u64,
        issued_at: u64,
    ) -> Result<Self> {
        let tbs = TbsCertificate {
            serial,
            subject: subject.to_string(),
            issuer: issuer.to_string(),
            public_key: subject_public.to_vec(),
            issued_at,
        };
        let signer = Signer::new(issuer_keypair)?;
        let signature = signer.sign(&serde_json::to_vec(&tbs)?);
        Ok(Self {
            serial: tbs.serial,
            subject: tbs.subject,
            issuer: tbs.issuer,
            public_key: tbs.public_key,
            issued_at: tbs.issued_at,
            signature,
        })
    }

    fn tbs_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&TbsCertificate {
            serial: self.serial,
            subject: self.subject.clone(),
            issuer: self.issuer.clone(),
            public_key: self.public_key.clone(),
            issued_at: self.issued_at,
        })?)
    }

    /// Verify this certificate's signature against the issuer's public key.
    pub fn verify(&self, issuer_public: &[u8]) -> Result<()> {
        let issuer = KeyPair::from_public(KeyPairSpec::Ed25519, issuer_public)?;
        let verifier = Verifier::new(&issuer)?;
        verifier.verify(&self.tbs_bytes()?, &self.signature)
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }
}

/// Serials of certificates withdrawn from trust.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevocationList {
    serials: HashSet<u64>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&mut self, serial: u64) {
        self.serials.insert(serial);
    }

    pub fn is_revoked(&self, serial: u64) -> bool {
        self.serials.contains(&serial)
    }
}

/// Validate a chain ordered leaf first, root last.
///
/// Every link's issuer must be the next certificate's subject and every
/// signature must verify under the next certificate's key; the root must be
/// self-signed and self-verifying. Revoked serials anywhere in the chain
/// fail validation.
pub fn validate_chain(chain: &[Certificate], revoked: &RevocationList) -> Result<()> {
    let root = chain
        .last()
        .ok_or_else(|| Error::Data("empty certificate chain".to_string()))?;
    if !root.is_self_signed() {
        return Err(Error::Data("chain root is not self-signed".to_string()));
    }
    root.verify(&root.public_key)?;

    for pair in chain.windows(2) {
        let (cert, issuer) = (&pair[0], &pair[1]);
        if cert.issuer != issuer.subject {
            return Err(Error::Data(format!(
                "chain break: {} issued by {}, expected {}",
                cert.subject, cert.issuer, issuer.subject
            )));
        }
        cert.verify(&issuer.public_key)?;
    }

    for cert in chain {
        if revoked.is_revoked(cert.serial) {
            return Err(Error::Data(format!(
                "certificate {} is revoked",
                cert.serial
            )));
        }
    }
    Ok(())
}
