//! Factory bootstrap: one provider, one random source, eager sub-factories.
//!
//! A [`Factory`] is constructed once from [`FactoryParameters`] and never
//! reconfigured. All sub-factories are built eagerly in [`Factory::create`]
//! and share the same provider and diversifier source, so repeated accessor
//! calls always return the same instance.

use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::info;

use tresslock_core::{Error, FactoryParameters, FactoryType, Result};

use crate::encryptor::{Decryptor, Encryptor};
use crate::keypair::{KeyPair, KeyPairSpec};
use crate::keyset::{KeySet, KeySetSpec};
use crate::lock::LockFactory;
use crate::provider::{BackendA, BackendB, Provider, StepAlgorithm};
use crate::random::{DiversifierSource, RandomFactory};
use crate::sign::{Signer, Verifier};

/// Hashing sub-factory.
pub struct DigestFactory {
    provider: Arc<dyn Provider>,
}

impl DigestFactory {
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        self.provider.digest(data)
    }
}

/// Keyed-MAC sub-factory.
pub struct MacFactory {
    provider: Arc<dyn Provider>,
}

impl MacFactory {
    pub fn mac(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        self.provider.mac(key, data)
    }

    /// Constant-time tag comparison.
    pub fn verify_mac(&self, key: &[u8], data: &[u8], tag: &[u8]) -> Result<()> {
        let expected = self.provider.mac(key, data);
        if bool::from(expected.as_slice().ct_eq(tag)) {
            Ok(())
        } else {
            Err(Error::Security)
        }
    }
}

/// Raw AEAD sub-factory for single-step use outside a cascade.
pub struct CipherFactory {
    provider: Arc<dyn Provider>,
}

impl CipherFactory {
    /// Step algorithms the active backend offers.
    pub fn algorithms(&self) -> &'static [StepAlgorithm] {
        self.provider.step_algorithms()
    }

    pub fn supports(&self, algorithm: StepAlgorithm) -> bool {
        self.provider.supports_step(algorithm)
    }

    pub fn seal(
        &self,
        algorithm: StepAlgorithm,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        self.require(algorithm)?;
        self.provider.seal_step(algorithm, key, nonce, plaintext)
    }

    pub fn open(
        &self,
        algorithm: StepAlgorithm,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        self.require(algorithm)?;
        self.provider.open_step(algorithm, key, nonce, ciphertext)
    }

    fn require(&self, algorithm: StepAlgorithm) -> Result<()> {
        if self.provider.supports_step(algorithm) {
            Ok(())
        } else {
            Err(Error::Capability(format!(
                "{:?} is not offered by the {:?} backend",
                algorithm,
                self.provider.factory_type()
            )))
        }
    }
}

/// Asymmetric sub-factory: keypairs and the wrappers bound to them.
pub struct KeyPairFactory {
    provider: Arc<dyn Provider>,
}

impl KeyPairFactory {
    pub fn generate(&self, spec: KeyPairSpec) -> KeyPair {
        KeyPair::generate(spec)
    }

    pub fn from_public(&self, spec: KeyPairSpec, public: &[u8]) -> Result<KeyPair> {
        KeyPair::from_public(spec, public)
    }

    pub fn create_signer(&self, keypair: &KeyPair) -> Result<Signer> {
        Signer::new(keypair)
    }

    pub fn create_verifier(&self, keypair: &KeyPair) -> Result<Verifier> {
        Verifier::new(keypair)
    }

    pub fn create_encryptor(&self, keypair: &KeyPair) -> Result<Encryptor> {
        Encryptor::new(Arc::clone(&self.provider), keypair)
    }

    pub fn create_decryptor(&self, keypair: &KeyPair) -> Result<Decryptor> {
        Decryptor::new(Arc::clone(&self.provider), keypair)
    }
}

/// Keyset sub-factory.
pub struct KeySetFactory {
    provider: Arc<dyn Provider>,
    diversifiers: Arc<DiversifierSource>,
}

impl KeySetFactory {
    pub fn generate_keyset(&self, spec: KeySetSpec) -> Result<KeySet> {
        KeySet::generate(Arc::clone(&self.provider), spec, self.diversifiers.next())
    }

    /// Rebuild a keyset from previously exported material.
    pub fn derive_keyset(
        &self,
        spec: KeySetSpec,
        master: &[u8],
        diversifier: [u8; 16],
    ) -> Result<KeySet> {
        KeySet::derive(Arc::clone(&self.provider), spec, master, diversifier)
    }
}

/// The root object: owns the provider and all sub-factories.
pub struct Factory {
    factory_type: FactoryType,
    provider: Arc<dyn Provider>,
    digests: DigestFactory,
    macs: MacFactory,
    ciphers: CipherFactory,
    random: RandomFactory,
    keypairs: KeyPairFactory,
    keysets: KeySetFactory,
    locks: LockFactory,
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("factory_type", &self.factory_type)
            .finish_non_exhaustive()
    }
}

impl Factory {
    /// Build a factory from validated parameters.
    ///
    /// The backend is selected here, exactly once. A seed phrase, when
    /// present, makes keyset algorithm selection reproducible across runs;
    /// key material itself stays random.
    pub fn create(params: &FactoryParameters) -> Result<Self> {
        params.validate()?;

        let provider: Arc<dyn Provider> = match params.factory_type {
            FactoryType::BackendA => Arc::new(BackendA::new()),
            FactoryType::BackendB => Arc::new(BackendB::new()),
        };
        let diversifiers = Arc::new(DiversifierSource::new(
            params.seed_phrase.as_deref().map(seed_from_phrase),
        ));
        info!(backend = ?params.factory_type, seeded = params.seed_phrase.is_some(), "factory created");

        Ok(Self {
            factory_type: params.factory_type,
            digests: DigestFactory {
                provider: Arc::clone(&provider),
            },
            macs: MacFactory {
                provider: Arc::clone(&provider),
            },
            ciphers: CipherFactory {
                provider: Arc::clone(&provider),
            },
            random: RandomFactory::new(),
            keypairs: KeyPairFactory {
                provider: Arc::clone(&provider),
            },
            keysets: KeySetFactory {
                provider: Arc::clone(&provider),
                diversifiers: Arc::clone(&diversifiers),
            },
            locks: LockFactory::new(Arc::clone(&provider), diversifiers),
            provider,
        })
    }

    pub fn factory_type(&self) -> FactoryType {
        self.factory_type
    }

    pub fn digests(&self) -> &DigestFactory {
        &self.digests
    }

    pub fn macs(&self) -> &MacFactory {
        &self.macs
    }

    pub fn ciphers(&self) -> &CipherFactory {
        &self.ciphers
    }

    pub fn random(&self) -> &RandomFactory {
        &self.random
    }

    pub fn keypairs(&self) -> &KeyPairFactory {
        &self.keypairs
    }

    pub fn keysets(&self) -> &KeySetFactory {
        &self.keysets
    }

    pub fn locks(&self) -> &LockFactory {
        &self.locks
    }

    /// Whether the active backend can build keysets of this shape.
    pub fn supports_keyset_spec(&self, spec: &KeySetSpec) -> bool {
        spec.is_valid() && !self.provider.step_algorithms().is_empty()
    }

    /// Whether this keypair family can back signature wrappers.
    pub fn supports_signature_spec(&self, spec: KeyPairSpec) -> bool {
        spec == KeyPairSpec::Ed25519
    }

    /// Whether this keypair family can back encryptor wrappers.
    pub fn supports_encryptor_spec(&self, spec: KeyPairSpec) -> bool {
        spec == KeyPairSpec::X25519
    }
}

fn seed_from_phrase(phrase: &str) -> [u8; 32] {
    let mut seed = [0u8; 32];
    let mut hasher = blake3::Hasher::new_derive_key("tresslock v1 factory seed");
    hasher.update(phrase.as_bytes());
    hasher.finalize_xof().fill(&mut seed);
    seed
}
