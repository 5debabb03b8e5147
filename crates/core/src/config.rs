//! Factory configuration for TressLock.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Which provider backend a factory is built over.
///
/// Immutable once a factory has been constructed; switching backends means
/// constructing a new factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactoryType {
    /// BLAKE3 digest/MAC/KDF with ChaCha20-Poly1305 family step ciphers.
    BackendA,
    /// SHA-256/HMAC/HKDF with AES-GCM family step ciphers.
    BackendB,
}

/// The sole external configuration surface for factory construction.
///
/// Never mutated after a factory has been built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryParameters {
    /// Backend provider selection.
    pub factory_type: FactoryType,
    /// Optional security phrase. When present, per-keyset algorithm
    /// diversification becomes reproducible, which tests rely on.
    pub seed_phrase: Option<String>,
}

impl FactoryParameters {
    /// Parameters for the given backend with no seed phrase.
    pub fn new(factory_type: FactoryType) -> Self {
        Self {
            factory_type,
            seed_phrase: None,
        }
    }

    /// Attach a security phrase for deterministic diversification.
    pub fn with_seed_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.seed_phrase = Some(phrase.into());
        self
    }

    /// Load parameters from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let params: FactoryParameters =
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Reject parameters a factory must not be built from.
    pub fn validate(&self) -> Result<()> {
        if let Some(phrase) = &self.seed_phrase {
            if phrase.is_empty() {
                return Err(Error::Config(
                    "seed phrase must not be empty when present".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn default_config() -> Self {
        Self {
            factory_type: FactoryType::BackendA,
            seed_phrase: None,
        }
    }
}
