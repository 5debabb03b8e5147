//! In-memory keystore of alias-indexed entries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use tresslock_core::{Error, Result};
use tresslock_crypto::KeyPair;

use crate::certificate::Certificate;

/// One stored identity: an alias, its certificate chain and, when this
/// store owns the identity, its keypair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStoreEntry {
    pub alias: String,
    /// Leaf first, root last. Empty until enrollment completes.
    pub chain: Vec<Certificate>,
    /// Present for own identities, absent for imported counterparties.
    pub keypair: Option<KeyPair>,
}

impl KeyStoreEntry {
    pub fn public_key(&self) -> Option<&[u8]> {
        self.keypair
            .as_ref()
            .map(|kp| kp.public_bytes())
            .or_else(|| self.chain.first().map(|cert| cert.public_key.as_slice()))
    }
}

/// Alias-keyed entry map. Aliases are unique; inserting a duplicate is a
/// data error, never a silent overwrite.
#[derive(Default)]
pub struct KeyStore {
    entries: HashMap<String, KeyStoreEntry>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entry holding a keypair and no chain yet.
    pub fn create_keypair_entry(&mut self, alias: &str, keypair: KeyPair) -> Result<()> {
        self.insert(KeyStoreEntry {
            alias: alias.to_string(),
            chain: Vec::new(),
            keypair: Some(keypair),
        })
    }

    pub fn insert(&mut self, entry: KeyStoreEntry) -> Result<()> {
        if self.entries.contains_key(&entry.alias) {
            return Err(Error::Data(format!("duplicate alias: {}", entry.alias)));
        }
        self.entries.insert(entry.alias.clone(), entry);
        Ok(())
    }

    pub fn get(&self, alias: &str) -> Option<&KeyStoreEntry> {
        self.entries.get(alias)
    }

    pub(crate) fn get_mut(&mut self, alias: &str) -> Option<&mut KeyStoreEntry> {
        self.entries.get_mut(alias)
    }

    pub fn require(&self, alias: &str) -> Result<&KeyStoreEntry> {
        self.get(alias)
            .ok_or_else(|| Error::Data(format!("unknown alias: {}", alias)))
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    pub fn remove(&mut self, alias: &str) -> Option<KeyStoreEntry> {
        self.entries.remove(alias)
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
