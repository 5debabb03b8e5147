//! Keystore gateway: enrollment protocol endpoint and secure entry
//! transport.
//!
//! One gateway wraps one [`KeyStore`] and one [`Factory`]. It plays either
//! side of the three-message enrollment exchange (request, response, ack)
//! and moves entries between stores as lock-wrapped export streams.
//!
//! The requester's store is committed only inside
//! [`KeyStoreGateway::process_certificate_response`], after the issued
//! chain fully validates. Any failure on that path discards the staged
//! enrollment and leaves the store byte-for-byte as it was.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use tresslock_core::{Error, Result};
use tresslock_crypto::{
    Factory, KeyPair, KeyPairSpec, KeyPairResolver, PasswordResolver, ResolvedZipLock, Signer,
    Verifier, ZipLock, ZipLockResolvers,
};

use crate::certificate::{validate_chain, Certificate, RevocationList};
use crate::protocol::{
    check_version, decode, encode, CertificateAck, CertificateRequest, CertificateResponse,
    EnrollmentState, PROTOCOL_VERSION,
};
use crate::store::{KeyStore, KeyStoreEntry};

/// Supplies the MAC secret shared with a named counterparty, or `None` to
/// decline.
pub type MacSecretResolver = Box<dyn Fn(&str) -> Option<Vec<u8>> + Send + Sync>;

/// The signed binding a certificate request proves possession of.
#[derive(Serialize)]
struct RequestBinding<'a> {
    version: u32,
    alias: &'a str,
    public_key: &'a [u8],
}

/// Lock-wrapped transport container for entries and chains.
#[derive(Serialize, Deserialize)]
struct ExportEnvelope {
    version: u32,
    lock: ZipLock,
    counterparty: Option<String>,
    ciphertext: Vec<u8>,
    mac: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
enum ExportPayload {
    Entry(KeyStoreEntry),
    Certificates { alias: String, chain: Vec<Certificate> },
}

/// Gateway over one keystore.
pub struct KeyStoreGateway {
    factory: Arc<Factory>,
    store: KeyStore,
    states: HashMap<String, EnrollmentState>,
    pending_requests: HashMap<String, CertificateRequest>,
    issued_responses: HashMap<u64, CertificateResponse>,
    certifier: Option<String>,
    resolvers: ZipLockResolvers,
    mac_secret: Option<MacSecretResolver>,
    revoked: RevocationList,
    next_serial: u64,
}

impl KeyStoreGateway {
    pub fn new(factory: Arc<Factory>, store: KeyStore) -> Self {
        Self {
            factory,
            store,
            states: HashMap::new(),
            pending_requests: HashMap::new(),
            issued_responses: HashMap::new(),
            certifier: None,
            resolvers: ZipLockResolvers::new(),
            mac_secret: None,
            revoked: RevocationList::new(),
            next_serial: 1,
        }
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut KeyStore {
        &mut self.store
    }

    pub fn enrollment_state(&self, alias: &str) -> Option<&EnrollmentState> {
        self.states.get(alias)
    }

    pub fn revoke(&mut self, serial: u64) {
        self.revoked.revoke(serial);
    }

    /// Register the callback that supplies passwords for lock resolution.
    pub fn set_password_resolver(&mut self, resolver: PasswordResolver) {
        self.resolvers.set_password_resolver(resolver);
    }

    /// Register the callback that supplies private keypairs for
    /// keypair-based locks.
    pub fn set_lock_resolver(&mut self, resolver: KeyPairResolver) {
        self.resolvers.set_keypair_resolver(resolver);
    }

    /// Register the callback that supplies per-counterparty MAC secrets for
    /// export stream authentication.
    pub fn set_mac_secret_resolver(&mut self, resolver: MacSecretResolver) {
        self.mac_secret = Some(resolver);
    }

    /// Designate the alias that signs issued certificates.
    ///
    /// The alias must hold an Ed25519 keypair. An alias with no chain gets a
    /// self-signed root certificate attached here.
    pub fn set_certifier(&mut self, alias: &str) -> Result<()> {
        let entry = self.store.require(alias)?;
        let keypair = entry
            .keypair
            .as_ref()
            .ok_or_else(|| Error::Data(format!("certifier {} holds no keypair", alias)))?
            .clone();
        if keypair.spec() != KeyPairSpec::Ed25519 {
            return Err(Error::Data(format!(
                "certifier {} keypair cannot sign",
                alias
            )));
        }

        if entry.chain.is_empty() {
            let serial = self.take_serial();
            let root = Certificate::self_signed(alias, &keypair, serial, now_millis())?;
            if let Some(entry) = self.store.get_mut(alias) {
                entry.chain = vec![root];
            }
            info!(alias, "created self-signed certifier root");
        }
        self.certifier = Some(alias.to_string());
        Ok(())
    }

    /// Step 1, requester side: emit a self-signed request for an alias
    /// already holding a keypair.
    pub fn create_certificate_request(&mut self, alias: &str) -> Result<Vec<u8>> {
        let entry = self.store.require(alias)?;
        if !entry.chain.is_empty() {
            return Err(Error::Data(format!(
                "alias {} already has an issued certificate",
                alias
            )));
        }
        let keypair = entry
            .keypair
            .as_ref()
            .ok_or_else(|| Error::Data(format!("alias {} holds no keypair", alias)))?;
        match self.states.get(alias) {
            Some(state) if !state.is_terminal() => {
                return Err(Error::ProtocolAbort(format!(
                    "enrollment already in flight for {}",
                    alias
                )));
            }
            _ => {}
        }

        let proof = Signer::new(keypair)?.sign(&binding_bytes(alias, keypair.public_bytes())?);
        let request = CertificateRequest {
            version: PROTOCOL_VERSION,
            alias: alias.to_string(),
            public_key: keypair.public_bytes().to_vec(),
            proof,
        };
        let bytes = encode(&request)?;
        self.pending_requests.insert(alias.to_string(), request);
        self.states
            .insert(alias.to_string(), EnrollmentState::Requested);
        debug!(alias, "certificate request created");
        Ok(bytes)
    }

    /// Step 2, certifier side: verify proof of possession and issue a chain
    /// rooted at the certifier. Never mutates the requester's store.
    pub fn process_certificate_request(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
        let request: CertificateRequest = decode(bytes, "certificate request")?;
        check_version(request.version, "certificate request")?;

        let certifier = self
            .certifier
            .clone()
            .ok_or_else(|| Error::ProtocolAbort("no certifier configured".to_string()))?;

        let requester = KeyPair::from_public(KeyPairSpec::Ed25519, &request.public_key)
            .map_err(|_| Error::ProtocolAbort("malformed requester key".to_string()))?;
        Verifier::new(&requester)?
            .verify(
                &binding_bytes(&request.alias, &request.public_key)?,
                &request.proof,
            )
            .map_err(|_| Error::ProtocolAbort("proof of possession failed".to_string()))?;

        let serial = self.take_serial();
        let entry = self.store.require(&certifier)?;
        let signer_keypair = entry
            .keypair
            .as_ref()
            .ok_or_else(|| Error::ProtocolAbort("certifier keypair unavailable".to_string()))?;
        let leaf = Certificate::issued(
            &request.alias,
            &request.public_key,
            &certifier,
            signer_keypair,
            serial,
            now_millis(),
        )?;
        let mut chain = vec![leaf];
        chain.extend(entry.chain.iter().cloned());

        let response = CertificateResponse {
            version: PROTOCOL_VERSION,
            response_id: OsRng.next_u64(),
            alias: request.alias.clone(),
            chain,
        };
        let bytes = encode(&response)?;
        self.issued_responses
            .insert(response.response_id, response.clone());
        info!(alias = %request.alias, response_id = response.response_id, "certificate issued");
        Ok(bytes)
    }

    /// Step 3, requester side: validate the issued chain, commit the entry,
    /// emit the ack.
    ///
    /// Validation runs to completion before the store is touched. On any
    /// failure the staged enrollment is discarded, the alias moves to
    /// `Aborted` and the store is unchanged.
    pub fn process_certificate_response(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, u64)> {
        let response: CertificateResponse = decode(bytes, "certificate response")?;
        let alias = response.alias.clone();

        match self.validate_response(&response) {
            Ok(()) => {}
            Err(err) => {
                self.abort(&alias);
                warn!(alias = %alias, %err, "enrollment aborted");
                return Err(err);
            }
        }

        // Single commit point
        let entry = match self.store.get_mut(&alias) {
            Some(entry) => entry,
            None => {
                // Entry removed between request and response
                self.abort(&alias);
                warn!(alias = %alias, "enrollment aborted");
                return Err(Error::ProtocolAbort(format!("no staged entry for {}", alias)));
            }
        };
        entry.chain = response.chain.clone();
        self.pending_requests.remove(&alias);
        self.states.insert(
            alias.clone(),
            EnrollmentState::ResponseReceived {
                response_id: response.response_id,
            },
        );

        let ack = CertificateAck {
            version: PROTOCOL_VERSION,
            response_id: response.response_id,
            alias: alias.clone(),
        };
        info!(alias = %alias, response_id = response.response_id, "certificate chain committed");
        Ok((encode(&ack)?, response.response_id))
    }

    /// Finalize bookkeeping for an ack, on whichever side receives it.
    pub fn process_certificate_ack(&mut self, bytes: &[u8]) -> Result<()> {
        let ack: CertificateAck = decode(bytes, "certificate ack")?;
        check_version(ack.version, "certificate ack")?;

        // Certifier side: retire the matching issued response
        if let Some(response) = self.issued_responses.get(&ack.response_id) {
            if response.alias != ack.alias {
                return Err(Error::ProtocolAbort(format!(
                    "ack alias {} does not match issued response",
                    ack.alias
                )));
            }
            self.issued_responses.remove(&ack.response_id);
            debug!(alias = %ack.alias, "issued response acknowledged");
            return Ok(());
        }

        // Requester side: close out our own enrollment
        match self.states.get(&ack.alias) {
            Some(EnrollmentState::ResponseReceived { response_id })
                if *response_id == ack.response_id =>
            {
                self.states
                    .insert(ack.alias.clone(), EnrollmentState::Acknowledged);
                debug!(alias = %ack.alias, "enrollment acknowledged");
                Ok(())
            }
            _ => Err(Error::ProtocolAbort(format!(
                "unexpected ack for {}",
                ack.alias
            ))),
        }
    }

    /// Serialize one entry wrapped by the given lock.
    ///
    /// When a counterparty is named, the stream additionally carries a MAC
    /// under the secret the MAC resolver supplies for that counterparty.
    pub fn export_entry(
        &self,
        alias: &str,
        lock: &ResolvedZipLock,
        counterparty: Option<&str>,
    ) -> Result<Vec<u8>> {
        let entry = self.store.require(alias)?.clone();
        self.export(ExportPayload::Entry(entry), lock, counterparty)
    }

    /// Serialize one alias's certificate chain wrapped by the given lock.
    pub fn export_certificates(
        &self,
        alias: &str,
        lock: &ResolvedZipLock,
        counterparty: Option<&str>,
    ) -> Result<Vec<u8>> {
        let entry = self.store.require(alias)?;
        if entry.chain.is_empty() {
            return Err(Error::Data(format!("alias {} has no chain", alias)));
        }
        self.export(
            ExportPayload::Certificates {
                alias: alias.to_string(),
                chain: entry.chain.clone(),
            },
            lock,
            counterparty,
        )
    }

    /// Import an entry stream, re-resolving its lock via the registered
    /// resolvers. Returns the imported alias.
    pub fn import_entry(&mut self, bytes: &[u8]) -> Result<String> {
        match self.import(bytes)? {
            ExportPayload::Entry(entry) => {
                let alias = entry.alias.clone();
                self.store.insert(entry)?;
                info!(alias = %alias, "entry imported");
                Ok(alias)
            }
            ExportPayload::Certificates { .. } => {
                Err(Error::Data("stream carries certificates, not an entry".to_string()))
            }
        }
    }

    /// Import a certificate chain stream as a public-only entry.
    pub fn import_certificates(&mut self, bytes: &[u8]) -> Result<String> {
        match self.import(bytes)? {
            ExportPayload::Certificates { alias, chain } => {
                validate_chain(&chain, &self.revoked)?;
                self.store.insert(KeyStoreEntry {
                    alias: alias.clone(),
                    chain,
                    keypair: None,
                })?;
                info!(alias = %alias, "certificates imported");
                Ok(alias)
            }
            ExportPayload::Entry(_) => {
                Err(Error::Data("stream carries an entry, not certificates".to_string()))
            }
        }
    }

    fn export(
        &self,
        payload: ExportPayload,
        lock: &ResolvedZipLock,
        counterparty: Option<&str>,
    ) -> Result<Vec<u8>> {
        let ciphertext = lock.keyset().encrypt(&serde_json::to_vec(&payload)?)?;
        let mac = match counterparty {
            Some(name) => {
                let secret = self.mac_secret_for(name)?;
                Some(self.factory.macs().mac(&secret, &ciphertext))
            }
            None => None,
        };
        Ok(serde_json::to_vec(&ExportEnvelope {
            version: PROTOCOL_VERSION,
            lock: lock.lock().clone(),
            counterparty: counterparty.map(str::to_string),
            ciphertext,
            mac,
        })?)
    }

    fn import(&self, bytes: &[u8]) -> Result<ExportPayload> {
        let envelope: ExportEnvelope = serde_json::from_slice(bytes)
            .map_err(|_| Error::Data("malformed export stream".to_string()))?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(Error::Data(format!(
                "unsupported export stream version {}",
                envelope.version
            )));
        }

        if let Some(mac) = &envelope.mac {
            let name = envelope
                .counterparty
                .as_deref()
                .ok_or(Error::Security)?;
            let secret = self.mac_secret_for(name)?;
            self.factory
                .macs()
                .verify_mac(&secret, &envelope.ciphertext, mac)?;
        }

        let source = envelope.counterparty.as_deref().unwrap_or("import");
        let keyset = self
            .factory
            .locks()
            .resolve_zip_lock(&envelope.lock, source, &self.resolvers)?;
        let plain = keyset.decrypt(&envelope.ciphertext)?;
        serde_json::from_slice(&plain).map_err(|_| Error::Data("malformed export payload".to_string()))
    }

    fn mac_secret_for(&self, counterparty: &str) -> Result<Vec<u8>> {
        self.mac_secret
            .as_ref()
            .and_then(|resolve| resolve(counterparty))
            .ok_or(Error::Cancelled)
    }

    fn validate_response(&self, response: &CertificateResponse) -> Result<()> {
        check_version(response.version, "certificate response")?;

        match self.states.get(&response.alias) {
            Some(EnrollmentState::Requested) => {}
            _ => {
                return Err(Error::ProtocolAbort(format!(
                    "no enrollment awaiting a response for {}",
                    response.alias
                )));
            }
        }
        let pending = self.pending_requests.get(&response.alias).ok_or_else(|| {
            Error::ProtocolAbort(format!("no pending request for {}", response.alias))
        })?;

        let leaf = response
            .chain
            .first()
            .ok_or_else(|| Error::ProtocolAbort("empty issued chain".to_string()))?;
        if leaf.subject != response.alias {
            return Err(Error::ProtocolAbort(format!(
                "issued leaf names {}, expected {}",
                leaf.subject, response.alias
            )));
        }
        if leaf.public_key != pending.public_key {
            return Err(Error::ProtocolAbort(
                "issued leaf binds a different public key".to_string(),
            ));
        }
        validate_chain(&response.chain, &self.revoked)
            .map_err(|err| Error::ProtocolAbort(format!("chain validation failed: {}", err)))
    }

    fn abort(&mut self, alias: &str) {
        self.pending_requests.remove(alias);
        self.states
            .insert(alias.to_string(), EnrollmentState::Aborted);
    }

    fn take_serial(&mut self) -> u64 {
        let serial = self.next_serial;
        self.next_serial += 1;
        serial
    }
}

fn binding_bytes(alias: &str, public_key: &[u8]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&RequestBinding {
        version: PROTOCOL_VERSION,
        alias,
        public_key,
    })?)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
