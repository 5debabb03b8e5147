//! Lock-wrapped export and import between keystores.

use std::sync::Arc;

use crate::test_utils::{backend_a, certifier_gateway, gateway_with_identity, test_lock_spec};
use tresslock_core::Error;
use tresslock_crypto::{KeyPair, KeyPairSpec, KeySetSpec};
use tresslock_keystore::{KeyStore, KeyStoreGateway};

fn enrolled_alice(factory: &Arc<tresslock_crypto::Factory>) -> KeyStoreGateway {
    let mut certifier = certifier_gateway(factory);
    let mut alice = gateway_with_identity(factory, "alice");
    let request = alice.create_certificate_request("alice").unwrap();
    let response = certifier.process_certificate_request(&request).unwrap();
    alice.process_certificate_response(&response).unwrap();
    alice
}

#[test]
fn entry_export_import_preserves_identity() {
    let factory = backend_a();
    let alice = enrolled_alice(&factory);
    let original = alice.store().require("alice").unwrap().clone();

    let lock = factory
        .locks()
        .new_password_zip_lock(&test_lock_spec(), "transfer", "Secret1!")
        .unwrap();
    let stream = alice.export_entry("alice", &lock, None).unwrap();

    let mut importer = KeyStoreGateway::new(Arc::clone(&factory), KeyStore::new());
    importer.set_password_resolver(Box::new(|_| Some("Secret1!".to_string())));
    let alias = importer.import_entry(&stream).unwrap();

    assert_eq!(alias, "alice");
    let imported = importer.store().require("alice").unwrap();
    assert_eq!(imported.chain, original.chain);
    assert_eq!(imported.public_key(), original.public_key());
}

#[test]
fn import_into_occupied_alias_is_a_data_error() {
    let factory = backend_a();
    let alice = enrolled_alice(&factory);
    let lock = factory
        .locks()
        .new_password_zip_lock(&test_lock_spec(), "transfer", "pw")
        .unwrap();
    let stream = alice.export_entry("alice", &lock, None).unwrap();

    let mut importer = gateway_with_identity(&factory, "alice");
    importer.set_password_resolver(Box::new(|_| Some("pw".to_string())));
    assert!(matches!(
        importer.import_entry(&stream).unwrap_err(),
        Error::Data(_)
    ));
}

#[test]
fn keypair_locked_export_reaches_only_the_recipient() {
    let factory = backend_a();
    let alice = enrolled_alice(&factory);
    let recipient = KeyPair::generate(KeyPairSpec::X25519);

    let lock = factory
        .locks()
        .new_keypair_zip_lock(KeySetSpec::new(256, 2), &recipient.public_only())
        .unwrap();
    let stream = alice.export_entry("alice", &lock, None).unwrap();

    let mut holder = KeyStoreGateway::new(Arc::clone(&factory), KeyStore::new());
    let private = recipient.clone();
    holder.set_lock_resolver(Box::new(move |_| Some(private.clone())));
    assert_eq!(holder.import_entry(&stream).unwrap(), "alice");

    let mut stranger = KeyStoreGateway::new(Arc::clone(&factory), KeyStore::new());
    stranger.set_lock_resolver(Box::new(|_| Some(KeyPair::generate(KeyPairSpec::X25519))));
    assert!(matches!(
        stranger.import_entry(&stream).unwrap_err(),
        Error::Security
    ));
}

#[test]
fn certificate_stream_builds_public_only_entry() {
    let factory = backend_a();
    let alice = enrolled_alice(&factory);
    let lock = factory
        .locks()
        .new_password_zip_lock(&test_lock_spec(), "trust", "pw")
        .unwrap();
    let stream = alice.export_certificates("alice", &lock, None).unwrap();

    let mut importer = KeyStoreGateway::new(Arc::clone(&factory), KeyStore::new());
    importer.set_password_resolver(Box::new(|_| Some("pw".to_string())));
    importer.import_certificates(&stream).unwrap();

    let entry = importer.store().require("alice").unwrap();
    assert!(entry.keypair.is_none());
    assert_eq!(entry.chain.len(), 2);
}

#[test]
fn counterparty_mac_binds_the_stream() {
    let factory = backend_a();
    let mut alice = enrolled_alice(&factory);
    alice.set_mac_secret_resolver(Box::new(|name| {
        (name == "bob").then(|| b"alice-bob shared secret".to_vec())
    }));

    let lock = factory
        .locks()
        .new_password_zip_lock(&test_lock_spec(), "transfer", "pw")
        .unwrap();
    let stream = alice.export_entry("alice", &lock, Some("bob")).unwrap();

    let mut bob = KeyStoreGateway::new(Arc::clone(&factory), KeyStore::new());
    bob.set_password_resolver(Box::new(|_| Some("pw".to_string())));
    bob.set_mac_secret_resolver(Box::new(|name| {
        (name == "bob").then(|| b"alice-bob shared secret".to_vec())
    }));
    assert_eq!(bob.import_entry(&stream).unwrap(), "alice");

    // No MAC secret registered: import declines rather than guessing
    let mut silent = KeyStoreGateway::new(Arc::clone(&factory), KeyStore::new());
    silent.set_password_resolver(Box::new(|_| Some("pw".to_string())));
    assert!(matches!(
        silent.import_entry(&stream).unwrap_err(),
        Error::Cancelled
    ));
}
