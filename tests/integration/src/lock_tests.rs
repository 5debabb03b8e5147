//! Password lock and archive lock behavior through the factory surface.

use crate::test_utils::{all_factories, backend_a, test_lock_spec};
use tresslock_core::Error;
use tresslock_crypto::{
    KeyPair, KeyPairSpec, KeySetSpec, PasswordLockSpec, ZipLockResolvers,
};

#[test]
fn spec_validity_and_iteration_scaling() {
    let spec = PasswordLockSpec::new(8, KeySetSpec::new(256, 1));
    assert!(spec.is_valid());
    assert_eq!(spec.num_iterations(), 8192);

    assert!(!PasswordLockSpec::new(0, KeySetSpec::new(256, 1)).is_valid());
    assert!(!PasswordLockSpec::new(65, KeySetSpec::new(256, 1)).is_valid());
    assert!(!PasswordLockSpec::new(8, KeySetSpec::new(100, 1)).is_valid());
}

#[test]
fn password_round_trip_and_uniform_failure() {
    for factory in all_factories() {
        let lock = factory
            .locks()
            .new_keyset_lock(&test_lock_spec(), "res", "Secret1!")
            .unwrap();
        let blob = lock.keyset().encrypt(b"locked payload").unwrap();

        let resolved = factory
            .locks()
            .resolve_keyset_lock(lock.bytes(), "res", "Secret1!")
            .unwrap();
        assert_eq!(resolved.keyset().decrypt(&blob).unwrap(), b"locked payload");

        assert!(matches!(
            factory
                .locks()
                .resolve_keyset_lock(lock.bytes(), "res", "WrongPass")
                .unwrap_err(),
            Error::Security
        ));
    }
}

#[test]
fn similar_locks_are_independent_but_equivalent() {
    let factory = backend_a();
    let reference = factory
        .locks()
        .new_keyset_lock(&test_lock_spec(), "res", "Secret1!")
        .unwrap();

    let first = factory.locks().similar_keyset_lock(&reference).unwrap();
    let second = factory.locks().similar_keyset_lock(&reference).unwrap();

    // Fresh salt and nonces every time
    assert_ne!(first.bytes(), reference.bytes());
    assert_ne!(second.bytes(), reference.bytes());
    assert_ne!(first.bytes(), second.bytes());

    // Yet all three resolve with the one password to the same keyset
    let blob = reference.keyset().encrypt(b"rotated").unwrap();
    for lock in [&first, &second] {
        let resolved = factory
            .locks()
            .resolve_keyset_lock(lock.bytes(), "res", "Secret1!")
            .unwrap();
        assert_eq!(resolved.keyset().decrypt(&blob).unwrap(), b"rotated");
    }
}

#[test]
fn password_zip_lock_resolves_via_callback_only() {
    let factory = backend_a();
    let created = factory
        .locks()
        .new_password_zip_lock(&test_lock_spec(), "backup.zip", "Secret1!")
        .unwrap();
    let entry = created.keyset().encrypt(b"archived bytes").unwrap();

    let mut resolvers = ZipLockResolvers::new();
    resolvers.set_password_resolver(Box::new(|source| {
        (source == "backup.zip").then(|| "Secret1!".to_string())
    }));
    let keyset = factory
        .locks()
        .resolve_zip_lock(created.lock(), "backup.zip", &resolvers)
        .unwrap();
    assert_eq!(keyset.decrypt(&entry).unwrap(), b"archived bytes");

    // A source the resolver does not recognize counts as a decline
    assert!(matches!(
        factory
            .locks()
            .resolve_zip_lock(created.lock(), "other.zip", &resolvers)
            .unwrap_err(),
        Error::Cancelled
    ));
}

#[test]
fn keypair_zip_lock_needs_the_matching_private_key() {
    let factory = backend_a();
    let recipient = KeyPair::generate(KeyPairSpec::X25519);
    let created = factory
        .locks()
        .new_keypair_zip_lock(KeySetSpec::new(256, 2), &recipient.public_only())
        .unwrap();
    let entry = created.keyset().encrypt(b"sealed for one reader").unwrap();

    let mut resolvers = ZipLockResolvers::new();
    let holder = recipient.clone();
    resolvers.set_keypair_resolver(Box::new(move |_| Some(holder.clone())));
    let keyset = factory
        .locks()
        .resolve_zip_lock(created.lock(), "transfer", &resolvers)
        .unwrap();
    assert_eq!(keyset.decrypt(&entry).unwrap(), b"sealed for one reader");

    let mut wrong = ZipLockResolvers::new();
    wrong.set_keypair_resolver(Box::new(|_| Some(KeyPair::generate(KeyPairSpec::X25519))));
    assert!(matches!(
        factory
            .locks()
            .resolve_zip_lock(created.lock(), "transfer", &wrong)
            .unwrap_err(),
        Error::Security
    ));
}
