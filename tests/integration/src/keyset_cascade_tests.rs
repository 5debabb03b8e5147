//! End-to-end keyset cascade behavior through the factory surface.

use crate::test_utils::{all_factories, backend_a};
use tresslock_core::Error;
use tresslock_crypto::{KeySetSpec, KEYSET_KEY_LENGTHS, MAX_CIPHER_STEPS};

#[test]
fn round_trip_every_spec_on_every_backend() {
    for factory in all_factories() {
        for bits in KEYSET_KEY_LENGTHS {
            for steps in 1..=MAX_CIPHER_STEPS {
                let keyset = factory
                    .keysets()
                    .generate_keyset(KeySetSpec::new(bits, steps))
                    .unwrap();
                for payload in [&b""[..], b"x", &[0u8; 1024][..]] {
                    let blob = keyset.encrypt(payload).unwrap();
                    assert_eq!(keyset.decrypt(&blob).unwrap(), payload);
                }
            }
        }
    }
}

#[test]
fn tamper_anywhere_fails_closed() {
    let factory = backend_a();
    let keyset = factory
        .keysets()
        .generate_keyset(KeySetSpec::new(256, 3))
        .unwrap();
    let blob = keyset.encrypt(b"integration tamper target").unwrap();

    for index in 0..blob.len() {
        for bit in [0x01u8, 0x80u8] {
            let mut tampered = blob.clone();
            tampered[index] ^= bit;
            assert!(
                matches!(keyset.decrypt(&tampered).unwrap_err(), Error::Security),
                "byte {} bit {:#x} did not fail closed",
                index,
                bit
            );
        }
    }
}

#[test]
fn blobs_do_not_cross_keysets_or_backends() {
    let factories = all_factories();
    let spec = KeySetSpec::new(256, 2);
    let a = factories[0].keysets().generate_keyset(spec).unwrap();
    let b = factories[0].keysets().generate_keyset(spec).unwrap();
    let other_backend = factories[1].keysets().generate_keyset(spec).unwrap();

    let blob = a.encrypt(b"bound to one cascade").unwrap();
    assert!(matches!(b.decrypt(&blob).unwrap_err(), Error::Security));
    assert!(matches!(
        other_backend.decrypt(&blob).unwrap_err(),
        Error::Security
    ));
}

#[test]
fn exported_material_rebuilds_the_cascade() {
    let factory = backend_a();
    let spec = KeySetSpec::new(192, 2);
    let keyset = factory.keysets().generate_keyset(spec).unwrap();
    let blob = keyset.encrypt(b"survives rebuild").unwrap();

    // Derivation from the same secret and diversifier is the rebuild path
    // locks use internally; exercise it through the public factory API.
    let rebuilt = factory
        .keysets()
        .derive_keyset(spec, b"a fixed master secret", [11u8; 16])
        .unwrap();
    assert!(rebuilt.decrypt(&blob).is_err());

    let same = factory
        .keysets()
        .derive_keyset(spec, b"a fixed master secret", [11u8; 16])
        .unwrap();
    let fixed_blob = rebuilt.encrypt(b"deterministic").unwrap();
    assert_eq!(same.decrypt(&fixed_blob).unwrap(), b"deterministic");
}

#[test]
fn invalid_specs_rejected_before_any_work() {
    let factory = backend_a();
    for spec in [
        KeySetSpec::new(512, 1),
        KeySetSpec::new(256, 0),
        KeySetSpec::new(256, MAX_CIPHER_STEPS + 1),
    ] {
        assert!(!factory.supports_keyset_spec(&spec));
        assert!(matches!(
            factory.keysets().generate_keyset(spec).unwrap_err(),
            Error::Data(_)
        ));
    }
}
