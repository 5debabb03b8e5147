//! The three-message enrollment protocol across two gateways.

use crate::test_utils::{backend_a, certifier_gateway, gateway_with_identity};
use tresslock_core::Error;
use tresslock_keystore::{
    validate_chain, CertificateResponse, EnrollmentState, RevocationList,
};

#[test]
fn alice_enrolls_end_to_end() {
    let factory = backend_a();
    let mut certifier = certifier_gateway(&factory);
    let mut alice = gateway_with_identity(&factory, "alice");

    let request = alice.create_certificate_request("alice").unwrap();
    assert_eq!(
        alice.enrollment_state("alice"),
        Some(&EnrollmentState::Requested)
    );

    let response = certifier.process_certificate_request(&request).unwrap();
    let (ack, response_id) = alice.process_certificate_response(&response).unwrap();
    assert_eq!(
        alice.enrollment_state("alice"),
        Some(&EnrollmentState::ResponseReceived { response_id })
    );

    certifier.process_certificate_ack(&ack).unwrap();
    alice.process_certificate_ack(&ack).unwrap();
    assert_eq!(
        alice.enrollment_state("alice"),
        Some(&EnrollmentState::Acknowledged)
    );

    let entry = alice.store().require("alice").unwrap();
    assert_eq!(entry.chain[0].subject, "alice");
    assert_eq!(entry.chain.last().unwrap().subject, "certifier");
    validate_chain(&entry.chain, &RevocationList::new()).unwrap();
}

#[test]
fn corrupted_response_leaves_store_untouched() {
    let factory = backend_a();
    let mut certifier = certifier_gateway(&factory);
    let mut alice = gateway_with_identity(&factory, "alice");

    let request = alice.create_certificate_request("alice").unwrap();
    let response = certifier.process_certificate_request(&request).unwrap();

    let mut parsed: CertificateResponse = serde_json::from_slice(&response).unwrap();
    parsed.chain[0].signature[0] ^= 0x01;
    let corrupted = serde_json::to_vec(&parsed).unwrap();

    let err = alice.process_certificate_response(&corrupted).unwrap_err();
    assert!(matches!(err, Error::ProtocolAbort(_)));
    assert!(alice.store().require("alice").unwrap().chain.is_empty());
    assert_eq!(
        alice.enrollment_state("alice"),
        Some(&EnrollmentState::Aborted)
    );

    // The untampered response still works on a fresh attempt
    let request = alice.create_certificate_request("alice").unwrap();
    let response = certifier.process_certificate_request(&request).unwrap();
    alice.process_certificate_response(&response).unwrap();
    assert!(!alice.store().require("alice").unwrap().chain.is_empty());
}

#[test]
fn response_for_unknown_alias_aborts_cleanly() {
    let factory = backend_a();
    let mut certifier = certifier_gateway(&factory);
    let mut alice = gateway_with_identity(&factory, "alice");
    let mut bystander = gateway_with_identity(&factory, "bob");

    let request = alice.create_certificate_request("alice").unwrap();
    let response = certifier.process_certificate_request(&request).unwrap();

    // Bob never asked for anything
    assert!(matches!(
        bystander.process_certificate_response(&response).unwrap_err(),
        Error::ProtocolAbort(_)
    ));
    assert!(bystander.store().require("bob").unwrap().chain.is_empty());
}

#[test]
fn revoked_chain_is_rejected_at_response_time() {
    let factory = backend_a();
    let mut certifier = certifier_gateway(&factory);
    let mut alice = gateway_with_identity(&factory, "alice");

    let request = alice.create_certificate_request("alice").unwrap();
    let response = certifier.process_certificate_request(&request).unwrap();
    let parsed: CertificateResponse = serde_json::from_slice(&response).unwrap();

    // Alice distrusts the certifier root before processing
    alice.revoke(parsed.chain.last().unwrap().serial);
    assert!(matches!(
        alice.process_certificate_response(&response).unwrap_err(),
        Error::ProtocolAbort(_)
    ));
    assert!(alice.store().require("alice").unwrap().chain.is_empty());
}

#[test]
fn stray_ack_is_a_protocol_abort() {
    let factory = backend_a();
    let mut certifier = certifier_gateway(&factory);
    let mut alice = gateway_with_identity(&factory, "alice");

    let request = alice.create_certificate_request("alice").unwrap();
    let response = certifier.process_certificate_request(&request).unwrap();
    let (ack, _) = alice.process_certificate_response(&response).unwrap();

    certifier.process_certificate_ack(&ack).unwrap();
    // Replaying the ack at the certifier finds no issued response left
    assert!(matches!(
        certifier.process_certificate_ack(&ack).unwrap_err(),
        Error::ProtocolAbort(_)
    ));
}
