//! TressLock keystore: certificate enrollment and entry transport.
//!
//! A [`KeyStoreGateway`] wraps a [`KeyStore`] and speaks the three-message
//! enrollment protocol (request, issued chain, ack) as either requester or
//! certifier. Entries travel between stores as archive-lock-wrapped export
//! streams, with credentials supplied through resolver callbacks rather
//! than prompts.

pub mod certificate;
pub mod gateway;
pub mod protocol;
pub mod store;

pub use certificate::{validate_chain, Certificate, RevocationList};
pub use gateway::{KeyStoreGateway, MacSecretResolver};
pub use protocol::{
    CertificateAck, CertificateRequest, CertificateResponse, EnrollmentState, PROTOCOL_VERSION,
};
pub use store::{KeyStore, KeyStoreEntry};
