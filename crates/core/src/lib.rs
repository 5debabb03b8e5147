//! Shared foundation for the TressLock cryptographic toolkit.
//!
//! This crate carries the pieces every other TressLock crate leans on:
//!
//! - **Error taxonomy**: one [`Error`] enum covering configuration,
//!   capability, data, security, protocol-abort and cancellation classes.
//! - **Factory configuration**: [`FactoryParameters`] selecting a provider
//!   backend and an optional security phrase.
//! - **Logging**: `tracing`-based bootstrap with plain and JSON output.
//!
//! Higher layers (keyset engine, locks, keystore gateway) live in
//! `tresslock-crypto` and `tresslock-keystore`.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{FactoryParameters, FactoryType};
pub use error::{Error, Result};
