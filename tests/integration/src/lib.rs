//! Cross-crate integration tests for TressLock.
//!
//! This suite exercises the full surface as a caller would:
//! - keyset cascades end to end on both backends
//! - password and archive locks, including failure uniformity
//! - the three-message enrollment protocol and its atomicity guarantee
//! - lock-wrapped export/import between keystores

pub mod test_utils;

#[cfg(test)]
mod keyset_cascade_tests;

#[cfg(test)]
mod lock_tests;

#[cfg(test)]
mod enrollment_tests;

#[cfg(test)]
mod transport_tests;
