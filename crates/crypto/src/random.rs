//! Randomness and keyset diversification sources.

use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};

/// The factory's secure random source.
///
/// Thin wrapper over the operating system RNG; `OsRng` draws are safe from
/// any thread.
#[derive(Debug, Default)]
pub struct RandomFactory;

impl RandomFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn fill_bytes(&self, out: &mut [u8]) {
        OsRng.fill_bytes(out);
    }

    pub fn bytes(&self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        OsRng.fill_bytes(&mut out);
        out
    }
}

/// Hands out per-keyset diversifiers controlling step-algorithm selection.
///
/// With a seed the sequence is a deterministic function of (seed, counter),
/// so the same factory configuration reproduces the same algorithm choices;
/// without a seed every diversifier is drawn from `OsRng`.
pub(crate) struct DiversifierSource {
    seed: Option<[u8; 32]>,
    counter: AtomicU64,
}

impl DiversifierSource {
    pub(crate) fn new(seed: Option<[u8; 32]>) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(0),
        }
    }

    pub(crate) fn next(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        match &self.seed {
            Some(seed) => {
                let index = self.counter.fetch_add(1, Ordering::Relaxed);
                let mut hasher = blake3::Hasher::new_derive_key("tresslock v1 diversifier");
                hasher.update(seed);
                hasher.update(&index.to_le_bytes());
                hasher.finalize_xof().fill(&mut out);
            }
            None => OsRng.fill_bytes(&mut out),
        }
        out
    }
}
