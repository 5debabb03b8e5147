//! TressLock cryptographic engine.
//!
//! Everything starts at [`Factory::create`]: parameters select one of two
//! provider backends, and the factory hands out sub-factories for digests,
//! MACs, raw ciphers, randomness, keypairs, keysets and locks. The backend
//! choice is made once; no other component switches on it at runtime.
//!
//! The centerpiece is the keyset, a cascade of independently-keyed AEAD
//! ciphers (see [`keyset`]), and the lock layer that wraps keysets under
//! passwords or recipient keys for storage and transport.

pub mod encryptor;
pub mod factory;
pub mod keypair;
pub mod keyset;
pub mod lock;
pub mod provider;
pub mod random;
pub mod sign;
pub mod ziplock;

pub use encryptor::{Decryptor, Encryptor};
pub use factory::{
    CipherFactory, DigestFactory, Factory, KeyPairFactory, KeySetFactory, MacFactory,
};
pub use keypair::{KeyPair, KeyPairSpec};
pub use keyset::{KeySet, KeySetSpec, KEYSET_KEY_LENGTHS, MAX_CIPHER_STEPS, TAG_LEN};
pub use lock::{
    KeySetLock, LockFactory, PasswordLockSpec, MAX_K_ITERATIONS, MIN_K_ITERATIONS,
};
pub use provider::{Provider, StepAlgorithm};
pub use random::RandomFactory;
pub use sign::{Signer, Verifier};
pub use ziplock::{
    KeyPairResolver, PasswordResolver, ResolvedZipLock, ZipLock, ZipLockResolvers,
};
