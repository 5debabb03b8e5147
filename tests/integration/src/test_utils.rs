//! Shared fixtures for the integration suite.

use std::sync::{Arc, Once};

use tresslock_core::{FactoryParameters, FactoryType};
use tresslock_crypto::{Factory, KeyPair, KeyPairSpec, KeySetSpec, PasswordLockSpec};
use tresslock_keystore::{KeyStore, KeyStoreGateway};

static LOGGING: Once = Once::new();

/// Install the tracing subscriber once for the whole suite.
///
/// The subscriber can only be set once per process, so every fixture funnels
/// through this guard.
pub fn init_logging() {
    LOGGING.call_once(|| {
        tresslock_core::logging::init();
        tracing::debug!("integration suite logging ready");
    });
}

/// A factory for each backend, for tests that must hold on both.
pub fn all_factories() -> Vec<Arc<Factory>> {
    init_logging();
    [FactoryType::BackendA, FactoryType::BackendB]
        .into_iter()
        .map(|factory_type| {
            Arc::new(
                Factory::create(&FactoryParameters::new(factory_type))
                    .expect("factory construction"),
            )
        })
        .collect()
}

pub fn backend_a() -> Arc<Factory> {
    init_logging();
    Arc::new(Factory::create(&FactoryParameters::new(FactoryType::BackendA)).expect("backend A"))
}

/// Cheap lock spec for tests: one stretch unit, two cascade steps.
pub fn test_lock_spec() -> PasswordLockSpec {
    PasswordLockSpec::new(1, KeySetSpec::new(256, 2))
}

/// A gateway whose store holds a fresh Ed25519 keypair under `alias`.
pub fn gateway_with_identity(factory: &Arc<Factory>, alias: &str) -> KeyStoreGateway {
    let mut store = KeyStore::new();
    store
        .create_keypair_entry(alias, KeyPair::generate(KeyPairSpec::Ed25519))
        .expect("fresh store accepts alias");
    KeyStoreGateway::new(Arc::clone(factory), store)
}

/// A gateway configured as certifier under the alias "certifier".
pub fn certifier_gateway(factory: &Arc<Factory>) -> KeyStoreGateway {
    let mut gateway = gateway_with_identity(factory, "certifier");
    gateway.set_certifier("certifier").expect("certifier setup");
    gateway
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_init_is_idempotent() {
        // Repeated calls must not panic on the already-set global subscriber
        init_logging();
        init_logging();
        tracing::info!("still alive after double init");
    }
}
