//! Bearer credential resolution.
//!
//! Two independent trust pipelines turn a bearer credential into an
//! [`AuthContext`]:
//!
//! - **Signed tokens** from several issuers, verified by the [`KeyResolver`]
//!   with one [`TokenValidator`] per issuer over a shared [`KeyStore`].
//! - **Opaque service tokens**, looked up in the [`ServiceTokenStore`].
//!
//! # Composition
//!
//! ```text
//! AuthConfig
//!   -> KeyStore, ServiceTokenStore          (loaded once)
//!   -> Symmetric/AsymmetricValidator        (one per issuer, shares the KeyStore)
//!   -> KeyResolver                          (issuer -> validator, allow-lists)
//!   -> gateway::auth middleware             (holds resolver + service tokens)
//! ```
//!
//! Everything is built before the listener starts and is read-only afterwards.

pub mod claims;
pub mod context;
pub mod error;
pub mod key_store;
pub mod resolver;
pub mod service_token;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;

use tracing::{info, warn};

pub use claims::Claims;
pub use context::{ActorType, AuthContext, AuthMethod};
pub use error::{AuthError, FailureReason};
pub use key_store::{AlgorithmFamily, KeyStore, KeyStoreError, PublicKey, PublicKeyKind};
pub use resolver::{DEFAULT_KEY_ID, KeyResolver, KeyResolverBuilder};
pub use service_token::{DeclaredIdentity, HeaderError, ServiceTokenStore};
pub use validator::{AsymmetricValidator, SymmetricValidator, TokenValidator};

use crate::config::AuthConfig;

/// Load every configured signing key.
///
/// # Errors
///
/// Returns [`KeyStoreError`] for the first symmetric key whose secret is
/// missing or empty, or public key that fails to parse.
pub fn build_key_store(config: &AuthConfig) -> Result<KeyStore, KeyStoreError> {
    let mut store = KeyStore::new();

    for issuer in &config.issuers {
        for key in &issuer.keys {
            match issuer.algorithm {
                AlgorithmFamily::Symmetric => {
                    let secret = key.resolve_secret().unwrap_or_default();
                    store.load_symmetric_key(&issuer.issuer, &key.kid, secret)?;
                }
                AlgorithmFamily::Asymmetric => {
                    let pem = key.resolve_public_key().unwrap_or_default();
                    store.load_asymmetric_key(&issuer.issuer, &key.kid, &pem)?;
                }
            }
        }
    }

    info!(keys = store.len(), issuers = config.issuers.len(), "Loaded signing keys");
    Ok(store)
}

/// Build the resolver with one validator per configured issuer.
#[must_use]
pub fn build_resolver(config: &AuthConfig, keys: &Arc<KeyStore>) -> KeyResolver {
    let mut builder = KeyResolver::builder()
        .allowed_issuers(config.allowed_issuers.iter().cloned())
        .allowed_audiences(config.allowed_audiences.iter().cloned());

    for issuer in &config.issuers {
        builder = match issuer.algorithm {
            AlgorithmFamily::Symmetric => builder.register(SymmetricValidator::new(
                issuer.issuer.clone(),
                Arc::clone(keys),
                config.clock_skew,
            )),
            AlgorithmFamily::Asymmetric => builder.register(AsymmetricValidator::new(
                issuer.issuer.clone(),
                Arc::clone(keys),
                config.clock_skew,
            )),
        };
    }

    builder.build()
}

/// Register every configured service token.
#[must_use]
pub fn build_service_tokens(config: &AuthConfig) -> ServiceTokenStore {
    let mut store = ServiceTokenStore::new();

    for entry in &config.service_tokens {
        if !store.register_token(&entry.resolve_token(), &entry.client) {
            warn!(client = %entry.client, "Service token is empty, not registered");
        }
    }

    info!(tokens = store.len(), "Loaded service tokens");
    store
}
