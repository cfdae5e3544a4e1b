//! Tenant AuthN
//!
//! Resolves the bearer credential of a multi-tenant API request into a
//! normalized [`auth::AuthContext`].
//!
//! # Features
//!
//! - **Multi-issuer JWT**: per-issuer symmetric (HMAC) or asymmetric
//!   (RSA/EC/Ed25519) validators over a shared key store
//! - **Key-id fallback**: tokens without `kid` use the issuer's `v1` key
//! - **Issuer/audience allow-lists** with post-validation issuer cross-check
//! - **Service-to-service tokens**: static opaque secrets mapped to clients
//! - **axum middleware** with uniform, non-leaking rejection bodies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` selects `json` output;
/// anything else is human-readable text.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    }
    .map_err(|e| Error::Tracing(e.to_string()))
}
