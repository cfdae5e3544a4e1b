//! Error types for process composition and serving

use std::io;

use thiserror::Error;

use crate::auth::KeyStoreError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Startup and serving errors.
///
/// Request-time authentication failures are [`crate::auth::AuthError`];
/// nothing in this enum is produced while handling a request.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key material is empty or failed to parse
    #[error("Key material error: {0}")]
    KeyMaterial(#[from] KeyStoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Tracing subscriber could not be installed
    #[error("Tracing setup error: {0}")]
    Tracing(String),
}
