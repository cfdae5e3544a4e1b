//! Failure taxonomy for credential resolution.
//!
//! Every failure inside the resolver and validators carries its specific
//! cause for server-side logging. [`AuthError::reason`] collapses that cause
//! into a stable [`FailureReason`] tag; the HTTP layer collapses it further
//! into a single client-facing message.

use std::fmt;

use jsonwebtoken::Algorithm;
use thiserror::Error;

use super::key_store::AlgorithmFamily;

/// Request-time authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization` header on the request.
    #[error("missing Authorization header")]
    MissingAuthorization,

    /// `Authorization` header present but not `Bearer <token>`.
    #[error("authorization scheme must be Bearer")]
    InvalidScheme,

    /// Token structure could not be decoded (segment count, base64, JSON).
    #[error("malformed token: {0}")]
    Malformed(String),

    /// No key registered for the issuer/key-id pair.
    #[error("no key registered for issuer '{issuer}' with kid '{key_id}'")]
    KeyNotFound {
        /// Issuer the lookup was made for.
        issuer: String,
        /// Effective key id (after fallback).
        key_id: String,
    },

    /// Token header declares an algorithm outside the validator's family.
    #[error("token algorithm {actual:?} not accepted by {expected} validator")]
    AlgorithmMismatch {
        /// Family the validator was built for.
        expected: AlgorithmFamily,
        /// Algorithm declared in the token header.
        actual: Algorithm,
    },

    /// Signature did not verify against the resolved key.
    #[error("invalid signature")]
    InvalidSignature,

    /// Token expired beyond the clock-skew tolerance.
    #[error("token expired")]
    TokenExpired,

    /// Issuer not allowed, not registered, or not matching after validation.
    #[error("invalid issuer: {0}")]
    InvalidIssuer(String),

    /// No token audience matched the allowed audience set.
    #[error("no accepted audience in token")]
    InvalidAudience,

    /// Verified payload is missing a mandatory claim.
    #[error("invalid claims: {0}")]
    ClaimsInvalid(String),
}

/// Stable reason tag for an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// See [`AuthError::MissingAuthorization`].
    MissingAuthorization,
    /// See [`AuthError::InvalidScheme`].
    InvalidScheme,
    /// See [`AuthError::KeyNotFound`].
    KeyNotFound,
    /// Signature failures, including algorithm mismatches.
    InvalidSignature,
    /// See [`AuthError::TokenExpired`].
    TokenExpired,
    /// See [`AuthError::InvalidIssuer`].
    InvalidIssuer,
    /// See [`AuthError::InvalidAudience`].
    InvalidAudience,
    /// Missing workspace or actor claim.
    ClaimsInvalid,
    /// Structural decode failures.
    Unknown,
}

impl FailureReason {
    /// Snake-case label used in structured log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingAuthorization => "missing_authorization",
            Self::InvalidScheme => "invalid_scheme",
            Self::KeyNotFound => "key_not_found",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenExpired => "token_expired",
            Self::InvalidIssuer => "invalid_issuer",
            Self::InvalidAudience => "invalid_audience",
            Self::ClaimsInvalid => "claims_invalid",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuthError {
    /// Classify this failure.
    ///
    /// An algorithm mismatch surfaces as [`FailureReason::InvalidSignature`]:
    /// from the caller's side it is indistinguishable from a bad signature.
    #[must_use]
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::MissingAuthorization => FailureReason::MissingAuthorization,
            Self::InvalidScheme => FailureReason::InvalidScheme,
            Self::Malformed(_) => FailureReason::Unknown,
            Self::KeyNotFound { .. } => FailureReason::KeyNotFound,
            Self::AlgorithmMismatch { .. } | Self::InvalidSignature => {
                FailureReason::InvalidSignature
            }
            Self::TokenExpired => FailureReason::TokenExpired,
            Self::InvalidIssuer(_) => FailureReason::InvalidIssuer,
            Self::InvalidAudience => FailureReason::InvalidAudience,
            Self::ClaimsInvalid(_) => FailureReason::ClaimsInvalid,
        }
    }

    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::Malformed(detail.into())
    }
}
