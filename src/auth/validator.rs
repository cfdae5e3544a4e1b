//! Per-issuer token validators.
//!
//! # Verification flow
//!
//! 1. Resolve the key for `(issuer, kid)` from the [`KeyStore`].
//! 2. Decode the token header and check the declared `alg` belongs to the
//!    validator's family (and, for public keys, to the key's kind).
//! 3. Verify the signature with the resolved key.
//! 4. Check `exp`, tolerating the configured clock skew.
//! 5. Require non-empty `workspace_id` and `actor_id`.
//!
//! Step 2 is implemented separately by each validator and always runs before
//! any signature math, so a token can never pick a weaker algorithm than the
//! one its issuer signs with.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};

use super::claims::{Claims, WireClaims};
use super::error::AuthError;
use super::key_store::{AlgorithmFamily, KeyStore};

/// Verifies tokens for a single issuer.
pub trait TokenValidator: Send + Sync {
    /// Issuer this validator is scoped to.
    fn issuer(&self) -> &str;

    /// Algorithm family this validator accepts.
    fn family(&self) -> AlgorithmFamily;

    /// Validate `token` against the key registered under `key_id`, as of `now`.
    fn validate_at(
        &self,
        token: &str,
        key_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthError>;

    /// Validate `token` against the key registered under `key_id`.
    fn validate(&self, token: &str, key_id: &str) -> Result<Claims, AuthError> {
        self.validate_at(token, key_id, Utc::now())
    }
}

/// HMAC validator (`HS256`, `HS384`, `HS512`).
pub struct SymmetricValidator {
    issuer: String,
    keys: Arc<KeyStore>,
    clock_skew: TimeDelta,
}

impl SymmetricValidator {
    /// Create a validator for `issuer` backed by the shared key store.
    #[must_use]
    pub fn new(issuer: impl Into<String>, keys: Arc<KeyStore>, clock_skew: Duration) -> Self {
        Self {
            issuer: issuer.into(),
            keys,
            clock_skew: skew(clock_skew),
        }
    }
}

impl TokenValidator for SymmetricValidator {
    fn issuer(&self) -> &str {
        &self.issuer
    }

    fn family(&self) -> AlgorithmFamily {
        AlgorithmFamily::Symmetric
    }

    fn validate_at(
        &self,
        token: &str,
        key_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthError> {
        let secret = self
            .keys
            .symmetric_key(&self.issuer, key_id)
            .ok_or_else(|| AuthError::KeyNotFound {
                issuer: self.issuer.clone(),
                key_id: key_id.to_string(),
            })?;

        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::malformed(format!("header: {e}")))?;
        if !matches!(
            header.alg,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::AlgorithmMismatch {
                expected: AlgorithmFamily::Symmetric,
                actual: header.alg,
            });
        }

        verify(
            token,
            &DecodingKey::from_secret(secret),
            header.alg,
            now,
            self.clock_skew,
        )
    }
}

/// Public-key validator (RSA, EC, Ed25519).
pub struct AsymmetricValidator {
    issuer: String,
    keys: Arc<KeyStore>,
    clock_skew: TimeDelta,
}

impl AsymmetricValidator {
    /// Create a validator for `issuer` backed by the shared key store.
    #[must_use]
    pub fn new(issuer: impl Into<String>, keys: Arc<KeyStore>, clock_skew: Duration) -> Self {
        Self {
            issuer: issuer.into(),
            keys,
            clock_skew: skew(clock_skew),
        }
    }
}

impl TokenValidator for AsymmetricValidator {
    fn issuer(&self) -> &str {
        &self.issuer
    }

    fn family(&self) -> AlgorithmFamily {
        AlgorithmFamily::Asymmetric
    }

    fn validate_at(
        &self,
        token: &str,
        key_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthError> {
        let key = self
            .keys
            .asymmetric_key(&self.issuer, key_id)
            .ok_or_else(|| AuthError::KeyNotFound {
                issuer: self.issuer.clone(),
                key_id: key_id.to_string(),
            })?;

        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::malformed(format!("header: {e}")))?;
        // HS* is refused here even though the public key bytes are at hand:
        // accepting it would let anyone sign with the published key.
        if !key.kind().accepts(header.alg) {
            return Err(AuthError::AlgorithmMismatch {
                expected: AlgorithmFamily::Asymmetric,
                actual: header.alg,
            });
        }

        verify(token, key.decoding_key(), header.alg, now, self.clock_skew)
    }
}

/// Signature, expiry and mandatory-claim checks once the algorithm is pinned.
fn verify(
    token: &str,
    key: &DecodingKey,
    alg: Algorithm,
    now: DateTime<Utc>,
    clock_skew: TimeDelta,
) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(alg);
    // exp, aud and iss are checked here and in the resolver
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let wire = jsonwebtoken::decode::<WireClaims>(token, key, &validation)
        .map_err(map_decode_error)?
        .claims;

    let expires_at = wire.expires_at()?;
    if expires_at
        .checked_add_signed(clock_skew)
        .is_some_and(|deadline| now > deadline)
    {
        return Err(AuthError::TokenExpired);
    }

    wire.into_claims()
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        // header already decoded, so a JSON failure here is the payload
        ErrorKind::Json(_) => AuthError::ClaimsInvalid(err.to_string()),
        _ => AuthError::malformed(err.to_string()),
    }
}

fn skew(clock_skew: Duration) -> TimeDelta {
    TimeDelta::from_std(clock_skew).unwrap_or(TimeDelta::MAX)
}
