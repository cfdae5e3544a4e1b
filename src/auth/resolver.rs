//! End-to-end trust decision for a signed token.
//!
//! ```text
//! UNVALIDATED
//!   -> HEADER_EXTRACTED     kid + iss read without verification
//!   -> ISSUER_CHECKED       iss in the allow-list
//!   -> VALIDATOR_DISPATCHED validator registered for iss
//!   -> CLAIMS_VERIFIED      signature, expiry, tenant claims; iss unchanged
//!   -> AUDIENCE_CHECKED     any aud in the allowed set
//!   -> ACCEPTED(Claims) | REJECTED(AuthError)
//! ```
//!
//! The unverified header and payload are only used to route the token to a
//! validator; nothing read there is trusted until the validator has run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::claims::Claims;
use super::error::AuthError;
use super::validator::TokenValidator;

/// Key id used when a token header carries no (or an empty) `kid`.
pub const DEFAULT_KEY_ID: &str = "v1";

/// Resolves signed tokens across all trusted issuers.
///
/// Built once through [`KeyResolverBuilder`] and immutable afterwards.
pub struct KeyResolver {
    allowed_issuers: HashSet<String>,
    allowed_audiences: HashSet<String>,
    validators: HashMap<String, Arc<dyn TokenValidator>>,
}

impl KeyResolver {
    /// Start building a resolver.
    #[must_use]
    pub fn builder() -> KeyResolverBuilder {
        KeyResolverBuilder::default()
    }

    /// Resolve `token` using the system clock.
    pub fn resolve(&self, token: &str) -> Result<Claims, AuthError> {
        self.resolve_at(token, Utc::now())
    }

    /// Resolve `token` as of `now`.
    pub fn resolve_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let unverified = peek(token)?;

        let key_id = if unverified.kid.is_empty() {
            debug!(issuer = %unverified.issuer, kid = "", effective_kid = DEFAULT_KEY_ID, "Token has no kid, using default");
            DEFAULT_KEY_ID
        } else {
            unverified.kid.as_str()
        };

        if !self.allowed_issuers.contains(&unverified.issuer) {
            return Err(AuthError::InvalidIssuer(unverified.issuer));
        }

        let Some(validator) = self.validators.get(&unverified.issuer) else {
            return Err(AuthError::InvalidIssuer(unverified.issuer));
        };

        let claims = validator.validate_at(token, key_id, now).inspect_err(|e| {
            debug!(
                issuer = %unverified.issuer,
                kid = %unverified.kid,
                effective_kid = %key_id,
                error = %e,
                "Validator rejected token"
            );
        })?;

        if claims.issuer != unverified.issuer {
            warn!(
                routed = %unverified.issuer,
                verified = %claims.issuer,
                "Verified issuer differs from routing issuer"
            );
            return Err(AuthError::InvalidIssuer(claims.issuer));
        }

        if !claims
            .audience
            .iter()
            .any(|aud| self.allowed_audiences.contains(aud))
        {
            return Err(AuthError::InvalidAudience);
        }

        Ok(claims)
    }

    /// Whether a validator is registered for `issuer`.
    #[must_use]
    pub fn has_validator(&self, issuer: &str) -> bool {
        self.validators.contains_key(issuer)
    }
}

/// Collects the allow-lists and validators for a [`KeyResolver`].
#[derive(Default)]
pub struct KeyResolverBuilder {
    allowed_issuers: HashSet<String>,
    allowed_audiences: HashSet<String>,
    validators: HashMap<String, Arc<dyn TokenValidator>>,
}

impl KeyResolverBuilder {
    /// Add issuers to the allow-list.
    #[must_use]
    pub fn allowed_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_issuers
            .extend(issuers.into_iter().map(Into::into));
        self
    }

    /// Add audiences to the allow-list.
    #[must_use]
    pub fn allowed_audiences<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_audiences
            .extend(audiences.into_iter().map(Into::into));
        self
    }

    /// Register the validator for its issuer, replacing any previous one.
    #[must_use]
    pub fn register(mut self, validator: impl TokenValidator + 'static) -> Self {
        let issuer = validator.issuer().to_string();
        if self
            .validators
            .insert(issuer.clone(), Arc::new(validator))
            .is_some()
        {
            warn!(issuer = %issuer, "Replacing previously registered validator");
        }
        self
    }

    /// Freeze into a [`KeyResolver`].
    #[must_use]
    pub fn build(self) -> KeyResolver {
        for issuer in self.validators.keys() {
            if !self.allowed_issuers.contains(issuer) {
                warn!(issuer = %issuer, "Validator registered for an issuer that is not allowed");
            }
        }

        KeyResolver {
            allowed_issuers: self.allowed_issuers,
            allowed_audiences: self.allowed_audiences,
            validators: self.validators,
        }
    }
}

/// Routing fields read from an unverified token.
#[derive(Debug, PartialEq, Eq)]
struct Unverified {
    kid: String,
    issuer: String,
}

#[derive(Deserialize)]
struct PeekHeader {
    #[serde(default)]
    kid: Option<String>,
}

#[derive(Deserialize)]
struct PeekPayload {
    #[serde(default)]
    iss: Option<String>,
}

fn peek(token: &str) -> Result<Unverified, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, _signature] = segments.as_slice() else {
        return Err(AuthError::malformed(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    let header: PeekHeader = decode_segment(header, "header")?;
    let payload: PeekPayload = decode_segment(payload, "payload")?;

    Ok(Unverified {
        kid: header.kid.unwrap_or_default(),
        issuer: payload.iss.unwrap_or_default(),
    })
}

fn decode_segment<T: DeserializeOwned>(segment: &str, part: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::malformed(format!("{part} encoding: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::malformed(format!("{part} json: {e}")))
}
