//! Token claims.
//!
//! Canonical wire names for the tenant claims are `workspace_id` and
//! `actor_id`. Older issuers send `workspaceId` / `actorId`; both spellings
//! decode to the same field. A payload carrying both spellings of one field
//! is rejected as malformed.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthError;

/// Identity claims extracted from a verified token.
///
/// A `Claims` value only exists after validation, and its `workspace_id` and
/// `actor_id` are never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claims {
    /// Tenant the actor belongs to.
    pub workspace_id: String,
    /// Acting user.
    pub actor_id: String,
    /// `iss`
    pub issuer: String,
    /// `aud`, normalized to a set.
    pub audience: BTreeSet<String>,
    /// `exp`
    pub expires_at: DateTime<Utc>,
    /// `iat`, when the issuer sends it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
}

/// `aud` is either a single string or an array of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Audience {
    One(String),
    Many(Vec<String>),
}

/// Payload as it appears on the wire, before any checks.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default, alias = "workspaceId")]
    workspace_id: Option<String>,
    #[serde(default, alias = "actorId")]
    actor_id: Option<String>,
}

impl WireClaims {
    /// The `exp` claim as a timestamp.
    pub(crate) fn expires_at(&self) -> Result<DateTime<Utc>, AuthError> {
        let exp = self
            .exp
            .ok_or_else(|| AuthError::ClaimsInvalid("missing exp".into()))?;
        DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| AuthError::ClaimsInvalid("exp out of range".into()))
    }

    /// Check the mandatory tenant claims and build [`Claims`].
    pub(crate) fn into_claims(self) -> Result<Claims, AuthError> {
        let expires_at = self.expires_at()?;
        let workspace_id = non_blank(self.workspace_id, "workspace_id")?;
        let actor_id = non_blank(self.actor_id, "actor_id")?;

        let audience = match self.aud {
            Some(Audience::One(aud)) => BTreeSet::from([aud]),
            Some(Audience::Many(auds)) => auds.into_iter().collect(),
            None => BTreeSet::new(),
        };

        Ok(Claims {
            workspace_id,
            actor_id,
            issuer: self.iss.unwrap_or_default(),
            audience,
            expires_at,
            issued_at: self.iat.and_then(|iat| DateTime::from_timestamp(iat, 0)),
        })
    }
}

fn non_blank(value: Option<String>, claim: &str) -> Result<String, AuthError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AuthError::ClaimsInvalid(format!("missing {claim}"))),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn wire(value: serde_json::Value) -> Result<WireClaims, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[test]
    fn snake_case_claims_decode() {
        let claims = wire(json!({
            "iss": "acme-crm",
            "aud": "gateway-a",
            "exp": 1_700_000_000,
            "iat": 1_699_999_000,
            "workspace_id": "ws_1",
            "actor_id": "usr_1",
        }))
        .unwrap()
        .into_claims()
        .unwrap();

        assert_eq!(claims.workspace_id, "ws_1");
        assert_eq!(claims.actor_id, "usr_1");
        assert_eq!(claims.issuer, "acme-crm");
        assert_eq!(claims.audience, BTreeSet::from(["gateway-a".to_string()]));
        assert_eq!(claims.expires_at.timestamp(), 1_700_000_000);
        assert_eq!(claims.issued_at.map(|t| t.timestamp()), Some(1_699_999_000));
    }

    #[test]
    fn camel_case_aliases_decode() {
        let claims = wire(json!({
            "iss": "acme-crm",
            "aud": ["a", "b"],
            "exp": 1_700_000_000,
            "workspaceId": "ws_1",
            "actorId": "usr_1",
        }))
        .unwrap()
        .into_claims()
        .unwrap();

        assert_eq!(claims.workspace_id, "ws_1");
        assert_eq!(claims.actor_id, "usr_1");
        assert_eq!(claims.audience.len(), 2);
        assert!(claims.issued_at.is_none());
    }

    #[test]
    fn both_spellings_of_one_claim_are_rejected() {
        let result = wire(json!({
            "exp": 1_700_000_000,
            "workspace_id": "ws_1",
            "workspaceId": "ws_2",
            "actor_id": "usr_1",
        }));

        assert!(result.is_err());
    }

    #[test]
    fn missing_or_blank_tenant_claims_fail() {
        let missing_actor = wire(json!({"exp": 1_700_000_000, "workspace_id": "ws_1"}))
            .unwrap()
            .into_claims()
            .unwrap_err();
        assert_eq!(missing_actor, AuthError::ClaimsInvalid("missing actor_id".into()));

        let blank_workspace = wire(json!({
            "exp": 1_700_000_000,
            "workspace_id": "  ",
            "actor_id": "usr_1",
        }))
        .unwrap()
        .into_claims()
        .unwrap_err();
        assert_eq!(
            blank_workspace,
            AuthError::ClaimsInvalid("missing workspace_id".into())
        );
    }

    #[test]
    fn missing_exp_fails() {
        let err = wire(json!({"workspace_id": "ws_1", "actor_id": "usr_1"}))
            .unwrap()
            .into_claims()
            .unwrap_err();

        assert_eq!(err, AuthError::ClaimsInvalid("missing exp".into()));
    }
}
