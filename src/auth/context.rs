//! The normalized identity handed to request handlers.

use serde::Serialize;

use super::claims::Claims;
use super::service_token::DeclaredIdentity;

/// Kind of principal behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    /// A human user authenticated by a signed token.
    User,
    /// A backend service authenticated by a shared secret.
    Service,
}

/// Trust pipeline that produced the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Signed token.
    Jwt,
    /// Opaque service-to-service token.
    S2s,
}

/// Resolved identity for one request.
///
/// Only constructible through [`AuthContext::from_claims`] and
/// [`AuthContext::service`], which keeps `actor_type == Service` exactly when
/// `auth_method == S2s`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    workspace_id: String,
    actor_id: String,
    actor_type: ActorType,
    auth_method: AuthMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client: Option<String>,
}

impl AuthContext {
    /// Identity of a user holding a verified token.
    #[must_use]
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            workspace_id: claims.workspace_id,
            actor_id: claims.actor_id,
            actor_type: ActorType::User,
            auth_method: AuthMethod::Jwt,
            issuer: Some(claims.issuer),
            client: None,
        }
    }

    /// Identity of an S2S caller.
    #[must_use]
    pub fn service(client: impl Into<String>, declared: DeclaredIdentity) -> Self {
        Self {
            workspace_id: declared.workspace_id,
            actor_id: declared.actor_id,
            actor_type: ActorType::Service,
            auth_method: AuthMethod::S2s,
            issuer: None,
            client: Some(client.into()),
        }
    }

    /// Tenant scope; empty for S2S calls that did not declare one.
    #[must_use]
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Acting principal; empty for S2S calls that did not declare one.
    #[must_use]
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// User for JWT callers, service for S2S callers.
    #[must_use]
    pub fn actor_type(&self) -> ActorType {
        self.actor_type
    }

    /// Pipeline that accepted the credential.
    #[must_use]
    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    /// Token issuer (JWT only).
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// S2S client name (S2S only).
    #[must_use]
    pub fn client(&self) -> Option<&str> {
        self.client.as_deref()
    }
}
