//! Opaque service-to-service tokens.
//!
//! A static registry from shared secret to client name, loaded from
//! configuration at startup. S2S callers may also declare the workspace and
//! actor they act for via `X-Workspace-Id` / `X-Actor-Id`.

use std::collections::HashMap;

use axum::http::HeaderMap;
use thiserror::Error;

/// Optional header naming the workspace an S2S call acts in.
pub const WORKSPACE_HEADER: &str = "x-workspace-id";
/// Optional header naming the actor an S2S call acts for.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// A caller-declared identity header that is present but unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// Header present but empty after trimming.
    #[error("{0} header must not be blank")]
    Blank(&'static str),
    /// Header present but not visible ASCII (non-ASCII UTF-8 included).
    #[error("{0} header contains invalid characters")]
    Invalid(&'static str),
}

/// Workspace and actor declared by an S2S caller; empty when not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredIdentity {
    /// From `X-Workspace-Id`.
    pub workspace_id: String,
    /// From `X-Actor-Id`.
    pub actor_id: String,
}

/// Registry of opaque S2S tokens.
#[derive(Debug, Default)]
pub struct ServiceTokenStore {
    tokens: HashMap<String, String>,
}

impl ServiceTokenStore {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` for `client`. Empty tokens are ignored so an unset
    /// config value can never authenticate anyone.
    ///
    /// Returns `true` if the token was registered.
    pub fn register_token(&mut self, token: &str, client: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        self.tokens.insert(token.to_string(), client.to_string());
        true
    }

    /// Client name for `token`, if registered.
    #[must_use]
    pub fn validate_token(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }

    /// Read the optional identity headers. Absent headers yield empty
    /// values; present ones must be non-blank after trimming.
    pub fn validate_optional_headers(headers: &HeaderMap) -> Result<DeclaredIdentity, HeaderError> {
        Ok(DeclaredIdentity {
            workspace_id: optional_header(headers, WORKSPACE_HEADER, "X-Workspace-Id")?,
            actor_id: optional_header(headers, ACTOR_HEADER, "X-Actor-Id")?,
        })
    }

    /// Number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn optional_header(
    headers: &HeaderMap,
    name: &str,
    display: &'static str,
) -> Result<String, HeaderError> {
    let Some(value) = headers.get(name) else {
        return Ok(String::new());
    };
    let value = value.to_str().map_err(|_| HeaderError::Invalid(display))?.trim();
    if value.is_empty() {
        return Err(HeaderError::Blank(display));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn registered_token_resolves_to_client() {
        let mut store = ServiceTokenStore::new();
        assert!(store.register_token("static-xyz", "crm-web"));

        assert_eq!(store.validate_token("static-xyz"), Some("crm-web"));
        assert_eq!(store.validate_token("static-xy"), None);
        assert_eq!(store.validate_token("STATIC-XYZ"), None);
    }

    #[test]
    fn empty_token_is_never_registered() {
        let mut store = ServiceTokenStore::new();

        assert!(!store.register_token("", "crm-web"));
        assert!(store.is_empty());
        assert_eq!(store.validate_token(""), None);
    }

    #[test]
    fn absent_headers_yield_empty_identity() {
        let identity = ServiceTokenStore::validate_optional_headers(&HeaderMap::new()).unwrap();

        assert_eq!(identity, DeclaredIdentity::default());
    }

    #[test]
    fn present_headers_are_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert(WORKSPACE_HEADER, HeaderValue::from_static(" ws_1 "));
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("svc-importer"));

        let identity = ServiceTokenStore::validate_optional_headers(&headers).unwrap();

        assert_eq!(identity.workspace_id, "ws_1");
        assert_eq!(identity.actor_id, "svc-importer");
    }

    #[test]
    fn blank_header_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert(WORKSPACE_HEADER, HeaderValue::from_static("   "));

        let err = ServiceTokenStore::validate_optional_headers(&headers).unwrap_err();

        assert_eq!(err, HeaderError::Blank("X-Workspace-Id"));
        assert_eq!(err.to_string(), "X-Workspace-Id header must not be blank");
    }

    #[test]
    fn non_ascii_header_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_bytes(b"\xffactor").unwrap());

        let err = ServiceTokenStore::validate_optional_headers(&headers).unwrap_err();

        assert_eq!(err, HeaderError::Invalid("X-Actor-Id"));
    }

    #[test]
    fn utf8_header_outside_ascii_is_an_error() {
        // GIVEN: well-formed UTF-8 that is not visible ASCII
        let mut headers = HeaderMap::new();
        headers.insert(WORKSPACE_HEADER, HeaderValue::from_bytes("wörk".as_bytes()).unwrap());

        // WHEN
        let err = ServiceTokenStore::validate_optional_headers(&headers).unwrap_err();

        // THEN: rejected the same way as raw bytes
        assert_eq!(err, HeaderError::Invalid("X-Workspace-Id"));
    }
}
