//! Authentication middleware
//!
//! Turns the request's bearer credential into an [`AuthContext`]:
//!
//! - `Authorization: Bearer <token>` is required (except on public paths)
//! - tokens that look like a compact JWT go to the [`KeyResolver`]
//! - anything else is looked up in the [`ServiceTokenStore`]
//!
//! The resolved context is inserted into the request extensions; handlers
//! take it with `Extension<AuthContext>`. Every trust failure is answered
//! with the same 401 body so callers cannot probe which check failed; the
//! specific reason only goes to the server log.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use crate::Result;
use crate::auth::{
    self, AuthContext, AuthError, HeaderError, KeyResolver, ServiceTokenStore,
};
use crate::config::AuthConfig;

/// Client-facing message for every signed/opaque token trust failure.
pub const TRUST_FAILURE_MESSAGE: &str = "invalid or expired token";

/// Base64url of `{"`, the start of every compact JWT header.
const JWT_PREFIX: &str = "eyJ";

/// Characters of a credential that may appear in logs.
const MASK_PREFIX_LEN: usize = 6;

/// Resolved authentication state shared by all requests.
pub struct ResolvedAuthConfig {
    resolver: KeyResolver,
    service_tokens: ServiceTokenStore,
    public_paths: Vec<String>,
}

/// How a bearer credential will be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Compact signed token
    Structured,
    /// Opaque service token
    Opaque,
}

impl ResolvedAuthConfig {
    /// Build the key store, validators, resolver and service tokens.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::KeyMaterial`] if any symmetric secret is empty or
    /// any public key fails to parse.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let keys = Arc::new(auth::build_key_store(config)?);
        let resolver = auth::build_resolver(config, &keys);
        let service_tokens = auth::build_service_tokens(config);

        Ok(Self::new(resolver, service_tokens, config.public_paths.clone()))
    }

    /// Assemble from already-built parts.
    #[must_use]
    pub fn new(
        resolver: KeyResolver,
        service_tokens: ServiceTokenStore,
        public_paths: Vec<String>,
    ) -> Self {
        Self {
            resolver,
            service_tokens,
            public_paths,
        }
    }

    /// Check if a path is public (bypasses auth)
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path.starts_with(p))
    }

    /// Resolve the request's credential using the system clock.
    pub fn authenticate(&self, headers: &HeaderMap) -> std::result::Result<AuthContext, AuthRejection> {
        self.authenticate_at(headers, Utc::now())
    }

    /// Resolve the request's credential as of `now`.
    pub fn authenticate_at(
        &self,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> std::result::Result<AuthContext, AuthRejection> {
        let token = bearer_token(headers).inspect_err(|e| {
            warn!(reason = %e.reason(), "Rejected request without usable Authorization header");
        })?;

        match classify(token) {
            CredentialKind::Structured => match self.resolver.resolve_at(token, now) {
                Ok(claims) => Ok(AuthContext::from_claims(claims)),
                Err(e) => {
                    warn!(
                        reason = %e.reason(),
                        error = %e,
                        token = %mask_token(token),
                        "Signed token rejected"
                    );
                    Err(e.into())
                }
            },
            CredentialKind::Opaque => {
                let Some(client) = self.service_tokens.validate_token(token) else {
                    warn!(
                        reason = %auth::FailureReason::InvalidSignature,
                        token = %mask_token(token),
                        "Unknown service token"
                    );
                    return Err(AuthError::InvalidSignature.into());
                };

                let declared = ServiceTokenStore::validate_optional_headers(headers).inspect_err(|e| {
                    warn!(client = %client, error = %e, "Malformed service identity header");
                })?;

                Ok(AuthContext::service(client, declared))
            }
        }
    }
}

/// Extract the credential from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> std::result::Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthorization)?
        .to_str()
        .map_err(|_| AuthError::InvalidScheme)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Ok(token)
        }
        _ => Err(AuthError::InvalidScheme),
    }
}

/// Syntactic sniff only; never a substitute for validation.
#[must_use]
pub fn classify(token: &str) -> CredentialKind {
    if token.starts_with(JWT_PREFIX) && token.matches('.').count() == 2 {
        CredentialKind::Structured
    } else {
        CredentialKind::Opaque
    }
}

/// Loggable prefix of a credential. Short credentials show at most half.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let visible = (token.chars().count() / 2).min(MASK_PREFIX_LEN);
    let prefix: String = token.chars().take(visible).collect();
    format!("{prefix}...")
}

/// Authentication middleware
pub async fn auth_middleware(
    State(auth_config): State<Arc<ResolvedAuthConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();

    if auth_config.is_public_path(path) {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    match auth_config.authenticate(request.headers()) {
        Ok(context) => {
            debug!(
                path = %path,
                method = ?context.auth_method(),
                workspace = %context.workspace_id(),
                actor = %context.actor_id(),
                "Authenticated request"
            );
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(rejection) => rejection.into_response(),
    }
}

/// A rejected request, rendered as `{"ok": false, "error": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AuthRejection {
    /// HTTP status of the rejection.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "UNAUTHORIZED",
            message: message.into(),
        }
    }
}

impl From<AuthError> for AuthRejection {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuthorization => {
                Self::unauthorized("Missing Authorization header. Use: Authorization: Bearer <token>")
            }
            AuthError::InvalidScheme => {
                Self::unauthorized("Authorization header must use the Bearer scheme")
            }
            _ => Self::unauthorized(TRUST_FAILURE_MESSAGE),
        }
    }
}

impl From<HeaderError> for AuthRejection {
    fn from(err: HeaderError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_HEADER",
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "ok": false,
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));

        if self.status == StatusCode::UNAUTHORIZED {
            (self.status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (self.status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::HeaderValue;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::service_token::WORKSPACE_HEADER;
    use crate::auth::testutil::{self, HS_SECRET};
    use crate::auth::{ActorType, AuthMethod, KeyStore, SymmetricValidator};

    fn resolved() -> ResolvedAuthConfig {
        let mut keys = KeyStore::new();
        keys.load_symmetric_key("acme-crm", "v1", HS_SECRET).unwrap();
        let resolver = KeyResolver::builder()
            .allowed_issuers(["acme-crm"])
            .allowed_audiences(["gateway-a"])
            .register(SymmetricValidator::new(
                "acme-crm",
                Arc::new(keys),
                Duration::from_secs(60),
            ))
            .build();
        let mut service_tokens = ServiceTokenStore::new();
        service_tokens.register_token("static-xyz", "crm-web");

        ResolvedAuthConfig::new(resolver, service_tokens, vec!["/health".into()])
    }

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn public_path_check() {
        let auth = resolved();

        assert!(auth.is_public_path("/health"));
        assert!(auth.is_public_path("/health/live"));
        assert!(!auth.is_public_path("/v1/whoami"));
    }

    #[test]
    fn bearer_scheme_parsing() {
        assert_eq!(bearer_token(&with_auth("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(&with_auth("bearer abc")), Ok("abc"));
        assert_eq!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingAuthorization)
        );
        for bad in ["Basic abc", "Bearer", "Bearer ", "Bearer a b", "abc"] {
            assert_eq!(bearer_token(&with_auth(bad)), Err(AuthError::InvalidScheme), "{bad:?}");
        }
    }

    #[test]
    fn classification_is_syntactic() {
        assert_eq!(classify("eyJhbGciOi.eyJzdWIi.sig"), CredentialKind::Structured);
        assert_eq!(classify("eyJhbGciOi.eyJzdWIi"), CredentialKind::Opaque);
        assert_eq!(classify("static-xyz"), CredentialKind::Opaque);
        assert_eq!(classify("abc.def.ghi"), CredentialKind::Opaque);
    }

    #[test]
    fn masking_never_reveals_the_full_credential() {
        assert_eq!(mask_token("static-xyz-0123456789"), "static...");
        assert_eq!(mask_token("abcd"), "ab...");
        assert_eq!(mask_token(""), "...");
    }

    #[test]
    fn jwt_resolves_to_user_context() {
        let token = testutil::hs256(HS_SECRET, Some("v1"), &testutil::claims("acme-crm"));

        let ctx = resolved()
            .authenticate_at(&with_auth(&format!("Bearer {token}")), testutil::now())
            .unwrap();

        assert_eq!(ctx.auth_method(), AuthMethod::Jwt);
        assert_eq!(ctx.actor_type(), ActorType::User);
        assert_eq!(ctx.workspace_id(), "ws_42");
        assert_eq!(ctx.issuer(), Some("acme-crm"));
    }

    #[test]
    fn resolving_same_credential_twice_gives_equal_contexts() {
        let auth = resolved();
        let token = testutil::hs256(HS_SECRET, None, &testutil::claims("acme-crm"));
        let jwt = with_auth(&format!("Bearer {token}"));
        let s2s = with_auth("Bearer static-xyz");

        // WHEN: each credential is resolved twice
        let first = auth.authenticate_at(&jwt, testutil::now()).unwrap();
        let second = auth.authenticate_at(&jwt, testutil::now()).unwrap();

        // THEN: the contexts are equal in every field
        assert_eq!(first, second);
        assert_eq!(
            auth.authenticate_at(&s2s, testutil::now()).unwrap(),
            auth.authenticate_at(&s2s, testutil::now()).unwrap()
        );
    }

    #[test]
    fn trust_failures_share_one_message() {
        let auth = resolved();
        let mut expired = testutil::claims("acme-crm");
        expired["exp"] = (testutil::now().timestamp() - 3600).into();
        let foreign = testutil::claims("unknown-idp");

        let rejections: Vec<AuthRejection> = [
            testutil::hs256(HS_SECRET, Some("v1"), &expired),
            testutil::hs256(HS_SECRET, Some("v1"), &foreign),
            testutil::hs256(
                "wrong-secret-wrong-secret-wrong-secret",
                Some("v1"),
                &testutil::claims("acme-crm"),
            ),
            "not-registered".to_string(),
        ]
        .iter()
        .map(|t| {
            auth.authenticate_at(&with_auth(&format!("Bearer {t}")), testutil::now())
                .unwrap_err()
        })
        .collect();

        for rejection in rejections {
            assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(rejection.message(), TRUST_FAILURE_MESSAGE);
        }
    }

    #[test]
    fn blank_s2s_header_is_bad_request() {
        let mut headers = with_auth("Bearer static-xyz");
        headers.insert(WORKSPACE_HEADER, HeaderValue::from_static("   "));

        let rejection = resolved().authenticate_at(&headers, testutil::now()).unwrap_err();

        assert_eq!(rejection.status(), StatusCode::BAD_REQUEST);
        assert_eq!(rejection.code(), "INVALID_HEADER");
    }

    #[test]
    fn blank_header_with_unknown_token_is_still_unauthorized() {
        let mut headers = with_auth("Bearer nope");
        headers.insert(WORKSPACE_HEADER, HeaderValue::from_static("   "));

        let rejection = resolved().authenticate_at(&headers, testutil::now()).unwrap_err();

        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    }
}
