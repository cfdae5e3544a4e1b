//! Token minting helpers shared by the unit tests.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

pub const ES256_PRIVATE: &str = include_str!("../../tests/fixtures/es256_primary.key");
pub const ES256_PUBLIC: &str = include_str!("../../tests/fixtures/es256_primary.pub");
pub const ES256_ROGUE_PRIVATE: &str = include_str!("../../tests/fixtures/es256_rogue.key");
pub const RSA_PRIVATE: &str = include_str!("../../tests/fixtures/rs256.key");
pub const RSA_PUBLIC: &str = include_str!("../../tests/fixtures/rs256.pub");
pub const ED25519_PRIVATE: &str = include_str!("../../tests/fixtures/ed25519.key");
pub const ED25519_PUBLIC: &str = include_str!("../../tests/fixtures/ed25519.pub");

pub const HS_SECRET: &str = "a-shared-secret-of-at-least-32-bytes!!";

/// Fixed reference instant for deterministic expiry checks.
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_000_000, 0).unwrap()
}

/// Minimal valid payload for `issuer`, expiring an hour after [`now`].
pub fn claims(issuer: &str) -> Value {
    json!({
        "iss": issuer,
        "aud": ["gateway-a"],
        "iat": now().timestamp(),
        "exp": now().timestamp() + 3600,
        "workspace_id": "ws_42",
        "actor_id": "usr_7",
    })
}

pub fn hs256(secret: &str, kid: Option<&str>, claims: &Value) -> String {
    sign(
        Algorithm::HS256,
        kid,
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn es256(private_pem: &str, kid: Option<&str>, claims: &Value) -> String {
    let key = EncodingKey::from_ec_pem(private_pem.as_bytes()).unwrap();
    sign(Algorithm::ES256, kid, claims, &key)
}

pub fn rsa(alg: Algorithm, kid: Option<&str>, claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(RSA_PRIVATE.as_bytes()).unwrap();
    sign(alg, kid, claims, &key)
}

pub fn eddsa(kid: Option<&str>, claims: &Value) -> String {
    let key = EncodingKey::from_ed_pem(ED25519_PRIVATE.as_bytes()).unwrap();
    sign(Algorithm::EdDSA, kid, claims, &key)
}

fn sign(alg: Algorithm, kid: Option<&str>, claims: &Value, key: &EncodingKey) -> String {
    let mut header = Header::new(alg);
    header.kid = kid.map(str::to_string);
    jsonwebtoken::encode(&header, claims, key).unwrap()
}
