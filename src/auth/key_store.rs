//! Signing key material, indexed by issuer and key id.
//!
//! Keys are partitioned by [`AlgorithmFamily`]: symmetric issuers share an
//! HMAC secret, asymmetric issuers publish a PEM public key. The store is
//! filled during startup through `&mut self` loaders and then frozen behind
//! an `Arc`, so request handling only ever sees the read methods.

use std::collections::HashMap;
use std::fmt;

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Cryptographic family an issuer signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmFamily {
    /// Shared secret, HMAC (`HS256`, `HS384`, `HS512`).
    Symmetric,
    /// Public key (RSA, EC or Ed25519).
    Asymmetric,
}

impl fmt::Display for AlgorithmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symmetric => f.write_str("symmetric"),
            Self::Asymmetric => f.write_str("asymmetric"),
        }
    }
}

/// Kind of a parsed public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyKind {
    /// RSA (`RS*`, `PS*`)
    Rsa,
    /// NIST curve EC (`ES256`, `ES384`)
    Ec,
    /// Ed25519 (`EdDSA`)
    Ed,
}

impl PublicKeyKind {
    /// Whether a token signed with `alg` can be checked against this key kind.
    #[must_use]
    pub fn accepts(self, alg: Algorithm) -> bool {
        match self {
            Self::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            Self::Ec => matches!(alg, Algorithm::ES256 | Algorithm::ES384),
            Self::Ed => alg == Algorithm::EdDSA,
        }
    }
}

/// A parsed public key ready for signature verification.
#[derive(Clone)]
pub struct PublicKey {
    kind: PublicKeyKind,
    key: DecodingKey,
}

impl PublicKey {
    /// The key kind.
    #[must_use]
    pub fn kind(&self) -> PublicKeyKind {
        self.kind
    }

    /// The verification key.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// Key loading failures. Fatal at startup.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// Material is not an RSA, EC or Ed25519 public key in PEM form.
    #[error("invalid public key for issuer '{issuer}' (kid '{key_id}'): {source}")]
    Parse {
        /// Issuer the key was loaded for.
        issuer: String,
        /// Key id the key was loaded under.
        key_id: String,
        /// Last parser error.
        #[source]
        source: jsonwebtoken::errors::Error,
    },

    /// Symmetric key with no secret; it would verify tokens signed with `""`.
    #[error("empty secret for issuer '{issuer}' (kid '{key_id}')")]
    EmptySecret {
        /// Issuer the key was loaded for.
        issuer: String,
        /// Key id the key was loaded under.
        key_id: String,
    },
}

/// Key material for every trusted issuer.
#[derive(Debug, Default)]
pub struct KeyStore {
    symmetric: HashMap<String, HashMap<String, Vec<u8>>>,
    asymmetric: HashMap<String, HashMap<String, PublicKey>>,
}

impl KeyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared secret. A later load for the same pair replaces it.
    pub fn load_symmetric_key(
        &mut self,
        issuer: &str,
        key_id: &str,
        secret: impl Into<Vec<u8>>,
    ) -> Result<(), KeyStoreError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(KeyStoreError::EmptySecret {
                issuer: issuer.to_string(),
                key_id: key_id.to_string(),
            });
        }

        debug!(issuer = %issuer, kid = %key_id, "Loaded symmetric key");
        self.symmetric
            .entry(issuer.to_string())
            .or_default()
            .insert(key_id.to_string(), secret);
        Ok(())
    }

    /// Parse and register a PEM-encoded public key.
    ///
    /// Literal `\n` sequences (as left behind by env files and container
    /// orchestrators) are turned back into line breaks before parsing.
    pub fn load_asymmetric_key(
        &mut self,
        issuer: &str,
        key_id: &str,
        public_key_pem: &str,
    ) -> Result<(), KeyStoreError> {
        let pem = normalize_pem(public_key_pem);
        let key = parse_public_key(pem.as_bytes()).map_err(|source| KeyStoreError::Parse {
            issuer: issuer.to_string(),
            key_id: key_id.to_string(),
            source,
        })?;

        debug!(issuer = %issuer, kid = %key_id, kind = ?key.kind, "Loaded public key");
        self.asymmetric
            .entry(issuer.to_string())
            .or_default()
            .insert(key_id.to_string(), key);
        Ok(())
    }

    /// Look up a shared secret.
    #[must_use]
    pub fn symmetric_key(&self, issuer: &str, key_id: &str) -> Option<&[u8]> {
        self.symmetric
            .get(issuer)
            .and_then(|keys| keys.get(key_id))
            .map(Vec::as_slice)
    }

    /// Look up a public key.
    #[must_use]
    pub fn asymmetric_key(&self, issuer: &str, key_id: &str) -> Option<&PublicKey> {
        self.asymmetric.get(issuer).and_then(|keys| keys.get(key_id))
    }

    /// Number of registered keys across both families.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symmetric.values().map(HashMap::len).sum::<usize>()
            + self.asymmetric.values().map(HashMap::len).sum::<usize>()
    }

    /// `true` when no key has been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_pem(raw: &str) -> String {
    raw.trim()
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .trim()
        .to_string()
}

fn parse_public_key(pem: &[u8]) -> Result<PublicKey, jsonwebtoken::errors::Error> {
    if let Ok(key) = DecodingKey::from_rsa_pem(pem) {
        return Ok(PublicKey {
            kind: PublicKeyKind::Rsa,
            key,
        });
    }
    if let Ok(key) = DecodingKey::from_ec_pem(pem) {
        return Ok(PublicKey {
            kind: PublicKeyKind::Ec,
            key,
        });
    }
    DecodingKey::from_ed_pem(pem).map(|key| PublicKey {
        kind: PublicKeyKind::Ed,
        key,
    })
}
