//! Configuration management

use std::{collections::HashSet, env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::{AlgorithmFamily, DEFAULT_KEY_ID};
use crate::{Error, Result};

/// Secrets shorter than this are accepted but logged.
const MIN_SECRET_LEN: usize = 32;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Trust configuration for bearer credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuers whose tokens may be accepted
    pub allowed_issuers: Vec<String>,
    /// Audiences this service answers to (any-match)
    pub allowed_audiences: Vec<String>,
    /// Grace window applied to `exp`
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,
    /// Paths that bypass authentication (default: `["/health"]`)
    pub public_paths: Vec<String>,
    /// Key material per issuer
    pub issuers: Vec<IssuerConfig>,
    /// Opaque service-to-service tokens
    pub service_tokens: Vec<ServiceTokenConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allowed_issuers: Vec::new(),
            allowed_audiences: Vec::new(),
            clock_skew: Duration::from_secs(60),
            public_paths: vec!["/health".to_string()],
            issuers: Vec::new(),
            service_tokens: Vec::new(),
        }
    }
}

/// One trusted token issuer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Value of the `iss` claim
    pub issuer: String,
    /// Family every key of this issuer belongs to
    pub algorithm: AlgorithmFamily,
    /// Keys by `kid`
    #[serde(default)]
    pub keys: Vec<SigningKeyConfig>,
}

/// One signing key of an issuer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeyConfig {
    /// Key id (default `v1`)
    #[serde(default = "default_kid")]
    pub kid: String,
    /// Shared secret for symmetric issuers (supports `env:VAR_NAME`)
    #[serde(default)]
    pub secret: Option<String>,
    /// PEM public key for asymmetric issuers (supports `env:VAR_NAME`)
    #[serde(default)]
    pub public_key: Option<String>,
}

fn default_kid() -> String {
    DEFAULT_KEY_ID.to_string()
}

/// Opaque token granted to a backend client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTokenConfig {
    /// Token value (supports `env:VAR_NAME`)
    pub token: String,
    /// Client name reported for requests using this token
    pub client: String,
}

/// Resolve a secret-bearing value.
///
/// `env:VAR_NAME` reads the variable; an unset variable resolves to an empty
/// string so it can never match a literal credential.
#[must_use]
pub fn resolve_secret(value: &str) -> String {
    match value.strip_prefix("env:") {
        Some(var_name) => env::var(var_name).unwrap_or_default(),
        None => value.to_string(),
    }
}

impl SigningKeyConfig {
    /// Resolved shared secret, if configured.
    #[must_use]
    pub fn resolve_secret(&self) -> Option<String> {
        self.secret.as_deref().map(resolve_secret)
    }

    /// Resolved PEM public key, if configured.
    #[must_use]
    pub fn resolve_public_key(&self) -> Option<String> {
        self.public_key.as_deref().map(resolve_secret)
    }
}

impl ServiceTokenConfig {
    /// Resolved token value.
    #[must_use]
    pub fn resolve_token(&self) -> String {
        resolve_secret(&self.token)
    }
}

impl AuthConfig {
    /// Reject trust configurations that cannot be served safely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for duplicate issuers, keys without material
    /// of the issuer's family, or empty symmetric secrets.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for issuer in &self.issuers {
            if issuer.issuer.is_empty() {
                return Err(Error::Config("issuer name must not be empty".into()));
            }
            if !seen.insert(issuer.issuer.as_str()) {
                return Err(Error::Config(format!(
                    "issuer '{}' configured more than once",
                    issuer.issuer
                )));
            }
            if issuer.keys.is_empty() {
                tracing::warn!(issuer = %issuer.issuer, "Issuer has no keys; all its tokens will fail");
            }
            if !self.allowed_issuers.contains(&issuer.issuer) {
                tracing::warn!(issuer = %issuer.issuer, "Issuer has keys but is not in allowed_issuers");
            }

            for key in &issuer.keys {
                Self::validate_key(issuer, key)?;
            }
        }

        if self.allowed_audiences.is_empty() && !self.allowed_issuers.is_empty() {
            tracing::warn!("allowed_audiences is empty; every signed token will be rejected");
        }

        Ok(())
    }

    fn validate_key(issuer: &IssuerConfig, key: &SigningKeyConfig) -> Result<()> {
        match issuer.algorithm {
            AlgorithmFamily::Symmetric => {
                let secret = key.resolve_secret().unwrap_or_default();
                if secret.is_empty() {
                    return Err(Error::Config(format!(
                        "issuer '{}' key '{}': symmetric key requires a non-empty secret",
                        issuer.issuer, key.kid
                    )));
                }
                if secret.len() < MIN_SECRET_LEN {
                    tracing::warn!(
                        issuer = %issuer.issuer,
                        kid = %key.kid,
                        "Symmetric secret is shorter than {MIN_SECRET_LEN} bytes"
                    );
                }
            }
            AlgorithmFamily::Asymmetric => {
                if key.resolve_public_key().unwrap_or_default().trim().is_empty() {
                    return Err(Error::Config(format!(
                        "issuer '{}' key '{}': asymmetric key requires a public_key",
                        issuer.issuer, key.kid
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or describes an unusable trust configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (TENANT_AUTHN_ prefix)
        figment = figment.merge(Env::prefixed("TENANT_AUTHN_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files must be in the process environment before expansion
        config.load_env_files();
        config.expand_env_vars()?;
        config.auth.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!("Env file not found (skipped): {expanded}");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} in key material and service tokens
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Config(e.to_string()))?;

        for issuer in &mut self.auth.issuers {
            for key in &mut issuer.keys {
                for value in [&mut key.secret, &mut key.public_key].into_iter().flatten() {
                    *value = Self::expand_string(&re, value);
                }
            }
        }
        for token in &mut self.auth.service_tokens {
            token.token = Self::expand_string(&re, &token.token);
        }
        Ok(())
    }

    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(&caps[1]).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Human-readable `Duration` (de)serialization: `"30s"`, `"5m"`, `"100ms"`, `"30"`
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as whole seconds, e.g. `"30s"`.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize `ms`, `s` or `m` suffixed values; bare numbers are seconds.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();

        // "ms" first: "100ms" also ends in 's'
        let parsed = if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>().map(|m| Duration::from_secs(m * 60))
        } else {
            s.parse::<u64>().map(Duration::from_secs)
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = r#"
server:
  port: 9090
auth:
  allowed_issuers: [acme-crm, partner-idp]
  allowed_audiences: [gateway-a]
  clock_skew: 2m
  issuers:
    - issuer: acme-crm
      algorithm: symmetric
      keys:
        - secret: "a-shared-secret-of-at-least-32-bytes!!"
    - issuer: partner-idp
      algorithm: asymmetric
      keys:
        - kid: "2024-10"
          public_key: "-----BEGIN PUBLIC KEY-----\\nabc\\n-----END PUBLIC KEY-----"
  service_tokens:
    - token: static-xyz
      client: crm-web
"#;

    #[test]
    fn auth_config_deserializes_from_yaml() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.auth.clock_skew, Duration::from_secs(120));
        assert_eq!(config.auth.public_paths, vec!["/health".to_string()]);
        assert_eq!(config.auth.issuers.len(), 2);
        // kid defaults to the fallback id
        assert_eq!(config.auth.issuers[0].keys[0].kid, "v1");
        assert_eq!(config.auth.issuers[1].algorithm, AlgorithmFamily::Asymmetric);
        assert_eq!(config.auth.service_tokens[0].client, "crm-web");
        assert!(config.auth.validate().is_ok());
    }

    #[test]
    fn load_reads_file_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authn.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.auth.allowed_issuers, vec!["acme-crm", "partner-idp"]);
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/authn.yaml"))).unwrap_err();

        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn symmetric_key_without_secret_is_rejected() {
        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.auth.issuers[0].keys[0].secret = Some("env:TENANT_AUTHN_TEST_UNSET_SECRET".into());

        let err = config.auth.validate().unwrap_err();

        assert!(err.to_string().contains("non-empty secret"));
    }

    #[test]
    fn duplicate_issuers_are_rejected() {
        let mut config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        let dup = config.auth.issuers[0].clone();
        config.auth.issuers.push(dup);

        assert!(config.auth.validate().is_err());
    }

    #[test]
    fn unset_env_reference_resolves_to_empty() {
        // an unset variable must never turn into a usable literal token
        assert_eq!(resolve_secret("env:TENANT_AUTHN_TEST_DEFINITELY_UNSET"), "");
        assert_eq!(resolve_secret("literal"), "literal");
    }

    #[test]
    fn placeholders_expand_with_defaults() {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();

        assert_eq!(
            Config::expand_string(&re, "${TENANT_AUTHN_TEST_UNSET_PLACEHOLDER:-fallback}"),
            "fallback"
        );
    }

    #[test]
    fn env_files_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("secrets.env");
        let mut f = std::fs::File::create(&env_path).unwrap();
        writeln!(f, "TENANT_AUTHN_TEST_ENV_FILE_SECRET=from_env_file").unwrap();
        drop(f);

        let config = Config {
            env_files: vec![env_path.to_string_lossy().to_string()],
            ..Default::default()
        };
        config.load_env_files();

        assert_eq!(
            resolve_secret("env:TENANT_AUTHN_TEST_ENV_FILE_SECRET"),
            "from_env_file"
        );
    }

    #[test]
    fn durations_parse_all_suffixes() {
        #[derive(Deserialize)]
        struct D(#[serde(with = "humantime_serde")] Duration);

        let parse = |s: &str| serde_json::from_value::<D>(serde_json::json!(s)).unwrap().0;

        assert_eq!(parse("100ms"), Duration::from_millis(100));
        assert_eq!(parse("30s"), Duration::from_secs(30));
        assert_eq!(parse("5m"), Duration::from_secs(300));
        assert_eq!(parse("45"), Duration::from_secs(45));
    }
}
