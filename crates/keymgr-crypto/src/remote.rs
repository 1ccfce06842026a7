//! # Remote Keys
//!
//! A [`RemoteKey`] is a handle to a key held by a key-management service
//! (KMS or HSM). Locally it knows only the identifier and the metadata
//! declared for it; every operation is delegated through
//! [`RemoteKeyService`].
//!
//! ## Backend contract
//!
//! A backend receives a [`RemoteRequest`] (key id, payload, algorithm,
//! tags, deadline) and returns the signature, verification result or
//! transformed bytes, or a [`RemoteError`] carrying its native error code.
//! Backends are obtained per call from a [`RemoteClientFactory`] using the
//! [`RemoteConfig`] found in the execution context. [`ClientCache`] lets a
//! factory reuse one client per configuration.
//!
//! ## Configuration
//!
//! [`RemoteConfig::from_env`] reads:
//! - `KEYMGR_KMS_REGION` (optional)
//! - `KEYMGR_KMS_ENDPOINT_URL` (optional, must parse as a URL)
//! - `KEYMGR_KMS_TIMEOUT_SECS` (default: 30)
//! - `KEYMGR_KMS_GRANT_TOKENS` (optional, comma separated)

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use url::Url;

use keymgr_core::{
    Cipher, KeyAttributes, KeyError, KeyType, KeyUsage, Meta, RemoteError, SignAlgorithm,
};

use crate::key::{Key, KeyMaterial};

/// Handle to a key held by a remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteKey {
    attrs: KeyAttributes,
}

impl RemoteKey {
    /// Wrap declared attributes.
    pub fn new(attrs: KeyAttributes) -> Self {
        Self { attrs }
    }

    /// Describe a remote key from its metadata.
    pub fn describe(
        id: impl Into<String>,
        key_type: KeyType,
        key_size: usize,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        Ok(Self::new(KeyAttributes::new(id, key_type, key_size, usage)?))
    }

    /// Restrict the ciphers this key accepts.
    pub fn with_ciphers(mut self, ciphers: impl IntoIterator<Item = Cipher>) -> Self {
        self.attrs = self.attrs.with_ciphers(ciphers);
        self
    }
}

impl Key for RemoteKey {
    fn attributes(&self) -> &KeyAttributes {
        &self.attrs
    }

    // A remote handle stands for the private half when it may sign or
    // decrypt.
    fn is_private(&self) -> bool {
        self.is_symmetric()
            || self.attrs.has_usage(KeyUsage::Sign)
            || self.attrs.has_usage(KeyUsage::Decrypt)
    }

    fn material(&self) -> KeyMaterial<'_> {
        KeyMaterial::Remote(self.attrs.id())
    }

    fn is_remote(&self) -> bool {
        true
    }
}

/// Algorithm a remote request runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAlgorithm {
    /// Sign or verify.
    Sign(SignAlgorithm),
    /// Encrypt or decrypt.
    Cipher(Cipher),
}

impl std::fmt::Display for RemoteAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sign(alg) => alg.fmt(f),
            Self::Cipher(cipher) => cipher.fmt(f),
        }
    }
}

/// A single exchange with a remote backend.
#[derive(Debug, Clone)]
pub struct RemoteRequest<'a> {
    /// Backend identifier of the key.
    pub key_id: &'a str,
    /// Declared key type.
    pub key_type: KeyType,
    /// Message, plaintext or ciphertext.
    pub payload: &'a [u8],
    /// Algorithm to run.
    pub algorithm: RemoteAlgorithm,
    /// Caller tags, forwarded unmodified.
    pub tags: &'a [Meta],
    /// Deadline from the execution context.
    pub deadline: Option<Instant>,
}

/// A remote key-management endpoint.
pub trait RemoteKeyService: Send + Sync {
    /// Sign `req.payload`. Returns the raw signature.
    fn sign(&self, req: &RemoteRequest<'_>) -> Result<Vec<u8>, RemoteError>;

    /// Verify `signature` over `req.payload`.
    fn verify(&self, req: &RemoteRequest<'_>, signature: &[u8]) -> Result<bool, RemoteError>;

    /// Encrypt `req.payload`.
    fn encrypt(&self, req: &RemoteRequest<'_>) -> Result<Vec<u8>, RemoteError>;

    /// Decrypt `req.payload`.
    fn decrypt(&self, req: &RemoteRequest<'_>) -> Result<Vec<u8>, RemoteError>;

    /// Backend name for logs.
    fn service_name(&self) -> &str;
}

/// Builds backend clients from configuration.
///
/// Called once per remote operation. Factories whose clients are costly to
/// build should hand out a shared client per configuration.
pub trait RemoteClientFactory: Send + Sync {
    /// A client for `config`. Any setup work must finish by `deadline`.
    fn client(
        &self,
        config: &RemoteConfig,
        deadline: Option<Instant>,
    ) -> Result<Arc<dyn RemoteKeyService>, KeyError>;
}

/// Clients shared per [`RemoteConfig`], for factories whose clients are
/// costly to build.
pub struct ClientCache<S: ?Sized> {
    clients: Mutex<HashMap<RemoteConfig, Arc<S>>>,
}

impl<S: ?Sized> Default for ClientCache<S> {
    fn default() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for ClientCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("clients", &self.len())
            .finish()
    }
}

impl<S: ?Sized> ClientCache<S> {
    /// The client cached for `config`, or a new one from `connect`.
    ///
    /// `connect` runs without the lock held. If two callers race, the first
    /// insert wins and both get that client. Failures are not cached.
    pub fn get_or_connect(
        &self,
        config: &RemoteConfig,
        connect: impl FnOnce() -> Result<Arc<S>, KeyError>,
    ) -> Result<Arc<S>, KeyError> {
        if let Some(client) = self.lock().get(config) {
            return Ok(Arc::clone(client));
        }
        let client = connect()?;
        let mut clients = self.lock();
        Ok(Arc::clone(
            clients.entry(config.clone()).or_insert(client),
        ))
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RemoteConfig, Arc<S>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Remote backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Backend region, e.g. `eu-west-1`. `None` defers to the backend's own
    /// resolution.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override, e.g. a local KMS emulator.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Grant tokens attached to every request, ahead of per-call tags.
    #[serde(default)]
    pub grant_tokens: Vec<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            timeout_secs: default_timeout_secs(),
            grant_tokens: Vec::new(),
        }
    }
}

impl RemoteConfig {
    /// Load configuration from environment variables (see module docs).
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint_url = std::env::var("KEYMGR_KMS_ENDPOINT_URL").ok();
        if let Some(raw) = &endpoint_url {
            parse_url("KEYMGR_KMS_ENDPOINT_URL", raw)?;
        }
        let timeout_secs = match std::env::var("KEYMGR_KMS_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?,
            Err(_) => default_timeout_secs(),
        };
        Ok(Self {
            region: std::env::var("KEYMGR_KMS_REGION").ok(),
            endpoint_url,
            timeout_secs,
            grant_tokens: std::env::var("KEYMGR_KMS_GRANT_TOKENS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
        })
    }

    /// Configuration pointing at a local emulator (for testing).
    pub fn local(port: u16) -> Result<Self, ConfigError> {
        let raw = format!("http://127.0.0.1:{port}");
        parse_url("local", &raw)?;
        Ok(Self {
            region: Some("us-east-1".to_string()),
            endpoint_url: Some(raw),
            timeout_secs: 5,
            grant_tokens: Vec::new(),
        })
    }

    /// The parsed endpoint override.
    pub fn endpoint(&self) -> Result<Option<Url>, ConfigError> {
        self.endpoint_url
            .as_deref()
            .map(|raw| parse_url("endpoint_url", raw))
            .transpose()
    }

    /// Request timeout.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

fn parse_url(var: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A URL setting did not parse. Holds the setting name and the parser
    /// message.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    /// The timeout was not a whole number of seconds.
    #[error("invalid timeout {0:?}: expected whole seconds")]
    InvalidTimeout(String),
}

impl From<ConfigError> for KeyError {
    fn from(e: ConfigError) -> Self {
        KeyError::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_key_material_is_its_id() {
        let key = RemoteKey::describe("alias/signing", KeyType::EccNistP, 256, [KeyUsage::Sign])
            .unwrap();
        assert!(key.is_remote());
        assert!(key.is_private());
        assert!(matches!(key.material(), KeyMaterial::Remote("alias/signing")));
    }

    #[test]
    fn verify_only_remote_key_is_public() {
        let key = RemoteKey::describe("k", KeyType::Rsa, 2048, [KeyUsage::Verify]).unwrap();
        assert!(!key.is_private());
        let sym = RemoteKey::describe("s", KeyType::Symmetric, 256, [KeyUsage::Encrypt]).unwrap();
        assert!(sym.is_private());
    }

    #[test]
    fn remote_key_descriptor_from_json() {
        let key: RemoteKey = serde_json::from_str(
            r#"{"id":"arn:aws:kms:eu-west-1:111122223333:key/abcd","usage":["encrypt","decrypt"],
                "key_type":"symmetric","key_size":256,"ciphers":["symmetric-default"]}"#,
        )
        .unwrap();
        assert_eq!(key.key_type(), KeyType::Symmetric);
        assert!(key.can_encrypt(Cipher::SymmetricDefault));
        assert!(!key.can_sign(SignAlgorithm::RsaPssSha256));

        let bad = serde_json::from_str::<RemoteKey>(
            r#"{"id":"k","usage":["sign"],"key_type":"ecc-nist-p","key_size":512}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn local_config_is_valid() {
        let cfg = RemoteConfig::local(4566).unwrap();
        assert_eq!(
            cfg.endpoint().unwrap().unwrap().as_str(),
            "http://127.0.0.1:4566/"
        );
        assert_eq!(cfg.timeout().as_secs(), 5);
    }

    #[test]
    fn config_defaults_from_json() {
        let cfg: RemoteConfig = serde_json::from_str(r#"{"region":"eu-west-1"}"#).unwrap();
        assert_eq!(cfg.timeout_secs, 30);
        assert!(cfg.grant_tokens.is_empty());
        assert!(cfg.endpoint().unwrap().is_none());
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let cfg = RemoteConfig {
            endpoint_url: Some("not a url".to_string()),
            ..RemoteConfig::default()
        };
        assert!(matches!(cfg.endpoint(), Err(ConfigError::InvalidUrl(..))));
    }

    #[test]
    fn grant_token_lists_are_trimmed() {
        assert_eq!(split_list(" a, b ,,c"), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn config_error_becomes_configuration() {
        let err: KeyError = ConfigError::InvalidTimeout("ten".into()).into();
        assert!(matches!(err, KeyError::Configuration(_)));
    }

    // One test owns the KEYMGR_KMS_* variables; splitting it would race.
    #[test]
    fn config_from_environment() {
        const VARS: [&str; 4] = [
            "KEYMGR_KMS_REGION",
            "KEYMGR_KMS_ENDPOINT_URL",
            "KEYMGR_KMS_TIMEOUT_SECS",
            "KEYMGR_KMS_GRANT_TOKENS",
        ];
        let clear = || VARS.iter().for_each(|v| std::env::remove_var(v));

        clear();
        assert_eq!(RemoteConfig::from_env().unwrap(), RemoteConfig::default());

        std::env::set_var("KEYMGR_KMS_REGION", "eu-west-1");
        std::env::set_var("KEYMGR_KMS_ENDPOINT_URL", "http://127.0.0.1:4566");
        std::env::set_var("KEYMGR_KMS_TIMEOUT_SECS", " 12 ");
        std::env::set_var("KEYMGR_KMS_GRANT_TOKENS", "a, b");
        let cfg = RemoteConfig::from_env().unwrap();
        assert_eq!(cfg.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cfg.endpoint_url.as_deref(), Some("http://127.0.0.1:4566"));
        assert_eq!(cfg.timeout_secs, 12);
        assert_eq!(cfg.grant_tokens, vec!["a", "b"]);

        std::env::set_var("KEYMGR_KMS_TIMEOUT_SECS", "ten");
        assert!(matches!(
            RemoteConfig::from_env(),
            Err(ConfigError::InvalidTimeout(raw)) if raw == "ten"
        ));

        std::env::set_var("KEYMGR_KMS_TIMEOUT_SECS", "12");
        std::env::set_var("KEYMGR_KMS_ENDPOINT_URL", "::not-a-url");
        assert!(matches!(
            RemoteConfig::from_env(),
            Err(ConfigError::InvalidUrl(var, _)) if var == "KEYMGR_KMS_ENDPOINT_URL"
        ));

        clear();
    }

    #[test]
    fn client_cache_connects_once_per_config() {
        let cache: ClientCache<String> = ClientCache::default();
        let connects = std::cell::Cell::new(0);
        let connect = |name: &str| -> Result<Arc<String>, KeyError> {
            connects.set(connects.get() + 1);
            Ok(Arc::new(name.to_string()))
        };
        let eu = RemoteConfig {
            region: Some("eu-west-1".to_string()),
            ..RemoteConfig::default()
        };

        let first = cache.get_or_connect(&eu, || connect("eu")).unwrap();
        let again = cache.get_or_connect(&eu, || connect("unused")).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(connects.get(), 1);

        let other = cache
            .get_or_connect(&RemoteConfig::default(), || connect("default"))
            .unwrap();
        assert_eq!(other.as_str(), "default");
        assert_eq!(connects.get(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_connects_are_not_cached() {
        let cache: ClientCache<String> = ClientCache::default();
        let cfg = RemoteConfig::default();
        let err = cache
            .get_or_connect(&cfg, || Err(KeyError::Aborted("slow".into())))
            .unwrap_err();
        assert!(matches!(err, KeyError::Aborted(_)));
        assert!(cache.is_empty());
        let client = cache
            .get_or_connect(&cfg, || Ok(Arc::new("ok".to_string())))
            .unwrap();
        assert_eq!(client.as_str(), "ok");
    }
}
