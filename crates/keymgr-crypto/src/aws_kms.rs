//! # AWS KMS Backend
//!
//! [`RemoteKeyService`] over AWS KMS `Sign`, `Verify`, `Encrypt` and
//! `Decrypt`. Enabled by the `aws-kms` feature.
//!
//! The key identifier is passed through as the KMS `KeyId` (key id, ARN or
//! alias). Grant tokens come from [`RemoteConfig::grant_tokens`] followed by
//! every [`MetaName::GrantToken`] tag on the request. Each call is bounded by
//! the configured timeout, tightened by the request deadline.
//!
//! Calls block on a private current-thread Tokio runtime, so the service
//! must not be used from inside another Tokio runtime's worker thread.
//! [`AwsKmsFactory`] builds one service per distinct [`RemoteConfig`] and
//! reuses it for every later operation.
//!
//! ## Example
//!
//! ```bash
//! export KEYMGR_KMS_REGION=eu-west-1
//! # Against LocalStack:
//! export KEYMGR_KMS_ENDPOINT_URL=http://127.0.0.1:4566
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aws_sdk_kms::error::ProvideErrorMetadata;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::{EncryptionAlgorithmSpec, MessageType, SigningAlgorithmSpec};

use keymgr_core::{Cipher, KeyError, Meta, MetaName, RemoteError, SignAlgorithm};

use crate::remote::{
    ClientCache, RemoteAlgorithm, RemoteClientFactory, RemoteConfig, RemoteKeyService,
    RemoteRequest,
};

/// Builds [`AwsKmsService`] clients from a [`RemoteConfig`], one per
/// distinct configuration.
#[derive(Debug, Default)]
pub struct AwsKmsFactory {
    services: ClientCache<AwsKmsService>,
}

impl AwsKmsFactory {
    /// A factory with no connected services.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RemoteClientFactory for AwsKmsFactory {
    fn client(
        &self,
        config: &RemoteConfig,
        deadline: Option<Instant>,
    ) -> Result<Arc<dyn RemoteKeyService>, KeyError> {
        let service = self.services.get_or_connect(config, || {
            AwsKmsService::connect(config, deadline).map(Arc::new)
        })?;
        Ok(service)
    }
}

/// AWS KMS client bound to one configuration.
pub struct AwsKmsService {
    client: aws_sdk_kms::Client,
    runtime: tokio::runtime::Runtime,
    timeout: Duration,
    grant_tokens: Vec<String>,
}

impl std::fmt::Debug for AwsKmsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsKmsService")
            .field("timeout", &self.timeout)
            .field("grant_tokens", &self.grant_tokens.len())
            .finish()
    }
}

impl AwsKmsService {
    /// Load the AWS configuration (credentials from the usual provider
    /// chain) and build a KMS client. Loading is bounded by the configured
    /// timeout and `deadline`, whichever is sooner.
    pub fn connect(config: &RemoteConfig, deadline: Option<Instant>) -> Result<Self, KeyError> {
        let endpoint = config.endpoint()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| KeyError::Configuration(format!("tokio runtime: {e}")))?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(url) = endpoint {
            loader = loader.endpoint_url(url.as_str());
        }
        let budget = call_budget(config.timeout(), deadline, Instant::now());
        let sdk_config = runtime
            .block_on(async { tokio::time::timeout(budget, loader.load()).await })
            .map_err(|_| {
                KeyError::Aborted(format!(
                    "aws configuration not loaded within {} ms",
                    budget.as_millis()
                ))
            })?;
        tracing::debug!(
            region = ?config.region,
            endpoint = ?config.endpoint_url,
            "aws kms client configured"
        );

        Ok(Self {
            client: aws_sdk_kms::Client::new(&sdk_config),
            runtime,
            timeout: config.timeout(),
            grant_tokens: config.grant_tokens.clone(),
        })
    }

    fn run<T, F>(&self, operation: &str, deadline: Option<Instant>, fut: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let budget = call_budget(self.timeout, deadline, Instant::now());
        self.runtime
            .block_on(async { tokio::time::timeout(budget, fut).await })
            .map_err(|_| {
                RemoteError::new(
                    operation,
                    "Timeout",
                    format!("no response within {} ms", budget.as_millis()),
                )
            })?
    }
}

impl RemoteKeyService for AwsKmsService {
    fn sign(&self, req: &RemoteRequest<'_>) -> Result<Vec<u8>, RemoteError> {
        let spec = signing_spec(sign_algorithm(req, "Sign")?);
        let call = self
            .client
            .sign()
            .key_id(req.key_id)
            .message(Blob::new(req.payload))
            .message_type(MessageType::Raw)
            .signing_algorithm(spec)
            .set_grant_tokens(grant_tokens(&self.grant_tokens, req.tags));
        self.run("Sign", req.deadline, async move {
            let resp = call.send().await.map_err(|e| sdk_error("Sign", &e))?;
            resp.signature
                .map(Blob::into_inner)
                .ok_or_else(|| RemoteError::invalid_response("Sign", "response has no signature"))
        })
    }

    fn verify(&self, req: &RemoteRequest<'_>, signature: &[u8]) -> Result<bool, RemoteError> {
        let spec = signing_spec(sign_algorithm(req, "Verify")?);
        let call = self
            .client
            .verify()
            .key_id(req.key_id)
            .message(Blob::new(req.payload))
            .message_type(MessageType::Raw)
            .signature(Blob::new(signature))
            .signing_algorithm(spec)
            .set_grant_tokens(grant_tokens(&self.grant_tokens, req.tags));
        self.run("Verify", req.deadline, async move {
            match call.send().await {
                Ok(resp) => Ok(resp.signature_valid),
                // KMS reports a bad signature as an error.
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_kms_invalid_signature_exception()) =>
                {
                    Ok(false)
                }
                Err(e) => Err(sdk_error("Verify", &e)),
            }
        })
    }

    fn encrypt(&self, req: &RemoteRequest<'_>) -> Result<Vec<u8>, RemoteError> {
        let spec = encryption_spec(cipher(req, "Encrypt")?);
        let call = self
            .client
            .encrypt()
            .key_id(req.key_id)
            .plaintext(Blob::new(req.payload))
            .encryption_algorithm(spec)
            .set_grant_tokens(grant_tokens(&self.grant_tokens, req.tags));
        self.run("Encrypt", req.deadline, async move {
            let resp = call.send().await.map_err(|e| sdk_error("Encrypt", &e))?;
            resp.ciphertext_blob.map(Blob::into_inner).ok_or_else(|| {
                RemoteError::invalid_response("Encrypt", "response has no ciphertext")
            })
        })
    }

    fn decrypt(&self, req: &RemoteRequest<'_>) -> Result<Vec<u8>, RemoteError> {
        let spec = encryption_spec(cipher(req, "Decrypt")?);
        let call = self
            .client
            .decrypt()
            .key_id(req.key_id)
            .ciphertext_blob(Blob::new(req.payload))
            .encryption_algorithm(spec)
            .set_grant_tokens(grant_tokens(&self.grant_tokens, req.tags));
        self.run("Decrypt", req.deadline, async move {
            let resp = call.send().await.map_err(|e| sdk_error("Decrypt", &e))?;
            resp.plaintext.map(Blob::into_inner).ok_or_else(|| {
                RemoteError::invalid_response("Decrypt", "response has no plaintext")
            })
        })
    }

    fn service_name(&self) -> &str {
        "aws-kms"
    }
}

fn sign_algorithm(req: &RemoteRequest<'_>, operation: &str) -> Result<SignAlgorithm, RemoteError> {
    match req.algorithm {
        RemoteAlgorithm::Sign(alg) => Ok(alg),
        RemoteAlgorithm::Cipher(c) => Err(RemoteError::new(
            operation,
            "UnsupportedOperation",
            format!("{c} is not a signing algorithm"),
        )),
    }
}

fn cipher(req: &RemoteRequest<'_>, operation: &str) -> Result<Cipher, RemoteError> {
    match req.algorithm {
        RemoteAlgorithm::Cipher(c) => Ok(c),
        RemoteAlgorithm::Sign(alg) => Err(RemoteError::new(
            operation,
            "UnsupportedOperation",
            format!("{alg} is not a cipher"),
        )),
    }
}

fn signing_spec(alg: SignAlgorithm) -> SigningAlgorithmSpec {
    match alg {
        SignAlgorithm::RsaPssSha256 => SigningAlgorithmSpec::RsassaPssSha256,
        SignAlgorithm::RsaPssSha384 => SigningAlgorithmSpec::RsassaPssSha384,
        SignAlgorithm::RsaPssSha512 => SigningAlgorithmSpec::RsassaPssSha512,
        SignAlgorithm::RsaPkcs1V15Sha256 => SigningAlgorithmSpec::RsassaPkcs1V15Sha256,
        SignAlgorithm::RsaPkcs1V15Sha384 => SigningAlgorithmSpec::RsassaPkcs1V15Sha384,
        SignAlgorithm::RsaPkcs1V15Sha512 => SigningAlgorithmSpec::RsassaPkcs1V15Sha512,
        SignAlgorithm::EcdSha256 => SigningAlgorithmSpec::EcdsaSha256,
        SignAlgorithm::EcdSha384 => SigningAlgorithmSpec::EcdsaSha384,
        SignAlgorithm::EcdSha512 => SigningAlgorithmSpec::EcdsaSha512,
    }
}

fn encryption_spec(cipher: Cipher) -> EncryptionAlgorithmSpec {
    match cipher {
        Cipher::SymmetricDefault => EncryptionAlgorithmSpec::SymmetricDefault,
        Cipher::RsaOaepSha256 => EncryptionAlgorithmSpec::RsaesOaepSha256,
    }
}

/// Configured tokens first, then tag-supplied ones. `None` when empty.
fn grant_tokens(configured: &[String], tags: &[Meta]) -> Option<Vec<String>> {
    let tokens: Vec<String> = configured
        .iter()
        .cloned()
        .chain(Meta::values_of(tags, &MetaName::GrantToken).map(str::to_string))
        .collect();
    (!tokens.is_empty()).then_some(tokens)
}

fn call_budget(timeout: Duration, deadline: Option<Instant>, now: Instant) -> Duration {
    match deadline {
        Some(deadline) => timeout.min(deadline.saturating_duration_since(now)),
        None => timeout,
    }
}

fn sdk_error<E: ProvideErrorMetadata + std::fmt::Display>(operation: &str, e: &E) -> RemoteError {
    RemoteError::new(
        operation,
        e.code().unwrap_or("Unknown"),
        e.message().map(str::to_string).unwrap_or_else(|| e.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_signing_algorithm_has_a_kms_spec() {
        for alg in SignAlgorithm::ALL {
            let spec = signing_spec(alg);
            let name = spec.as_str().to_ascii_lowercase();
            match alg.family() {
                keymgr_core::SignFamily::Rsa => assert!(name.starts_with("rsassa")),
                keymgr_core::SignFamily::Ecd => assert!(name.starts_with("ecdsa")),
            }
        }
    }

    #[test]
    fn cipher_specs() {
        assert_eq!(
            encryption_spec(Cipher::SymmetricDefault),
            EncryptionAlgorithmSpec::SymmetricDefault
        );
        assert_eq!(
            encryption_spec(Cipher::RsaOaepSha256),
            EncryptionAlgorithmSpec::RsaesOaepSha256
        );
    }

    #[test]
    fn grant_tokens_merge_config_and_tags() {
        let tags = [
            Meta::new("request-id", "7"),
            Meta::grant_token("from-tag"),
        ];
        assert_eq!(
            grant_tokens(&["from-config".to_string()], &tags),
            Some(vec!["from-config".to_string(), "from-tag".to_string()])
        );
        assert_eq!(grant_tokens(&[], &[Meta::new("request-id", "7")]), None);
    }

    #[test]
    fn deadline_tightens_the_budget() {
        let now = Instant::now();
        let timeout = Duration::from_secs(30);
        assert_eq!(call_budget(timeout, None, now), timeout);
        assert_eq!(
            call_budget(timeout, Some(now + Duration::from_secs(2)), now),
            Duration::from_secs(2)
        );
        assert_eq!(call_budget(timeout, Some(now), now), Duration::ZERO);
    }
}
