//! # Capability Dispatch
//!
//! [`KeyDispatcher`] runs sign, verify, encrypt and decrypt against any
//! [`Key`]. Every call checks the key's capability guard first, so an
//! incompatible (key, algorithm) pair is rejected before any primitive or
//! backend is touched. The call is then routed on [`Key::material`]:
//!
//! - local material runs in-process;
//! - [`KeyMaterial::Remote`] goes to a backend client built by the
//!   dispatcher's [`RemoteClientFactory`] from the [`RemoteConfig`] stored
//!   in the [`ServiceContext`] under [`ConfigType::Kms`].
//!
//! Remote responses always reach the caller. Backend errors are wrapped
//! with the key identifier.

use std::sync::Arc;

use rand::rngs::OsRng;

use keymgr_core::{
    Cipher, ConfigType, KeyError, Meta, RemoteError, ServiceContext, SignAlgorithm,
};

use crate::ec_key;
use crate::key::{Key, KeyMaterial};
use crate::remote::{
    RemoteAlgorithm, RemoteClientFactory, RemoteConfig, RemoteKeyService, RemoteRequest,
};
use crate::rsa_key;
use crate::symmetric;

/// Routes key operations to local primitives or a remote backend.
#[derive(Clone, Default)]
pub struct KeyDispatcher {
    factory: Option<Arc<dyn RemoteClientFactory>>,
}

impl std::fmt::Debug for KeyDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDispatcher")
            .field("remote", &self.factory.is_some())
            .finish()
    }
}

impl KeyDispatcher {
    /// A dispatcher for local keys only. Remote keys fail with
    /// `ConfigurationMissing`.
    pub fn local() -> Self {
        Self { factory: None }
    }

    /// A dispatcher that builds remote clients with `factory`.
    pub fn with_remote(factory: Arc<dyn RemoteClientFactory>) -> Self {
        Self {
            factory: Some(factory),
        }
    }

    /// Sign `payload` with `alg`.
    pub fn sign(
        &self,
        ctx: &ServiceContext,
        payload: &[u8],
        key: &dyn Key,
        alg: SignAlgorithm,
        tags: &[Meta],
    ) -> Result<Vec<u8>, KeyError> {
        key.attributes().check_sign(alg)?;
        match key.material() {
            KeyMaterial::RsaPrivate(k) => rsa_key::sign(k, alg, payload, &mut OsRng),
            KeyMaterial::EcPrivate(k) => ec_key::sign(k, alg, payload),
            KeyMaterial::RsaPublic(_) | KeyMaterial::EcPublic(_) => {
                Err(public_material(key, "sign"))
            }
            KeyMaterial::Symmetric(_) => Err(KeyError::UnsupportedKeyType(format!(
                "symmetric key {} cannot sign",
                key.id()
            ))),
            KeyMaterial::Remote(id) => {
                let signature = self.remote(
                    ctx,
                    key,
                    id,
                    "Sign",
                    payload,
                    RemoteAlgorithm::Sign(alg),
                    tags,
                    |client, req| client.sign(req),
                )?;
                non_empty(id, "Sign", signature, "signature")
            }
        }
    }

    /// Verify `signature` over `payload`. A signature that does not verify
    /// is `Ok(false)`.
    pub fn verify(
        &self,
        ctx: &ServiceContext,
        payload: &[u8],
        signature: &[u8],
        key: &dyn Key,
        alg: SignAlgorithm,
        tags: &[Meta],
    ) -> Result<bool, KeyError> {
        key.attributes().check_verify(alg)?;
        match key.material() {
            KeyMaterial::RsaPrivate(k) => {
                rsa_key::verify(&k.to_public_key(), alg, payload, signature)
            }
            KeyMaterial::RsaPublic(k) => rsa_key::verify(k, alg, payload, signature),
            KeyMaterial::EcPrivate(k) => ec_key::verify(&k.public(), alg, payload, signature),
            KeyMaterial::EcPublic(k) => ec_key::verify(k, alg, payload, signature),
            KeyMaterial::Symmetric(_) => Err(KeyError::UnsupportedKeyType(format!(
                "symmetric key {} cannot verify",
                key.id()
            ))),
            KeyMaterial::Remote(id) => self.remote(
                ctx,
                key,
                id,
                "Verify",
                payload,
                RemoteAlgorithm::Sign(alg),
                tags,
                |client, req| client.verify(req, signature),
            ),
        }
    }

    /// Encrypt `plaintext` under `cipher`.
    pub fn encrypt(
        &self,
        ctx: &ServiceContext,
        plaintext: &[u8],
        key: &dyn Key,
        cipher: Cipher,
        tags: &[Meta],
    ) -> Result<Vec<u8>, KeyError> {
        key.attributes().check_encrypt(cipher)?;
        match key.material() {
            KeyMaterial::RsaPublic(k) => rsa_key::encrypt_oaep(k, plaintext, &mut OsRng),
            KeyMaterial::RsaPrivate(k) => {
                rsa_key::encrypt_oaep(&k.to_public_key(), plaintext, &mut OsRng)
            }
            KeyMaterial::Symmetric(secret) => symmetric::encrypt(secret, plaintext, &mut OsRng),
            KeyMaterial::EcPrivate(_) | KeyMaterial::EcPublic(_) => Err(no_cipher(key, cipher)),
            KeyMaterial::Remote(id) => {
                let ciphertext = self.remote(
                    ctx,
                    key,
                    id,
                    "Encrypt",
                    plaintext,
                    RemoteAlgorithm::Cipher(cipher),
                    tags,
                    |client, req| client.encrypt(req),
                )?;
                non_empty(id, "Encrypt", ciphertext, "ciphertext")
            }
        }
    }

    /// Decrypt `ciphertext` under `cipher`.
    pub fn decrypt(
        &self,
        ctx: &ServiceContext,
        ciphertext: &[u8],
        key: &dyn Key,
        cipher: Cipher,
        tags: &[Meta],
    ) -> Result<Vec<u8>, KeyError> {
        key.attributes().check_decrypt(cipher)?;
        match key.material() {
            KeyMaterial::RsaPrivate(k) => rsa_key::decrypt_oaep(k, ciphertext),
            KeyMaterial::Symmetric(secret) => symmetric::decrypt(secret, ciphertext),
            KeyMaterial::RsaPublic(_) => Err(public_material(key, "decrypt")),
            KeyMaterial::EcPrivate(_) | KeyMaterial::EcPublic(_) => Err(no_cipher(key, cipher)),
            KeyMaterial::Remote(id) => self.remote(
                ctx,
                key,
                id,
                "Decrypt",
                ciphertext,
                RemoteAlgorithm::Cipher(cipher),
                tags,
                |client, req| client.decrypt(req),
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn remote<T>(
        &self,
        ctx: &ServiceContext,
        key: &dyn Key,
        key_id: &str,
        operation: &str,
        payload: &[u8],
        algorithm: RemoteAlgorithm,
        tags: &[Meta],
        call: impl FnOnce(&dyn RemoteKeyService, &RemoteRequest<'_>) -> Result<T, RemoteError>,
    ) -> Result<T, KeyError> {
        ctx.check_active()?;
        let config = ctx
            .config::<RemoteConfig>(ConfigType::Kms)
            .ok_or_else(|| {
                KeyError::ConfigurationMissing("no remote configuration present".to_string())
            })?;
        let factory = self.factory.as_ref().ok_or_else(|| {
            KeyError::ConfigurationMissing("no remote client factory configured".to_string())
        })?;
        let client = factory.client(config, ctx.deadline())?;

        tracing::debug!(
            key_id = %key_id,
            operation,
            algorithm = %algorithm,
            service = client.service_name(),
            tags = tags.len(),
            "dispatching to remote key service"
        );
        let req = RemoteRequest {
            key_id,
            key_type: key.key_type(),
            payload,
            algorithm,
            tags,
            deadline: ctx.deadline(),
        };
        call(client.as_ref(), &req).map_err(|e| {
            tracing::warn!(key_id = %key_id, operation, code = %e.code, error = %e, "remote key operation failed");
            KeyError::remote(key_id, e)
        })
    }
}

fn non_empty(
    key_id: &str,
    operation: &str,
    bytes: Vec<u8>,
    what: &str,
) -> Result<Vec<u8>, KeyError> {
    if bytes.is_empty() {
        return Err(KeyError::remote(
            key_id,
            RemoteError::invalid_response(operation, format!("empty {what} returned")),
        ));
    }
    Ok(bytes)
}

fn public_material(key: &dyn Key, op: &str) -> KeyError {
    KeyError::CapabilityViolation(format!(
        "key {} holds only public material and cannot {op}",
        key.id()
    ))
}

fn no_cipher(key: &dyn Key, cipher: Cipher) -> KeyError {
    KeyError::UnsupportedKeyType(format!(
        "{} key {} has no {cipher} implementation",
        key.key_type(),
        key.id()
    ))
}
