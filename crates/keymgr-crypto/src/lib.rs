#![deny(missing_docs)]

//! # keymgr-crypto — Keys and Key Operations
//!
//! Implements the key variants of the keymgr workspace on top of the
//! `keymgr-core` capability model:
//!
//! - **RSA** private/public keys (PSS and PKCS#1 v1.5 signatures, OAEP-SHA256
//!   encryption).
//! - **EC** private/public keys on NIST P-256/384/521 and secp256k1 (ECDSA).
//! - **Symmetric** secrets (AES-GCM, keyed digest stages).
//! - **Remote** handles delegating to a key-management service, with an
//!   AWS KMS backend behind the `aws-kms` feature.
//!
//! Around them sit the PEM codec with its partial-result decode policy, the
//! one/two-stage digest composer, and [`KeyDispatcher`], which routes every
//! operation to the local primitive or the remote backend after the key's
//! capability guard has approved it.
//!
//! ## Crate Policy
//!
//! - Depends only on `keymgr-core` internally.
//! - No mocking of cryptographic primitives in tests. Only the remote
//!   backend is replaced by an in-process service.
//! - Secret material is held in `Zeroizing` buffers or the curve crates'
//!   zeroizing types, and is redacted from `Debug` output.
//! - `unsafe` prohibited.

pub mod digester;
pub mod dispatch;
pub mod ec_key;
pub mod key;
pub mod pem;
pub mod remote;
pub mod rsa_key;
pub mod symmetric;

#[cfg(feature = "aws-kms")]
pub mod aws_kms;

pub use crate::digester::{chunked_write, DigestRequest, Digester};
pub use crate::dispatch::KeyDispatcher;
pub use crate::ec_key::{Curve, EcPrivateKey, EcPublic, EcPublicKey, EcSecret};
pub use crate::key::{AnyKey, Key, KeyMaterial, PrivateKey};
pub use crate::pem::{
    decode_any_keys, decode_blocks, load_pem_dir, BlockOutcome, PemBlock, PemEncode,
};
pub use crate::remote::{
    ClientCache, ConfigError, RemoteAlgorithm, RemoteClientFactory, RemoteConfig, RemoteKey,
    RemoteKeyService, RemoteRequest,
};
pub use crate::rsa_key::{RsaPrivateKey, RsaPublicKey};
pub use crate::symmetric::SymmetricKey;

#[cfg(feature = "aws-kms")]
pub use crate::aws_kms::{AwsKmsFactory, AwsKmsService};
