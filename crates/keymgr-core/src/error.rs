//! # Error Types — Structured Error Hierarchy
//!
//! Defines the error types shared by every keymgr crate. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Every failure is reported synchronously to the immediate caller.
//! - Remote backend failures keep the backend's native error code and are
//!   wrapped with the identifier of the key the call was made for.
//! - Caller errors such as an unknown algorithm identifier surface as
//!   `UnsupportedAlgorithm`, never as a panic.

use thiserror::Error;

use crate::capability::KeyType;

/// Top-level error type for key modelling, codec, digest and dispatch.
#[derive(Error, Debug)]
pub enum KeyError {
    /// Algorithm identifier outside the closed enumeration, or an algorithm
    /// used in a position it cannot occupy.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key type does not belong to the algorithm family, or the key kind
    /// cannot take part in the requested operation at all.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Key size is not in the allowed list for its key type.
    #[error("unsupported key size {size} for key type {key_type}")]
    UnsupportedKeySize {
        /// The key type being constructed.
        key_type: KeyType,
        /// The rejected size in bits.
        size: usize,
    },

    /// Undecodable block, truncated structure, or wrong encoded structure
    /// for the requested key kind.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The key's usage set or algorithm compatibility forbids the operation.
    #[error("capability violation: {0}")]
    CapabilityViolation(String),

    /// A write into a hash accumulator accepted fewer bytes than requested.
    #[error("integrity failure: {0}")]
    Integrity(String),

    /// Invalid request shape, e.g. a digest with three stages.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Required configuration is absent from the execution context.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The execution context was cancelled or its deadline elapsed.
    #[error("operation aborted: {0}")]
    Aborted(String),

    /// The remote key-management backend rejected or failed the call.
    #[error("remote call for key {key_id} failed: {source}")]
    Remote {
        /// Identifier of the key the call was made for.
        key_id: String,
        /// The backend failure.
        #[source]
        source: RemoteError,
    },

    /// A local cryptographic primitive failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// IO error while reading or writing key blocks.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeyError {
    /// Wrap a backend failure with the key identifier it concerns.
    pub fn remote(key_id: impl Into<String>, source: RemoteError) -> Self {
        Self::Remote {
            key_id: key_id.into(),
            source,
        }
    }
}

/// Structured failure reported by a remote key-management backend.
///
/// `code` carries the backend's native error code (for AWS KMS the
/// exception name, e.g. `NotFoundException`) so callers and retry
/// policies can act on it without parsing `message`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed ({code}): {message}")]
pub struct RemoteError {
    /// Remote operation that failed, e.g. `Sign`.
    pub operation: String,
    /// Native backend error code.
    pub code: String,
    /// Human-readable backend message.
    pub message: String,
}

impl RemoteError {
    /// Create a remote error from its parts.
    pub fn new(
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// A response that arrived but failed validation.
    pub fn invalid_response(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(operation, "InvalidResponse", message)
    }
}
