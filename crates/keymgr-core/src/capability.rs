//! # Key Capability Model
//!
//! Attributes shared by every key variant and the closed compatibility
//! matrix that decides which algorithms a key may take part in.
//!
//! ## Compatibility rule
//!
//! A key may sign (verify) with an algorithm iff its usage set contains
//! `sign` (`verify`) and the algorithm's family matches its key type:
//!
//! | Family | Key types |
//! |---|---|
//! | RSA (PSS, PKCS#1 v1.5) | `rsa` |
//! | ECD | `ecc-nist-p`, `ecc-secg-p256k1` |
//!
//! Encryption pairs `symmetric-default` with symmetric keys and
//! `rsa-oaep-sha256` with RSA keys. A non-empty supported-cipher set further
//! restricts which of those a key accepts.
//!
//! Key sizes are checked once, when [`KeyAttributes`] is built. A
//! deserialized descriptor goes through the same validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::algorithm::{Cipher, SignAlgorithm, SignFamily};
use crate::error::KeyError;

/// Operation category a key is authorized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUsage {
    /// Produce signatures.
    Sign,
    /// Verify signatures.
    Verify,
    /// Encrypt plaintext.
    Encrypt,
    /// Decrypt ciphertext.
    Decrypt,
}

impl KeyUsage {
    /// Every usage, in declaration order.
    pub const ALL: [KeyUsage; 4] = [Self::Sign, Self::Verify, Self::Encrypt, Self::Decrypt];

    /// Returns the usage identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }
}

impl std::fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyUsage {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|u| u.as_str() == s.trim())
            .ok_or_else(|| KeyError::Configuration(format!("unknown key usage: {s}")))
    }
}

/// Kind of key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// RSA key pair.
    #[serde(rename = "rsa")]
    Rsa,
    /// NIST prime curve (P-256, P-384, P-521).
    #[serde(rename = "ecc-nist-p")]
    EccNistP,
    /// SECG secp256k1 curve.
    #[serde(rename = "ecc-secg-p256k1")]
    EccSecgP256k1,
    /// Symmetric secret. Always considered private.
    #[serde(rename = "symmetric")]
    Symmetric,
}

impl KeyType {
    /// Every key type, in declaration order.
    pub const ALL: [KeyType; 4] = [
        Self::Rsa,
        Self::EccNistP,
        Self::EccSecgP256k1,
        Self::Symmetric,
    ];

    /// Returns the key type identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::EccNistP => "ecc-nist-p",
            Self::EccSecgP256k1 => "ecc-secg-p256k1",
            Self::Symmetric => "symmetric",
        }
    }

    /// Sizes in bits a key of this type may have. Empty means unconstrained.
    pub fn allowed_sizes(&self) -> &'static [usize] {
        match self {
            Self::Rsa => &[2048, 3072, 4096],
            Self::EccNistP => &[256, 384, 521],
            Self::EccSecgP256k1 => &[256],
            Self::Symmetric => &[],
        }
    }

    /// Reject a size outside [`allowed_sizes`](Self::allowed_sizes).
    pub fn validate_size(&self, size: usize) -> Result<(), KeyError> {
        let allowed = self.allowed_sizes();
        if allowed.is_empty() || allowed.contains(&size) {
            Ok(())
        } else {
            Err(KeyError::UnsupportedKeySize {
                key_type: *self,
                size,
            })
        }
    }

    /// `true` if keys of this type may take part in the signing family.
    pub fn supports(&self, family: SignFamily) -> bool {
        match family {
            SignFamily::Rsa => matches!(self, Self::Rsa),
            SignFamily::Ecd => matches!(self, Self::EccNistP | Self::EccSecgP256k1),
        }
    }

    /// `true` if keys of this type may be used with the cipher.
    pub fn supports_cipher(&self, cipher: Cipher) -> bool {
        match cipher {
            Cipher::SymmetricDefault => matches!(self, Self::Symmetric),
            Cipher::RsaOaepSha256 => matches!(self, Self::Rsa),
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| KeyError::UnsupportedKeyType(format!("unknown key type: {s}")))
    }
}

/// Attributes common to every key: identity, usage, type, size and the
/// cipher restriction. Composed into each key variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawKeyAttributes")]
pub struct KeyAttributes {
    id: String,
    usage: BTreeSet<KeyUsage>,
    key_type: KeyType,
    key_size: usize,
    ciphers: BTreeSet<Cipher>,
}

/// Unvalidated wire form of [`KeyAttributes`].
#[derive(Deserialize)]
struct RawKeyAttributes {
    id: String,
    usage: BTreeSet<KeyUsage>,
    key_type: KeyType,
    key_size: usize,
    #[serde(default)]
    ciphers: BTreeSet<Cipher>,
}

impl TryFrom<RawKeyAttributes> for KeyAttributes {
    type Error = KeyError;

    fn try_from(raw: RawKeyAttributes) -> Result<Self, Self::Error> {
        Ok(KeyAttributes::new(raw.id, raw.key_type, raw.key_size, raw.usage)?
            .with_ciphers(raw.ciphers))
    }
}

impl KeyAttributes {
    /// Build validated attributes.
    ///
    /// Fails with `Configuration` for an empty usage set and with
    /// `UnsupportedKeySize` for a size outside the type's allowed list.
    pub fn new(
        id: impl Into<String>,
        key_type: KeyType,
        key_size: usize,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        let id = id.into();
        let usage: BTreeSet<KeyUsage> = usage.into_iter().collect();
        if usage.is_empty() {
            return Err(KeyError::Configuration(format!(
                "key {id} must declare at least one usage"
            )));
        }
        key_type.validate_size(key_size)?;
        Ok(Self {
            id,
            usage,
            key_type,
            key_size,
            ciphers: BTreeSet::new(),
        })
    }

    /// Restrict the ciphers this key accepts.
    pub fn with_ciphers(mut self, ciphers: impl IntoIterator<Item = Cipher>) -> Self {
        self.ciphers = ciphers.into_iter().collect();
        self
    }

    /// Opaque, backend-specific key identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Usages the key is authorized for.
    pub fn usage(&self) -> &BTreeSet<KeyUsage> {
        &self.usage
    }

    /// Kind of key material.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Key size in bits.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Ciphers the key is restricted to. Empty means no restriction.
    pub fn supported_ciphers(&self) -> &BTreeSet<Cipher> {
        &self.ciphers
    }

    /// `true` if the usage set contains `usage`.
    pub fn has_usage(&self, usage: KeyUsage) -> bool {
        self.usage.contains(&usage)
    }

    /// `true` if the algorithm family matches the key type.
    pub fn matches_algorithm(&self, alg: SignAlgorithm) -> bool {
        self.key_type.supports(alg.family())
    }

    /// May this key sign with `alg`?
    pub fn can_sign(&self, alg: SignAlgorithm) -> bool {
        self.has_usage(KeyUsage::Sign) && self.matches_algorithm(alg)
    }

    /// May this key verify with `alg`?
    pub fn can_verify(&self, alg: SignAlgorithm) -> bool {
        self.has_usage(KeyUsage::Verify) && self.matches_algorithm(alg)
    }

    /// [`can_sign`](Self::can_sign) for an identifier string. Unknown
    /// identifiers are `UnsupportedAlgorithm`.
    pub fn can_sign_named(&self, alg: &str) -> Result<bool, KeyError> {
        Ok(self.can_sign(alg.parse()?))
    }

    /// [`can_verify`](Self::can_verify) for an identifier string.
    pub fn can_verify_named(&self, alg: &str) -> Result<bool, KeyError> {
        Ok(self.can_verify(alg.parse()?))
    }

    /// May this key encrypt with `cipher`?
    pub fn can_encrypt(&self, cipher: Cipher) -> bool {
        self.check_cipher(KeyUsage::Encrypt, cipher).is_ok()
    }

    /// May this key decrypt with `cipher`?
    pub fn can_decrypt(&self, cipher: Cipher) -> bool {
        self.check_cipher(KeyUsage::Decrypt, cipher).is_ok()
    }

    /// Guard for signing: `CapabilityViolation` if the sign usage is
    /// missing, `UnsupportedKeyType` on a family mismatch.
    pub fn check_sign(&self, alg: SignAlgorithm) -> Result<(), KeyError> {
        self.check_signature(KeyUsage::Sign, alg)
    }

    /// Guard for verification, see [`check_sign`](Self::check_sign).
    pub fn check_verify(&self, alg: SignAlgorithm) -> Result<(), KeyError> {
        self.check_signature(KeyUsage::Verify, alg)
    }

    /// Guard for encryption.
    pub fn check_encrypt(&self, cipher: Cipher) -> Result<(), KeyError> {
        self.check_cipher(KeyUsage::Encrypt, cipher)
    }

    /// Guard for decryption.
    pub fn check_decrypt(&self, cipher: Cipher) -> Result<(), KeyError> {
        self.check_cipher(KeyUsage::Decrypt, cipher)
    }

    fn check_usage(&self, usage: KeyUsage) -> Result<(), KeyError> {
        if self.has_usage(usage) {
            Ok(())
        } else {
            Err(KeyError::CapabilityViolation(format!(
                "key {} is not authorized for {usage}",
                self.id
            )))
        }
    }

    fn check_signature(&self, usage: KeyUsage, alg: SignAlgorithm) -> Result<(), KeyError> {
        self.check_usage(usage)?;
        if !self.matches_algorithm(alg) {
            return Err(KeyError::UnsupportedKeyType(format!(
                "key {} of type {} cannot {usage} with {alg}",
                self.id, self.key_type
            )));
        }
        Ok(())
    }

    fn check_cipher(&self, usage: KeyUsage, cipher: Cipher) -> Result<(), KeyError> {
        self.check_usage(usage)?;
        if !self.key_type.supports_cipher(cipher) {
            return Err(KeyError::UnsupportedKeyType(format!(
                "key {} of type {} cannot {usage} with {cipher}",
                self.id, self.key_type
            )));
        }
        if !self.ciphers.is_empty() && !self.ciphers.contains(&cipher) {
            return Err(KeyError::CapabilityViolation(format!(
                "key {} is restricted to ciphers {:?}",
                self.id,
                self.ciphers.iter().map(Cipher::as_str).collect::<Vec<_>>()
            )));
        }
        Ok(())
    }
}
