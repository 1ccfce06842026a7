//! # Algorithm Identifiers
//!
//! Closed enumerations for every algorithm a key can take part in:
//! signing algorithms, digest stages and encryption ciphers.
//!
//! Identifiers cross the crate boundary as strings (configuration files,
//! remote descriptors, CLI flags). They are resolved through the read-only
//! `ALL` tables below, which are fixed at compile time and never mutated.
//! An identifier that is not in a table is an
//! [`KeyError::UnsupportedAlgorithm`], never a panic.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::KeyError;

/// Family a signing algorithm belongs to. Each family is bound to the key
/// types that may take part in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignFamily {
    /// RSA signatures (PSS or PKCS#1 v1.5 padding).
    Rsa,
    /// Elliptic-curve DSA signatures.
    Ecd,
}

/// Padding scheme of an RSA signing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsaPadding {
    /// RSASSA-PSS with a salt as long as the digest.
    Pss,
    /// RSASSA-PKCS1-v1_5.
    Pkcs1v15,
}

/// Signing / verification algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignAlgorithm {
    /// RSASSA-PSS over SHA-256.
    #[serde(rename = "rsa-pss-sha256")]
    RsaPssSha256,
    /// RSASSA-PSS over SHA-384.
    #[serde(rename = "rsa-pss-sha384")]
    RsaPssSha384,
    /// RSASSA-PSS over SHA-512.
    #[serde(rename = "rsa-pss-sha512")]
    RsaPssSha512,
    /// RSASSA-PKCS1-v1_5 over SHA-256.
    #[serde(rename = "rsa-pkcs1-v1.5-sha256")]
    RsaPkcs1V15Sha256,
    /// RSASSA-PKCS1-v1_5 over SHA-384.
    #[serde(rename = "rsa-pkcs1-v1.5-sha384")]
    RsaPkcs1V15Sha384,
    /// RSASSA-PKCS1-v1_5 over SHA-512.
    #[serde(rename = "rsa-pkcs1-v1.5-sha512")]
    RsaPkcs1V15Sha512,
    /// ECDSA over SHA-256.
    #[serde(rename = "ecd-sha256")]
    EcdSha256,
    /// ECDSA over SHA-384.
    #[serde(rename = "ecd-sha384")]
    EcdSha384,
    /// ECDSA over SHA-512.
    #[serde(rename = "ecd-sha512")]
    EcdSha512,
}

impl SignAlgorithm {
    /// Every signing algorithm, in declaration order.
    pub const ALL: [SignAlgorithm; 9] = [
        Self::RsaPssSha256,
        Self::RsaPssSha384,
        Self::RsaPssSha512,
        Self::RsaPkcs1V15Sha256,
        Self::RsaPkcs1V15Sha384,
        Self::RsaPkcs1V15Sha512,
        Self::EcdSha256,
        Self::EcdSha384,
        Self::EcdSha512,
    ];

    /// Returns the algorithm identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RsaPssSha256 => "rsa-pss-sha256",
            Self::RsaPssSha384 => "rsa-pss-sha384",
            Self::RsaPssSha512 => "rsa-pss-sha512",
            Self::RsaPkcs1V15Sha256 => "rsa-pkcs1-v1.5-sha256",
            Self::RsaPkcs1V15Sha384 => "rsa-pkcs1-v1.5-sha384",
            Self::RsaPkcs1V15Sha512 => "rsa-pkcs1-v1.5-sha512",
            Self::EcdSha256 => "ecd-sha256",
            Self::EcdSha384 => "ecd-sha384",
            Self::EcdSha512 => "ecd-sha512",
        }
    }

    /// The family this algorithm belongs to.
    pub fn family(&self) -> SignFamily {
        match self {
            Self::RsaPssSha256
            | Self::RsaPssSha384
            | Self::RsaPssSha512
            | Self::RsaPkcs1V15Sha256
            | Self::RsaPkcs1V15Sha384
            | Self::RsaPkcs1V15Sha512 => SignFamily::Rsa,
            Self::EcdSha256 | Self::EcdSha384 | Self::EcdSha512 => SignFamily::Ecd,
        }
    }

    /// The digest the message is hashed with before signing.
    pub fn hash(&self) -> HashAlgorithm {
        match self {
            Self::RsaPssSha256 | Self::RsaPkcs1V15Sha256 | Self::EcdSha256 => {
                HashAlgorithm::Sha256
            }
            Self::RsaPssSha384 | Self::RsaPkcs1V15Sha384 | Self::EcdSha384 => {
                HashAlgorithm::Sha384
            }
            Self::RsaPssSha512 | Self::RsaPkcs1V15Sha512 | Self::EcdSha512 => {
                HashAlgorithm::Sha512
            }
        }
    }

    /// The RSA padding scheme, or `None` for the ECD family.
    pub fn rsa_padding(&self) -> Option<RsaPadding> {
        match self {
            Self::RsaPssSha256 | Self::RsaPssSha384 | Self::RsaPssSha512 => Some(RsaPadding::Pss),
            Self::RsaPkcs1V15Sha256 | Self::RsaPkcs1V15Sha384 | Self::RsaPkcs1V15Sha512 => {
                Some(RsaPadding::Pkcs1v15)
            }
            Self::EcdSha256 | Self::EcdSha384 | Self::EcdSha512 => None,
        }
    }
}

impl std::fmt::Display for SignAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(&Self::ALL, s, Self::as_str, "signing algorithm")
    }
}

/// A digest stage: a plain hash or a keyed construction wrapping one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// No hashing. Accepted as an identifier, rejected as a digest stage.
    #[serde(rename = "none")]
    None,
    /// SHA-256.
    #[serde(rename = "sha256")]
    Sha256,
    /// SHA-384.
    #[serde(rename = "sha384")]
    Sha384,
    /// SHA-512.
    #[serde(rename = "sha512")]
    Sha512,
    /// HMAC keyed construction around the preceding stage.
    #[serde(rename = "hmac")]
    Hmac,
}

impl HashAlgorithm {
    /// Every digest stage identifier.
    pub const ALL: [HashAlgorithm; 5] = [
        Self::None,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
        Self::Hmac,
    ];

    /// Returns the algorithm identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
            Self::Hmac => "hmac",
        }
    }

    /// `true` for constructions that need a key and an inner hash.
    pub fn is_keyed(&self) -> bool {
        matches!(self, Self::Hmac)
    }

    /// Internal block size in bytes of a plain hash. Keyed constructions
    /// and `None` have no block size of their own.
    pub fn block_size(&self) -> Option<usize> {
        match self {
            Self::Sha256 => Some(64),
            Self::Sha384 | Self::Sha512 => Some(128),
            Self::None | Self::Hmac => None,
        }
    }

    /// Digest output length in bytes of a plain hash.
    pub fn output_size(&self) -> Option<usize> {
        match self {
            Self::Sha256 => Some(32),
            Self::Sha384 => Some(48),
            Self::Sha512 => Some(64),
            Self::None | Self::Hmac => None,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(&Self::ALL, s, Self::as_str, "hash algorithm")
    }
}

/// Encryption cipher a key may be used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cipher {
    /// AES-GCM with a random 96-bit nonce (AES-128 or AES-256 by key length).
    #[serde(rename = "symmetric-default")]
    SymmetricDefault,
    /// RSAES-OAEP with SHA-256 and MGF1-SHA-256.
    #[serde(rename = "rsa-oaep-sha256")]
    RsaOaepSha256,
}

impl Cipher {
    /// Every cipher identifier.
    pub const ALL: [Cipher; 2] = [Self::SymmetricDefault, Self::RsaOaepSha256];

    /// Returns the cipher identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SymmetricDefault => "symmetric-default",
            Self::RsaOaepSha256 => "rsa-oaep-sha256",
        }
    }
}

impl std::fmt::Display for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cipher {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(&Self::ALL, s, Self::as_str, "cipher")
    }
}

fn lookup<T: Copy>(
    table: &[T],
    name: &str,
    as_str: fn(&T) -> &'static str,
    kind: &str,
) -> Result<T, KeyError> {
    let name = name.trim();
    table
        .iter()
        .find(|candidate| as_str(*candidate) == name)
        .copied()
        .ok_or_else(|| KeyError::UnsupportedAlgorithm(format!("unknown {kind}: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_algorithm_identifiers_round_trip() {
        for alg in SignAlgorithm::ALL {
            assert_eq!(alg.as_str().parse::<SignAlgorithm>().unwrap(), alg);
        }
    }

    #[test]
    fn unknown_sign_algorithm_is_unsupported() {
        let err = "rsa-pss-md5".parse::<SignAlgorithm>().unwrap_err();
        assert!(matches!(err, KeyError::UnsupportedAlgorithm(_)));
        assert!(err.to_string().contains("rsa-pss-md5"));
    }

    #[test]
    fn families_partition_the_table() {
        let rsa = SignAlgorithm::ALL
            .iter()
            .filter(|a| a.family() == SignFamily::Rsa)
            .count();
        let ecd = SignAlgorithm::ALL
            .iter()
            .filter(|a| a.family() == SignFamily::Ecd)
            .count();
        assert_eq!(rsa, 6);
        assert_eq!(ecd, 3);
    }

    #[test]
    fn rsa_padding_only_for_rsa_family() {
        for alg in SignAlgorithm::ALL {
            assert_eq!(alg.rsa_padding().is_some(), alg.family() == SignFamily::Rsa);
        }
        assert_eq!(SignAlgorithm::RsaPssSha384.rsa_padding(), Some(RsaPadding::Pss));
        assert_eq!(
            SignAlgorithm::RsaPkcs1V15Sha512.rsa_padding(),
            Some(RsaPadding::Pkcs1v15)
        );
    }

    #[test]
    fn sign_algorithm_hash_matches_suffix() {
        for alg in SignAlgorithm::ALL {
            assert!(alg.as_str().ends_with(alg.hash().as_str()));
        }
    }

    #[test]
    fn hash_block_sizes() {
        assert_eq!(HashAlgorithm::Sha256.block_size(), Some(64));
        assert_eq!(HashAlgorithm::Sha384.block_size(), Some(128));
        assert_eq!(HashAlgorithm::Sha512.block_size(), Some(128));
        assert_eq!(HashAlgorithm::Hmac.block_size(), None);
        assert!(HashAlgorithm::Hmac.is_keyed());
        assert!(!HashAlgorithm::Sha256.is_keyed());
    }

    #[test]
    fn hash_and_cipher_parse() {
        assert_eq!(" sha512 ".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!("md5".parse::<HashAlgorithm>().is_err());
        assert_eq!(
            "rsa-oaep-sha256".parse::<Cipher>().unwrap(),
            Cipher::RsaOaepSha256
        );
        assert!("des".parse::<Cipher>().is_err());
    }

    #[test]
    fn serde_uses_identifier_strings() {
        let json = serde_json::to_string(&SignAlgorithm::RsaPkcs1V15Sha256).unwrap();
        assert_eq!(json, "\"rsa-pkcs1-v1.5-sha256\"");
        let back: SignAlgorithm = serde_json::from_str("\"ecd-sha384\"").unwrap();
        assert_eq!(back, SignAlgorithm::EcdSha384);
        let cipher: Cipher = serde_json::from_str("\"symmetric-default\"").unwrap();
        assert_eq!(cipher, Cipher::SymmetricDefault);
    }
}
