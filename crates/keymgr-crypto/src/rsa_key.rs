//! # RSA Keys
//!
//! RSA key pairs and public keys backed by the `rsa` crate, plus the local
//! primitives dispatch runs on them: RSASSA-PSS and RSASSA-PKCS1-v1_5 over
//! the algorithm's digest, and RSAES-OAEP-SHA256.
//!
//! Key size is the modulus length in bits and must be 2048, 3072 or 4096.

use rand::{CryptoRng, RngCore};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Sign, Pss};
use sha2::{Sha256, Sha384, Sha512};

use keymgr_core::{
    HashAlgorithm, KeyAttributes, KeyError, KeyType, KeyUsage, RsaPadding, SignAlgorithm,
};

use crate::digester;
use crate::key::{Key, KeyMaterial, PrivateKey};
use crate::pem::{self, labels, PemBlock, PrivateDer, PublicDer};

/// An RSA public key.
#[derive(Debug, Clone)]
pub struct RsaPublicKey {
    attrs: KeyAttributes,
    inner: rsa::RsaPublicKey,
}

impl RsaPublicKey {
    /// Wrap an existing public key.
    pub fn from_key(
        id: impl Into<String>,
        inner: rsa::RsaPublicKey,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        let attrs = KeyAttributes::new(id, KeyType::Rsa, modulus_bits(&inner), usage)?;
        Ok(Self { attrs, inner })
    }

    /// Build from a decoded block labelled `RSA PUBLIC KEY` (PKCS#1, with a
    /// PKIX fallback) or `PUBLIC KEY` (PKIX).
    pub fn from_pem_block(
        block: &PemBlock,
        id: impl Into<String>,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        match pem::decode_public(block)? {
            Some(PublicDer::Rsa(inner)) => Self::from_key(id, inner, usage),
            Some(other) => Err(KeyError::MalformedInput(format!(
                "expected an rsa public key, decoded {}",
                other.key_type()
            ))),
            None => Err(not_a_key(block, "public")),
        }
    }

    /// Decode the first RSA public key in `data`.
    pub fn from_pem(
        data: &[u8],
        id: impl Into<String>,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        let id = id.into();
        let usage: Vec<KeyUsage> = usage.into_iter().collect();
        pem::decode_first(data, &[labels::RSA_PUBLIC_KEY, labels::PUBLIC_KEY], |block| {
            Self::from_pem_block(block, id.clone(), usage.iter().copied())
        })
    }

    /// The underlying `rsa` key.
    pub fn inner(&self) -> &rsa::RsaPublicKey {
        &self.inner
    }
}

impl Key for RsaPublicKey {
    fn attributes(&self) -> &KeyAttributes {
        &self.attrs
    }

    fn is_private(&self) -> bool {
        false
    }

    fn material(&self) -> KeyMaterial<'_> {
        KeyMaterial::RsaPublic(&self.inner)
    }
}

/// An RSA key pair.
#[derive(Debug, Clone)]
pub struct RsaPrivateKey {
    attrs: KeyAttributes,
    inner: rsa::RsaPrivateKey,
    public: RsaPublicKey,
}

impl RsaPrivateKey {
    /// Generate a fresh key pair of `bits` modulus length.
    pub fn generate<R: RngCore + CryptoRng>(
        id: impl Into<String>,
        bits: usize,
        usage: impl IntoIterator<Item = KeyUsage>,
        rng: &mut R,
    ) -> Result<Self, KeyError> {
        KeyType::Rsa.validate_size(bits)?;
        let inner = rsa::RsaPrivateKey::new(rng, bits)
            .map_err(|e| KeyError::Crypto(format!("rsa key generation failed: {e}")))?;
        Self::from_key(id, inner, usage)
    }

    /// Wrap an existing private key and derive its public half.
    pub fn from_key(
        id: impl Into<String>,
        inner: rsa::RsaPrivateKey,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        inner
            .validate()
            .map_err(|e| KeyError::MalformedInput(format!("invalid rsa private key: {e}")))?;
        let id = id.into();
        let usage: Vec<KeyUsage> = usage.into_iter().collect();
        let attrs = KeyAttributes::new(
            id.clone(),
            KeyType::Rsa,
            modulus_bits(&inner),
            usage.clone(),
        )?;
        let public = RsaPublicKey::from_key(id, inner.to_public_key(), usage)?;
        Ok(Self {
            attrs,
            inner,
            public,
        })
    }

    /// Build from a decoded block labelled `RSA PRIVATE KEY` (PKCS#1) or
    /// `PRIVATE KEY` (PKCS#8). A PKCS#8 block holding another key type is
    /// malformed input.
    pub fn from_pem_block(
        block: &PemBlock,
        id: impl Into<String>,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        match pem::decode_private(block)? {
            Some(PrivateDer::Rsa(inner)) => Self::from_key(id, inner, usage),
            Some(other) => Err(KeyError::MalformedInput(format!(
                "expected an rsa private key, decoded {}",
                other.key_type()
            ))),
            None => Err(not_a_key(block, "private")),
        }
    }

    /// Decode the first RSA private key in `data`.
    pub fn from_pem(
        data: &[u8],
        id: impl Into<String>,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        let id = id.into();
        let usage: Vec<KeyUsage> = usage.into_iter().collect();
        pem::decode_first(data, &[labels::RSA_PRIVATE_KEY, labels::PRIVATE_KEY], |block| {
            Self::from_pem_block(block, id.clone(), usage.iter().copied())
        })
    }

    /// The underlying `rsa` key.
    pub fn inner(&self) -> &rsa::RsaPrivateKey {
        &self.inner
    }
}

impl Key for RsaPrivateKey {
    fn attributes(&self) -> &KeyAttributes {
        &self.attrs
    }

    fn is_private(&self) -> bool {
        true
    }

    fn material(&self) -> KeyMaterial<'_> {
        KeyMaterial::RsaPrivate(&self.inner)
    }
}

impl PrivateKey for RsaPrivateKey {
    type Public = RsaPublicKey;

    fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }
}

/// Exact bit length of the modulus.
fn modulus_bits(key: &impl PublicKeyParts) -> usize {
    key.n().bits()
}

fn not_a_key(block: &PemBlock, half: &str) -> KeyError {
    KeyError::MalformedInput(format!(
        "block labelled {} does not hold an rsa {half} key",
        block.label()
    ))
}

fn pss(hash: HashAlgorithm) -> Result<Pss, KeyError> {
    match hash {
        HashAlgorithm::Sha256 => Ok(Pss::new::<Sha256>()),
        HashAlgorithm::Sha384 => Ok(Pss::new::<Sha384>()),
        HashAlgorithm::Sha512 => Ok(Pss::new::<Sha512>()),
        other => Err(KeyError::UnsupportedAlgorithm(format!(
            "{other} cannot back an rsa signature"
        ))),
    }
}

fn pkcs1v15(hash: HashAlgorithm) -> Result<Pkcs1v15Sign, KeyError> {
    match hash {
        HashAlgorithm::Sha256 => Ok(Pkcs1v15Sign::new::<Sha256>()),
        HashAlgorithm::Sha384 => Ok(Pkcs1v15Sign::new::<Sha384>()),
        HashAlgorithm::Sha512 => Ok(Pkcs1v15Sign::new::<Sha512>()),
        other => Err(KeyError::UnsupportedAlgorithm(format!(
            "{other} cannot back an rsa signature"
        ))),
    }
}

fn padding(alg: SignAlgorithm) -> Result<RsaPadding, KeyError> {
    alg.rsa_padding().ok_or_else(|| {
        KeyError::UnsupportedAlgorithm(format!("{alg} is not an rsa signing algorithm"))
    })
}

/// Sign `msg` with `alg`, hashing it with the algorithm's digest first.
pub(crate) fn sign<R: RngCore + CryptoRng>(
    key: &rsa::RsaPrivateKey,
    alg: SignAlgorithm,
    msg: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, KeyError> {
    let hashed = digester::hash(alg.hash(), msg)?;
    let signed = match padding(alg)? {
        RsaPadding::Pss => key.sign_with_rng(rng, pss(alg.hash())?, &hashed),
        RsaPadding::Pkcs1v15 => key.sign_with_rng(rng, pkcs1v15(alg.hash())?, &hashed),
    };
    signed.map_err(|e| KeyError::Crypto(format!("rsa signing failed: {e}")))
}

/// Verify `signature` over `msg`. A signature that does not verify is
/// `Ok(false)`.
pub(crate) fn verify(
    key: &rsa::RsaPublicKey,
    alg: SignAlgorithm,
    msg: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let hashed = digester::hash(alg.hash(), msg)?;
    let verified = match padding(alg)? {
        RsaPadding::Pss => key.verify(pss(alg.hash())?, &hashed, signature),
        RsaPadding::Pkcs1v15 => key.verify(pkcs1v15(alg.hash())?, &hashed, signature),
    };
    Ok(verified.is_ok())
}

/// RSAES-OAEP with SHA-256.
pub(crate) fn encrypt_oaep<R: RngCore + CryptoRng>(
    key: &rsa::RsaPublicKey,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, KeyError> {
    key.encrypt(rng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| KeyError::Crypto(format!("rsa-oaep encryption failed: {e}")))
}

/// Inverse of [`encrypt_oaep`].
pub(crate) fn decrypt_oaep(
    key: &rsa::RsaPrivateKey,
    ciphertext: &[u8],
) -> Result<Vec<u8>, KeyError> {
    key.decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map_err(|e| KeyError::Crypto(format!("rsa-oaep decryption failed: {e}")))
}

/// Parse PKCS#1 `RSAPrivateKey` DER.
pub(crate) fn private_from_pkcs1(der: &[u8]) -> Result<rsa::RsaPrivateKey, KeyError> {
    rsa::RsaPrivateKey::from_pkcs1_der(der)
        .map_err(|e| KeyError::MalformedInput(format!("invalid pkcs#1 rsa private key: {e}")))
}

/// Parse PKCS#1 `RSAPublicKey` DER.
pub(crate) fn public_from_pkcs1(der: &[u8]) -> Option<rsa::RsaPublicKey> {
    rsa::RsaPublicKey::from_pkcs1_der(der).ok()
}
