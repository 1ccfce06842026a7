//! # Elliptic-Curve Keys
//!
//! EC key pairs and public keys on P-256, P-384, P-521 and secp256k1,
//! backed by the RustCrypto curve crates.
//!
//! Signatures are ECDSA over the prehash produced by the algorithm's digest,
//! encoded as fixed-size `r || s`. A digest shorter than the curve's field
//! is left-padded with zeros, which leaves its integer value unchanged.

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rand::{CryptoRng, RngCore};

use keymgr_core::{KeyAttributes, KeyError, KeyType, KeyUsage, SignAlgorithm};

use crate::digester;
use crate::key::{Key, KeyMaterial, PrivateKey};
use crate::pem::{self, labels, PemBlock, PrivateDer, PublicDer};

/// Supported curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    /// NIST P-256.
    P256,
    /// NIST P-384.
    P384,
    /// NIST P-521.
    P521,
    /// SECG secp256k1.
    Secp256k1,
}

impl Curve {
    /// Resolve the curve for a key type and size.
    pub fn resolve(key_type: KeyType, bits: usize) -> Result<Self, KeyError> {
        if matches!(key_type, KeyType::Rsa | KeyType::Symmetric) {
            return Err(KeyError::UnsupportedKeyType(format!(
                "{key_type} is not an elliptic-curve key type"
            )));
        }
        match (key_type, bits) {
            (KeyType::EccNistP, 256) => Ok(Self::P256),
            (KeyType::EccNistP, 384) => Ok(Self::P384),
            (KeyType::EccNistP, 521) => Ok(Self::P521),
            (KeyType::EccSecgP256k1, 256) => Ok(Self::Secp256k1),
            _ => Err(KeyError::UnsupportedKeySize {
                key_type,
                size: bits,
            }),
        }
    }

    /// Key type of keys on this curve.
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::P256 | Self::P384 | Self::P521 => KeyType::EccNistP,
            Self::Secp256k1 => KeyType::EccSecgP256k1,
        }
    }

    /// Key size in bits.
    pub fn bits(&self) -> usize {
        match self {
            Self::P256 | Self::Secp256k1 => 256,
            Self::P384 => 384,
            Self::P521 => 521,
        }
    }

    /// Length of a serialized field element in bytes.
    pub fn field_len(&self) -> usize {
        match self {
            Self::P256 | Self::Secp256k1 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    /// Curve name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
            Self::Secp256k1 => "secp256k1",
        }
    }
}

impl std::fmt::Display for Curve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EC private scalar on one of the supported curves.
#[derive(Clone)]
pub enum EcSecret {
    /// P-256 scalar.
    P256(p256::SecretKey),
    /// P-384 scalar.
    P384(p384::SecretKey),
    /// P-521 scalar.
    P521(p521::SecretKey),
    /// secp256k1 scalar.
    Secp256k1(k256::SecretKey),
}

/// EC public point on one of the supported curves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcPublic {
    /// P-256 point.
    P256(p256::PublicKey),
    /// P-384 point.
    P384(p384::PublicKey),
    /// P-521 point.
    P521(p521::PublicKey),
    /// secp256k1 point.
    Secp256k1(k256::PublicKey),
}

impl EcSecret {
    /// Generate a random scalar on `curve`.
    pub fn random<R: RngCore + CryptoRng>(curve: Curve, rng: &mut R) -> Self {
        match curve {
            Curve::P256 => Self::P256(p256::SecretKey::random(rng)),
            Curve::P384 => Self::P384(p384::SecretKey::random(rng)),
            Curve::P521 => Self::P521(p521::SecretKey::random(rng)),
            Curve::Secp256k1 => Self::Secp256k1(k256::SecretKey::random(rng)),
        }
    }

    /// The curve this scalar lives on.
    pub fn curve(&self) -> Curve {
        match self {
            Self::P256(_) => Curve::P256,
            Self::P384(_) => Curve::P384,
            Self::P521(_) => Curve::P521,
            Self::Secp256k1(_) => Curve::Secp256k1,
        }
    }

    /// The matching public point.
    pub fn public(&self) -> EcPublic {
        match self {
            Self::P256(sk) => EcPublic::P256(sk.public_key()),
            Self::P384(sk) => EcPublic::P384(sk.public_key()),
            Self::P521(sk) => EcPublic::P521(sk.public_key()),
            Self::Secp256k1(sk) => EcPublic::Secp256k1(sk.public_key()),
        }
    }

    /// Parse SEC1 `ECPrivateKey` DER. The embedded curve parameters select
    /// the curve.
    pub(crate) fn from_sec1_der(der: &[u8]) -> Result<Self, KeyError> {
        p256::SecretKey::from_sec1_der(der)
            .map(Self::P256)
            .or_else(|_| p384::SecretKey::from_sec1_der(der).map(Self::P384))
            .or_else(|_| p521::SecretKey::from_sec1_der(der).map(Self::P521))
            .or_else(|_| k256::SecretKey::from_sec1_der(der).map(Self::Secp256k1))
            .map_err(|e| KeyError::MalformedInput(format!("invalid sec1 ec private key: {e}")))
    }

    /// Parse PKCS#8 `PrivateKeyInfo` DER holding an EC key.
    pub(crate) fn from_pkcs8_der(der: &[u8]) -> Option<Self> {
        use pkcs8::DecodePrivateKey;
        p256::SecretKey::from_pkcs8_der(der)
            .map(Self::P256)
            .or_else(|_| p384::SecretKey::from_pkcs8_der(der).map(Self::P384))
            .or_else(|_| p521::SecretKey::from_pkcs8_der(der).map(Self::P521))
            .or_else(|_| k256::SecretKey::from_pkcs8_der(der).map(Self::Secp256k1))
            .ok()
    }

    /// Encode as SEC1 `ECPrivateKey` DER.
    pub(crate) fn to_sec1_der(&self) -> Result<zeroize::Zeroizing<Vec<u8>>, KeyError> {
        let encoded = match self {
            Self::P256(sk) => sk.to_sec1_der(),
            Self::P384(sk) => sk.to_sec1_der(),
            Self::P521(sk) => sk.to_sec1_der(),
            Self::Secp256k1(sk) => sk.to_sec1_der(),
        };
        encoded.map_err(|e| KeyError::Crypto(format!("sec1 encoding failed: {e}")))
    }

    /// ECDSA over `digest`.
    pub(crate) fn sign_prehash(&self, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        let prehash = pad_prehash(digest, self.curve().field_len());
        let signature = match self {
            Self::P256(sk) => {
                let signer = p256::ecdsa::SigningKey::from_bytes(&sk.to_bytes()).map_err(ecdsa_err)?;
                let sig: p256::ecdsa::Signature = signer.sign_prehash(&prehash).map_err(ecdsa_err)?;
                sig.to_bytes().to_vec()
            }
            Self::P384(sk) => {
                let signer = p384::ecdsa::SigningKey::from_bytes(&sk.to_bytes()).map_err(ecdsa_err)?;
                let sig: p384::ecdsa::Signature = signer.sign_prehash(&prehash).map_err(ecdsa_err)?;
                sig.to_bytes().to_vec()
            }
            Self::P521(sk) => {
                let signer = p521::ecdsa::SigningKey::from_bytes(&sk.to_bytes()).map_err(ecdsa_err)?;
                let sig: p521::ecdsa::Signature = signer.sign_prehash(&prehash).map_err(ecdsa_err)?;
                sig.to_bytes().to_vec()
            }
            Self::Secp256k1(sk) => {
                let signer = k256::ecdsa::SigningKey::from_bytes(&sk.to_bytes()).map_err(ecdsa_err)?;
                let sig: k256::ecdsa::Signature = signer.sign_prehash(&prehash).map_err(ecdsa_err)?;
                sig.to_bytes().to_vec()
            }
        };
        Ok(signature)
    }
}

fn ecdsa_err(e: p256::ecdsa::Error) -> KeyError {
    KeyError::Crypto(format!("ecdsa signing failed: {e}"))
}

impl std::fmt::Debug for EcSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EcSecret({}, [REDACTED])", self.curve())
    }
}

impl EcPublic {
    /// The curve this point lives on.
    pub fn curve(&self) -> Curve {
        match self {
            Self::P256(_) => Curve::P256,
            Self::P384(_) => Curve::P384,
            Self::P521(_) => Curve::P521,
            Self::Secp256k1(_) => Curve::Secp256k1,
        }
    }

    /// Parse PKIX `SubjectPublicKeyInfo` DER holding an EC point.
    pub(crate) fn from_public_key_der(der: &[u8]) -> Option<Self> {
        use pkcs8::DecodePublicKey;
        p256::PublicKey::from_public_key_der(der)
            .map(Self::P256)
            .or_else(|_| p384::PublicKey::from_public_key_der(der).map(Self::P384))
            .or_else(|_| p521::PublicKey::from_public_key_der(der).map(Self::P521))
            .or_else(|_| k256::PublicKey::from_public_key_der(der).map(Self::Secp256k1))
            .ok()
    }

    /// Encode as PKIX `SubjectPublicKeyInfo` DER.
    pub(crate) fn to_public_key_der(&self) -> Result<Vec<u8>, KeyError> {
        use pkcs8::EncodePublicKey;
        let encoded = match self {
            Self::P256(pk) => pk.to_public_key_der(),
            Self::P384(pk) => pk.to_public_key_der(),
            Self::P521(pk) => pk.to_public_key_der(),
            Self::Secp256k1(pk) => pk.to_public_key_der(),
        };
        encoded
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| KeyError::Crypto(format!("pkix encoding failed: {e}")))
    }

    /// Uncompressed SEC1 encoding of the point.
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        match self {
            Self::P256(pk) => pk.to_sec1_bytes().into_vec(),
            Self::P384(pk) => pk.to_sec1_bytes().into_vec(),
            Self::P521(pk) => pk.to_sec1_bytes().into_vec(),
            Self::Secp256k1(pk) => pk.to_sec1_bytes().into_vec(),
        }
    }

    /// Verify a fixed-size `r || s` signature over `digest`. Anything that
    /// does not verify, including a signature of the wrong length, is
    /// `false`.
    pub(crate) fn verify_prehash(&self, digest: &[u8], signature: &[u8]) -> bool {
        let prehash = pad_prehash(digest, self.curve().field_len());
        let sec1 = self.to_sec1_bytes();
        match self {
            Self::P256(_) => {
                let (Ok(vk), Ok(sig)) = (
                    p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1),
                    p256::ecdsa::Signature::from_slice(signature),
                ) else {
                    return false;
                };
                vk.verify_prehash(&prehash, &sig).is_ok()
            }
            Self::P384(_) => {
                let (Ok(vk), Ok(sig)) = (
                    p384::ecdsa::VerifyingKey::from_sec1_bytes(&sec1),
                    p384::ecdsa::Signature::from_slice(signature),
                ) else {
                    return false;
                };
                vk.verify_prehash(&prehash, &sig).is_ok()
            }
            Self::P521(_) => {
                let (Ok(vk), Ok(sig)) = (
                    p521::ecdsa::VerifyingKey::from_sec1_bytes(&sec1),
                    p521::ecdsa::Signature::from_slice(signature),
                ) else {
                    return false;
                };
                vk.verify_prehash(&prehash, &sig).is_ok()
            }
            Self::Secp256k1(_) => {
                let (Ok(vk), Ok(sig)) = (
                    k256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1),
                    k256::ecdsa::Signature::from_slice(signature),
                ) else {
                    return false;
                };
                vk.verify_prehash(&prehash, &sig).is_ok()
            }
        }
    }
}

fn pad_prehash(digest: &[u8], field_len: usize) -> Vec<u8> {
    if digest.len() >= field_len {
        return digest.to_vec();
    }
    let mut padded = vec![0u8; field_len - digest.len()];
    padded.extend_from_slice(digest);
    padded
}

/// Sign `msg` with an ECD algorithm.
pub(crate) fn sign(key: &EcSecret, alg: SignAlgorithm, msg: &[u8]) -> Result<Vec<u8>, KeyError> {
    ensure_ecd(alg)?;
    key.sign_prehash(&digester::hash(alg.hash(), msg)?)
}

/// Verify an ECD signature over `msg`.
pub(crate) fn verify(
    key: &EcPublic,
    alg: SignAlgorithm,
    msg: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    ensure_ecd(alg)?;
    Ok(key.verify_prehash(&digester::hash(alg.hash(), msg)?, signature))
}

fn ensure_ecd(alg: SignAlgorithm) -> Result<(), KeyError> {
    if alg.rsa_padding().is_some() {
        return Err(KeyError::UnsupportedAlgorithm(format!(
            "{alg} is not an ecdsa algorithm"
        )));
    }
    Ok(())
}

/// An EC public key.
#[derive(Debug, Clone)]
pub struct EcPublicKey {
    attrs: KeyAttributes,
    inner: EcPublic,
}

impl EcPublicKey {
    /// Wrap an existing public point.
    pub fn from_key(
        id: impl Into<String>,
        inner: EcPublic,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        let curve = inner.curve();
        let attrs = KeyAttributes::new(id, curve.key_type(), curve.bits(), usage)?;
        Ok(Self { attrs, inner })
    }

    /// Build from a decoded `EC PUBLIC KEY` or `PUBLIC KEY` block (PKIX).
    pub fn from_pem_block(
        block: &PemBlock,
        id: impl Into<String>,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        match pem::decode_public(block)? {
            Some(PublicDer::Ec(inner)) => Self::from_key(id, inner, usage),
            Some(other) => Err(KeyError::MalformedInput(format!(
                "expected an ec public key, decoded {}",
                other.key_type()
            ))),
            None => Err(KeyError::MalformedInput(format!(
                "block labelled {} does not hold an ec public key",
                block.label()
            ))),
        }
    }

    /// Decode the first EC public key in `data`.
    pub fn from_pem(
        data: &[u8],
        id: impl Into<String>,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        let id = id.into();
        let usage: Vec<KeyUsage> = usage.into_iter().collect();
        pem::decode_first(data, &[labels::EC_PUBLIC_KEY, labels::PUBLIC_KEY], |block| {
            Self::from_pem_block(block, id.clone(), usage.iter().copied())
        })
    }

    /// The curve the key lives on.
    pub fn curve(&self) -> Curve {
        self.inner.curve()
    }

    /// The public point.
    pub fn inner(&self) -> &EcPublic {
        &self.inner
    }
}

impl Key for EcPublicKey {
    fn attributes(&self) -> &KeyAttributes {
        &self.attrs
    }

    fn is_private(&self) -> bool {
        false
    }

    fn material(&self) -> KeyMaterial<'_> {
        KeyMaterial::EcPublic(&self.inner)
    }
}

/// An EC key pair.
#[derive(Debug, Clone)]
pub struct EcPrivateKey {
    attrs: KeyAttributes,
    inner: EcSecret,
    public: EcPublicKey,
}

impl EcPrivateKey {
    /// Generate a key pair. `key_type` and `bits` select the curve;
    /// combinations without a curve fail.
    pub fn generate<R: RngCore + CryptoRng>(
        id: impl Into<String>,
        key_type: KeyType,
        bits: usize,
        usage: impl IntoIterator<Item = KeyUsage>,
        rng: &mut R,
    ) -> Result<Self, KeyError> {
        let curve = Curve::resolve(key_type, bits)?;
        Self::from_key(id, EcSecret::random(curve, rng), usage)
    }

    /// Wrap an existing scalar and derive its public point.
    pub fn from_key(
        id: impl Into<String>,
        inner: EcSecret,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        let id = id.into();
        let usage: Vec<KeyUsage> = usage.into_iter().collect();
        let curve = inner.curve();
        let attrs = KeyAttributes::new(id.clone(), curve.key_type(), curve.bits(), usage.clone())?;
        let public = EcPublicKey::from_key(id, inner.public(), usage)?;
        Ok(Self {
            attrs,
            inner,
            public,
        })
    }

    /// Build from a decoded `EC PRIVATE KEY` (SEC1) or `PRIVATE KEY`
    /// (PKCS#8) block. A PKCS#8 block holding an RSA key is malformed
    /// input.
    pub fn from_pem_block(
        block: &PemBlock,
        id: impl Into<String>,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        match pem::decode_private(block)? {
            Some(PrivateDer::Ec(inner)) => Self::from_key(id, inner, usage),
            Some(other) => Err(KeyError::MalformedInput(format!(
                "expected an ec private key, decoded {}",
                other.key_type()
            ))),
            None => Err(KeyError::MalformedInput(format!(
                "block labelled {} does not hold an ec private key",
                block.label()
            ))),
        }
    }

    /// Decode the first EC private key in `data`.
    pub fn from_pem(
        data: &[u8],
        id: impl Into<String>,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        let id = id.into();
        let usage: Vec<KeyUsage> = usage.into_iter().collect();
        pem::decode_first(data, &[labels::EC_PRIVATE_KEY, labels::PRIVATE_KEY], |block| {
            Self::from_pem_block(block, id.clone(), usage.iter().copied())
        })
    }

    /// The curve the key lives on.
    pub fn curve(&self) -> Curve {
        self.inner.curve()
    }

    /// The private scalar.
    pub fn inner(&self) -> &EcSecret {
        &self.inner
    }
}

impl Key for EcPrivateKey {
    fn attributes(&self) -> &KeyAttributes {
        &self.attrs
    }

    fn is_private(&self) -> bool {
        true
    }

    fn material(&self) -> KeyMaterial<'_> {
        KeyMaterial::EcPrivate(&self.inner)
    }
}

impl PrivateKey for EcPrivateKey {
    type Public = EcPublicKey;

    fn public_key(&self) -> &EcPublicKey {
        &self.public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keymgr_core::KeyUsage::{Sign, Verify};
    use rand::rngs::OsRng;

    fn generate(key_type: KeyType, bits: usize) -> EcPrivateKey {
        EcPrivateKey::generate("ec", key_type, bits, [Sign, Verify], &mut OsRng).unwrap()
    }

    #[test]
    fn curve_resolution() {
        assert_eq!(Curve::resolve(KeyType::EccNistP, 256).unwrap(), Curve::P256);
        assert_eq!(Curve::resolve(KeyType::EccNistP, 521).unwrap(), Curve::P521);
        assert_eq!(
            Curve::resolve(KeyType::EccSecgP256k1, 256).unwrap(),
            Curve::Secp256k1
        );
        assert!(matches!(
            Curve::resolve(KeyType::EccSecgP256k1, 384),
            Err(KeyError::UnsupportedKeySize { .. })
        ));
        assert!(matches!(
            Curve::resolve(KeyType::Rsa, 2048),
            Err(KeyError::UnsupportedKeyType(_))
        ));
    }

    #[test]
    fn generated_sizes_match_curve() {
        assert_eq!(generate(KeyType::EccNistP, 256).key_size(), 256);
        assert_eq!(generate(KeyType::EccNistP, 384).key_size(), 384);
        assert_eq!(generate(KeyType::EccNistP, 521).key_size(), 521);
        let k1 = generate(KeyType::EccSecgP256k1, 256);
        assert_eq!(k1.key_type(), KeyType::EccSecgP256k1);
        assert_eq!(k1.public_key().key_type(), KeyType::EccSecgP256k1);
    }

    #[test]
    fn every_curve_signs_with_every_ecd_digest() {
        let msg = b"corridor receipt";
        for (key_type, bits) in [
            (KeyType::EccNistP, 256),
            (KeyType::EccNistP, 384),
            (KeyType::EccNistP, 521),
            (KeyType::EccSecgP256k1, 256),
        ] {
            let key = generate(key_type, bits);
            for alg in [
                SignAlgorithm::EcdSha256,
                SignAlgorithm::EcdSha384,
                SignAlgorithm::EcdSha512,
            ] {
                let sig = sign(key.inner(), alg, msg).unwrap();
                assert_eq!(sig.len(), 2 * key.curve().field_len(), "{} {alg}", key.curve());
                assert!(verify(key.public_key().inner(), alg, msg, &sig).unwrap());
                assert!(!verify(key.public_key().inner(), alg, b"other", &sig).unwrap());
            }
        }
    }

    #[test]
    fn malformed_signature_does_not_verify() {
        let key = generate(KeyType::EccNistP, 256);
        assert!(!verify(key.public_key().inner(), SignAlgorithm::EcdSha256, b"m", &[1, 2, 3]).unwrap());
    }

    #[test]
    fn rsa_algorithms_are_refused() {
        let key = generate(KeyType::EccNistP, 256);
        assert!(matches!(
            sign(key.inner(), SignAlgorithm::RsaPssSha256, b"m"),
            Err(KeyError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn prehash_padding_preserves_value() {
        assert_eq!(pad_prehash(&[1, 2], 4), vec![0, 0, 1, 2]);
        assert_eq!(pad_prehash(&[1, 2, 3, 4, 5], 4), vec![1, 2, 3, 4, 5]);
    }
}
