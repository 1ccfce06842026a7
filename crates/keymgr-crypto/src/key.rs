//! # Key Abstraction
//!
//! Every key variant implements [`Key`]: identity, usage, type and size
//! come from the composed [`KeyAttributes`], the capability checks are
//! provided methods on top of them, and [`Key::material`] exposes what the
//! key actually holds.
//!
//! ## Material contract
//!
//! Local variants return their real material. A remote key returns only its
//! identifier ([`KeyMaterial::Remote`], equal to [`Key::id`]). Dispatch
//! routes on this distinction.
//!
//! [`AnyKey`] is the closed set of variants, used wherever a key of
//! unknown kind is produced (e.g. decoding a PEM bundle).

use std::collections::BTreeSet;

use keymgr_core::{Cipher, KeyAttributes, KeyError, KeyType, KeyUsage, SignAlgorithm};

use crate::ec_key::{EcPrivateKey, EcPublic, EcPublicKey, EcSecret};
use crate::remote::RemoteKey;
use crate::rsa_key::{RsaPrivateKey, RsaPublicKey};
use crate::symmetric::SymmetricKey;

/// Borrowed view of the material a key holds.
#[derive(Clone, Copy)]
pub enum KeyMaterial<'a> {
    /// RSA private key.
    RsaPrivate(&'a rsa::RsaPrivateKey),
    /// RSA public key.
    RsaPublic(&'a rsa::RsaPublicKey),
    /// EC private scalar.
    EcPrivate(&'a EcSecret),
    /// EC public point.
    EcPublic(&'a EcPublic),
    /// Raw symmetric secret.
    Symmetric(&'a [u8]),
    /// Remote key: only the identifier is known locally.
    Remote(&'a str),
}

impl KeyMaterial<'_> {
    /// `true` for [`KeyMaterial::Remote`].
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

// Secret material is never printed.
impl std::fmt::Debug for KeyMaterial<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RsaPrivate(_) => f.write_str("RsaPrivate([REDACTED])"),
            Self::RsaPublic(k) => f.debug_tuple("RsaPublic").field(k).finish(),
            Self::EcPrivate(s) => write!(f, "EcPrivate({}, [REDACTED])", s.curve()),
            Self::EcPublic(p) => f.debug_tuple("EcPublic").field(p).finish(),
            Self::Symmetric(bytes) => write!(f, "Symmetric([REDACTED; {}])", bytes.len()),
            Self::Remote(id) => f.debug_tuple("Remote").field(id).finish(),
        }
    }
}

/// Operations shared by every key variant.
pub trait Key: Send + Sync + std::fmt::Debug {
    /// The composed attributes.
    fn attributes(&self) -> &KeyAttributes;

    /// `true` if the key holds (or, for remote keys, stands for) secret
    /// material. Always `true` for symmetric keys.
    fn is_private(&self) -> bool;

    /// The key's material. See the module docs for the remote contract.
    fn material(&self) -> KeyMaterial<'_>;

    /// `true` if operations must be delegated to a remote backend.
    fn is_remote(&self) -> bool {
        false
    }

    /// Opaque, backend-specific identifier.
    fn id(&self) -> &str {
        self.attributes().id()
    }

    /// Usages the key is authorized for.
    fn usage(&self) -> &BTreeSet<KeyUsage> {
        self.attributes().usage()
    }

    /// Key size in bits.
    fn key_size(&self) -> usize {
        self.attributes().key_size()
    }

    /// Kind of key material.
    fn key_type(&self) -> KeyType {
        self.attributes().key_type()
    }

    /// `true` for symmetric keys.
    fn is_symmetric(&self) -> bool {
        self.key_type() == KeyType::Symmetric
    }

    /// Ciphers the key is restricted to. Empty means no restriction.
    fn supported_ciphers(&self) -> &BTreeSet<Cipher> {
        self.attributes().supported_ciphers()
    }

    /// May this key sign with `alg`?
    fn can_sign(&self, alg: SignAlgorithm) -> bool {
        self.attributes().can_sign(alg)
    }

    /// May this key verify with `alg`?
    fn can_verify(&self, alg: SignAlgorithm) -> bool {
        self.attributes().can_verify(alg)
    }

    /// May this key encrypt with `cipher`?
    fn can_encrypt(&self, cipher: Cipher) -> bool {
        self.attributes().can_encrypt(cipher)
    }

    /// May this key decrypt with `cipher`?
    fn can_decrypt(&self, cipher: Cipher) -> bool {
        self.attributes().can_decrypt(cipher)
    }
}

/// A key holding private material together with its derived public key.
///
/// The public key is created at construction time, carries the same
/// identifier and usage set, and never changes afterwards.
pub trait PrivateKey: Key {
    /// The matching public variant.
    type Public: Key + Clone;

    /// The derived public key.
    fn public_key(&self) -> &Self::Public;
}

/// Closed set of key variants.
#[derive(Debug, Clone)]
pub enum AnyKey {
    /// RSA key pair.
    RsaPrivate(RsaPrivateKey),
    /// RSA public key.
    RsaPublic(RsaPublicKey),
    /// EC key pair.
    EcPrivate(EcPrivateKey),
    /// EC public key.
    EcPublic(EcPublicKey),
    /// Symmetric secret.
    Symmetric(SymmetricKey),
    /// Remote key handle.
    Remote(RemoteKey),
}

impl AnyKey {
    fn as_key(&self) -> &dyn Key {
        match self {
            Self::RsaPrivate(k) => k,
            Self::RsaPublic(k) => k,
            Self::EcPrivate(k) => k,
            Self::EcPublic(k) => k,
            Self::Symmetric(k) => k,
            Self::Remote(k) => k,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RsaPrivate(_) => "rsa private key",
            Self::RsaPublic(_) => "rsa public key",
            Self::EcPrivate(_) => "ec private key",
            Self::EcPublic(_) => "ec public key",
            Self::Symmetric(_) => "symmetric key",
            Self::Remote(_) => "remote key",
        }
    }

    /// The derived public key of an asymmetric private key.
    pub fn public_key(&self) -> Option<AnyKey> {
        match self {
            Self::RsaPrivate(k) => Some(Self::RsaPublic(k.public_key().clone())),
            Self::EcPrivate(k) => Some(Self::EcPublic(k.public_key().clone())),
            _ => None,
        }
    }

    /// Fail with `UnsupportedKeyType` unless the key is of `expected` type.
    pub fn expect_type(&self, expected: KeyType) -> Result<&Self, KeyError> {
        if self.key_type() == expected {
            Ok(self)
        } else {
            Err(KeyError::UnsupportedKeyType(format!(
                "expected a {expected} key, got {}",
                self.kind()
            )))
        }
    }
}

impl Key for AnyKey {
    fn attributes(&self) -> &KeyAttributes {
        self.as_key().attributes()
    }

    fn is_private(&self) -> bool {
        self.as_key().is_private()
    }

    fn material(&self) -> KeyMaterial<'_> {
        self.as_key().material()
    }

    fn is_remote(&self) -> bool {
        self.as_key().is_remote()
    }
}

impl From<RsaPrivateKey> for AnyKey {
    fn from(k: RsaPrivateKey) -> Self {
        Self::RsaPrivate(k)
    }
}

impl From<RsaPublicKey> for AnyKey {
    fn from(k: RsaPublicKey) -> Self {
        Self::RsaPublic(k)
    }
}

impl From<EcPrivateKey> for AnyKey {
    fn from(k: EcPrivateKey) -> Self {
        Self::EcPrivate(k)
    }
}

impl From<EcPublicKey> for AnyKey {
    fn from(k: EcPublicKey) -> Self {
        Self::EcPublic(k)
    }
}

impl From<SymmetricKey> for AnyKey {
    fn from(k: SymmetricKey) -> Self {
        Self::Symmetric(k)
    }
}

impl From<RemoteKey> for AnyKey {
    fn from(k: RemoteKey) -> Self {
        Self::Remote(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec_key::EcPrivateKey;
    use keymgr_core::KeyUsage::{Sign, Verify};

    #[test]
    fn any_key_delegates_to_variant() {
        let ec = EcPrivateKey::generate(
            "ec-1",
            KeyType::EccNistP,
            256,
            [Sign, Verify],
            &mut rand::rngs::OsRng,
        )
        .unwrap();
        let any = AnyKey::from(ec);
        assert_eq!(any.id(), "ec-1");
        assert_eq!(any.key_size(), 256);
        assert!(any.is_private());
        assert!(!any.is_remote());
        assert!(any.can_sign(SignAlgorithm::EcdSha256));
        assert!(!any.can_sign(SignAlgorithm::RsaPssSha256));
        assert!(matches!(any.material(), KeyMaterial::EcPrivate(_)));

        let public = any.public_key().unwrap();
        assert!(!public.is_private());
        assert_eq!(public.id(), "ec-1");
        assert_eq!(public.usage(), any.usage());
        assert_eq!(public.kind(), "ec public key");
    }

    #[test]
    fn remote_material_is_the_identifier() {
        let remote = RemoteKey::describe(
            "arn:aws:kms:eu-west-1:111122223333:key/1234",
            KeyType::Rsa,
            2048,
            [Sign],
        )
        .unwrap();
        let any = AnyKey::from(remote);
        assert!(any.is_remote());
        match any.material() {
            KeyMaterial::Remote(id) => assert_eq!(id, any.id()),
            other => panic!("unexpected material {other:?}"),
        }
        assert!(any.public_key().is_none());
    }

    #[test]
    fn expect_type_names_the_actual_kind() {
        let sym = SymmetricKey::new("s", vec![7u8; 32], [KeyUsage::Encrypt]).unwrap();
        let any = AnyKey::from(sym);
        assert!(any.expect_type(KeyType::Symmetric).is_ok());
        let err = any.expect_type(KeyType::Rsa).unwrap_err();
        assert!(err.to_string().contains("symmetric key"));
    }
}
