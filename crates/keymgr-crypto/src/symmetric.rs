//! # Symmetric Keys
//!
//! Opaque secret material usable with the `symmetric-default` cipher
//! (AES-GCM) and as the key of a keyed digest stage. The secret is held in
//! [`Zeroizing`] and wiped on drop.
//!
//! `symmetric-default` picks AES-128-GCM or AES-256-GCM from the key length.
//! Ciphertext is `nonce (12 bytes) || ciphertext || tag (16 bytes)` with a
//! fresh random nonce per call.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use keymgr_core::{Cipher, KeyAttributes, KeyError, KeyType, KeyUsage};

use crate::key::{Key, KeyMaterial};

const NONCE_LEN: usize = 12;

/// A symmetric secret.
#[derive(Clone)]
pub struct SymmetricKey {
    attrs: KeyAttributes,
    secret: Zeroizing<Vec<u8>>,
}

impl SymmetricKey {
    /// Wrap existing secret material. The key size is `8 × len`.
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<Vec<u8>>,
        usage: impl IntoIterator<Item = KeyUsage>,
    ) -> Result<Self, KeyError> {
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            return Err(KeyError::MalformedInput(
                "symmetric key material must not be empty".to_string(),
            ));
        }
        let attrs = KeyAttributes::new(id, KeyType::Symmetric, secret.len() * 8, usage)?;
        Ok(Self { attrs, secret })
    }

    /// Generate `bits` of fresh secret material. `bits` must be a positive
    /// multiple of 8.
    pub fn generate<R: RngCore + CryptoRng>(
        id: impl Into<String>,
        bits: usize,
        usage: impl IntoIterator<Item = KeyUsage>,
        rng: &mut R,
    ) -> Result<Self, KeyError> {
        if bits == 0 || bits % 8 != 0 {
            return Err(KeyError::UnsupportedKeySize {
                key_type: KeyType::Symmetric,
                size: bits,
            });
        }
        let mut secret = Zeroizing::new(vec![0u8; bits / 8]);
        rng.fill_bytes(&mut secret);
        Self::new(id, secret.to_vec(), usage)
    }

    /// Restrict the ciphers this key accepts.
    pub fn with_ciphers(mut self, ciphers: impl IntoIterator<Item = Cipher>) -> Self {
        self.attrs = self.attrs.with_ciphers(ciphers);
        self
    }
}

impl Key for SymmetricKey {
    fn attributes(&self) -> &KeyAttributes {
        &self.attrs
    }

    fn is_private(&self) -> bool {
        true
    }

    fn material(&self) -> KeyMaterial<'_> {
        KeyMaterial::Symmetric(&self.secret)
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("attrs", &self.attrs)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// AES-GCM encrypt with a random nonce prefixed to the output.
pub(crate) fn encrypt<R: RngCore + CryptoRng>(
    secret: &[u8],
    plaintext: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, KeyError> {
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);
    let nonce_ref = Nonce::from(nonce);
    let sealed = match secret.len() {
        16 => Aes128Gcm::new_from_slice(secret)
            .map_err(|e| aead_err("key", e))?
            .encrypt(&nonce_ref, plaintext),
        32 => Aes256Gcm::new_from_slice(secret)
            .map_err(|e| aead_err("key", e))?
            .encrypt(&nonce_ref, plaintext),
        other => return Err(bad_length(other)),
    };
    let sealed = sealed.map_err(|e| aead_err("encryption", e))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Inverse of [`encrypt`]. A tag mismatch is a `Crypto` error.
pub(crate) fn decrypt(secret: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
    if ciphertext.len() < NONCE_LEN {
        return Err(KeyError::MalformedInput(format!(
            "ciphertext of {} bytes is shorter than the nonce",
            ciphertext.len()
        )));
    }
    let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
    let nonce = <[u8; NONCE_LEN]>::try_from(nonce)
        .map(Nonce::from)
        .map_err(|_| KeyError::MalformedInput("truncated nonce".to_string()))?;
    let opened = match secret.len() {
        16 => Aes128Gcm::new_from_slice(secret)
            .map_err(|e| aead_err("key", e))?
            .decrypt(&nonce, sealed),
        32 => Aes256Gcm::new_from_slice(secret)
            .map_err(|e| aead_err("key", e))?
            .decrypt(&nonce, sealed),
        other => return Err(bad_length(other)),
    };
    opened.map_err(|e| aead_err("decryption", e))
}

fn aead_err(stage: &str, e: impl std::fmt::Display) -> KeyError {
    KeyError::Crypto(format!("aes-gcm {stage} failed: {e}"))
}

fn bad_length(len: usize) -> KeyError {
    KeyError::Crypto(format!(
        "symmetric-default needs a 128 or 256-bit key, got {} bits",
        len * 8
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keymgr_core::KeyUsage::{Decrypt, Encrypt};
    use rand::rngs::OsRng;

    #[test]
    fn symmetric_keys_are_private_and_symmetric() {
        let key = SymmetricKey::new("sym", vec![1u8; 32], [Encrypt]).unwrap();
        assert!(key.is_private());
        assert!(key.is_symmetric());
        assert_eq!(key.key_size(), 256);
        assert!(!key.is_remote());
    }

    #[test]
    fn generate_rejects_partial_bytes() {
        assert!(SymmetricKey::generate("s", 100, [Encrypt], &mut OsRng).is_err());
        assert!(SymmetricKey::generate("s", 0, [Encrypt], &mut OsRng).is_err());
        let k = SymmetricKey::generate("s", 128, [Encrypt], &mut OsRng).unwrap();
        assert_eq!(k.key_size(), 128);
    }

    #[test]
    fn empty_material_is_rejected() {
        assert!(SymmetricKey::new("s", Vec::new(), [Encrypt]).is_err());
    }

    #[test]
    fn aes_gcm_round_trip_for_both_lengths() {
        for len in [16usize, 32] {
            let secret = vec![9u8; len];
            let ct = encrypt(&secret, b"hello", &mut OsRng).unwrap();
            assert_eq!(ct.len(), NONCE_LEN + 5 + 16);
            assert_eq!(decrypt(&secret, &ct).unwrap(), b"hello");
        }
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let secret = [3u8; 32];
        let mut ct = encrypt(&secret, b"hello", &mut OsRng).unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 1;
        assert!(matches!(decrypt(&secret, &ct), Err(KeyError::Crypto(_))));
        assert!(matches!(decrypt(&secret, &ct[..4]), Err(KeyError::MalformedInput(_))));
    }

    #[test]
    fn nonce_is_read_from_the_prefix() {
        let secret = [5u8; 16];
        let mut ct = encrypt(&secret, b"hello", &mut OsRng).unwrap();
        assert!(matches!(decrypt(&secret, &ct[..NONCE_LEN]), Err(KeyError::Crypto(_))));
        ct[0] ^= 1;
        assert!(matches!(decrypt(&secret, &ct), Err(KeyError::Crypto(_))));
        ct[0] ^= 1;
        assert_eq!(decrypt(&secret, &ct).unwrap(), b"hello");
    }

    #[test]
    fn odd_key_lengths_cannot_encrypt() {
        let key = SymmetricKey::new("s", vec![0u8; 24], [Encrypt, Decrypt]).unwrap();
        let KeyMaterial::Symmetric(secret) = key.material() else {
            panic!("symmetric material expected");
        };
        assert!(matches!(
            encrypt(secret, b"x", &mut OsRng),
            Err(KeyError::Crypto(_))
        ));
    }

    #[test]
    fn debug_redacts_secret() {
        let key = SymmetricKey::new("s", vec![0xAB; 16], [Encrypt]).unwrap();
        let printed = format!("{key:?}");
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("171"));
    }
}
