//! # Digest Composer
//!
//! Composes one- or two-stage digests:
//!
//! - one stage: a plain hash (`sha256`, `sha384`, `sha512`) of the message;
//! - two stages: a keyed construction (`hmac`) wrapping the plain hash of
//!   stage 0, keyed with the supplied key.
//!
//! The message is streamed into the accumulator in chunks of the hash's
//! block size (64 bytes for SHA-256, 128 for SHA-384/512), with any
//! remainder in one final write. A write that accepts fewer bytes than
//! offered is an integrity failure and aborts the computation.

use std::io::Write;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};

use keymgr_core::{HashAlgorithm, KeyError};

/// Input to [`Digester::digest_request`].
#[derive(Debug, Clone, Copy)]
pub struct DigestRequest<'a> {
    /// One or two stages, applied in order.
    pub stages: &'a [HashAlgorithm],
    /// Key for a keyed stage.
    pub key: Option<&'a [u8]>,
    /// The message.
    pub message: &'a [u8],
}

/// Streaming hash state for one composed digest.
pub(crate) enum Accumulator {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    HmacSha256(Hmac<Sha256>),
    HmacSha384(Hmac<Sha384>),
    HmacSha512(Hmac<Sha512>),
}

impl Accumulator {
    /// Build the accumulator for a validated stage list.
    fn new(stages: &[HashAlgorithm], key: Option<&[u8]>) -> Result<Self, KeyError> {
        match stages {
            [] | [_, _, _, ..] => Err(KeyError::Configuration(
                "number of hash algorithms must be either one or two".to_string(),
            )),
            [plain] => Self::plain(*plain),
            [inner, outer] => {
                if inner.is_keyed() {
                    return Err(KeyError::UnsupportedAlgorithm(format!(
                        "{inner} cannot be the first digest stage"
                    )));
                }
                if !outer.is_keyed() {
                    return Err(KeyError::UnsupportedAlgorithm(format!(
                        "{outer} cannot wrap {inner}: the second stage must be keyed"
                    )));
                }
                let key = key.ok_or_else(|| {
                    KeyError::Configuration(format!("{outer} over {inner} requires a key"))
                })?;
                Self::keyed(*inner, key)
            }
        }
    }

    fn plain(alg: HashAlgorithm) -> Result<Self, KeyError> {
        match alg {
            HashAlgorithm::Sha256 => Ok(Self::Sha256(Sha256::new())),
            HashAlgorithm::Sha384 => Ok(Self::Sha384(Sha384::new())),
            HashAlgorithm::Sha512 => Ok(Self::Sha512(Sha512::new())),
            HashAlgorithm::None => Err(KeyError::Configuration(
                "hash algorithm none produces no digest".to_string(),
            )),
            HashAlgorithm::Hmac => Err(KeyError::UnsupportedAlgorithm(
                "hmac needs an inner hash stage".to_string(),
            )),
        }
    }

    fn keyed(inner: HashAlgorithm, key: &[u8]) -> Result<Self, KeyError> {
        let bad_key = |e: hmac::digest::InvalidLength| KeyError::Crypto(format!("hmac key: {e}"));
        match inner {
            HashAlgorithm::Sha256 => Ok(Self::HmacSha256(
                Hmac::<Sha256>::new_from_slice(key).map_err(bad_key)?,
            )),
            HashAlgorithm::Sha384 => Ok(Self::HmacSha384(
                Hmac::<Sha384>::new_from_slice(key).map_err(bad_key)?,
            )),
            HashAlgorithm::Sha512 => Ok(Self::HmacSha512(
                Hmac::<Sha512>::new_from_slice(key).map_err(bad_key)?,
            )),
            HashAlgorithm::None => Err(KeyError::Configuration(
                "hmac needs an inner hash, got none".to_string(),
            )),
            HashAlgorithm::Hmac => Err(KeyError::UnsupportedAlgorithm(
                "hmac cannot wrap hmac".to_string(),
            )),
        }
    }

    /// Block size of the underlying hash.
    fn block_size(&self) -> usize {
        match self {
            Self::Sha256(_) | Self::HmacSha256(_) => 64,
            Self::Sha384(_) | Self::Sha512(_) | Self::HmacSha384(_) | Self::HmacSha512(_) => 128,
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
            Self::HmacSha256(m) => m.finalize().into_bytes().to_vec(),
            Self::HmacSha384(m) => m.finalize().into_bytes().to_vec(),
            Self::HmacSha512(m) => m.finalize().into_bytes().to_vec(),
        }
    }
}

impl Write for Accumulator {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Sha256(h) => Digest::update(h, buf),
            Self::Sha384(h) => Digest::update(h, buf),
            Self::Sha512(h) => Digest::update(h, buf),
            Self::HmacSha256(m) => Mac::update(m, buf),
            Self::HmacSha384(m) => Mac::update(m, buf),
            Self::HmacSha512(m) => Mac::update(m, buf),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Write `data` to `out` in `block_size` chunks. A short write is an
/// `Integrity` error.
pub fn chunked_write<W: Write + ?Sized>(
    out: &mut W,
    data: &[u8],
    block_size: usize,
) -> Result<(), KeyError> {
    if block_size == 0 {
        return Err(KeyError::Configuration("block size must be positive".to_string()));
    }
    let mut written = 0usize;
    for chunk in data.chunks(block_size) {
        let n = out.write(chunk)?;
        if n != chunk.len() {
            return Err(KeyError::Integrity(format!(
                "short write at offset {written}: {n} of {} bytes accepted",
                chunk.len()
            )));
        }
        written += n;
    }
    Ok(())
}

/// Computes composed digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Digester;

impl Digester {
    /// Create a digester.
    pub fn new() -> Self {
        Self
    }

    /// Digest `msg` through `stages`, keying a keyed stage with `key`.
    pub fn digest(
        &self,
        key: Option<&[u8]>,
        msg: &[u8],
        stages: &[HashAlgorithm],
    ) -> Result<Vec<u8>, KeyError> {
        let mut acc = Accumulator::new(stages, key)?;
        let block_size = acc.block_size();
        chunked_write(&mut acc, msg, block_size)?;
        Ok(acc.finalize())
    }

    /// [`digest`](Self::digest) over a [`DigestRequest`].
    pub fn digest_request(&self, req: &DigestRequest<'_>) -> Result<Vec<u8>, KeyError> {
        self.digest(req.key, req.message, req.stages)
    }

    /// [`digest`](Self::digest) with stage identifiers given as strings.
    /// Unknown identifiers are `UnsupportedAlgorithm`.
    pub fn digest_named(
        &self,
        key: Option<&[u8]>,
        msg: &[u8],
        stages: &[&str],
    ) -> Result<Vec<u8>, KeyError> {
        let stages = stages
            .iter()
            .map(|s| s.parse::<HashAlgorithm>())
            .collect::<Result<Vec<_>, _>>()?;
        self.digest(key, msg, &stages)
    }
}

/// Plain single-stage hash, used ahead of signing.
pub(crate) fn hash(alg: HashAlgorithm, msg: &[u8]) -> Result<Vec<u8>, KeyError> {
    Digester.digest(None, msg, &[alg])
}
