//! SHA-256 / HMAC-SHA256 helpers.
//!
//! [`KeyTagger`] is the building block of the whole-store authentication
//! tag: it keys HMAC once (the inner and outer padded blocks are absorbed a
//! single time) and then produces one tag per 16-bit storage key by cloning
//! the prepared state, so every key costs exactly two compression-function
//! calls regardless of what is stored under it.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use crate::memory::SecretBytes;

/// SHA-256 output length in bytes.
pub const SHA256_DIGEST_LENGTH: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; SHA256_DIGEST_LENGTH] {
    Sha256::digest(data).into()
}

/// HMAC-SHA256 of `data` under `key`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if the MAC cannot be keyed
/// (not reachable for HMAC, which accepts any key length).
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<SecretBytes<SHA256_DIGEST_LENGTH>, CryptoError> {
    let mut mac = new_hmac(key)?;
    mac.update(data);
    Ok(SecretBytes::new(mac.finalize().into_bytes().into()))
}

fn new_hmac(key: &[u8]) -> Result<HmacSha256, CryptoError> {
    <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("HMAC key rejected: {e}")))
}

/// HMAC-SHA256 keyed once, evaluated many times.
pub struct KeyTagger {
    prepared: HmacSha256,
}

impl KeyTagger {
    /// Absorb `key` into the inner and outer HMAC states.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if the MAC cannot be keyed.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            prepared: new_hmac(key)?,
        })
    }

    /// HMAC of an arbitrary message under the prepared key.
    #[must_use]
    pub fn tag(&self, data: &[u8]) -> SecretBytes<SHA256_DIGEST_LENGTH> {
        let mut mac = self.prepared.clone();
        mac.update(data);
        SecretBytes::new(mac.finalize().into_bytes().into())
    }

    /// HMAC of a storage key, encoded as two little-endian bytes.
    #[must_use]
    pub fn key_tag(&self, key: u16) -> SecretBytes<SHA256_DIGEST_LENGTH> {
        self.tag(&key.to_le_bytes())
    }

    /// XOR the tag of `key` into `sum`. Applying the same key twice cancels
    /// out, which is how deletions are accounted for.
    pub fn fold(&self, sum: &mut SecretBytes<SHA256_DIGEST_LENGTH>, key: u16) {
        let tag = self.key_tag(key);
        for (s, t) in sum.expose_mut().iter_mut().zip(tag.expose().iter()) {
            *s ^= t;
        }
    }
}
