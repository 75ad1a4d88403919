//! Incremental PBKDF2-HMAC-SHA256.
//!
//! The storage layer derives the PIN key-encryption key in two halves and
//! reports progress (and honours cancellation) between rounds, so the
//! iteration loop has to be resumable:
//!
//! ```text
//! let mut ctx = Pbkdf2Sha256::new(pin, salt, 1)?;   // block index 1
//! for _ in 0..5 { ctx.update(iterations / 10); report_progress(); }
//! let kek = ctx.finish();
//! ```
//!
//! The result is bit-identical to one-shot PBKDF2 with `1 + Σ update(n)`
//! iterations for the requested output block.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::mac::SHA256_DIGEST_LENGTH;
use crate::memory::SecretBytes;

type HmacSha256 = Hmac<Sha256>;

/// Resumable PBKDF2-HMAC-SHA256 state for a single output block.
pub struct Pbkdf2Sha256 {
    prf: HmacSha256,
    u: [u8; SHA256_DIGEST_LENGTH],
    t: [u8; SHA256_DIGEST_LENGTH],
}

impl Pbkdf2Sha256 {
    /// Start deriving output block `block_index` (1-based, as in RFC 8018).
    ///
    /// Performs the first iteration, `U1 = PRF(P, S ∥ INT(i))`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if `block_index` is zero
    /// or the PRF cannot be keyed.
    pub fn new(password: &[u8], salt: &[u8], block_index: u32) -> Result<Self, CryptoError> {
        if block_index == 0 {
            return Err(CryptoError::InvalidKeyMaterial(
                "PBKDF2 block index is 1-based".into(),
            ));
        }
        let prf = <HmacSha256 as Mac>::new_from_slice(password)
            .map_err(|e| CryptoError::InvalidKeyMaterial(format!("PBKDF2 PRF key rejected: {e}")))?;

        let mut first = prf.clone();
        first.update(salt);
        first.update(&block_index.to_be_bytes());
        let u: [u8; SHA256_DIGEST_LENGTH] = first.finalize().into_bytes().into();

        Ok(Self { prf, u, t: u })
    }

    /// Run `iterations` more rounds: `U_j = PRF(P, U_{j-1})`, `T ^= U_j`.
    pub fn update(&mut self, iterations: u32) {
        for _ in 0..iterations {
            let mut mac = self.prf.clone();
            mac.update(&self.u);
            let mut next: [u8; SHA256_DIGEST_LENGTH] = mac.finalize().into_bytes().into();
            for (t, u) in self.t.iter_mut().zip(next.iter()) {
                *t ^= u;
            }
            self.u.copy_from_slice(&next);
            next.zeroize();
        }
    }

    /// Return the derived block. Intermediate state is wiped on drop.
    #[must_use]
    pub fn finish(self) -> SecretBytes<SHA256_DIGEST_LENGTH> {
        SecretBytes::new(self.t)
    }
}

impl Drop for Pbkdf2Sha256 {
    fn drop(&mut self) {
        self.u.zeroize();
        self.t.zeroize();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
