//! Streaming ChaCha20-Poly1305 (RFC 7539).
//!
//! This module provides:
//! - [`Rfc7539`]: an AEAD context that encrypts or decrypts in chunks
//! - the size constants shared with the storage layout
//!
//! # Why streaming
//!
//! Protected values are written to flash one ChaCha20 block at a time as
//! they are produced, so peak RAM is one block regardless of value size.
//! The one-shot AEAD APIs need the whole buffer in memory; this context
//! drives the stream cipher and the Poly1305 authenticator directly and is
//! bit-identical to the one-shot construction.
//!
//! # Call order
//!
//! `new` → `auth` (at most once) → `encrypt`/`decrypt` (any number of
//! chunks, every chunk except the last a multiple of 16 bytes) → `finish`.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use poly1305::universal_hash::{KeyInit, UniversalHash};
use poly1305::Poly1305;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// ChaCha20 key length in bytes.
pub const CHACHA20_KEY_SIZE: usize = 32;

/// ChaCha20 IV (nonce) length in bytes, as per RFC 7539.
pub const CHACHA20_IV_SIZE: usize = 12;

/// ChaCha20 block length in bytes.
pub const CHACHA20_BLOCK_SIZE: usize = 64;

/// Poly1305 tag length in bytes.
pub const POLY1305_TAG_SIZE: usize = 16;

/// Poly1305 block length; every non-final data chunk must be a multiple.
const POLY1305_BLOCK_SIZE: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Nothing absorbed yet.
    Fresh,
    /// Associated data absorbed.
    Authenticated,
    /// Data chunks absorbed, all block-aligned so far.
    Streaming,
    /// A short chunk was absorbed; only `finish` may follow.
    Tail,
}

/// ChaCha20-Poly1305 AEAD context.
pub struct Rfc7539 {
    cipher: ChaCha20,
    mac: Poly1305,
    stage: Stage,
    aad_len: u64,
    data_len: u64,
}

impl Rfc7539 {
    /// Key the cipher and derive the one-time Poly1305 key from block 0.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if `key` is not 32 bytes
    /// or `iv` is not 12 bytes.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != CHACHA20_KEY_SIZE {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "invalid ChaCha20 key length: {} bytes (expected {CHACHA20_KEY_SIZE})",
                key.len()
            )));
        }
        if iv.len() != CHACHA20_IV_SIZE {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "invalid ChaCha20 IV length: {} bytes (expected {CHACHA20_IV_SIZE})",
                iv.len()
            )));
        }

        let mut cipher = ChaCha20::new(key.into(), iv.into());
        let mut block0 = [0u8; CHACHA20_BLOCK_SIZE];
        cipher.apply_keystream(&mut block0);
        let mac = Poly1305::new(poly1305::Key::from_slice(&block0[..CHACHA20_KEY_SIZE]));
        block0.zeroize();

        Ok(Self {
            cipher,
            mac,
            stage: Stage::Fresh,
            aad_len: 0,
            data_len: 0,
        })
    }

    /// Absorb associated data.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadMisuse`] if called twice or after data.
    pub fn auth(&mut self, aad: &[u8]) -> Result<(), CryptoError> {
        if self.stage != Stage::Fresh {
            return Err(CryptoError::AeadMisuse("associated data must come first and once"));
        }
        self.mac.update_padded(aad);
        self.aad_len = aad.len() as u64;
        self.stage = Stage::Authenticated;
        Ok(())
    }

    /// Encrypt `input` into `output` (same length) and authenticate the
    /// ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadMisuse`] on a length mismatch or when a
    /// short chunk was already processed.
    pub fn encrypt(&mut self, input: &[u8], output: &mut [u8]) -> Result<(), CryptoError> {
        self.begin_chunk(input.len(), output.len())?;
        output.copy_from_slice(input);
        self.cipher.apply_keystream(output);
        self.mac.update_padded(output);
        Ok(())
    }

    /// Authenticate `input` and decrypt it into `output` (same length).
    ///
    /// The plaintext must not be trusted until the tag from [`finish`]
    /// has been compared against the stored one.
    ///
    /// [`finish`]: Rfc7539::finish
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadMisuse`] on a length mismatch or when a
    /// short chunk was already processed.
    pub fn decrypt(&mut self, input: &[u8], output: &mut [u8]) -> Result<(), CryptoError> {
        self.begin_chunk(input.len(), output.len())?;
        self.mac.update_padded(input);
        output.copy_from_slice(input);
        self.cipher.apply_keystream(output);
        Ok(())
    }

    fn begin_chunk(&mut self, in_len: usize, out_len: usize) -> Result<(), CryptoError> {
        if in_len != out_len {
            return Err(CryptoError::AeadMisuse("input and output lengths differ"));
        }
        if self.stage == Stage::Tail {
            return Err(CryptoError::AeadMisuse("data after a partial block"));
        }
        self.stage = if in_len % POLY1305_BLOCK_SIZE == 0 {
            Stage::Streaming
        } else {
            Stage::Tail
        };
        self.data_len = self.data_len.wrapping_add(in_len as u64);
        Ok(())
    }

    /// Absorb the length block and return the Poly1305 tag.
    #[must_use]
    pub fn finish(mut self) -> [u8; POLY1305_TAG_SIZE] {
        let mut lengths = [0u8; POLY1305_BLOCK_SIZE];
        lengths[..8].copy_from_slice(&self.aad_len.to_le_bytes());
        lengths[8..].copy_from_slice(&self.data_len.to_le_bytes());
        self.mac.update_padded(&lengths);
        self.mac.finalize().into()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
