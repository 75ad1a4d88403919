//! Authenticated encryption of protected values under the cached DEK.

use pinstore_crypto_core::{
    random_buffer, Rfc7539, SecretBuffer, CHACHA20_BLOCK_SIZE, CHACHA20_IV_SIZE,
    POLY1305_TAG_SIZE,
};
use zeroize::{Zeroize, Zeroizing};

use super::{Storage, MAX_PROTECTED_LEN};
use crate::error::StorageError;
use crate::key::StorageKey;
use crate::ledger::Ledger;

const HEADER_SIZE: usize = CHACHA20_IV_SIZE + POLY1305_TAG_SIZE;

fn offset_u16(offset: usize) -> Result<u16, StorageError> {
    u16::try_from(offset).map_err(|_| StorageError::ValueTooLong { len: offset })
}

impl<L: Ledger> Storage<L> {
    /// Encrypt `value` straight into a pre-allocated entry, one ChaCha20
    /// block at a time, then write the tag.
    pub(super) fn set_encrypted(&mut self, key: StorageKey, value: &[u8]) -> Result<(), StorageError> {
        if value.len() > MAX_PROTECTED_LEN {
            return Err(StorageError::ValueTooLong { len: value.len() });
        }
        let total = offset_u16(HEADER_SIZE.saturating_add(value.len()))?;
        self.auth_set(key, None, total)?;

        let mut iv = [0u8; CHACHA20_IV_SIZE];
        random_buffer(&mut iv)?;
        self.ledger.update_bytes(key.raw(), 0, &iv)?;

        let mut ctx = Rfc7539::new(self.cached_dek(), &iv)?;
        ctx.auth(&key.to_le_bytes())?;

        let mut block = Zeroizing::new([0u8; CHACHA20_BLOCK_SIZE]);
        let mut offset = HEADER_SIZE;
        for chunk in value.chunks(CHACHA20_BLOCK_SIZE) {
            let out = &mut block[..chunk.len()];
            ctx.encrypt(chunk, out)?;
            self.ledger.update_bytes(key.raw(), offset_u16(offset)?, out)?;
            offset = offset.saturating_add(chunk.len());
        }

        let tag = ctx.finish();
        self.ledger
            .update_bytes(key.raw(), offset_u16(CHACHA20_IV_SIZE)?, &tag)?;
        Ok(())
    }

    /// Authenticated raw entry of `key`: `IV ∥ TAG ∥ CT`.
    pub(super) fn load_encrypted(&mut self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
        let Some(stored) = self.auth_get(key)? else {
            return Ok(None);
        };
        if stored.len() < HEADER_SIZE {
            return Err(self.handle_fault("ciphertext length check"));
        }
        Ok(Some(stored))
    }

    /// Decrypt and verify the value of `key`. A tag mismatch is a fault and
    /// no plaintext is returned.
    pub(super) fn get_encrypted(
        &mut self,
        key: StorageKey,
        max_len: usize,
    ) -> Result<Option<SecretBuffer>, StorageError> {
        let Some(stored) = self.load_encrypted(key)? else {
            return Ok(None);
        };
        let (iv, rest) = stored.split_at(CHACHA20_IV_SIZE);
        let (stored_tag, ciphertext) = rest.split_at(POLY1305_TAG_SIZE);
        if ciphertext.len() > max_len {
            return Err(StorageError::BufferTooSmall {
                len: ciphertext.len(),
            });
        }

        let mut plaintext = vec![0u8; ciphertext.len()];
        let mut ctx = Rfc7539::new(self.cached_dek(), iv)?;
        ctx.auth(&key.to_le_bytes())?;
        ctx.decrypt(ciphertext, &mut plaintext)?;
        let mut computed = ctx.finish();

        let ok = self.secure_eq(&computed, stored_tag);
        computed.zeroize();
        let ok = match ok {
            Ok(ok) => ok,
            Err(e) => {
                plaintext.zeroize();
                return Err(e);
            }
        };
        if !ok {
            plaintext.zeroize();
            return Err(self.handle_fault("authentication tag check"));
        }
        Ok(Some(SecretBuffer::from_vec(plaintext)))
    }
}
