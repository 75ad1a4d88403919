//! Whole-store authentication tag.
//!
//! The SAK-keyed HMAC of every protected key is XORed into a 32-byte sum,
//! and `HMAC(SAK, sum)[..16]` is stored under the tag key. Reading any
//! protected value recomputes the sum over the whole ledger and checks the
//! tag, so adding, removing or renaming a protected entry behind the
//! storage layer's back is detected on the next protected read.

use pinstore_crypto_core::{hmac_sha256, KeyTagger, SecretBytes, SHA256_DIGEST_LENGTH};

use super::{Storage, STORAGE_TAG_SIZE};
use crate::error::StorageError;
use crate::key::{StorageKey, STORAGE_TAG_KEY};
use crate::ledger::Ledger;

impl<L: Ledger> Storage<L> {
    fn write_storage_tag(&mut self) -> Result<(), StorageError> {
        let tag = hmac_sha256(self.cached_sak(), self.authentication_sum.expose())?;
        self.ledger
            .set(STORAGE_TAG_KEY.raw(), &tag.expose()[..STORAGE_TAG_SIZE])?;
        Ok(())
    }

    /// Reset the sum to that of a store without protected entries.
    pub(super) fn auth_init(&mut self) -> Result<(), StorageError> {
        self.authentication_sum.clear();
        self.write_storage_tag()
    }

    /// Toggle `key` in the sum and rewrite the tag. Public keys are not
    /// covered.
    pub(super) fn auth_update(&mut self, key: StorageKey) -> Result<(), StorageError> {
        if !key.is_protected() {
            return Ok(());
        }
        let tagger = KeyTagger::new(self.cached_sak())?;
        tagger.fold(&mut self.authentication_sum, key.raw());
        self.write_storage_tag()
    }

    /// Write `key` (or pre-allocate it with `None`) and account for it in
    /// the tag if it is new. If the tag cannot be updated the new entry is
    /// removed again.
    pub(super) fn auth_set(
        &mut self,
        key: StorageKey,
        value: Option<&[u8]>,
        len: u16,
    ) -> Result<(), StorageError> {
        let found = self.ledger.set_ex(key.raw(), value, len)?;
        if !found {
            if let Err(e) = self.auth_update(key) {
                if let Err(del) = self.ledger.delete(key.raw()) {
                    tracing::warn!(key = %key, "rollback after failed tag update failed: {del}");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Walk the whole ledger, verify the authentication tag and return the
    /// raw stored value of `key`. Caches the recomputed sum.
    pub(super) fn auth_get(&mut self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
        let tagger = KeyTagger::new(self.cached_sak())?;
        let mut sum = SecretBytes::<SHA256_DIGEST_LENGTH>::zeroed();

        let mut value = None;
        let mut stored_tag = None;
        let mut entry_count = 0u32;
        let mut other_count = 0u32;
        let mut cursor = 0usize;
        while let Some((k, v)) = self.ledger.get_next(&mut cursor) {
            entry_count = entry_count.wrapping_add(1);
            if k == key.raw() {
                value = Some(v.to_vec());
            } else {
                other_count = other_count.wrapping_add(1);
            }
            let k = StorageKey::from_raw(k);
            if !k.is_protected() {
                if k == STORAGE_TAG_KEY {
                    stored_tag = Some(v.to_vec());
                }
                continue;
            }
            tagger.fold(&mut sum, k.raw());
        }

        let computed = tagger.tag(sum.expose());
        self.authentication_sum.expose_mut().copy_from_slice(sum.expose());

        if self.ledger.get_next(&mut cursor).is_some() {
            return Err(self.handle_fault("loop completion check"));
        }

        let tag_ok = match stored_tag {
            Some(ref tag) if tag.len() == STORAGE_TAG_SIZE => {
                self.secure_eq(&computed.expose()[..STORAGE_TAG_SIZE], tag)?
            }
            _ => false,
        };
        if !tag_ok {
            return Err(self.handle_fault("storage tag check"));
        }

        if value.is_none() && other_count != entry_count {
            return Err(self.handle_fault("sanity check"));
        }
        Ok(value)
    }
}
