//! The wipe code: a second PIN that erases the storage when entered.
//!
//! Stored as `code:u32 ∥ salt[8] ∥ HMAC(salt, code)[..8]`. Candidates are
//! compared through the salted tag, computed twice so that a single
//! glitched computation cannot turn a match into a mismatch.

use pinstore_crypto_core::{hmac_sha256, random_buffer, wait_random};
use zeroize::Zeroizing;

use super::Storage;
use crate::error::StorageError;
use crate::key::WIPE_CODE_DATA_KEY;
use crate::ledger::Ledger;
use crate::pin::{ExternalSalt, Pin, WIPE_CODE_EMPTY};
use crate::progress::{PROCESSING_MSG, VERIFYING_PIN_MSG};

const WIPE_CODE_SIZE: usize = 4;
const WIPE_CODE_SALT_SIZE: usize = 8;
const WIPE_CODE_TAG_SIZE: usize = 8;
const WIPE_CODE_DATA_SIZE: usize = WIPE_CODE_SIZE + WIPE_CODE_SALT_SIZE + WIPE_CODE_TAG_SIZE;

impl<L: Ledger> Storage<L> {
    /// Store `code` (already in its stored form, [`WIPE_CODE_EMPTY`] for
    /// none) with a fresh salt.
    pub(super) fn set_wipe_code(&mut self, code: u32) -> Result<(), StorageError> {
        let mut data = Zeroizing::new([0u8; WIPE_CODE_DATA_SIZE]);
        let (code_bytes, rest) = data.split_at_mut(WIPE_CODE_SIZE);
        let (salt, tag) = rest.split_at_mut(WIPE_CODE_SALT_SIZE);
        code_bytes.copy_from_slice(&code.to_le_bytes());
        random_buffer(salt)?;
        let mac = hmac_sha256(salt, code_bytes)?;
        tag.copy_from_slice(&mac.expose()[..WIPE_CODE_TAG_SIZE]);

        self.ledger.set(WIPE_CODE_DATA_KEY.raw(), data.as_slice())?;
        Ok(())
    }

    /// `Ok(true)` unless `candidate` is the wipe code.
    pub(super) fn is_not_wipe_code(&mut self, candidate: u32) -> Result<bool, StorageError> {
        let data = self
            .ledger
            .get(WIPE_CODE_DATA_KEY.raw())
            .filter(|d| d.len() == WIPE_CODE_DATA_SIZE)
            .map(|d| Zeroizing::new(d.to_vec()));
        let Some(data) = data else {
            return Err(self.handle_fault("no wipe code"));
        };
        let (code, rest) = data.split_at(WIPE_CODE_SIZE);
        let (salt, stored_tag) = rest.split_at(WIPE_CODE_SALT_SIZE);

        let integrity = hmac_sha256(salt, code)?;
        if !self.secure_eq(stored_tag, &integrity.expose()[..WIPE_CODE_TAG_SIZE])? {
            return Err(self.handle_fault("wipe code tag"));
        }

        let candidate = Zeroizing::new(candidate.to_le_bytes());
        wait_random();
        let first = hmac_sha256(salt, candidate.as_slice())?;
        wait_random();
        let second = hmac_sha256(salt, candidate.as_slice())?;
        if !self.secure_eq(first.expose(), second.expose())? {
            return Err(self.handle_fault("wipe code fault"));
        }

        wait_random();
        let matches = self.secure_eq(stored_tag, &first.expose()[..WIPE_CODE_TAG_SIZE])?;
        Ok(!matches)
    }

    /// Wipe and halt if `candidate` is the wipe code.
    pub(super) fn check_not_wipe_code(&mut self, candidate: u32) -> Result<(), StorageError> {
        if self.is_not_wipe_code(candidate)? {
            Ok(())
        } else {
            tracing::warn!("wipe code entered");
            Err(self.fatal_wipe(StorageError::WipeCodeEntered))
        }
    }

    /// Wipe and halt if `pin` is the wipe code.
    ///
    /// # Errors
    ///
    /// [`StorageError::WipeCodeEntered`] (fatal) on a match.
    pub fn ensure_not_wipe_code(&mut self, pin: &Pin) -> Result<(), StorageError> {
        self.ensure_running()?;
        self.check_not_wipe_code(pin.encoded())
    }

    /// `true` if a wipe code is configured.
    ///
    /// # Errors
    ///
    /// [`StorageError::Locked`] unless unlocked.
    pub fn has_wipe_code(&mut self) -> Result<bool, StorageError> {
        self.ensure_running()?;
        if !self.unlocked {
            return Err(StorageError::Locked);
        }
        self.is_not_wipe_code(WIPE_CODE_EMPTY)
    }

    /// Verify `pin` and set the wipe code to `code`. The empty `code`
    /// removes the wipe code.
    ///
    /// # Errors
    ///
    /// - [`StorageError::BadArgument`] if `code` equals a non-empty `pin`
    /// - all errors of [`Storage::unlock`]
    pub fn change_wipe_code(
        &mut self,
        pin: &Pin,
        ext_salt: Option<&ExternalSalt>,
        code: &Pin,
    ) -> Result<(), StorageError> {
        self.ensure_running()?;
        if !pin.is_empty() && pin == code {
            return Err(StorageError::BadArgument(
                "wipe code must differ from the PIN".into(),
            ));
        }

        let message = if !pin.is_empty() && code.is_empty() {
            VERIFYING_PIN_MSG
        } else {
            PROCESSING_MSG
        };
        self.ui.start(self.config.derive_secs, message);

        self.unlock_with(pin, ext_salt)?;
        self.set_wipe_code(code.as_wipe_code())?;
        tracing::info!(enabled = !code.is_empty(), "wipe code changed");
        Ok(())
    }
}
