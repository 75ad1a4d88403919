//! PIN verification, key derivation and the key envelope.

use pinstore_crypto_core::{
    random_buffer, wait_random, Pbkdf2Sha256, Rfc7539, SecretBytes, CHACHA20_IV_SIZE,
    SHA256_DIGEST_LENGTH,
};
use zeroize::Zeroizing;

use super::{
    Storage, EDEK_PVC_SIZE, FALSE_BYTE, FALSE_WORD, HARDWARE_SALT_SIZE, KEYS_SIZE, PVC_SIZE,
    RANDOM_SALT_SIZE, TRUE_BYTE, TRUE_WORD,
};
use crate::error::StorageError;
use crate::key::{EDEK_PVC_KEY, PIN_NOT_SET_KEY, STORAGE_UPGRADED_KEY, VERSION_KEY};
use crate::ledger::{Ledger, LEDGER_VERSION};
use crate::pin::{ExternalSalt, Pin, EXTERNAL_SALT_SIZE};
use crate::progress::{WaitControl, PROCESSING_MSG, STARTING_MSG, VERIFYING_PIN_MSG};

type DerivedKey = SecretBytes<SHA256_DIGEST_LENGTH>;

const MAX_SALT_SIZE: usize = HARDWARE_SALT_SIZE + RANDOM_SALT_SIZE + EXTERNAL_SALT_SIZE;

/// End of the wrapped keys inside the envelope; the PVC follows.
const KEYS_END: usize = RANDOM_SALT_SIZE + KEYS_SIZE;

/// PBKDF2 rounds per derived key; progress is reported after each one.
const ROUNDS_PER_KEY: u32 = 5;

/// Throttle slices per second.
const SLICES_PER_SEC: u32 = 10;

impl<L: Ledger> Storage<L> {
    fn report(&mut self, wait_secs: u32, permille: u32) -> WaitControl {
        match (self.ui_callback.as_mut(), self.ui.message) {
            (Some(cb), Some(message)) => cb.progress(wait_secs, permille, message),
            _ => WaitControl::Continue,
        }
    }

    /// Derive `(KEK, KEIV)` from the PIN and the salts. With `cancellable`
    /// the progress hook may abort between rounds.
    fn derive_kek(
        &mut self,
        pin: &Pin,
        random_salt: &[u8; RANDOM_SALT_SIZE],
        ext_salt: Option<&ExternalSalt>,
        cancellable: bool,
    ) -> Result<(DerivedKey, DerivedKey), StorageError> {
        let mut salt = Zeroizing::new(Vec::with_capacity(MAX_SALT_SIZE));
        salt.extend_from_slice(self.hardware_salt.expose());
        salt.extend_from_slice(random_salt);
        if let Some(ext) = ext_salt {
            salt.extend_from_slice(ext);
        }
        let password = Zeroizing::new(pin.to_le_bytes());

        let permille = self.ui.derive_permille(0, self.config.derive_secs);
        self.report(self.ui.rem, permille);

        let kek = self.derive_half(password.as_slice(), &salt, 1, 0, cancellable)?;
        let keiv = self.derive_half(password.as_slice(), &salt, 2, ROUNDS_PER_KEY, cancellable)?;
        self.ui.rem = self.ui.rem.saturating_sub(self.config.derive_secs);
        Ok((kek, keiv))
    }

    /// One PBKDF2 block in [`ROUNDS_PER_KEY`] rounds. `done` is the number
    /// of rounds already run for this derivation.
    fn derive_half(
        &mut self,
        password: &[u8],
        salt: &[u8],
        block_index: u32,
        done: u32,
        cancellable: bool,
    ) -> Result<DerivedKey, StorageError> {
        let per_round = self.config.iterations_per_round();
        let derive_secs = self.config.derive_secs;
        let mut ctx = Pbkdf2Sha256::new(password, salt, block_index)?;
        for round in 1..=ROUNDS_PER_KEY {
            ctx.update(per_round);
            let tenths = done.saturating_add(round);
            let wait = self
                .ui
                .rem
                .saturating_sub(tenths.saturating_mul(derive_secs) / 10);
            let permille = self.ui.derive_permille(tenths, derive_secs);
            if self.report(wait, permille) == WaitControl::Cancel && cancellable {
                tracing::warn!("key derivation cancelled");
                return Err(StorageError::Cancelled);
            }
        }
        Ok(ctx.finish())
    }

    /// Wrap the cached keys under `pin` and record whether a PIN is set.
    pub(super) fn set_pin(
        &mut self,
        pin: &Pin,
        ext_salt: Option<&ExternalSalt>,
    ) -> Result<(), StorageError> {
        let mut random_salt = [0u8; RANDOM_SALT_SIZE];
        random_buffer(&mut random_salt)?;
        let (kek, keiv) = self.derive_kek(pin, &random_salt, ext_salt, false)?;

        let mut envelope = Zeroizing::new([0u8; EDEK_PVC_SIZE]);
        envelope[..RANDOM_SALT_SIZE].copy_from_slice(&random_salt);
        let mut ctx = Rfc7539::new(kek.expose(), &keiv.expose()[..CHACHA20_IV_SIZE])?;
        ctx.encrypt(
            self.cached_keys.expose(),
            &mut envelope[RANDOM_SALT_SIZE..KEYS_END],
        )?;
        let tag = Zeroizing::new(ctx.finish());
        envelope[KEYS_END..].copy_from_slice(&tag[..PVC_SIZE]);

        self.ledger.set(EDEK_PVC_KEY.raw(), envelope.as_slice())?;
        let flag = if pin.is_empty() { TRUE_BYTE } else { FALSE_BYTE };
        self.ledger.set(PIN_NOT_SET_KEY.raw(), &[flag])?;
        Ok(())
    }

    /// Unwrap the envelope. On success the keys are cached and `true` is
    /// returned; a PVC mismatch leaves the cache untouched.
    fn decrypt_dek(&mut self, kek: &DerivedKey, keiv: &DerivedKey) -> Result<bool, StorageError> {
        let envelope = self
            .ledger
            .get(EDEK_PVC_KEY.raw())
            .filter(|e| e.len() == EDEK_PVC_SIZE)
            .map(|e| Zeroizing::new(e.to_vec()));
        let Some(envelope) = envelope else {
            return Err(self.handle_fault("no EDEK"));
        };
        let encrypted = &envelope[RANDOM_SALT_SIZE..KEYS_END];
        let stored_pvc = &envelope[KEYS_END..];

        let mut keys = Zeroizing::new([0u8; KEYS_SIZE]);
        let mut ctx = Rfc7539::new(kek.expose(), &keiv.expose()[..CHACHA20_IV_SIZE])?;
        ctx.decrypt(encrypted, keys.as_mut_slice())?;
        let tag = Zeroizing::new(ctx.finish());

        wait_random();
        if !self.secure_eq32(&tag[..PVC_SIZE], stored_pvc)? {
            return Ok(false);
        }
        self.cached_keys.expose_mut().copy_from_slice(keys.as_slice());
        Ok(true)
    }

    /// Sleep `2^fails - 1` seconds in slices, polling the progress hook.
    fn throttle(&mut self, fails: u32) -> Result<(), StorageError> {
        let wait = 1u32
            .checked_shl(fails)
            .map_or(u32::MAX, |w| w.wrapping_sub(1));
        if wait == 0 {
            return Ok(());
        }
        tracing::debug!(fails, wait_secs = wait, "throttling PIN attempt");
        self.ui.total = self.ui.total.saturating_add(wait);
        self.ui.rem = self.ui.total;
        let floor = self.ui.total.saturating_sub(wait);
        while self.ui.rem > floor {
            for slice in 0..SLICES_PER_SEC {
                let permille = self.ui.throttle_permille(slice);
                if self.report(self.ui.rem, permille) == WaitControl::Cancel {
                    tracing::warn!("PIN entry cancelled");
                    return Err(StorageError::Cancelled);
                }
                self.delay.delay_ms(self.config.throttle_slice_ms);
            }
            self.ui.rem = self.ui.rem.saturating_sub(1);
        }
        Ok(())
    }

    /// Verify `pin` and cache the keys. Progress accounting must already be
    /// started by the caller.
    pub(super) fn unlock_with(
        &mut self,
        pin: &Pin,
        ext_salt: Option<&ExternalSalt>,
    ) -> Result<(), StorageError> {
        self.check_not_wipe_code(pin.encoded())?;

        let fails = self.pin_get_fails()?;
        wait_random();
        if fails >= self.config.pin_max_tries {
            return Err(self.fatal_wipe(StorageError::TooManyFails));
        }

        self.throttle(fails)?;

        let random_salt = self
            .ledger
            .get(EDEK_PVC_KEY.raw())
            .filter(|e| e.len() == EDEK_PVC_SIZE)
            .map(|e| {
                let mut salt = [0u8; RANDOM_SALT_SIZE];
                salt.copy_from_slice(&e[..RANDOM_SALT_SIZE]);
                salt
            });
        let Some(random_salt) = random_salt else {
            return Err(self.handle_fault("no EDEK"));
        };

        // Count the attempt before the key derivation reveals anything.
        self.increase_pin_fails()?;
        let expected = fails.saturating_add(1);

        let (kek, keiv) = self.derive_kek(pin, &random_salt, ext_salt, true)?;
        if !self.decrypt_dek(&kek, &keiv)? {
            wait_random();
            if expected >= self.config.pin_max_tries {
                tracing::error!("last PIN attempt failed");
                return Err(self.fatal_wipe(StorageError::TooManyFails));
            }
            tracing::warn!(
                remaining = self.config.pin_max_tries.saturating_sub(expected),
                "wrong PIN"
            );
            return Err(StorageError::WrongPin);
        }

        self.unlocked = true;
        if let Err(e) = self.check_storage_version() {
            if !self.halted {
                self.lock();
            }
            return Err(e);
        }
        self.pin_fails_reset()
    }

    /// Reconcile the encrypted version with the ledger version after an
    /// upgrade, and refuse rollbacks.
    fn check_storage_version(&mut self) -> Result<(), StorageError> {
        let version = match self.get_encrypted(VERSION_KEY, 4)? {
            Some(v) if v.len() == 4 => {
                let mut word = [0u8; 4];
                word.copy_from_slice(v.expose());
                u32::from_le_bytes(word)
            }
            _ => return Err(self.handle_fault("storage version check")),
        };
        let upgraded = self
            .ledger
            .get(STORAGE_UPGRADED_KEY.raw())
            .and_then(|v| <[u8; 4]>::try_from(v).ok())
            .map(u32::from_le_bytes);
        let Some(upgraded) = upgraded else {
            return Err(self.handle_fault("storage version check"));
        };

        if version > self.ledger_version || version > LEDGER_VERSION {
            tracing::error!(version, ledger = self.ledger_version, "storage downgrade");
            return Err(self.fatal_wipe(StorageError::WrongVersion));
        }
        if version < self.ledger_version {
            if upgraded != TRUE_WORD {
                tracing::error!(version, ledger = self.ledger_version, "upgrade not recorded");
                return Err(self.fatal_wipe(StorageError::WrongVersion));
            }
            self.ledger
                .set(STORAGE_UPGRADED_KEY.raw(), &FALSE_WORD.to_le_bytes())?;
            let current = self.ledger_version.to_le_bytes();
            self.set_encrypted(VERSION_KEY, &current)?;
            tracing::info!(from = version, to = self.ledger_version, "storage version updated");
        } else if upgraded != FALSE_WORD {
            return Err(self.fatal_wipe(StorageError::WrongVersion));
        }
        Ok(())
    }

    /// Verify `pin` and unlock.
    ///
    /// A failed attempt costs one try even if cancelled during the key
    /// derivation. The next attempt is delayed by `2^fails - 1` seconds.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NoPin`] if `pin` is `None`
    /// - [`StorageError::WrongPin`], or [`StorageError::TooManyFails`]
    ///   (fatal) once the last try is used up
    /// - [`StorageError::Cancelled`] if the progress hook cancels
    /// - [`StorageError::WipeCodeEntered`] (fatal) for the wipe code
    /// - [`StorageError::WrongVersion`] (fatal) on a schema rollback
    pub fn unlock(
        &mut self,
        pin: Option<&Pin>,
        ext_salt: Option<&ExternalSalt>,
    ) -> Result<(), StorageError> {
        self.ensure_running()?;
        let Some(pin) = pin else {
            return Err(StorageError::NoPin);
        };

        let message = if pin.is_empty() {
            if self.ui.message.is_none() {
                STARTING_MSG
            } else {
                PROCESSING_MSG
            }
        } else {
            VERIFYING_PIN_MSG
        };
        self.ui.start(self.config.derive_secs, message);

        self.unlock_with(pin, ext_salt)?;
        tracing::info!("storage unlocked");
        Ok(())
    }

    /// Verify `old_pin` and re-wrap the keys under `new_pin`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::BadArgument`] if either PIN is missing
    /// - [`StorageError::IsWipeCode`] if `new_pin` is the wipe code
    /// - [`StorageError::CannotSet`] if the envelope cannot be written
    /// - all errors of [`Storage::unlock`]
    pub fn change_pin(
        &mut self,
        old_pin: Option<&Pin>,
        new_pin: Option<&Pin>,
        old_ext_salt: Option<&ExternalSalt>,
        new_ext_salt: Option<&ExternalSalt>,
    ) -> Result<(), StorageError> {
        self.ensure_running()?;
        let (Some(old_pin), Some(new_pin)) = (old_pin, new_pin) else {
            return Err(StorageError::BadArgument("both PINs are required".into()));
        };

        let message = if !old_pin.is_empty() && new_pin.is_empty() {
            VERIFYING_PIN_MSG
        } else {
            PROCESSING_MSG
        };
        self.ui
            .start(self.config.derive_secs.saturating_mul(2), message);

        self.unlock_with(old_pin, old_ext_salt)?;
        if !self.is_not_wipe_code(new_pin.encoded())? {
            return Err(StorageError::IsWipeCode);
        }
        match self.set_pin(new_pin, new_ext_salt) {
            Ok(()) => {
                tracing::info!(has_pin = !new_pin.is_empty(), "PIN changed");
                Ok(())
            }
            Err(StorageError::Ledger(e)) => {
                tracing::error!("writing the new envelope failed: {e}");
                Err(StorageError::CannotSet)
            }
            Err(e) => Err(e),
        }
    }
}
