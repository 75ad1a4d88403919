//! PIN-gated encrypted storage.
//!
//! [`Storage`] owns the ledger and all volatile secret state: the cached
//! data encryption key (DEK) and storage authentication key (SAK), the
//! running authentication sum and the lifecycle flags. Every operation
//! takes `&mut self`, so there is exactly one caller at a time.
//!
//! Entries under the reserved `app == 0` namespace:
//!
//! | key | content |
//! |---|---|
//! | `0x0001` | PIN failure log ([`crate::pin_log`]) |
//! | `0x0002` | `random_salt[4] ∥ Enc(DEK ∥ SAK)[48] ∥ PVC[8]` |
//! | `0x0003` | PIN-not-set byte |
//! | `0x0004` | schema version, encrypted |
//! | `0x0005` | whole-store authentication tag |
//! | `0x0006` | `wipe_code[4] ∥ salt[8] ∥ tag[8]` |
//! | `0x0007` | upgraded flag |
//!
//! Protected application values are stored as `IV[12] ∥ TAG[16] ∥ CT`.
//!
//! # Fatal errors
//!
//! Integrity violations, the last allowed wrong PIN, the wipe code and a
//! version mismatch end in [`StorageError::is_fatal`] errors. Secrets are
//! zeroed before such an error is returned and every later call fails with
//! [`StorageError::Halted`] until [`Storage::init`] runs again.

mod auth;
mod encrypted;
mod fails;
mod fault;
mod unlock;
mod upgrade;
mod wipe_code;

use pinstore_crypto_core::{random_buffer, sha256, SecretBuffer, SecretBytes, SHA256_DIGEST_LENGTH};

use crate::config::{Delay, StorageConfig, ThreadDelay};
use crate::counter;
use crate::error::StorageError;
use crate::key::{StorageKey, EDEK_PVC_KEY, PIN_NOT_SET_KEY, STORAGE_UPGRADED_KEY, VERSION_KEY};
use crate::ledger::{Ledger, LEDGER_VERSION};
use crate::pin::{Pin, WIPE_CODE_EMPTY};
use crate::progress::{UiCallback, UiState, PROCESSING_MSG};

// ---------------------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------------------

/// Size of the hardware salt (SHA-256 of the caller's salt).
pub const HARDWARE_SALT_SIZE: usize = SHA256_DIGEST_LENGTH;

/// Size of the per-envelope random salt.
pub const RANDOM_SALT_SIZE: usize = 4;

/// Data encryption key size.
pub const DEK_SIZE: usize = 32;

/// Storage authentication key size.
pub const SAK_SIZE: usize = 16;

/// `DEK ∥ SAK`.
pub const KEYS_SIZE: usize = DEK_SIZE + SAK_SIZE;

/// PIN verification code size.
pub const PVC_SIZE: usize = 8;

/// Size of the envelope entry.
pub const EDEK_PVC_SIZE: usize = RANDOM_SALT_SIZE + KEYS_SIZE + PVC_SIZE;

/// Size of the stored whole-store authentication tag.
pub const STORAGE_TAG_SIZE: usize = 16;

/// Largest protected value that fits a 16-bit ledger length once the IV and
/// tag are added.
pub const MAX_PROTECTED_LEN: usize = u16::MAX as usize - 12 - 16;

pub(crate) const TRUE_WORD: u32 = 0xC35A_69A5;
pub(crate) const FALSE_WORD: u32 = 0x3CA5_965A;
pub(crate) const TRUE_BYTE: u8 = 0x01;
pub(crate) const FALSE_BYTE: u8 = 0x00;

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// The storage subsystem on top of a [`Ledger`].
pub struct Storage<L: Ledger> {
    ledger: L,
    config: StorageConfig,
    delay: Box<dyn Delay>,
    ui_callback: Option<Box<dyn UiCallback>>,
    ui: UiState,
    hardware_salt: SecretBytes<HARDWARE_SALT_SIZE>,
    cached_keys: SecretBytes<KEYS_SIZE>,
    authentication_sum: SecretBytes<SHA256_DIGEST_LENGTH>,
    /// Schema version of the readable ledger area.
    ledger_version: u32,
    initialized: bool,
    unlocked: bool,
    halted: bool,
    fault_in_progress: bool,
}

impl<L: Ledger> std::fmt::Debug for Storage<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("config", &self.config)
            .field("ledger_version", &self.ledger_version)
            .field("initialized", &self.initialized)
            .field("unlocked", &self.unlocked)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

impl<L: Ledger> Storage<L> {
    /// Wrap `ledger`. Nothing is read until [`Storage::init`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BadArgument`] if `config` is invalid.
    pub fn new(ledger: L, config: StorageConfig) -> Result<Self, StorageError> {
        Self::with_delay(ledger, config, Box::new(ThreadDelay))
    }

    /// Like [`Storage::new`] with a custom throttle delay.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BadArgument`] if `config` is invalid.
    pub fn with_delay(
        ledger: L,
        config: StorageConfig,
        delay: Box<dyn Delay>,
    ) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(Self {
            ledger,
            config,
            delay,
            ui_callback: None,
            ui: UiState::default(),
            hardware_salt: SecretBytes::zeroed(),
            cached_keys: SecretBytes::zeroed(),
            authentication_sum: SecretBytes::zeroed(),
            ledger_version: 0,
            initialized: false,
            unlocked: false,
            halted: false,
            fault_in_progress: false,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &StorageConfig {
        &self.config
    }

    #[must_use]
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access, bypassing all checks.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    #[must_use]
    pub fn into_ledger(self) -> L {
        self.ledger
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open the ledger, derive the hardware salt from `salt`, run a pending
    /// schema upgrade and create fresh storage if there is none. The
    /// storage is locked afterwards.
    ///
    /// Also clears a previous halt.
    ///
    /// # Errors
    ///
    /// - ledger or RNG failures
    /// - [`StorageError::Fault`] if the upgrade fails; the ledger has been
    ///   wiped in that case
    /// - [`StorageError::WrongVersion`] if the ledger schema is newer than
    ///   [`LEDGER_VERSION`]; the ledger has been wiped
    pub fn init(
        &mut self,
        callback: Option<Box<dyn UiCallback>>,
        salt: &[u8],
    ) -> Result<(), StorageError> {
        self.initialized = false;
        self.unlocked = false;
        self.halted = false;
        self.fault_in_progress = false;
        self.ui = UiState::default();
        self.cached_keys.clear();
        self.authentication_sum.clear();

        self.ledger_version = self.ledger.init()?;
        self.initialized = true;
        self.ui_callback = callback;
        *self.hardware_salt.expose_mut() = sha256(salt);

        if self.ledger_version > LEDGER_VERSION {
            tracing::error!(ledger = self.ledger_version, "ledger schema is newer than supported");
            return Err(self.fatal_wipe(StorageError::WrongVersion));
        }
        if self.ledger_version < LEDGER_VERSION {
            tracing::info!(from = self.ledger_version, to = LEDGER_VERSION, "upgrading storage");
            if let Err(e) = self.upgrade() {
                tracing::error!("storage upgrade failed: {e}");
                if let Err(wipe) = self.wipe_storage() {
                    tracing::error!("wipe after failed upgrade failed: {wipe}");
                }
                return Err(self.halt(StorageError::Fault("storage upgrade")));
            }
        }

        if self.ledger.get(EDEK_PVC_KEY.raw()).is_none() {
            tracing::info!("no key envelope found, initializing empty storage");
            self.init_wiped_storage()?;
            self.lock();
        }
        self.cached_keys.clear();
        Ok(())
    }

    /// Erase everything and recreate empty storage with no PIN.
    ///
    /// # Errors
    ///
    /// Ledger or RNG failures.
    pub fn wipe(&mut self) -> Result<(), StorageError> {
        self.ensure_running()?;
        self.wipe_storage()
    }

    pub(crate) fn wipe_storage(&mut self) -> Result<(), StorageError> {
        tracing::info!("wiping storage");
        self.ledger.wipe()?;
        self.ledger_version = LEDGER_VERSION;
        self.authentication_sum.clear();
        self.cached_keys.clear();
        self.init_wiped_storage()
    }

    /// Install fresh keys, an empty PIN, no wipe code and a zero failure
    /// count. Leaves the storage unlocked.
    fn init_wiped_storage(&mut self) -> Result<(), StorageError> {
        if !self.initialized {
            return Ok(());
        }
        random_buffer(self.cached_keys.expose_mut())?;
        self.unlocked = true;
        self.auth_init()?;
        self.set_encrypted(VERSION_KEY, &LEDGER_VERSION.to_le_bytes())?;
        self.ledger
            .set(STORAGE_UPGRADED_KEY.raw(), &FALSE_WORD.to_le_bytes())?;
        self.pin_logs_init(0)?;
        self.set_wipe_code(WIPE_CODE_EMPTY)?;

        self.ui.start(self.config.derive_secs, PROCESSING_MSG);
        self.set_pin(&Pin::empty(), None)
    }

    pub(crate) const fn ensure_running(&self) -> Result<(), StorageError> {
        if self.halted {
            return Err(StorageError::Halted);
        }
        if !self.initialized {
            return Err(StorageError::NotInitialized);
        }
        Ok(())
    }

    /// `true` once a PIN has been verified and until [`Storage::lock`].
    #[must_use]
    pub const fn is_unlocked(&self) -> bool {
        self.initialized && !self.halted && self.unlocked
    }

    /// Forget the cached keys.
    pub fn lock(&mut self) {
        self.unlocked = false;
        self.cached_keys.clear();
        self.authentication_sum.clear();
    }

    /// `true` if a non-empty PIN is set.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotInitialized`] or [`StorageError::Halted`].
    pub fn has_pin(&self) -> Result<bool, StorageError> {
        self.ensure_running()?;
        Ok(match self.ledger.get(PIN_NOT_SET_KEY.raw()) {
            Some([]) => true,
            Some([flag, ..]) => *flag == FALSE_BYTE,
            None => false,
        })
    }

    fn cached_dek(&self) -> &[u8] {
        &self.cached_keys.expose()[..DEK_SIZE]
    }

    fn cached_sak(&self) -> &[u8] {
        &self.cached_keys.expose()[DEK_SIZE..]
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    fn check_access(&self, key: StorageKey, write: bool) -> Result<(), StorageError> {
        self.ensure_running()?;
        if key.is_reserved() {
            return Err(StorageError::BadArgument(format!(
                "key {key} is reserved for the storage layer"
            )));
        }
        let allowed = if write {
            self.unlocked || key.is_writable_locked()
        } else {
            self.unlocked || key.is_public()
        };
        if allowed {
            Ok(())
        } else {
            Err(StorageError::Locked)
        }
    }

    /// Read `key`. Public values are returned as stored, protected ones are
    /// authenticated and decrypted.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Locked`] for a protected key while locked
    /// - [`StorageError::BufferTooSmall`] if the value exceeds `max_len`
    /// - [`StorageError::Fault`] on any integrity failure (fatal)
    pub fn get(&mut self, key: StorageKey, max_len: usize) -> Result<Option<SecretBuffer>, StorageError> {
        self.check_access(key, false)?;
        if key.is_public() {
            return match self.ledger.get(key.raw()) {
                Some(v) if v.len() > max_len => Err(StorageError::BufferTooSmall { len: v.len() }),
                Some(v) => Ok(Some(SecretBuffer::copy_from(v))),
                None => Ok(None),
            };
        }
        self.get_encrypted(key, max_len)
    }

    /// `true` if `key` holds a value.
    ///
    /// # Errors
    ///
    /// As for [`Storage::get`], except that no length limit applies.
    pub fn has(&mut self, key: StorageKey) -> Result<bool, StorageError> {
        self.check_access(key, false)?;
        if key.is_public() {
            return Ok(self.ledger.get(key.raw()).is_some());
        }
        Ok(self.load_encrypted(key)?.is_some())
    }

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Locked`] unless unlocked or the key is
    ///   writable while locked
    /// - [`StorageError::ValueTooLong`] for protected values over
    ///   [`MAX_PROTECTED_LEN`]
    pub fn set(&mut self, key: StorageKey, value: &[u8]) -> Result<(), StorageError> {
        self.check_access(key, true)?;
        if key.is_public() {
            self.ledger.set(key.raw(), value)?;
            Ok(())
        } else {
            self.set_encrypted(key, value)
        }
    }

    /// Remove `key`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Same access rules as [`Storage::set`].
    pub fn delete(&mut self, key: StorageKey) -> Result<bool, StorageError> {
        self.check_access(key, true)?;
        let found = self.ledger.delete(key.raw())?;
        if found {
            self.auth_update(key)?;
        }
        Ok(found)
    }

    // -----------------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------------

    fn check_counter_key(&self, key: StorageKey) -> Result<(), StorageError> {
        if !key.is_public() {
            return Err(StorageError::BadArgument(format!(
                "counter key {key} must be public"
            )));
        }
        self.check_access(key, true)
    }

    /// Set the monotonic counter under the public `key` to `count`.
    ///
    /// # Errors
    ///
    /// [`StorageError::BadArgument`] for a non-public key, otherwise as for
    /// [`Storage::set`].
    pub fn set_counter(&mut self, key: StorageKey, count: u32) -> Result<(), StorageError> {
        self.check_counter_key(key)?;
        counter::set_counter(&mut self.ledger, key.raw(), count)?;
        Ok(())
    }

    /// Increment the counter under the public `key` and return the new
    /// value. A missing counter starts at zero.
    ///
    /// # Errors
    ///
    /// As for [`Storage::set_counter`], plus malformed or overflowing
    /// counters.
    pub fn next_counter(&mut self, key: StorageKey) -> Result<u32, StorageError> {
        self.check_counter_key(key)?;
        Ok(counter::next_counter(&mut self.ledger, key.raw())?)
    }
}
