//! Storage keys: `app:6 | flags:2 | tag:8` packed into a `u16`.
//!
//! The two flag bits sit at the top of the `app` byte:
//!
//! - `0x80` *public*: stored in plaintext, readable while locked
//! - `0x40` together with `0x80` *write-when-locked*
//!
//! `app == 0` belongs to the storage layer itself and is never reachable
//! through `get`/`set`/`delete`.

use std::fmt;

/// Application id reserved for the storage layer's own entries.
pub const APP_STORAGE: u8 = 0x00;

/// Flag in the `app` byte marking a plaintext entry.
pub const FLAG_PUBLIC: u8 = 0x80;

/// Flags in the `app` byte that allow writing while locked.
pub const FLAGS_WRITE: u8 = 0xC0;

/// A 16-bit storage key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(u16);

impl StorageKey {
    /// Build a key from its `app` byte (flags included) and tag.
    #[must_use]
    pub const fn new(app: u8, tag: u8) -> Self {
        Self(u16::from_be_bytes([app, tag]))
    }

    /// Wrap a raw key.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// The raw 16-bit value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// The `app` byte, flags included.
    #[must_use]
    pub const fn app(self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    /// The low byte.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self.0.to_be_bytes()[1]
    }

    /// Owned by the storage layer (`app == 0`).
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.app() == APP_STORAGE
    }

    /// Stored in plaintext.
    #[must_use]
    pub const fn is_public(self) -> bool {
        self.app() & FLAG_PUBLIC != 0
    }

    /// Encrypted under the DEK and covered by the storage tag.
    #[must_use]
    pub const fn is_protected(self) -> bool {
        !self.is_public() && !self.is_reserved()
    }

    /// May be written or deleted while the storage is locked.
    #[must_use]
    pub const fn is_writable_locked(self) -> bool {
        self.app() & FLAGS_WRITE == FLAGS_WRITE
    }

    /// Little-endian encoding, used as AEAD associated data and as the
    /// message of the per-key authentication tag.
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl From<u16> for StorageKey {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({:#06x})", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Reserved keys (app 0)
// ---------------------------------------------------------------------------

/// Guard key, success log and entry log of the PIN failure counter.
pub const PIN_LOGS_KEY: StorageKey = StorageKey::new(APP_STORAGE, 0x01);

/// Random salt, encrypted DEK∥SAK and PIN verification code.
pub const EDEK_PVC_KEY: StorageKey = StorageKey::new(APP_STORAGE, 0x02);

/// One byte: `TRUE_BYTE` when no PIN is set.
pub const PIN_NOT_SET_KEY: StorageKey = StorageKey::new(APP_STORAGE, 0x03);

/// Authenticated storage version, stored encrypted.
pub const VERSION_KEY: StorageKey = StorageKey::new(APP_STORAGE, 0x04);

/// Truncated HMAC over the set of protected keys.
pub const STORAGE_TAG_KEY: StorageKey = StorageKey::new(APP_STORAGE, 0x05);

/// Wipe code, salt and tag.
pub const WIPE_CODE_DATA_KEY: StorageKey = StorageKey::new(APP_STORAGE, 0x06);

/// `TRUE_WORD` while an upgrade awaits its first unlock.
pub const STORAGE_UPGRADED_KEY: StorageKey = StorageKey::new(APP_STORAGE, 0x07);

/// Schema 0: the PIN as a plain `u32`.
pub const V0_PIN_KEY: StorageKey = StorageKey::new(APP_STORAGE, 0x00);

/// Schema 0: unary failure counter words.
pub const V0_PIN_FAIL_KEY: StorageKey = StorageKey::new(APP_STORAGE, 0x01);
