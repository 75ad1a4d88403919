//! The flash key-value ledger consumed by the storage layer.
//!
//! [`Ledger`] is the call contract: fixed-size records addressed by a
//! 16-bit key, ordered iteration, pre-allocation for incremental writes
//! and in-place updates that may only clear bits. The physical layout,
//! wear levelling and compaction are the implementor's business.
//!
//! [`MemoryLedger`] models NOR flash in RAM: erased bytes read `0xFF` and
//! programming ANDs new data into what is already there. During a schema
//! upgrade reads come from the old area while writes land in a fresh one,
//! until [`Ledger::upgrade_finish`] swaps them.

use crate::error::LedgerError;

/// Current ledger schema version.
///
/// - 0: plaintext entries, legacy PIN and failure counter
/// - 1: encrypted entries, PIN logs, storage tag
/// - 2: adds the wipe code
pub const LEDGER_VERSION: u32 = 2;

/// Key value marking free flash; never storable.
pub const KEY_FREE: u16 = 0xFFFF;

/// Durable key → bytes store.
pub trait Ledger {
    /// Open the ledger and return the schema version of the readable area.
    ///
    /// # Errors
    ///
    /// Implementation-defined I/O failure.
    fn init(&mut self) -> Result<u32, LedgerError>;

    /// Value stored under `key`.
    fn get(&self, key: u16) -> Option<&[u8]>;

    /// Entry after `cursor`, advancing it. Start with `cursor = 0`. Order is
    /// stable until the next mutation.
    fn get_next(&self, cursor: &mut usize) -> Option<(u16, &[u8])>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// See [`Ledger::set_ex`].
    fn set(&mut self, key: u16, value: &[u8]) -> Result<(), LedgerError> {
        let len = u16::try_from(value.len()).map_err(|_| LedgerError::TooLong(value.len()))?;
        self.set_ex(key, Some(value), len).map(|_| ())
    }

    /// Store `value` (or, with `None`, an erased allocation of `len` bytes
    /// to be filled by [`Ledger::update_bytes`]). Returns whether the key
    /// already existed.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ReservedKey`] for [`KEY_FREE`]
    /// - [`LedgerError::LengthMismatch`] if `value.len() != len`
    fn set_ex(&mut self, key: u16, value: Option<&[u8]>, len: u16) -> Result<bool, LedgerError>;

    /// Program `data` into the entry at byte `offset`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if `key` is absent
    /// - [`LedgerError::OutOfBounds`] if the write runs past the entry
    fn update_bytes(&mut self, key: u16, offset: u16, data: &[u8]) -> Result<(), LedgerError>;

    /// Program one little-endian word at a 4-byte aligned `offset`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unaligned`] plus those of [`Ledger::update_bytes`].
    fn update_word(&mut self, key: u16, offset: u16, value: u32) -> Result<(), LedgerError> {
        if offset % 4 != 0 {
            return Err(LedgerError::Unaligned { key, offset });
        }
        self.update_bytes(key, offset, &value.to_le_bytes())
    }

    /// Remove `key`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// [`LedgerError::ReservedKey`] for [`KEY_FREE`].
    fn delete(&mut self, key: u16) -> Result<bool, LedgerError>;

    /// Erase everything and reset the schema version to [`LEDGER_VERSION`].
    ///
    /// # Errors
    ///
    /// Implementation-defined I/O failure.
    fn wipe(&mut self) -> Result<(), LedgerError>;

    /// Make the area written during an upgrade the readable one.
    ///
    /// # Errors
    ///
    /// Implementation-defined I/O failure.
    fn upgrade_finish(&mut self) -> Result<(), LedgerError>;
}

// ---------------------------------------------------------------------------
// MemoryLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Record {
    key: u16,
    value: Vec<u8>,
}

/// In-RAM flash model.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    active: Vec<Record>,
    /// Write area while an upgrade is in progress.
    staged: Option<Vec<Record>>,
    version: u32,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Blank flash. Reports [`LEDGER_VERSION`] on `init`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: Vec::new(),
            staged: None,
            version: LEDGER_VERSION,
        }
    }

    /// Flash already holding `entries` at schema `version`, e.g. a ledger
    /// written by older firmware.
    #[must_use]
    pub fn from_entries(version: u32, entries: &[(u16, &[u8])]) -> Self {
        let mut active: Vec<Record> = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            active.retain(|r| r.key != *key);
            active.push(Record {
                key: *key,
                value: value.to_vec(),
            });
        }
        Self {
            active,
            staged: None,
            version,
        }
    }

    /// Schema version of the readable area.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Number of readable entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Readable keys in iteration order.
    #[must_use]
    pub fn keys(&self) -> Vec<u16> {
        self.active.iter().map(|r| r.key).collect()
    }

    /// XOR `mask` into byte `offset` of `key`, bypassing program
    /// semantics. Returns `false` if there is no such byte.
    pub fn tamper_xor(&mut self, key: u16, offset: usize, mask: u8) -> bool {
        match self
            .active
            .iter_mut()
            .find(|r| r.key == key)
            .and_then(|r| r.value.get_mut(offset))
        {
            Some(byte) => {
                *byte ^= mask;
                true
            }
            None => false,
        }
    }

    /// Overwrite or insert `key` directly in the readable area.
    pub fn tamper_set(&mut self, key: u16, value: &[u8]) {
        match self.active.iter_mut().find(|r| r.key == key) {
            Some(r) => r.value = value.to_vec(),
            None => self.active.push(Record {
                key,
                value: value.to_vec(),
            }),
        }
    }

    /// Drop `key` from the readable area. Returns whether it existed.
    pub fn tamper_remove(&mut self, key: u16) -> bool {
        let before = self.active.len();
        self.active.retain(|r| r.key != key);
        self.active.len() != before
    }

    /// Rewrite the schema version, as an attacker restoring an old image
    /// (or a newer one) would.
    pub fn tamper_version(&mut self, version: u32) {
        self.version = version;
    }

    fn write_area(&mut self) -> &mut Vec<Record> {
        match self.staged {
            Some(ref mut staged) => staged,
            None => &mut self.active,
        }
    }
}

/// Flash programming: bits can only go from 1 to 0.
fn program(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d &= *s;
    }
}

impl Ledger for MemoryLedger {
    fn init(&mut self) -> Result<u32, LedgerError> {
        if self.version < LEDGER_VERSION && self.staged.is_none() {
            self.staged = Some(Vec::new());
        }
        Ok(self.version)
    }

    fn get(&self, key: u16) -> Option<&[u8]> {
        self.active
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.value.as_slice())
    }

    fn get_next(&self, cursor: &mut usize) -> Option<(u16, &[u8])> {
        let record = self.active.get(*cursor)?;
        *cursor = cursor.checked_add(1)?;
        Some((record.key, record.value.as_slice()))
    }

    fn set_ex(&mut self, key: u16, value: Option<&[u8]>, len: u16) -> Result<bool, LedgerError> {
        if key == KEY_FREE {
            return Err(LedgerError::ReservedKey(key));
        }
        if let Some(v) = value {
            if v.len() != usize::from(len) {
                return Err(LedgerError::LengthMismatch {
                    declared: len,
                    actual: v.len(),
                });
            }
        }

        let area = self.write_area();
        let existing = area.iter().position(|r| r.key == key);

        // Same length and only clearing bits: program in place.
        if let (Some(idx), Some(v)) = (existing, value) {
            let old = &mut area[idx].value;
            if old.len() == v.len() && old.iter().zip(v).all(|(o, n)| o & n == *n) {
                program(old, v);
                return Ok(true);
            }
        }

        if let Some(idx) = existing {
            area.remove(idx);
        }
        let data = value.map_or_else(|| vec![0xFF; usize::from(len)], <[u8]>::to_vec);
        area.push(Record { key, value: data });
        Ok(existing.is_some())
    }

    fn update_bytes(&mut self, key: u16, offset: u16, data: &[u8]) -> Result<(), LedgerError> {
        let record = self
            .write_area()
            .iter_mut()
            .find(|r| r.key == key)
            .ok_or(LedgerError::NotFound(key))?;
        let start = usize::from(offset);
        let dst = start
            .checked_add(data.len())
            .and_then(|end| record.value.get_mut(start..end))
            .ok_or(LedgerError::OutOfBounds {
                key,
                offset,
                len: data.len(),
            })?;
        program(dst, data);
        Ok(())
    }

    fn delete(&mut self, key: u16) -> Result<bool, LedgerError> {
        if key == KEY_FREE {
            return Err(LedgerError::ReservedKey(key));
        }
        let area = self.write_area();
        let before = area.len();
        area.retain(|r| r.key != key);
        Ok(area.len() != before)
    }

    fn wipe(&mut self) -> Result<(), LedgerError> {
        self.active.clear();
        self.staged = None;
        self.version = LEDGER_VERSION;
        Ok(())
    }

    fn upgrade_finish(&mut self) -> Result<(), LedgerError> {
        if let Some(staged) = self.staged.take() {
            self.active = staged;
        }
        self.version = LEDGER_VERSION;
        Ok(())
    }
}
