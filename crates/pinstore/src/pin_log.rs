//! The PIN failure log.
//!
//! One ledger entry of 33 little-endian words:
//!
//! ```text
//! guard_key ∥ success_log[16] ∥ entry_log[16]
//! ```
//!
//! Each log word carries 16 data bits under the guard layout of
//! [`crate::guard`]. `entry_log[c]`, the first entry word not yet fully
//! cleared, is a thermometer code: one data bit is cleared per failed
//! attempt. A successful unlock copies the entry words into the success
//! log, so the failure count is the number of data bits where the two logs
//! differ in words `c - 1` and `c`. Recording a failure only ever clears
//! bits, so an interrupted write can never lower the count.
//!
//! This module is the pure encoding. Reading and writing the entry, and
//! turning a [`LogFault`] into a storage fault, is done by the storage
//! layer.

use thiserror::Error;

use crate::guard::{Guard, GuardKey};

/// Words per log.
pub const PIN_LOG_WORDS: usize = 16;

/// Words holding the guard key.
pub const GUARD_KEY_WORDS: usize = 1;

/// Serialized size of the whole entry.
pub const PIN_LOGS_SIZE: usize = 4 * (GUARD_KEY_WORDS + 2 * PIN_LOG_WORDS);

/// Most failures a fresh log can be initialised with, plus one. Also the
/// upper bound for the configured maximum number of tries.
pub const PIN_LOG_CAPACITY: u32 = 16;

/// Structural violation found in a log. Always a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LogFault(pub &'static str);

/// Success-log writes that record the current epoch, and whether the log
/// must be re-initialised afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetPlan {
    /// `(byte offset, word)` pairs to program into the entry.
    pub writes: Vec<(u16, u32)>,
    /// Every entry word is in use: replace the log with a fresh one.
    pub reinit: bool,
}

/// Decoded failure log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinLogs {
    guard_key: u32,
    success: [u32; PIN_LOG_WORDS],
    entry: [u32; PIN_LOG_WORDS],
}

const fn success_offset(i: usize) -> usize {
    4 * (GUARD_KEY_WORDS + i)
}

const fn entry_offset(i: usize) -> usize {
    4 * (GUARD_KEY_WORDS + PIN_LOG_WORDS + i)
}

fn offset_u16(offset: usize) -> Result<u16, LogFault> {
    u16::try_from(offset).map_err(|_| LogFault("PIN logs offset"))
}

impl PinLogs {
    /// A new log under a freshly generated guard key, pre-loaded with
    /// `fails` failures. `None` if `fails >= PIN_LOG_CAPACITY`.
    #[must_use]
    pub fn fresh(fails: u32) -> Option<Self> {
        if fails >= PIN_LOG_CAPACITY {
            return None;
        }
        let key = GuardKey::generate();
        let guard = key.expand();
        let unused = guard.unused();
        let mut logs = Self {
            guard_key: key.raw(),
            success: [unused; PIN_LOG_WORDS],
            entry: [unused; PIN_LOG_WORDS],
        };
        let thermometer = u32::MAX.checked_shr(fails.saturating_mul(2)).unwrap_or(0);
        logs.entry[0] = (thermometer & !guard.mask) | guard.guard;
        Some(logs)
    }

    /// Parse the ledger entry.
    ///
    /// # Errors
    ///
    /// `"no PIN logs"` if `bytes` has the wrong length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LogFault> {
        if bytes.len() != PIN_LOGS_SIZE {
            return Err(LogFault("no PIN logs"));
        }
        let mut words = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
        let mut next = || words.next().ok_or(LogFault("no PIN logs"));

        let guard_key = next()?;
        let mut success = [0u32; PIN_LOG_WORDS];
        for w in &mut success {
            *w = next()?;
        }
        let mut entry = [0u32; PIN_LOG_WORDS];
        for w in &mut entry {
            *w = next()?;
        }
        Ok(Self {
            guard_key,
            success,
            entry,
        })
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; PIN_LOGS_SIZE] {
        let mut out = [0u8; PIN_LOGS_SIZE];
        let words = std::iter::once(&self.guard_key)
            .chain(self.success.iter())
            .chain(self.entry.iter());
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    #[must_use]
    pub const fn guard_key(&self) -> u32 {
        self.guard_key
    }

    #[must_use]
    pub const fn success_log(&self) -> &[u32; PIN_LOG_WORDS] {
        &self.success
    }

    #[must_use]
    pub const fn entry_log(&self) -> &[u32; PIN_LOG_WORDS] {
        &self.entry
    }

    /// Expand the guard key.
    ///
    /// # Errors
    ///
    /// `"guard key check"` if the stored key fails validation.
    pub fn guard(&self) -> Result<Guard, LogFault> {
        GuardKey::validate(self.guard_key)
            .map(GuardKey::expand)
            .ok_or(LogFault("guard key check"))
    }

    /// Number of failures recorded since the last reset.
    ///
    /// # Errors
    ///
    /// Any structural inconsistency: guard bits, success/entry ordering,
    /// words after the current one already touched, a current word that is
    /// not a thermometer code, or an exhausted log.
    pub fn fails(&self) -> Result<u32, LogFault> {
        let guard = self.guard()?;
        let unused = guard.unused();

        let mut current: Option<usize> = None;
        let mut visited = 0usize;
        for (i, (&e, &s)) in self.entry.iter().zip(self.success.iter()).enumerate() {
            if !guard.guards_intact(e) || !guard.guards_intact(s) || e & s != e {
                return Err(LogFault("PIN logs format check"));
            }
            match current {
                None if e != guard.guard => current = Some(i),
                Some(_) if e != unused => return Err(LogFault("PIN entry log format check")),
                _ => {}
            }
            visited = visited.wrapping_add(1);
        }

        let Some(current) = current.filter(|_| visited == PIN_LOG_WORDS) else {
            return Err(LogFault("PIN log exhausted"));
        };

        let word = guard.spread(self.entry[current]);
        if word & word.wrapping_add(1) != 0 {
            return Err(LogFault("PIN entry log format check"));
        }

        let current = current.max(1);
        let prev = current.saturating_sub(1);
        let fails = (self.success[prev] ^ self.entry[prev])
            .count_ones()
            .saturating_add((self.success[current] ^ self.entry[current]).count_ones());
        Ok(fails)
    }

    /// The single word write that records one more failure.
    ///
    /// # Errors
    ///
    /// `"guard bits check"` if an entry word up to the current one has a
    /// damaged guard bit, `"PIN log exhausted"` if every entry word is used
    /// up.
    pub fn next_increase(&self) -> Result<(u16, u32), LogFault> {
        let guard = self.guard()?;
        for (i, &e) in self.entry.iter().enumerate() {
            if !guard.guards_intact(e) {
                return Err(LogFault("guard bits check"));
            }
            if e != guard.guard {
                return Ok((offset_u16(entry_offset(i))?, guard.advance(e)));
            }
        }
        Err(LogFault("PIN log exhausted"))
    }

    /// The writes that bring the failure count back to zero.
    ///
    /// Success words are set to their entry words for every epoch up to the
    /// current one. The log is only replaced once all entry words are in
    /// use, which spreads flash wear over many successful unlocks.
    ///
    /// # Errors
    ///
    /// `"guard key check"` if the guard key is invalid.
    pub fn reset_plan(&self) -> Result<ResetPlan, LogFault> {
        let guard = self.guard()?;
        let unused = guard.unused();
        let mut writes = Vec::new();
        for (i, (&e, &s)) in self.entry.iter().zip(self.success.iter()).enumerate() {
            if e == unused {
                return Ok(ResetPlan {
                    writes,
                    reinit: false,
                });
            }
            if s != guard.guard {
                writes.push((offset_u16(success_offset(i))?, e));
            }
        }
        Ok(ResetPlan {
            writes,
            reinit: true,
        })
    }

    /// Program `value` at byte `offset` the way flash would: bits can only
    /// be cleared. Offsets outside the entry or not word aligned are
    /// ignored.
    pub fn apply(&mut self, offset: u16, value: u32) {
        let offset = usize::from(offset);
        if offset % 4 != 0 {
            return;
        }
        let word = match offset / 4 {
            0 => Some(&mut self.guard_key),
            n if n <= PIN_LOG_WORDS => self.success.get_mut(n.saturating_sub(GUARD_KEY_WORDS)),
            n => self
                .entry
                .get_mut(n.saturating_sub(GUARD_KEY_WORDS + PIN_LOG_WORDS)),
        };
        if let Some(word) = word {
            *word &= value;
        }
    }
}
