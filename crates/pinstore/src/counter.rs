//! Monotonic counters that advance mostly by clearing bits.
//!
//! A counter entry is a base word followed by tail words. The value is
//!
//! ```text
//! base + 32 * (i - 1) + zeros(tail[i])
//! ```
//!
//! where `tail[i]` is the first non-zero tail word. Each increment shifts
//! one zero into that word, so the entry is rewritten only once every
//! `32 * tail_words` increments.

use crate::error::LedgerError;
use crate::ledger::Ledger;

/// Tail words written after the base word.
pub const COUNTER_TAIL_WORDS: usize = 2;

/// Serialized size of a freshly written counter.
pub const COUNTER_SIZE: usize = 4 * (1 + COUNTER_TAIL_WORDS);

fn encode(count: u32) -> [u8; COUNTER_SIZE] {
    let mut out = [0xFFu8; COUNTER_SIZE];
    out[..4].copy_from_slice(&count.to_le_bytes());
    out
}

/// Store `count` under `key` with a full tail.
///
/// # Errors
///
/// Propagates ledger failures.
pub fn set_counter<L: Ledger + ?Sized>(ledger: &mut L, key: u16, count: u32) -> Result<(), LedgerError> {
    ledger.set(key, &encode(count))
}

/// Increment the counter under `key` and return the new value. A missing
/// counter is created at zero.
///
/// # Errors
///
/// - [`LedgerError::MalformedCounter`] if the entry is not whole words
/// - [`LedgerError::CounterOverflow`] past `u32::MAX`
pub fn next_counter<L: Ledger + ?Sized>(ledger: &mut L, key: u16) -> Result<u32, LedgerError> {
    let Some(raw) = ledger.get(key) else {
        set_counter(ledger, key, 0)?;
        return Ok(0);
    };
    if raw.len() < 4 || raw.len() % 4 != 0 {
        return Err(LedgerError::MalformedCounter(key));
    }
    let words: Vec<u32> = raw
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    // First non-zero tail word, or one past the end if the tail is spent.
    let i = words
        .iter()
        .skip(1)
        .position(|&w| w != 0)
        .map_or(words.len(), |p| p.saturating_add(1));
    let used = u32::try_from(i.saturating_sub(1))
        .ok()
        .and_then(|n| n.checked_mul(32))
        .ok_or(LedgerError::CounterOverflow(key))?;
    let mut count = words[0]
        .checked_add(1)
        .and_then(|c| c.checked_add(used))
        .ok_or(LedgerError::CounterOverflow(key))?;

    if let Some(&tail) = words.get(i) {
        count = count
            .checked_add((!tail).count_ones())
            .ok_or(LedgerError::CounterOverflow(key))?;
        let offset = u16::try_from(i.saturating_mul(4)).map_err(|_| LedgerError::MalformedCounter(key))?;
        ledger.update_word(key, offset, tail >> 1)?;
    } else {
        set_counter(ledger, key, count)?;
    }
    Ok(count)
}
