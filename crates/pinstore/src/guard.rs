//! Guard keys for the PIN failure log.
//!
//! Every log word splits its 32 bits into 16 pairs. In each pair one bit
//! carries data and the other is a guard bit whose position and value are
//! fixed by the guard key. A glitched write that clears a guard bit, or a
//! corrupted guard key, is then detectable.

use pinstore_crypto_core::random_uniform;

/// Valid guard keys are `≡ GUARD_KEY_REMAINDER (mod GUARD_KEY_MODULUS)`.
pub const GUARD_KEY_MODULUS: u32 = 6311;

/// See [`GUARD_KEY_MODULUS`].
pub const GUARD_KEY_REMAINDER: u32 = 15;

/// Low bit of every pair.
pub const LOW_MASK: u32 = 0x5555_5555;

/// Bit `i` set iff bits `i..i + 5` of `x` are all set.
const fn runs_of_five(x: u32) -> u32 {
    let x = x & (x >> 2);
    let x = x & (x >> 1);
    x & (x >> 1)
}

/// A 32-bit guard key that has passed [`GuardKey::is_valid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardKey(u32);

impl GuardKey {
    /// Draw uniformly among valid guard keys.
    #[must_use]
    pub fn generate() -> Self {
        let slots = u32::MAX / GUARD_KEY_MODULUS + 1;
        loop {
            let candidate = random_uniform(slots)
                .checked_mul(GUARD_KEY_MODULUS)
                .and_then(|v| v.checked_add(GUARD_KEY_REMAINDER));
            if let Some(key) = candidate.and_then(Self::validate) {
                return key;
            }
        }
    }

    /// Integrity predicate:
    ///
    /// - residue `GUARD_KEY_REMAINDER` modulo `GUARD_KEY_MODULUS`
    /// - exactly two of the odd-position bits set in every byte
    /// - no run of five or more equal bits
    #[must_use]
    pub const fn is_valid(raw: u32) -> bool {
        if raw % GUARD_KEY_MODULUS != GUARD_KEY_REMAINDER {
            return false;
        }

        // Odd bits of each nibble pair, summed per byte in the low nibble.
        let count = (raw & 0x2222_2222).wrapping_add((raw >> 2) & 0x2222_2222);
        let count = count.wrapping_add(count >> 4);
        if count & 0x0E0E_0E0E != 0x0404_0404 {
            return false;
        }

        runs_of_five(raw) == 0 && runs_of_five(!raw) == 0
    }

    /// `Some` if `raw` is a valid guard key.
    #[must_use]
    pub const fn validate(raw: u32) -> Option<Self> {
        if Self::is_valid(raw) {
            Some(Self(raw))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Derive the guard bit positions and values.
    #[must_use]
    pub const fn expand(self) -> Guard {
        let gk = self.0;
        Guard {
            mask: ((gk & LOW_MASK) << 1) | (!gk & LOW_MASK),
            guard: (((gk & LOW_MASK) << 1) & gk) | ((!gk & LOW_MASK) & (gk >> 1)),
        }
    }
}

/// Guard bit layout derived from a [`GuardKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    /// One bit per pair: the guard bit.
    pub mask: u32,
    /// Required values of the guard bits (zero elsewhere).
    pub guard: u32,
}

impl Guard {
    /// A log word with all data bits still set.
    #[must_use]
    pub const fn unused(self) -> u32 {
        self.guard | !self.mask
    }

    /// `true` if the guard bits of `word` have their required values.
    #[must_use]
    pub const fn guards_intact(self, word: u32) -> bool {
        word & self.mask == self.guard
    }

    /// Data bits of `word`, each duplicated onto its guard position so the
    /// result is a plain bit string of 32 bits.
    #[must_use]
    pub const fn spread(self, word: u32) -> u32 {
        let data = word & !self.mask;
        let low = ((data >> 1) | data) & LOW_MASK;
        low | (low << 1)
    }

    /// Shift one more zero into a thermometer-coded (`0*1*`) word, clearing
    /// its highest still-set data bit.
    #[must_use]
    pub const fn advance(self, word: u32) -> u32 {
        let data = word & !self.mask;
        let low = ((data >> 1) | data) & LOW_MASK;
        let shifted = (low >> 2) | (low >> 1);
        (shifted & !self.mask) | self.guard
    }
}
