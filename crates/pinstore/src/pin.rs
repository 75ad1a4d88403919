//! Numeric PINs.
//!
//! A PIN is up to nine ASCII digits. It is stored and fed to the KDF as a
//! `u32` built by prefixing the digits with a `1`, so `""` encodes as `1`,
//! `"0000"` as `10000` and `"1234"` as `11234`. Leading zeros therefore
//! stay significant.

use std::fmt;
use std::str::FromStr;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::StorageError;

/// Maximum number of digits in a PIN or wipe code.
pub const MAX_PIN_DIGITS: usize = 9;

/// Length of the optional caller-supplied salt mixed into the KDF.
pub const EXTERNAL_SALT_SIZE: usize = 32;

/// Caller-supplied salt, e.g. from an SD card or a secure element.
pub type ExternalSalt = [u8; EXTERNAL_SALT_SIZE];

/// Encoding of the empty PIN.
pub const PIN_EMPTY: u32 = 1;

/// Stored value of an unset wipe code. No PIN encodes to 0, so an unset
/// wipe code never matches an empty PIN.
pub const WIPE_CODE_EMPTY: u32 = 0;

/// A PIN (or wipe code) in its `u32` encoding. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Pin(u32);

impl Pin {
    /// The empty PIN.
    #[must_use]
    pub const fn empty() -> Self {
        Self(PIN_EMPTY)
    }

    /// Parse a string of at most [`MAX_PIN_DIGITS`] ASCII digits.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BadArgument`] for non-digits or too many digits.
    pub fn from_digits(digits: &str) -> Result<Self, StorageError> {
        if digits.len() > MAX_PIN_DIGITS {
            return Err(StorageError::BadArgument(format!(
                "PIN longer than {MAX_PIN_DIGITS} digits"
            )));
        }
        let mut value = PIN_EMPTY;
        for c in digits.bytes() {
            if !c.is_ascii_digit() {
                return Err(StorageError::BadArgument("PIN must be decimal digits".into()));
            }
            // At most 10 digits including the leading 1, so this fits a u32.
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u32::from(c.wrapping_sub(b'0'))))
                .ok_or_else(|| StorageError::BadArgument("PIN out of range".into()))?;
        }
        Ok(Self(value))
    }

    /// Wrap an already encoded value, as found in schema-0 ledgers.
    #[must_use]
    pub const fn from_encoded(value: u32) -> Self {
        Self(value)
    }

    /// The `u32` encoding.
    #[must_use]
    pub const fn encoded(&self) -> u32 {
        self.0
    }

    /// `true` for the empty PIN.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == PIN_EMPTY
    }

    /// Little-endian bytes, the KDF password.
    #[must_use]
    pub const fn to_le_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Value stored when this PIN is used as a wipe code: the empty PIN
    /// means "no wipe code".
    #[must_use]
    pub const fn as_wipe_code(&self) -> u32 {
        if self.is_empty() {
            WIPE_CODE_EMPTY
        } else {
            self.0
        }
    }
}

impl FromStr for Pin {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_digits(s)
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(***)")
    }
}
