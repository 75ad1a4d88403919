//! Storage error types for `pinstore`.

use pinstore_crypto_core::CryptoError;
use thiserror::Error;

/// Errors reported by a [`Ledger`](crate::ledger::Ledger) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Key `0xFFFF` marks free space and can never be stored.
    #[error("key {0:#06x} is reserved by the ledger")]
    ReservedKey(u16),

    /// An in-place update targeted a key that is not present.
    #[error("key {0:#06x} not found")]
    NotFound(u16),

    /// An in-place update would run past the end of the entry.
    #[error("write of {len} bytes at offset {offset} exceeds entry {key:#06x}")]
    OutOfBounds {
        /// The entry being updated.
        key: u16,
        /// Byte offset of the write.
        offset: u16,
        /// Length of the write.
        len: usize,
    },

    /// A word update was not aligned to a 4-byte boundary.
    #[error("unaligned word offset {offset} in entry {key:#06x}")]
    Unaligned {
        /// The entry being updated.
        key: u16,
        /// The offending offset.
        offset: u16,
    },

    /// The value does not fit the 16-bit length field.
    #[error("value of {0} bytes is too long for the ledger")]
    TooLong(usize),

    /// `set_ex` was given data whose length disagrees with `len`.
    #[error("data length {actual} does not match declared length {declared}")]
    LengthMismatch {
        /// Length passed to `set_ex`.
        declared: u16,
        /// Length of the data actually supplied.
        actual: usize,
    },

    /// A counter entry has a length that is not a whole number of words.
    #[error("counter {0:#06x} is malformed")]
    MalformedCounter(u16),

    /// Incrementing the counter would wrap around.
    #[error("counter {0:#06x} overflowed")]
    CounterOverflow(u16),
}

/// Errors produced by storage operations.
///
/// Variants marked *fatal* leave the storage halted: every further call
/// returns [`StorageError::Halted`] until [`Storage::init`] runs again.
///
/// [`Storage::init`]: crate::Storage::init
#[derive(Debug, Error)]
pub enum StorageError {
    /// Cryptographic operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The underlying ledger rejected an operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// `init` has not been called.
    #[error("storage is not initialized")]
    NotInitialized,

    /// `unlock` was called without a PIN.
    #[error("no PIN supplied")]
    NoPin,

    /// *Fatal.* The failure counter reached the limit; storage was wiped.
    #[error("too many wrong PIN attempts, storage has been wiped")]
    TooManyFails,

    /// The progress hook asked to abort the current attempt.
    #[error("operation cancelled")]
    Cancelled,

    /// The PIN did not decrypt the master key envelope.
    #[error("wrong PIN")]
    WrongPin,

    /// *Fatal.* The authenticated storage version is inconsistent with the
    /// ledger (downgrade or bypassed upgrade); storage was wiped.
    #[error("storage version mismatch, storage has been wiped")]
    WrongVersion,

    /// The new PIN equals the configured wipe code.
    #[error("new PIN equals the wipe code")]
    IsWipeCode,

    /// The operation needs the unlocked state.
    #[error("storage is locked")]
    Locked,

    /// A caller-supplied argument was rejected.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// The new PIN could not be written.
    #[error("cannot set PIN")]
    CannotSet,

    /// *Fatal.* The wipe code was entered; storage was wiped.
    #[error("wipe code entered, all private data has been erased")]
    WipeCodeEntered,

    /// *Fatal.* An integrity check failed.
    #[error("fault detected: {0}")]
    Fault(&'static str),

    /// A fatal error occurred earlier; re-run `init`.
    #[error("storage is halted after a fatal error")]
    Halted,

    /// A value is larger than the caller's limit.
    #[error("value of {len} bytes exceeds the buffer")]
    BufferTooSmall {
        /// Actual stored length.
        len: usize,
    },

    /// A value is too long to be stored.
    #[error("value of {len} bytes is too long to store")]
    ValueTooLong {
        /// Length that was rejected.
        len: usize,
    },
}

impl StorageError {
    /// `true` for errors after which the storage is halted.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TooManyFails | Self::WrongVersion | Self::WipeCodeEntered | Self::Fault(_)
        )
    }
}
