//! `pinstore`: PIN-gated encrypted key-value storage.
//!
//! Values live in an append-only, bit-clearing [`Ledger`]. Protected values
//! are encrypted under a data key that is itself wrapped by a key derived
//! from the user's PIN, and the set of protected keys is authenticated as a
//! whole. Failed PIN attempts are recorded in a fault-resistant log,
//! throttled exponentially and end in a wipe after
//! [`StorageConfig::pin_max_tries`].
//!
//! ```no_run
//! use pinstore::{MemoryLedger, Pin, Storage, StorageConfig, StorageKey};
//!
//! # fn main() -> Result<(), pinstore::StorageError> {
//! let mut storage = Storage::new(MemoryLedger::new(), StorageConfig::default())?;
//! storage.init(None, b"device serial")?;
//! storage.unlock(Some(&Pin::empty()), None)?;
//! storage.set(StorageKey::new(0x01, 0x01), b"seed")?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod config;
pub mod counter;
pub mod error;
pub mod guard;
pub mod key;
pub mod ledger;
pub mod pin;
pub mod pin_log;
pub mod progress;
pub mod storage;

pub use config::{Delay, StorageConfig, ThreadDelay};
pub use error::{LedgerError, StorageError};
pub use key::StorageKey;
pub use ledger::{Ledger, MemoryLedger, LEDGER_VERSION};
pub use pin::{ExternalSalt, Pin, EXTERNAL_SALT_SIZE};
pub use progress::{UiCallback, WaitControl};
pub use storage::{Storage, MAX_PROTECTED_LEN};
