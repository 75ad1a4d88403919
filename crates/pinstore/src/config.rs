//! Runtime configuration and the throttle delay seam.
//!
//! [`StorageConfig::default`] is the production calibration. Tests shrink
//! the PBKDF2 budget and inject a [`Delay`] that returns immediately.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::pin_log::PIN_LOG_CAPACITY;

/// Tunable storage parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Total PBKDF2 iteration budget, split evenly between KEK and KEIV.
    pub pin_iter_count: u32,
    /// Seconds one KEK/KEIV derivation is expected to take; drives the
    /// progress estimate only.
    pub derive_secs: u32,
    /// Failed attempts after which the storage is wiped.
    pub pin_max_tries: u32,
    /// Length of one throttle slice; the hook is polled once per slice.
    pub throttle_slice_ms: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pin_iter_count: 20_000,
            derive_secs: 1,
            pin_max_tries: 16,
            throttle_slice_ms: 100,
        }
    }
}

impl StorageConfig {
    /// Check the parameters against the limits of the on-flash format.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BadArgument`] if `pin_max_tries` is zero or
    /// larger than one PIN log word can count, or if `pin_iter_count` is
    /// too small to be split into ten rounds.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.pin_max_tries == 0 || self.pin_max_tries > PIN_LOG_CAPACITY {
            return Err(StorageError::BadArgument(format!(
                "pin_max_tries must be in 1..={PIN_LOG_CAPACITY}, got {}",
                self.pin_max_tries
            )));
        }
        if self.pin_iter_count < 10 {
            return Err(StorageError::BadArgument(format!(
                "pin_iter_count must be at least 10, got {}",
                self.pin_iter_count
            )));
        }
        Ok(())
    }

    /// PBKDF2 iterations per progress round.
    #[must_use]
    pub const fn iterations_per_round(&self) -> u32 {
        self.pin_iter_count / 10
    }
}

/// Blocking sleep used by the PIN throttle.
pub trait Delay {
    /// Block for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

/// [`Delay`] backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
