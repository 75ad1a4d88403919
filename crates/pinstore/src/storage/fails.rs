//! Reading and updating the PIN failure log in the ledger.

use pinstore_crypto_core::wait_random;

use super::Storage;
use crate::error::StorageError;
use crate::key::PIN_LOGS_KEY;
use crate::ledger::Ledger;
use crate::pin_log::{LogFault, PinLogs};

impl<L: Ledger> Storage<L> {
    fn read_pin_logs(&mut self) -> Result<PinLogs, StorageError> {
        wait_random();
        let parsed = self
            .ledger
            .get(PIN_LOGS_KEY.raw())
            .ok_or(LogFault("no PIN logs"))
            .and_then(PinLogs::from_bytes);
        parsed.map_err(|fault| self.handle_fault(fault.0))
    }

    /// Replace the log with a fresh one holding `fails` failures.
    pub(super) fn pin_logs_init(&mut self, fails: u32) -> Result<(), StorageError> {
        let logs = PinLogs::fresh(fails).ok_or_else(|| {
            StorageError::BadArgument(format!("cannot record {fails} PIN failures"))
        })?;
        wait_random();
        self.ledger.set(PIN_LOGS_KEY.raw(), &logs.to_bytes())?;
        Ok(())
    }

    pub(super) fn pin_get_fails(&mut self) -> Result<u32, StorageError> {
        let logs = self.read_pin_logs()?;
        wait_random();
        logs.fails().map_err(|fault| self.handle_fault(fault.0))
    }

    /// Record one failure with a single word write, then read the log back.
    /// Anything but a count one higher than before is a fault.
    pub(super) fn increase_pin_fails(&mut self) -> Result<(), StorageError> {
        let logs = self.read_pin_logs()?;
        wait_random();
        let before = logs.fails().map_err(|fault| self.handle_fault(fault.0))?;
        let (offset, word) = logs
            .next_increase()
            .map_err(|fault| self.handle_fault(fault.0))?;
        wait_random();
        if let Err(e) = self.ledger.update_word(PIN_LOGS_KEY.raw(), offset, word) {
            tracing::error!("PIN log write failed: {e}");
            return Err(self.handle_fault("PIN logs update"));
        }

        let after = self.pin_get_fails()?;
        wait_random();
        if before.checked_add(1) != Some(after) {
            return Err(self.handle_fault("PIN counter increment"));
        }
        Ok(())
    }

    /// Bring the failure count back to zero.
    pub(super) fn pin_fails_reset(&mut self) -> Result<(), StorageError> {
        let logs = self.read_pin_logs()?;
        wait_random();
        let plan = logs.reset_plan().map_err(|fault| self.handle_fault(fault.0))?;
        for (offset, word) in plan.writes {
            self.ledger.update_word(PIN_LOGS_KEY.raw(), offset, word)?;
        }
        if plan.reinit {
            self.pin_logs_init(0)?;
        }
        Ok(())
    }

    /// Count one failed attempt made outside [`Storage::unlock`], e.g. a
    /// wrong PIN entered at a prompt that verifies it some other way.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotInitialized`], [`StorageError::Halted`], or a
    /// fatal fault if the log is damaged or the write did not take effect.
    pub fn pin_fails_increase(&mut self) -> Result<(), StorageError> {
        self.ensure_running()?;
        self.increase_pin_fails()
    }

    /// Attempts left before the storage is wiped.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotInitialized`], [`StorageError::Halted`], or a
    /// fatal fault if the log is damaged.
    pub fn get_pin_rem(&mut self) -> Result<u32, StorageError> {
        self.ensure_running()?;
        let fails = self.pin_get_fails()?;
        Ok(self.config.pin_max_tries.saturating_sub(fails))
    }
}
