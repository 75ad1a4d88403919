//! Fault handling and fatal shutdown.

use pinstore_crypto_core::{secequal, secequal32, CryptoError};

use super::Storage;
use crate::error::StorageError;
use crate::ledger::Ledger;

impl<L: Ledger> Storage<L> {
    /// Handle an integrity violation.
    ///
    /// The PIN failure counter doubles as a fault counter: it is increased
    /// and the increase is verified. If that fails, or a fault occurs while
    /// handling another one, the storage is wiped. Either way it halts.
    pub(crate) fn handle_fault(&mut self, msg: &'static str) -> StorageError {
        tracing::error!(reason = msg, "fault detected");

        if self.fault_in_progress {
            self.wipe_after_fault();
            return self.halt(StorageError::Fault(msg));
        }
        self.fault_in_progress = true;

        if !self.count_fault() {
            self.wipe_after_fault();
        }
        self.halt(StorageError::Fault(msg))
    }

    fn count_fault(&mut self) -> bool {
        self.increase_pin_fails().is_ok()
    }

    fn wipe_after_fault(&mut self) {
        if self.halted {
            return;
        }
        if let Err(e) = self.wipe_storage() {
            tracing::error!("wipe after fault failed: {e}");
        }
    }

    /// Constant-time equality. An interrupted comparison loop is a fault.
    pub(crate) fn secure_eq(&mut self, a: &[u8], b: &[u8]) -> Result<bool, StorageError> {
        secequal(a, b).or_else(|e| self.comparison_fault(e))
    }

    /// Masked word-wise equality, see [`secequal32`].
    pub(crate) fn secure_eq32(&mut self, a: &[u8], b: &[u8]) -> Result<bool, StorageError> {
        secequal32(a, b).or_else(|e| self.comparison_fault(e))
    }

    fn comparison_fault(&mut self, err: CryptoError) -> Result<bool, StorageError> {
        match err {
            CryptoError::LoopCompletion => Err(self.handle_fault("loop completion check")),
            other => Err(other.into()),
        }
    }

    /// Zero the secrets and refuse further operations until `init`.
    pub(crate) fn halt(&mut self, err: StorageError) -> StorageError {
        self.lock();
        self.halted = true;
        tracing::error!("storage halted: {err}");
        err
    }

    /// Wipe, then halt with `err`.
    pub(crate) fn fatal_wipe(&mut self, err: StorageError) -> StorageError {
        if let Err(e) = self.wipe_storage() {
            tracing::error!("wipe failed: {e}");
        }
        self.halt(err)
    }
}
