//! Migration of older ledger schemas.
//!
//! The ledger exposes the old area for reading and stages every write in a
//! fresh area until [`Ledger::upgrade_finish`]. Schema 0 kept values and
//! the PIN in plaintext; schema 1 lacks the wipe code.

use pinstore_crypto_core::random_buffer;
use zeroize::Zeroizing;

use super::{Storage, TRUE_WORD};
use crate::error::StorageError;
use crate::key::{StorageKey, STORAGE_UPGRADED_KEY, V0_PIN_FAIL_KEY, V0_PIN_KEY, VERSION_KEY};
use crate::ledger::{Ledger, LEDGER_VERSION};
use crate::pin::{Pin, PIN_EMPTY, WIPE_CODE_EMPTY};
use crate::progress::PROCESSING_MSG;

/// Failures recorded by a schema-0 counter: the cleared bits of the first
/// non-zero word.
fn legacy_fails(counter: Option<&[u8]>) -> u32 {
    counter
        .into_iter()
        .flat_map(|bytes| bytes.chunks_exact(4))
        .filter_map(|w| <[u8; 4]>::try_from(w).ok())
        .map(u32::from_le_bytes)
        .find(|&w| w != 0)
        .map_or(0, |w| (!w).count_ones())
}

fn snapshot<L: Ledger>(ledger: &L) -> Vec<(u16, Zeroizing<Vec<u8>>)> {
    let mut entries = Vec::new();
    let mut cursor = 0usize;
    while let Some((key, value)) = ledger.get_next(&mut cursor) {
        entries.push((key, Zeroizing::new(value.to_vec())));
    }
    entries
}

impl<L: Ledger> Storage<L> {
    pub(super) fn upgrade(&mut self) -> Result<(), StorageError> {
        let from = self.ledger_version;
        if from == 0 {
            self.upgrade_plaintext()?;
        } else {
            for (key, value) in snapshot(&self.ledger) {
                self.ledger.set(key, &value)?;
            }
        }

        if from <= 1 {
            self.set_wipe_code(WIPE_CODE_EMPTY)?;
        }

        self.ledger
            .set(STORAGE_UPGRADED_KEY.raw(), &TRUE_WORD.to_le_bytes())?;
        self.ledger.upgrade_finish()?;
        self.ledger_version = LEDGER_VERSION;
        tracing::info!(from, to = LEDGER_VERSION, "storage upgraded");
        Ok(())
    }

    /// Encrypt a schema-0 store under fresh keys.
    fn upgrade_plaintext(&mut self) -> Result<(), StorageError> {
        random_buffer(self.cached_keys.expose_mut())?;
        self.auth_init()?;
        self.set_encrypted(VERSION_KEY, &1u32.to_le_bytes())?;

        self.ui.start(self.config.derive_secs, PROCESSING_MSG);
        let pin = self
            .ledger
            .get(V0_PIN_KEY.raw())
            .and_then(|v| <[u8; 4]>::try_from(v).ok())
            .map(u32::from_le_bytes)
            .filter(|&v| v != PIN_EMPTY)
            .map_or_else(Pin::empty, Pin::from_encoded);
        self.set_pin(&pin, None)?;

        let fails = legacy_fails(self.ledger.get(V0_PIN_FAIL_KEY.raw()));
        self.pin_logs_init(fails)?;

        for (raw, value) in snapshot(&self.ledger) {
            let key = StorageKey::from_raw(raw);
            if key.is_reserved() {
                continue;
            }
            if key.is_public() {
                self.ledger.set(raw, &value)?;
            } else {
                self.set_encrypted(key, &value)?;
            }
        }

        self.unlocked = false;
        self.cached_keys.clear();
        Ok(())
    }
}
