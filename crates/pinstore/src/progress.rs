//! Progress reporting and cancellation during PIN processing.

/// Returned by the progress hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitControl {
    /// Keep going.
    Continue,
    /// Abort the current unlock attempt.
    Cancel,
}

/// Progress hook invoked while throttling and deriving keys.
///
/// `wait_secs` is the estimated time left, `permille` the fraction done.
/// Any `FnMut(u32, u32, &str) -> WaitControl` closure implements it.
pub trait UiCallback {
    /// Report progress; return [`WaitControl::Cancel`] to abort.
    fn progress(&mut self, wait_secs: u32, permille: u32, message: &str) -> WaitControl;
}

impl<F> UiCallback for F
where
    F: FnMut(u32, u32, &str) -> WaitControl,
{
    fn progress(&mut self, wait_secs: u32, permille: u32, message: &str) -> WaitControl {
        self(wait_secs, permille, message)
    }
}

pub(crate) const VERIFYING_PIN_MSG: &str = "Verifying PIN";
pub(crate) const PROCESSING_MSG: &str = "Processing";
pub(crate) const STARTING_MSG: &str = "Starting up";

/// Time accounting for the operation in progress.
#[derive(Debug, Default)]
pub(crate) struct UiState {
    pub(crate) total: u32,
    pub(crate) rem: u32,
    pub(crate) message: Option<&'static str>,
}

impl UiState {
    /// Begin an operation expected to take `total` seconds.
    pub(crate) fn start(&mut self, total: u32, message: &'static str) {
        self.total = total;
        self.rem = total;
        self.message = Some(message);
    }

    /// Permille done after `tenths` tenths of a `derive_secs` derivation.
    pub(crate) fn derive_permille(&self, tenths: u32, derive_secs: u32) -> u32 {
        self.total
            .saturating_sub(self.rem)
            .saturating_mul(1000)
            .saturating_add(tenths.saturating_mul(derive_secs).saturating_mul(100))
            .checked_div(self.total)
            .unwrap_or(1000)
    }

    /// Permille done at slice `slice` (0..10) of the current throttle second.
    pub(crate) fn throttle_permille(&self, slice: u32) -> u32 {
        let elapsed = self.total.saturating_sub(self.rem);
        if self.total > 1_000_000 {
            elapsed.checked_div(self.total / 1000).unwrap_or(1000)
        } else {
            elapsed
                .saturating_mul(10)
                .saturating_add(slice)
                .saturating_mul(100)
                .checked_div(self.total)
                .unwrap_or(1000)
        }
    }
}
