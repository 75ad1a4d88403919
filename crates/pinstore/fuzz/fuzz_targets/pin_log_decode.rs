//! Fuzz target for the PIN failure log decoder.
//!
//! Arbitrary ledger bytes must be rejected as a fault or decoded into a
//! consistent log, never panic.
//!
//! # Usage
//!
//! ```sh
//! cd crates/pinstore
//! cargo +nightly fuzz run pin_log_decode -- -max_len=256
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use pinstore::pin_log::PinLogs;

fuzz_target!(|data: &[u8]| {
    let Ok(mut logs) = PinLogs::from_bytes(data) else {
        return;
    };
    let before = logs.fails();
    if let Ok((offset, word)) = logs.next_increase() {
        logs.apply(offset, word);
        if let (Ok(before), Ok(after)) = (before, logs.fails()) {
            assert!(after >= before);
        }
    }
    if let Ok(plan) = logs.reset_plan() {
        for (offset, word) in plan.writes {
            logs.apply(offset, word);
        }
    }
});
