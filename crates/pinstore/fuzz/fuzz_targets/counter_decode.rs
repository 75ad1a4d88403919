//! Fuzz target for monotonic counters stored in the ledger.
//!
//! Whatever bytes sit under a counter key, incrementing must either fail
//! cleanly or return a value that never decreases.
//!
//! # Usage
//!
//! ```sh
//! cd crates/pinstore
//! cargo +nightly fuzz run counter_decode -- -max_len=64
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use pinstore::counter::next_counter;
use pinstore::{MemoryLedger, LEDGER_VERSION};

const KEY: u16 = 0x8101;

fuzz_target!(|data: &[u8]| {
    let mut ledger = MemoryLedger::from_entries(LEDGER_VERSION, &[(KEY, data)]);
    let Ok(first) = next_counter(&mut ledger, KEY) else {
        return;
    };
    if let Ok(second) = next_counter(&mut ledger, KEY) {
        assert!(second >= first);
    }
});
