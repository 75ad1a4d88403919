//! Verify that `SecretBytes` and `SecretBuffer` actually zero memory.
//!
//! **UB caveat:** the drop tests read freed memory. They are best-effort
//! smoke tests that work reliably under the debug profile; in release
//! builds the compiler may elide the post-free reads.

use pinstore_crypto_core::memory::{SecretBuffer, SecretBytes};
use zeroize::Zeroize;

/// Sentinel pattern used to verify zeroization: easily identifiable in memory.
const SENTINEL: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

#[test]
fn secret_bytes_zeroize_in_place() {
    let mut data = [0u8; 48];
    for chunk in data.chunks_mut(4) {
        chunk.copy_from_slice(&SENTINEL);
    }
    let mut keys = SecretBytes::new(data);
    keys.zeroize();
    assert!(keys.is_zero(), "zeroize left key bytes behind");
}

#[test]
fn boxed_secret_bytes_sentinel_not_found_after_drop() {
    let mut data = [0u8; 64];
    for chunk in data.chunks_mut(4) {
        chunk.copy_from_slice(&SENTINEL);
    }

    let boxed = Box::new(SecretBytes::new(data));
    let data_ptr = boxed.expose().as_ptr();
    assert_eq!(&boxed.expose()[..4], &SENTINEL);
    drop(boxed);

    // SAFETY: reading memory that was just freed, for testing only. The
    // allocation is still mapped immediately after free on common allocators.
    let sentinel_found = unsafe {
        let slice = std::slice::from_raw_parts(data_ptr, 64);
        slice.windows(4).any(|w| w == SENTINEL)
    };
    assert!(!sentinel_found, "sentinel found after SecretBytes drop");
}

#[test]
fn secret_buffer_sentinel_not_found_after_drop() {
    let sentinel_data: Vec<u8> = SENTINEL.iter().copied().cycle().take(512).collect();

    let data_ptr: *const u8;
    let data_len: usize;
    {
        let buf = SecretBuffer::copy_from(&sentinel_data);
        let exposed = buf.expose();
        data_ptr = exposed.as_ptr();
        data_len = exposed.len();
        assert_eq!(&exposed[..4], &SENTINEL);
    }

    // SAFETY: see above.
    let sentinel_found = unsafe {
        let slice = std::slice::from_raw_parts(data_ptr, data_len);
        slice.windows(4).any(|w| w == SENTINEL)
    };
    assert!(!sentinel_found, "sentinel found after SecretBuffer drop");
}
