//! Randomness helpers backed by the OS CSPRNG.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};

use crate::error::CryptoError;

/// Upper bound (exclusive) on the busy-wait length of [`wait_random`].
const MAX_RANDOM_SPINS: u32 = 256;

/// Fill `buf` from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::Rng`] if the CSPRNG fails.
pub fn random_buffer(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CryptoError::Rng(format!("CSPRNG fill failed: {e}")))
}

/// Uniform random `u32`.
#[must_use]
pub fn random_u32() -> u32 {
    OsRng.next_u32()
}

/// Uniform random value in `0..n`. Returns 0 when `n == 0`.
#[must_use]
pub fn random_uniform(n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    OsRng.gen_range(0..n)
}

/// Busy-wait for a random, short number of iterations.
///
/// Sprinkled before security decisions so that a glitch attacker cannot
/// time a fault against a fixed instruction offset.
pub fn wait_random() {
    let spins = random_uniform(MAX_RANDOM_SPINS);
    let mut acc = 0u32;
    for i in 0..spins {
        acc = std::hint::black_box(acc.wrapping_add(i));
    }
    std::hint::black_box(acc);
}
