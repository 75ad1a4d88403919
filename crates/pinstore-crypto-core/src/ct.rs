//! Constant-time comparisons hardened against single-fault skips.
//!
//! Both functions count the iterations they perform and report
//! [`CryptoError::LoopCompletion`] if the loop exited early, which on real
//! hardware only happens when an instruction was glitched.

use subtle::ConstantTimeEq;

use crate::error::CryptoError;
use crate::rng::random_u32;

/// Compare two byte strings in constant time.
///
/// Slices of different length compare unequal (the length is not secret).
///
/// # Errors
///
/// Returns [`CryptoError::LoopCompletion`] if the comparison loop did not
/// visit every byte.
pub fn secequal(a: &[u8], b: &[u8]) -> Result<bool, CryptoError> {
    if a.len() != b.len() {
        return Ok(false);
    }

    let mut diff = 0u8;
    let mut visited = 0usize;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
        visited = visited.wrapping_add(1);
    }

    if visited != a.len() {
        return Err(CryptoError::LoopCompletion);
    }

    Ok(bool::from(diff.ct_eq(&0)))
}

/// Compare two word-aligned byte strings using masked addition.
///
/// Each word pair contributes `((a + m) - b) ^ m` for a fresh random mask
/// `m`, which is zero iff `a == b` but never exposes `a ^ b` or a carry
/// pattern that depends only on the operands.
///
/// # Errors
///
/// - [`CryptoError::InvalidKeyMaterial`] if the inputs differ in length or
///   are not a multiple of 4 bytes
/// - [`CryptoError::LoopCompletion`] if the loop did not visit every word
pub fn secequal32(a: &[u8], b: &[u8]) -> Result<bool, CryptoError> {
    if a.len() != b.len() || a.len() % 4 != 0 {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "secequal32 needs equal word-aligned inputs, got {} and {} bytes",
            a.len(),
            b.len()
        )));
    }

    let words = a.len() / 4;
    let mut diff = 0u32;
    let mut visited = 0usize;
    for (wa, wb) in a.chunks_exact(4).zip(b.chunks_exact(4)) {
        let x = u32::from_le_bytes([wa[0], wa[1], wa[2], wa[3]]);
        let y = u32::from_le_bytes([wb[0], wb[1], wb[2], wb[3]]);
        let mask = random_u32();
        diff |= x.wrapping_add(mask).wrapping_sub(y) ^ mask;
        visited = visited.wrapping_add(1);
    }

    if visited != words {
        return Err(CryptoError::LoopCompletion);
    }

    Ok(bool::from(diff.ct_eq(&0)))
}
