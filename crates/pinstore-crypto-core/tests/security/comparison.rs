//! Behaviour of the fault-hardened comparisons on tag-shaped inputs.

use pinstore_crypto_core::ct::{secequal, secequal32};
use pinstore_crypto_core::CryptoError;

#[test]
fn secequal32_every_single_bit_difference_detected() {
    let a = [0xA5u8; 8];
    for byte in 0..8 {
        for bit in 0..8 {
            let mut b = a;
            b[byte] ^= 1 << bit;
            assert!(
                !secequal32(&a, &b).unwrap(),
                "bit {bit} of byte {byte} not detected"
            );
        }
    }
}

#[test]
fn secequal32_is_stable_across_random_masks() {
    let a = [0x12u8, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0];
    for _ in 0..1000 {
        assert!(secequal32(&a, &a).unwrap());
    }
}

#[test]
fn secequal32_mismatched_lengths_are_an_error() {
    assert!(matches!(
        secequal32(&[0u8; 8], &[0u8; 4]),
        Err(CryptoError::InvalidKeyMaterial(_))
    ));
}

#[test]
fn secequal_tag_prefix_is_not_enough() {
    let tag = [0x5Au8; 16];
    let mut forged = tag;
    forged[15] = 0x00;
    assert!(!secequal(&tag, &forged).unwrap());
}
