//! PBKDF2-HMAC-SHA256 Known-Answer Tests (RFC 7914 §11 and the widely
//! published RFC 6070-style SHA-256 vectors).

use pinstore_crypto_core::kdf::Pbkdf2Sha256;
use sha2::Sha256;

fn derive(password: &[u8], salt: &[u8], block: u32, iterations: u32) -> [u8; 32] {
    let mut ctx = Pbkdf2Sha256::new(password, salt, block).expect("valid block index");
    ctx.update(iterations - 1);
    *ctx.finish().expose()
}

#[test]
fn password_salt_c1() {
    let expected: [u8; 32] = [
        0x12, 0x0f, 0xb6, 0xcf, 0xfc, 0xf8, 0xb3, 0x2c, 0x43, 0xe7, 0x22, 0x52, 0x56, 0xc4, 0xf8,
        0x37, 0xa8, 0x65, 0x48, 0xc9, 0x2c, 0xcc, 0x35, 0x48, 0x08, 0x05, 0x98, 0x7c, 0xb7, 0x0b,
        0xe1, 0x7b,
    ];
    assert_eq!(derive(b"password", b"salt", 1, 1), expected);
}

#[test]
fn password_salt_c2() {
    let expected: [u8; 32] = [
        0xae, 0x4d, 0x0c, 0x95, 0xaf, 0x6b, 0x46, 0xd3, 0x2d, 0x0a, 0xdf, 0xf9, 0x28, 0xf0, 0x6d,
        0xd0, 0x2a, 0x30, 0x3f, 0x8e, 0xf3, 0xc2, 0x51, 0xdf, 0xd6, 0xe2, 0xd8, 0x5a, 0x95, 0x47,
        0x4c, 0x43,
    ];
    assert_eq!(derive(b"password", b"salt", 1, 2), expected);
}

#[test]
fn password_salt_c4096() {
    let expected: [u8; 32] = [
        0xc5, 0xe4, 0x78, 0xd5, 0x92, 0x88, 0xc8, 0x41, 0xaa, 0x53, 0x0d, 0xb6, 0x84, 0x5c, 0x4c,
        0x8d, 0x96, 0x28, 0x93, 0xa0, 0x01, 0xce, 0x4e, 0x11, 0xa4, 0x96, 0x38, 0x73, 0xaa, 0x98,
        0x13, 0x4a,
    ];
    assert_eq!(derive(b"password", b"salt", 1, 4096), expected);
}

/// Second output block, which the storage layer uses as the KEIV.
#[test]
fn rfc7914_passwd_salt_second_block() {
    let block2 = derive(b"passwd", b"salt", 2, 1);
    assert_eq!(
        block2[..8],
        [0x49, 0xca, 0x9c, 0xcc, 0xf1, 0x79, 0xb6, 0x45]
    );
}

/// KEK ∥ KEIV layout for a PIN-shaped password matches one-shot PBKDF2.
#[test]
fn pin_shaped_input_matches_pbkdf2_crate() {
    let pin = 11_234u32.to_le_bytes();
    let mut salt = [0u8; 68];
    for (i, b) in salt.iter_mut().enumerate() {
        *b = i as u8;
    }
    let mut expected = [0u8; 64];
    pbkdf2::pbkdf2_hmac::<Sha256>(&pin, &salt, 200, &mut expected);

    assert_eq!(derive(&pin, &salt, 1, 200), expected[..32]);
    assert_eq!(derive(&pin, &salt, 2, 200), expected[32..]);
}
