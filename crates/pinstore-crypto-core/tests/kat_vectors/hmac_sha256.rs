//! RFC 4231: HMAC-SHA256 Known-Answer Tests.

use pinstore_crypto_core::mac::{hmac_sha256, KeyTagger};

/// Test Case 1: key = 0x0b × 20, data = "Hi There".
#[test]
fn rfc4231_case_1() {
    let expected: [u8; 32] = [
        0xb0, 0x34, 0x4c, 0x61, 0xd8, 0xdb, 0x38, 0x53, 0x5c, 0xa8, 0xaf, 0xce, 0xaf, 0x0b, 0xf1,
        0x2b, 0x88, 0x1d, 0xc2, 0x00, 0xc9, 0x83, 0x3d, 0xa7, 0x26, 0xe9, 0x37, 0x6c, 0x2e, 0x32,
        0xcf, 0xf7,
    ];
    let tag = hmac_sha256(&[0x0b; 20], b"Hi There").unwrap();
    assert_eq!(tag.expose(), &expected);
}

/// Test Case 2: key = "Jefe", evaluated through the prepared tagger.
#[test]
fn rfc4231_case_2_prepared() {
    let expected: [u8; 32] = [
        0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08, 0x95, 0x75,
        0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec, 0x58, 0xb9, 0x64, 0xec,
        0x38, 0x43,
    ];
    let tagger = KeyTagger::new(b"Jefe").unwrap();
    let tag = tagger.tag(b"what do ya want for nothing?");
    assert_eq!(tag.expose(), &expected);
    // The prepared state is reusable.
    let again = tagger.tag(b"what do ya want for nothing?");
    assert_eq!(again.expose(), &expected);
}
