//! `pinstore-crypto-core`: cryptographic primitives for the pinstore secure storage.
//!
//! This crate is the audit target: zero I/O, zero global state. Every
//! primitive is exposed with the call shape the storage layer needs on a
//! constrained device (incremental PBKDF2 for progress reporting, streaming
//! ChaCha20-Poly1305 so values can be written to flash one block at a time).

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod ct;
pub mod rng;

pub mod aead;
pub mod kdf;
pub mod mac;

pub use aead::{Rfc7539, CHACHA20_BLOCK_SIZE, CHACHA20_IV_SIZE, CHACHA20_KEY_SIZE, POLY1305_TAG_SIZE};
pub use ct::{secequal, secequal32};
pub use error::CryptoError;
pub use kdf::Pbkdf2Sha256;
pub use mac::{hmac_sha256, sha256, KeyTagger, SHA256_DIGEST_LENGTH};
pub use memory::{SecretBuffer, SecretBytes};
pub use rng::{random_buffer, random_u32, random_uniform, wait_random};
