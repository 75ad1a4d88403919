//! Cryptographic error types for `pinstore-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material had the wrong length for the primitive it was fed to.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Streaming AEAD was driven out of order (e.g. `auth` after `encrypt`,
    /// or a non-block-multiple chunk before the final one).
    #[error("AEAD misuse: {0}")]
    AeadMisuse(&'static str),

    /// The operating system CSPRNG could not produce random bytes.
    #[error("random number generator failure: {0}")]
    Rng(String),

    /// A comparison loop did not run to completion. Only reachable through a
    /// fault (glitch) on real hardware.
    #[error("loop completion check failed")]
    LoopCompletion,
}
