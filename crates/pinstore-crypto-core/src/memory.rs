//! Zero-on-drop containers for key material and decrypted values.
//!
//! Every secret that crosses a function boundary in the storage layer (KEK,
//! KEIV, DEK, SAK, decrypted entries) lives in one of these types, so the
//! bytes are wiped on every return path, including early `?` returns.
//!
//! - [`SecretBytes`]: fixed-size, stack friendly, `mlock`'d best-effort
//! - [`SecretBuffer`]: variable-length, heap backed via [`secrecy`]

use std::fmt;

use secrecy::{ExposeSecret, SecretSlice};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::rng;

// ---------------------------------------------------------------------------
// Page locking
// ---------------------------------------------------------------------------

/// Best-effort `mlock` guard. Unlocks on drop if the lock succeeded.
struct PageLock {
    ptr: *const u8,
    len: usize,
    locked: bool,
}

// SAFETY: the pointer is only handed to mlock/munlock, never dereferenced.
unsafe impl Send for PageLock {}
unsafe impl Sync for PageLock {}

impl PageLock {
    const fn none() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
            locked: false,
        }
    }

    fn acquire(ptr: *const u8, len: usize) -> Self {
        let locked = platform::try_mlock(ptr, len);
        Self { ptr, len, locked }
    }
}

impl Drop for PageLock {
    fn drop(&mut self) {
        if self.locked {
            platform::try_munlock(self.ptr, self.len);
        }
    }
}

// ---------------------------------------------------------------------------
// SecretBytes<N>
// ---------------------------------------------------------------------------

/// Fixed-size secret, wiped on drop.
///
/// Used for the cached `DEK ∥ SAK`, the PIN-derived KEK/KEIV, the running
/// authentication sum and every intermediate digest derived from them.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes<const N: usize> {
    bytes: [u8; N],
    #[zeroize(skip)]
    lock: PageLock,
}

impl<const N: usize> SecretBytes<N> {
    /// Take ownership of `data`.
    ///
    /// The page lock is taken at the current address. If the value moves
    /// afterwards the stale `munlock` is harmless; zeroization does not
    /// depend on it.
    #[must_use]
    pub fn new(data: [u8; N]) -> Self {
        let mut s = Self {
            bytes: data,
            lock: PageLock::none(),
        };
        s.lock = PageLock::acquire(s.bytes.as_ptr(), N);
        s
    }

    /// All-zero secret, the resting state of volatile key caches.
    #[must_use]
    pub fn zeroed() -> Self {
        Self::new([0u8; N])
    }

    /// Fresh secret from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Rng`] if the CSPRNG fails.
    pub fn random() -> Result<Self, CryptoError> {
        let mut s = Self::zeroed();
        rng::random_buffer(&mut s.bytes)?;
        Ok(s)
    }

    /// Borrow the raw bytes.
    #[must_use]
    pub const fn expose(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Mutably borrow the raw bytes (for in-place derivation or decryption).
    pub fn expose_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }

    /// Overwrite with zeros without dropping.
    pub fn clear(&mut self) {
        self.bytes.zeroize();
    }

    /// `true` if every byte is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }
}

impl<const N: usize> fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes<{N}>(***)")
    }
}

impl<const N: usize> From<[u8; N]> for SecretBytes<N> {
    fn from(data: [u8; N]) -> Self {
        Self::new(data)
    }
}

// ---------------------------------------------------------------------------
// SecretBuffer
// ---------------------------------------------------------------------------

/// Variable-length secret, wiped on drop.
///
/// Returned by `get` for protected entries. Equality is intentionally not
/// implemented; compare through [`SecretBuffer::expose`].
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
    _lock: PageLock,
}

impl SecretBuffer {
    /// Take ownership of `data` without copying it.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        let inner: SecretSlice<u8> = data.into();
        let exposed = inner.expose_secret();
        let lock = PageLock::acquire(exposed.as_ptr(), exposed.len());
        Self { inner, _lock: lock }
    }

    /// Copy `data` into a new secret allocation. The caller still owns (and
    /// should wipe) the source.
    #[must_use]
    pub fn copy_from(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    /// Borrow the raw bytes.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Number of bytes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expose().len()
    }

    /// `true` if no bytes are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// Platform-specific implementations
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod platform {
    pub(super) fn try_mlock(ptr: *const u8, len: usize) -> bool {
        if len == 0 || ptr.is_null() {
            return false;
        }
        // SAFETY: mlock only inspects the address range; an invalid range
        // makes the kernel return an error, which we treat as "not locked".
        unsafe { libc::mlock(ptr.cast(), len) == 0 }
    }

    pub(super) fn try_munlock(ptr: *const u8, len: usize) {
        // SAFETY: see try_mlock. Failure is non-critical.
        unsafe {
            libc::munlock(ptr.cast(), len);
        }
    }
}

#[cfg(not(unix))]
mod platform {
    pub(super) fn try_mlock(_ptr: *const u8, _len: usize) -> bool {
        false
    }

    pub(super) fn try_munlock(_ptr: *const u8, _len: usize) {}
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
