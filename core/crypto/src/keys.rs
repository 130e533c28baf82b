//! Key types with secure memory handling.
//!
//! Key material automatically zeroizes its memory on drop to prevent
//! sensitive data from persisting in memory.

use chacha20poly1305::{
    aead::{KeyInit, OsRng},
    XChaCha20Poly1305,
};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use vidvault_common::{Error, Result};

/// Length of the content encryption key in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Process-wide content encryption key.
///
/// Loaded once at startup, shared read-only across all concurrent
/// operations, and passed by reference to codec calls.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StreamKey {
    key: [u8; KEY_LENGTH],
}

impl StreamKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a key from a byte slice.
    ///
    /// # Errors
    /// - Returns `InvalidKey` if the slice is not exactly KEY_LENGTH bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LENGTH {
            return Err(Error::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let key = XChaCha20Poly1305::generate_key(&mut OsRng);
        Self { key: key.into() }
    }
}

impl fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_valid() {
        let key = StreamKey::from_slice(&[7u8; KEY_LENGTH]).unwrap();
        assert_eq!(key.as_bytes(), &[7u8; KEY_LENGTH]);
    }

    #[test]
    fn test_from_slice_wrong_length() {
        assert!(matches!(
            StreamKey::from_slice(&[0u8; 16]),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            StreamKey::from_slice(&[0u8; 33]),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_generate_is_random() {
        let key1 = StreamKey::generate();
        let key2 = StreamKey::generate();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = StreamKey::from_bytes([9u8; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "StreamKey([REDACTED])");
    }
}
