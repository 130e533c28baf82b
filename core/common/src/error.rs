//! Common error types for VidVault.

use thiserror::Error;

/// Top-level error type for VidVault operations.
///
/// Every component returns a typed failure from this taxonomy; no cipher
/// or filesystem error is silently swallowed. The HTTP layer maps
/// variants onto status codes (`NotFound` vs `Io` is the 404/500 split).
#[derive(Debug, Error)]
pub enum Error {
    /// Encryption key is not exactly 32 bytes.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Path is not absolute or otherwise unsafe to touch.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ciphertext failed authentication during decryption
    /// (tamper, corruption, or truncation).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed or unsatisfiable Range header.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Unknown identifier or missing backing file.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input provided by a client.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Metadata catalog operation failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
