//! Cryptographic primitives for VidVault.
//!
//! This module provides:
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Chunked streaming encryption for files too large to hold in memory
//! - Secure key management with automatic zeroization
//!
//! # Security Guarantees
//! - Every (key, nonce) pair is used for exactly one block: a random
//!   file-level nonce is combined with a per-block counter
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Decryption fails closed on any authentication failure

pub mod keys;
pub mod stream;

pub use keys::{StreamKey, KEY_LENGTH};
pub use stream::{DecryptingStream, EncryptingStream, BLOCK_SIZE, NONCE_SIZE, TAG_SIZE};
