//! Encrypted file storage for VidVault.
//!
//! This module provides:
//! - Atomic stage-then-rename file writes with scoped cleanup
//! - The file-level encrypt/decrypt pipeline over the chunked codec
//! - Request-scoped scratch files with guaranteed removal
//!
//! # Design Principles
//! - A destination path either does not exist or is fully written;
//!   readers never observe a partial file
//! - Every temporary path is tracked by a per-operation registry and
//!   removed on every exit path unless explicitly committed
//! - Unauthenticated plaintext is never flushed to a visible path

pub mod atomic;
pub mod store;

pub use atomic::{AtomicWriter, CleanupRegistry};
pub use store::{CipherStore, ScratchFile};
