//! Shared application state.

use std::sync::Arc;

use vidvault_crypto::StreamKey;
use vidvault_storage::CipherStore;

use crate::catalog::VideoCatalog;

/// State shared by all request handlers.
///
/// Everything here is read-only after startup; per-request mutable
/// state (registries, scratch files, cipher buffers) is allocated by
/// the operation that needs it.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn VideoCatalog>,
    pub store: Arc<CipherStore>,
    pub key: Arc<StreamKey>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn VideoCatalog>,
        store: Arc<CipherStore>,
        key: StreamKey,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            catalog,
            store,
            key: Arc::new(key),
            max_upload_bytes,
        }
    }
}
