//! HTTP serving layer for VidVault.
//!
//! This module provides:
//! - Environment-driven server configuration
//! - The sqlite-backed video metadata catalog
//! - HTTP Range header parsing
//! - The range-addressable decrypt-and-stream path
//! - Upload, list, update, delete and stream request handlers
//!
//! # Architecture
//! Handlers run one logical task per request. Cipher and catalog work
//! happens on blocking tasks; the decrypted plaintext lives in a
//! request-scoped scratch file whose lifetime is tied to the response
//! body, so client disconnects and errors clean up identically.

pub mod catalog;
pub mod config;
pub mod handlers;
pub mod range;
pub mod state;
pub mod stream;

pub use catalog::{SqliteCatalog, VideoCatalog};
pub use config::ServerConfig;
pub use range::ByteRange;
pub use state::AppState;
pub use stream::RangeStreamCoordinator;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route(
            "/api/videos",
            post(handlers::upload_video).get(handlers::list_videos),
        )
        .route(
            "/api/videos/{id}",
            put(handlers::update_video).delete(handlers::delete_video),
        )
        .route("/api/videos/{id}/stream", get(handlers::stream_video))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
