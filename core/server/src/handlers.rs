//! Request handlers.
//!
//! Upload path: stage raw upload -> encrypt staged file -> commit
//! ciphertext -> discard raw -> record metadata. Playback path: resolve
//! id -> decrypt to scratch -> serve bytes -> scratch removed
//! unconditionally. Cipher and catalog work runs on blocking tasks.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;

use vidvault_common::{Error, VideoId, VideoRecord};
use vidvault_storage::CleanupRegistry;

use crate::state::AppState;
use crate::stream::RangeStreamCoordinator;

const ALLOWED_EXTENSIONS: [&str; 4] = [".mp4", ".mov", ".avi", ".mkv"];

/// Error wrapper that maps the common taxonomy onto HTTP statuses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRange(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: VideoId,
    pub file_name: String,
    pub uploaded_by: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// POST /api/videos
///
/// Multipart form: `title` (required), `description` (optional),
/// `video` (required file field with an allow-listed extension).
pub async fn upload_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let uploaded_by = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let mut title: Option<String> = None;
    let mut description = String::new();
    let mut staged: Option<(std::path::PathBuf, String)> = None;

    // The registry owns the raw upload staging file for the whole
    // request; any early return removes it.
    let registry = CleanupRegistry::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("title") => {
                title = Some(field.text().await.map_err(multipart_err)?);
            }
            Some("description") => {
                description = field.text().await.map_err(multipart_err)?;
            }
            Some("video") => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let ext = extension_of(&file_name)?;

                let raw_path = state.store.stage(&registry, "upload-")?;

                let mut sink = tokio::fs::OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .open(&raw_path)
                    .await
                    .map_err(Error::Io)?;
                let mut received: u64 = 0;
                while let Some(chunk) = field.chunk().await.map_err(multipart_err)? {
                    received += chunk.len() as u64;
                    sink.write_all(&chunk).await.map_err(Error::Io)?;
                }
                sink.flush().await.map_err(Error::Io)?;
                tracing::debug!(bytes = received, "staged raw upload");

                staged = Some((raw_path, ext));
            }
            _ => {}
        }
    }

    let title = title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput("title is required".to_string()))?;
    let (raw_path, ext) =
        staged.ok_or_else(|| Error::InvalidInput("video file is required".to_string()))?;

    let id = VideoId::new();
    let file_name = format!("{}{}", id, ext);
    let dest = state.store.ciphertext_path(&file_name);

    let store = Arc::clone(&state.store);
    let key = Arc::clone(&state.key);
    let raw_for_encrypt = raw_path.clone();
    tokio::task::spawn_blocking(move || {
        store.encrypt_file(&raw_for_encrypt, &dest, key.as_bytes())
    })
    .await
    .map_err(|e| Error::Storage(format!("blocking task failed: {}", e)))??;

    let record = VideoRecord {
        id,
        title,
        description,
        file_name: file_name.clone(),
        uploaded_by: uploaded_by.clone(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let catalog = Arc::clone(&state.catalog);
    let record_for_insert = record.clone();
    let inserted = tokio::task::spawn_blocking(move || catalog.record_upload(&record_for_insert))
        .await
        .map_err(|e| Error::Storage(format!("blocking task failed: {}", e)))?;

    if let Err(e) = inserted {
        // The ciphertext has no record pointing at it; remove it so the
        // failed upload leaves nothing behind.
        if let Err(remove_err) = state.store.remove(&file_name) {
            tracing::warn!(%file_name, error = %remove_err, "failed to remove ciphertext after catalog error");
        }
        return Err(e.into());
    }

    tracing::info!(%id, %file_name, %uploaded_by, "video uploaded");
    drop(registry);

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id,
            file_name,
            uploaded_by,
        }),
    ))
}

/// GET /api/videos/{id}/stream
pub async fn stream_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = VideoId::parse(&id)?;
    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let coordinator = RangeStreamCoordinator::new(
        Arc::clone(&state.catalog),
        Arc::clone(&state.store),
        Arc::clone(&state.key),
    );
    let vs = coordinator.serve(&id, range_header.as_deref()).await?;

    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, vs.content_type)
        .header(header::ACCEPT_RANGES, "bytes");

    response = match vs.range {
        Some(range) => response
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_LENGTH, range.len())
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", range.start, range.end, vs.total_size),
            ),
        None => response
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, vs.total_size),
    };

    response
        .body(Body::from_stream(vs.body))
        .map_err(|e| ApiError(Error::Storage(format!("failed to build response: {}", e))))
}

/// GET /api/videos
pub async fn list_videos(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let catalog = Arc::clone(&state.catalog);
    let videos = tokio::task::spawn_blocking(move || catalog.list())
        .await
        .map_err(|e| Error::Storage(format!("blocking task failed: {}", e)))??;

    Ok(Json(json!({ "count": videos.len(), "videos": videos })))
}

/// PUT /api/videos/{id}
pub async fn update_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = VideoId::parse(&id)?;
    if req.title.trim().is_empty() {
        return Err(Error::InvalidInput("title is required".to_string()).into());
    }

    let catalog = Arc::clone(&state.catalog);
    tokio::task::spawn_blocking(move || catalog.update(&id, &req.title, &req.description))
        .await
        .map_err(|e| Error::Storage(format!("blocking task failed: {}", e)))??;

    Ok(Json(json!({ "message": "Video updated successfully" })))
}

/// DELETE /api/videos/{id}
///
/// The ciphertext unlink is best-effort: a failure is reported in the
/// log but never blocks the record deletion.
pub async fn delete_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = VideoId::parse(&id)?;

    let catalog = Arc::clone(&state.catalog);
    let file_name = tokio::task::spawn_blocking(move || catalog.find_file_name(&id))
        .await
        .map_err(|e| Error::Storage(format!("blocking task failed: {}", e)))??;

    if let Err(e) = state.store.remove(&file_name) {
        tracing::warn!(%id, %file_name, error = %e, "failed to remove ciphertext");
    }

    let catalog = Arc::clone(&state.catalog);
    tokio::task::spawn_blocking(move || catalog.delete_record(&id))
        .await
        .map_err(|e| Error::Storage(format!("blocking task failed: {}", e)))??;

    tracing::info!(%id, "video deleted");
    Ok(Json(json!({ "message": "Video deleted successfully" })))
}

fn multipart_err(e: axum::extract::multipart::MultipartError) -> Error {
    Error::InvalidInput(format!("malformed multipart body: {}", e))
}

fn extension_of(file_name: &str) -> Result<String, Error> {
    let ext = FsPath::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(Error::InvalidInput(format!(
            "only video files ({}) are allowed",
            ALLOWED_EXTENSIONS.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_allow_list() {
        assert_eq!(extension_of("clip.mp4").unwrap(), ".mp4");
        assert_eq!(extension_of("CLIP.MOV").unwrap(), ".mov");
        assert!(extension_of("evil.exe").is_err());
        assert!(extension_of("noext").is_err());
    }
}
