//! The range-addressable decrypt-and-stream path.
//!
//! Per playback request the coordinator walks
//! `Located -> Staged/Decrypted -> Serving -> Cleaned`, with every error
//! path performing cleanup before the error is reported: the decrypted
//! scratch copy is owned by the response body, so normal completion,
//! client disconnect mid-stream, and failures all unlink it the same
//! way.

use std::io::SeekFrom;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

use vidvault_common::{Error, Result, VideoId};
use vidvault_crypto::StreamKey;
use vidvault_storage::{CipherStore, ScratchFile};

use crate::catalog::VideoCatalog;
use crate::range::ByteRange;

/// Coordinates locating, decrypting and serving one video.
pub struct RangeStreamCoordinator {
    catalog: Arc<dyn VideoCatalog>,
    store: Arc<CipherStore>,
    key: Arc<StreamKey>,
}

/// A ready-to-serve plaintext byte stream.
pub struct VideoStream {
    /// Total size of the decrypted body.
    pub total_size: u64,
    /// The sub-range being served, if the request carried one.
    pub range: Option<ByteRange>,
    /// Content type derived from the stored file name.
    pub content_type: &'static str,
    /// The body; dropping it removes the scratch copy.
    pub body: ScratchBody,
}

impl RangeStreamCoordinator {
    pub fn new(
        catalog: Arc<dyn VideoCatalog>,
        store: Arc<CipherStore>,
        key: Arc<StreamKey>,
    ) -> Self {
        Self {
            catalog,
            store,
            key,
        }
    }

    /// Serve a video, optionally restricted to a single byte range.
    ///
    /// # Errors
    /// - `NotFound` for an unknown id or missing ciphertext
    /// - `Authentication` / `InvalidKey` from decryption
    /// - `InvalidRange` for an unsatisfiable Range header
    pub async fn serve(&self, id: &VideoId, range_header: Option<&str>) -> Result<VideoStream> {
        // Located
        let catalog = Arc::clone(&self.catalog);
        let id_for_lookup = *id;
        let file_name = tokio::task::spawn_blocking(move || catalog.find_file_name(&id_for_lookup))
            .await
            .map_err(join_err)??;

        // Staged / Decrypted
        let store = Arc::clone(&self.store);
        let key = Arc::clone(&self.key);
        let lookup_name = file_name.clone();
        let scratch = tokio::task::spawn_blocking(move || {
            store.decrypt_to_scratch(&lookup_name, key.as_bytes())
        })
        .await
        .map_err(join_err)??;

        // Serving: parse the range against the decrypted size, then
        // seek and bound the copy. Failures from here on drop `scratch`,
        // which removes the plaintext copy before the error surfaces.
        let total_size = tokio::fs::metadata(scratch.path()).await?.len();
        let range = match range_header {
            Some(header) => Some(ByteRange::parse(header, total_size)?),
            None => None,
        };

        let (start, len) = match range {
            Some(r) => (r.start, r.len()),
            None => (0, total_size),
        };

        let mut file = tokio::fs::File::open(scratch.path()).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let body = ScratchBody::new(file.take(len), scratch);

        tracing::debug!(%id, total_size, ?range, "serving decrypted stream");

        Ok(VideoStream {
            total_size,
            range,
            content_type: content_type_for(&file_name),
            body,
        })
    }
}

fn join_err(e: tokio::task::JoinError) -> Error {
    Error::Storage(format!("blocking task failed: {}", e))
}

/// Content type by file extension; uploads are restricted to these.
pub fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next() {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

/// Response body that owns the scratch copy it reads from.
///
/// The scratch file is unlinked when the body is dropped — whether the
/// stream completed, errored, or the client disconnected mid-transfer.
pub struct ScratchBody {
    inner: ReaderStream<Take<tokio::fs::File>>,
    _scratch: ScratchFile,
}

impl ScratchBody {
    fn new(reader: Take<tokio::fs::File>, scratch: ScratchFile) -> Self {
        Self {
            inner: ReaderStream::new(reader),
            _scratch: scratch,
        }
    }
}

impl Stream for ScratchBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
