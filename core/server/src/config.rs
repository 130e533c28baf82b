//! Server configuration, loaded once at startup and immutable after.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use vidvault_common::{Error, Result};
use vidvault_crypto::StreamKey;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_ENCRYPTED_DIR: &str = "encrypted";
const DEFAULT_SCRATCH_DIR: &str = "staging";
const DEFAULT_DB: &str = "vidvault.db";
const DEFAULT_MAX_UPLOAD_MB: usize = 512;

/// Process configuration.
#[derive(Debug)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_addr: SocketAddr,
    /// Content encryption key.
    pub key: StreamKey,
    /// Directory holding encrypted videos.
    pub ciphertext_root: PathBuf,
    /// Directory for staged writes and playback scratch copies.
    pub scratch_root: PathBuf,
    /// Path to the sqlite catalog.
    pub db_path: PathBuf,
    /// Upload body size cap in bytes.
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from the environment.
    ///
    /// `VIDVAULT_KEY` must hold a base64-encoded 32-byte key. Relative
    /// directory paths are resolved against the current working
    /// directory so the rest of the system only ever sees absolute
    /// paths.
    ///
    /// # Errors
    /// - `InvalidKey` if the key is missing, not base64, or not 32 bytes
    /// - `InvalidInput` for an unparseable bind address
    pub fn from_env() -> Result<Self> {
        let key = load_key()?;

        let bind_addr: SocketAddr = env::var("VIDVAULT_ADDR")
            .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
            .parse()
            .map_err(|e| Error::InvalidInput(format!("invalid VIDVAULT_ADDR: {}", e)))?;

        let max_upload_mb = match env::var("VIDVAULT_MAX_UPLOAD_MB") {
            Ok(v) => v
                .parse::<usize>()
                .map_err(|e| Error::InvalidInput(format!("invalid VIDVAULT_MAX_UPLOAD_MB: {}", e)))?,
            Err(_) => DEFAULT_MAX_UPLOAD_MB,
        };

        Ok(Self {
            bind_addr,
            key,
            ciphertext_root: absolutize(env_or("VIDVAULT_ENCRYPTED_DIR", DEFAULT_ENCRYPTED_DIR))?,
            scratch_root: absolutize(env_or("VIDVAULT_SCRATCH_DIR", DEFAULT_SCRATCH_DIR))?,
            db_path: absolutize(env_or("VIDVAULT_DB", DEFAULT_DB))?,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }
}

fn env_or(name: &str, default: &str) -> PathBuf {
    PathBuf::from(env::var(name).unwrap_or_else(|_| default.to_string()))
}

fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

fn load_key() -> Result<StreamKey> {
    let encoded = env::var("VIDVAULT_KEY")
        .map_err(|_| Error::InvalidKey("VIDVAULT_KEY is not set".to_string()))?;
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| Error::InvalidKey(format!("VIDVAULT_KEY is not valid base64: {}", e)))?;
    let key = StreamKey::from_slice(&bytes)?;
    tracing::info!(key_bytes = bytes.len(), "loaded content encryption key");
    Ok(key)
}
