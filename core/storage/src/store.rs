//! File-level encrypt/decrypt pipeline over the chunked codec.
//!
//! The store owns two directories: the ciphertext root, where encrypted
//! videos live permanently, and a scratch directory for staged writes
//! and request-scoped plaintext copies.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use vidvault_common::{Error, Result};
use vidvault_crypto::{DecryptingStream, EncryptingStream};

use crate::atomic::{AtomicWriter, CleanupRegistry};

/// Suffix appended to stored ciphertext files.
const CIPHERTEXT_SUFFIX: &str = ".enc";

/// Encrypted file store.
pub struct CipherStore {
    ciphertext_root: PathBuf,
    writer: AtomicWriter,
}

impl CipherStore {
    /// Create a store with the given ciphertext root and scratch
    /// directory. Both must be absolute; both are created if missing.
    pub fn new(ciphertext_root: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Result<Self> {
        let ciphertext_root = ciphertext_root.into();
        if !ciphertext_root.is_absolute() {
            return Err(Error::InvalidPath(format!(
                "ciphertext root must be absolute: {}",
                ciphertext_root.display()
            )));
        }
        std::fs::create_dir_all(&ciphertext_root)?;

        Ok(Self {
            ciphertext_root,
            writer: AtomicWriter::new(scratch_dir)?,
        })
    }

    /// On-disk path of the ciphertext for a stored file name.
    pub fn ciphertext_path(&self, file_name: &str) -> PathBuf {
        self.ciphertext_root
            .join(format!("{}{}", file_name, CIPHERTEXT_SUFFIX))
    }

    /// Stage a scratch file for an inbound raw upload.
    pub fn stage(&self, registry: &CleanupRegistry, prefix: &str) -> Result<PathBuf> {
        self.writer.stage(registry, prefix)
    }

    /// The scratch directory used for staging and playback copies.
    pub fn scratch_dir(&self) -> &Path {
        self.writer.scratch_dir()
    }

    /// Encrypt `input` into `output` atomically.
    ///
    /// The key is validated before the filesystem is touched. On any
    /// failure the staged output is discarded and the destination is
    /// never partially visible.
    ///
    /// # Errors
    /// - `InvalidKey` if the key is not 32 bytes
    /// - `InvalidPath` for relative paths
    /// - `Io` for missing/irregular input or write failures
    pub fn encrypt_file(&self, input: &Path, output: &Path, key: &[u8]) -> Result<()> {
        let stream = EncryptingStream::new(key)?;
        validate_io_paths(input, output)?;

        let registry = CleanupRegistry::new();
        let scratch = self.writer.stage(&registry, "encrypt-")?;

        let reader = BufReader::new(File::open(input)?);
        let mut sink = BufWriter::new(File::create(&scratch)?);
        let written = stream.encrypt_stream(reader, &mut sink)?;
        sink.flush()?;
        sink.get_ref().sync_all()?;

        self.writer.commit(&registry, &scratch, output)?;
        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            bytes = written,
            "encrypted file"
        );
        Ok(())
    }

    /// Decrypt `input` into `output` atomically.
    ///
    /// Every block is authenticated before its plaintext leaves the
    /// staged file; an authentication failure discards the staged
    /// output entirely.
    ///
    /// # Errors
    /// - `InvalidKey`, `InvalidPath`, `Io` as for [`encrypt_file`](Self::encrypt_file)
    /// - `Authentication` on tampered or truncated ciphertext
    pub fn decrypt_file(&self, input: &Path, output: &Path, key: &[u8]) -> Result<()> {
        let stream = DecryptingStream::new(key)?;
        validate_io_paths(input, output)?;

        let registry = CleanupRegistry::new();
        let scratch = self.writer.stage(&registry, "decrypt-")?;

        let reader = BufReader::new(File::open(input)?);
        let mut sink = BufWriter::new(File::create(&scratch)?);
        let written = stream.decrypt_stream(reader, &mut sink)?;
        sink.flush()?;
        sink.get_ref().sync_all()?;

        self.writer.commit(&registry, &scratch, output)?;
        tracing::debug!(
            input = %input.display(),
            output = %output.display(),
            bytes = written,
            "decrypted file"
        );
        Ok(())
    }

    /// Decrypt a stored ciphertext into a request-scoped scratch file.
    ///
    /// Ownership of the plaintext copy transfers to the returned
    /// [`ScratchFile`], which unlinks it on drop.
    ///
    /// # Errors
    /// - `NotFound` if no ciphertext exists for `file_name`
    /// - `Authentication` / `Io` from decryption
    pub fn decrypt_to_scratch(&self, file_name: &str, key: &[u8]) -> Result<ScratchFile> {
        let source = self.ciphertext_path(file_name);
        if !source.is_file() {
            return Err(Error::NotFound(format!(
                "encrypted file missing from storage: {}",
                file_name
            )));
        }

        let registry = CleanupRegistry::new();
        let dest = self.writer.stage(&registry, "stream-")?;
        self.decrypt_file(&source, &dest, key)?;

        // The plaintext copy outlives this call; its cleanup belongs to
        // the returned guard.
        registry.keep(&dest);
        Ok(ScratchFile::new(dest))
    }

    /// Whether a ciphertext exists for `file_name`.
    pub fn contains(&self, file_name: &str) -> bool {
        self.ciphertext_path(file_name).is_file()
    }

    /// Remove the stored ciphertext for `file_name`.
    ///
    /// # Errors
    /// - `NotFound` if there is nothing to remove
    /// - `Io` on unlink failure
    pub fn remove(&self, file_name: &str) -> Result<()> {
        let path = self.ciphertext_path(file_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "encrypted file missing from storage: {}",
                file_name
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_io_paths(input: &Path, output: &Path) -> Result<()> {
    for path in [input, output] {
        if !path.is_absolute() {
            return Err(Error::InvalidPath(format!(
                "path must be absolute: {}",
                path.display()
            )));
        }
    }

    let meta = std::fs::metadata(input)?;
    if !meta.is_file() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a regular file: {}", input.display()),
        )));
    }
    Ok(())
}

/// A transient plaintext artifact owned by one playback request.
///
/// The file is unlinked when the guard drops, on every exit path.
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch file");
            }
        }
    }
}
