//! Atomic file writes via stage-to-temp-then-rename.
//!
//! Writers stage content into uniquely named scratch files and rename
//! them into place, so a destination path either does not exist or is
//! fully written. Every scratch path is tracked by a per-operation
//! [`CleanupRegistry`] whose drop removes everything that was not
//! explicitly committed.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use vidvault_common::{Error, Result};

/// Tracks scratch paths created by one in-flight operation.
///
/// The registry is private to a single operation; the internal lock
/// protects its list, not any cross-request state. Dropping the
/// registry removes every path that was not [`kept`](Self::keep) — the
/// single mechanism preventing orphaned temporary files from partial or
/// failed operations.
pub struct CleanupRegistry {
    paths: Mutex<Vec<PathBuf>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self {
            paths: Mutex::new(Vec::new()),
        }
    }

    /// Track a scratch path for removal.
    pub fn register(&self, path: PathBuf) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path);
    }

    /// Stop tracking a path that was successfully committed.
    pub fn keep(&self, path: &Path) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|p| p != path);
    }

    fn remove_all(paths: &mut Vec<PathBuf>) {
        for path in paths.drain(..) {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch file");
                }
            }
        }
    }
}

impl Default for CleanupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CleanupRegistry {
    fn drop(&mut self) {
        let paths = match self.paths.get_mut() {
            Ok(paths) => paths,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::remove_all(paths);
    }
}

/// Stages uniquely named scratch files and commits them with an atomic
/// rename.
pub struct AtomicWriter {
    scratch_dir: PathBuf,
}

impl AtomicWriter {
    /// Create a writer rooted at `scratch_dir`.
    ///
    /// The directory is created if missing. Paths must be absolute
    /// because the working directory can differ between interactive and
    /// service invocations.
    ///
    /// # Errors
    /// - `InvalidPath` if the directory path is relative
    /// - `Io` if the directory cannot be created
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Result<Self> {
        let scratch_dir = scratch_dir.into();
        require_absolute(&scratch_dir)?;
        ensure_dir(&scratch_dir)?;
        Ok(Self { scratch_dir })
    }

    /// The directory scratch files are staged in.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Create a uniquely named scratch file and register it for cleanup.
    ///
    /// # Postconditions
    /// - The file exists, empty, readable and writable by the owning
    ///   process
    ///
    /// # Errors
    /// - `Io` if the file cannot be created
    pub fn stage(&self, registry: &CleanupRegistry, prefix: &str) -> Result<PathBuf> {
        let path = self.scratch_dir.join(format!("{}{}", prefix, Uuid::new_v4()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        drop(file);
        set_file_permissions(&path)?;

        registry.register(path.clone());
        Ok(path)
    }

    /// Atomically rename `scratch` to `dest` and mark the scratch path
    /// as kept.
    ///
    /// The rename is atomic with respect to the filesystem on the same
    /// volume: a concurrent reader sees either the old state or the
    /// fully written new state. A cross-device rename fails with `Io`,
    /// in which case the destination must be treated as not written.
    ///
    /// # Errors
    /// - `InvalidPath` for relative paths
    /// - `Io` if the destination parent cannot be created or the rename
    ///   fails
    pub fn commit(&self, registry: &CleanupRegistry, scratch: &Path, dest: &Path) -> Result<()> {
        require_absolute(scratch)?;
        require_absolute(dest)?;

        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }

        fs::rename(scratch, dest)?;
        registry.keep(scratch);
        tracing::debug!(dest = %dest.display(), "committed atomic write");
        Ok(())
    }

    /// Remove a scratch file. Absence is not an error.
    ///
    /// # Errors
    /// - `InvalidPath` for relative paths
    /// - `Io` for removal failures other than the file being gone
    pub fn abort(&self, scratch: &Path) -> Result<()> {
        require_absolute(scratch)?;
        match fs::remove_file(scratch) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn require_absolute(path: &Path) -> Result<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(Error::InvalidPath(format!(
            "path must be absolute: {}",
            path.display()
        )))
    }
}

/// Create a directory and make sure the owning process can traverse and
/// write it, even on filesystems whose default mode lacks those bits.
fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

fn set_file_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_creates_unique_files() {
        let temp = TempDir::new().unwrap();
        let writer = AtomicWriter::new(temp.path()).unwrap();
        let registry = CleanupRegistry::new();

        let a = writer.stage(&registry, "test-").unwrap();
        let b = writer.stage(&registry, "test-").unwrap();

        assert_ne!(a, b);
        assert!(a.exists());
        assert!(b.exists());
    }

    #[test]
    fn test_commit_renames_and_keeps() {
        let temp = TempDir::new().unwrap();
        let writer = AtomicWriter::new(temp.path()).unwrap();
        let registry = CleanupRegistry::new();

        let scratch = writer.stage(&registry, "commit-").unwrap();
        fs::write(&scratch, b"payload").unwrap();

        let dest = temp.path().join("final.bin");
        writer.commit(&registry, &scratch, &dest).unwrap();
        drop(registry);

        assert!(!scratch.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_registry_drop_removes_uncommitted() {
        let temp = TempDir::new().unwrap();
        let writer = AtomicWriter::new(temp.path()).unwrap();

        let scratch = {
            let registry = CleanupRegistry::new();
            writer.stage(&registry, "orphan-").unwrap()
        };

        assert!(!scratch.exists());
    }

    #[test]
    fn test_abort_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let writer = AtomicWriter::new(temp.path()).unwrap();
        let registry = CleanupRegistry::new();

        let scratch = writer.stage(&registry, "abort-").unwrap();
        writer.abort(&scratch).unwrap();
        // Second abort on a missing file succeeds.
        writer.abort(&scratch).unwrap();
    }

    #[test]
    fn test_relative_paths_rejected() {
        let temp = TempDir::new().unwrap();
        let writer = AtomicWriter::new(temp.path()).unwrap();
        let registry = CleanupRegistry::new();

        assert!(matches!(
            AtomicWriter::new("relative/dir"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            writer.commit(&registry, Path::new("rel.tmp"), &temp.path().join("x")),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            writer.abort(Path::new("rel.tmp")),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_commit_creates_destination_parent() {
        let temp = TempDir::new().unwrap();
        let writer = AtomicWriter::new(temp.path()).unwrap();
        let registry = CleanupRegistry::new();

        let scratch = writer.stage(&registry, "nest-").unwrap();
        fs::write(&scratch, b"x").unwrap();

        let dest = temp.path().join("a/b/final.bin");
        writer.commit(&registry, &scratch, &dest).unwrap();
        assert!(dest.exists());
    }
}
