//! Video metadata catalog.
//!
//! The serving core only needs a handful of operations from the
//! metadata store; [`VideoCatalog`] is that boundary. [`SqliteCatalog`]
//! is the shipped implementation.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use vidvault_common::{Error, Result, VideoId, VideoRecord};

/// Boundary contract between the serving core and the metadata store.
pub trait VideoCatalog: Send + Sync {
    /// Resolve a video id to its stored file name.
    ///
    /// # Errors
    /// - `NotFound` for unknown ids
    fn find_file_name(&self, id: &VideoId) -> Result<String>;

    /// Record a completed upload.
    fn record_upload(&self, record: &VideoRecord) -> Result<()>;

    /// Delete a video record.
    ///
    /// # Errors
    /// - `NotFound` if no record exists
    fn delete_record(&self, id: &VideoId) -> Result<()>;

    /// List all records, newest first.
    fn list(&self) -> Result<Vec<VideoRecord>>;

    /// Update title and description.
    ///
    /// # Errors
    /// - `NotFound` if no record exists
    fn update(&self, id: &VideoId, title: &str, description: &str) -> Result<()>;
}

/// Sqlite-backed catalog.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open (and if necessary create) the catalog at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// In-memory catalog for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS videos (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                file_name   TEXT NOT NULL,
                uploaded_by TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )",
        )
        .map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VideoCatalog for SqliteCatalog {
    fn find_file_name(&self, id: &VideoId) -> Result<String> {
        let conn = self.conn();
        conn.query_row(
            "SELECT file_name FROM videos WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                Error::NotFound(format!("video not found: {}", id))
            }
            other => db_err(other),
        })
    }

    fn record_upload(&self, record: &VideoRecord) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO videos (id, title, description, file_name, uploaded_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.to_string(),
                record.title,
                record.description,
                record.file_name,
                record.uploaded_by,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn delete_record(&self, id: &VideoId) -> Result<()> {
        let conn = self.conn();
        let affected = conn
            .execute(
                "DELETE FROM videos WHERE id = ?1",
                params![id.to_string()],
            )
            .map_err(db_err)?;
        if affected == 0 {
            return Err(Error::NotFound(format!("video not found: {}", id)));
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<VideoRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, title, description, file_name, uploaded_by, created_at, updated_at
                 FROM videos ORDER BY created_at DESC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, title, description, file_name, uploaded_by, created_at, updated_at) =
                row.map_err(db_err)?;
            records.push(VideoRecord {
                id: VideoId::parse(&id)?,
                title,
                description,
                file_name,
                uploaded_by,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
            });
        }
        Ok(records)
    }

    fn update(&self, id: &VideoId, title: &str, description: &str) -> Result<()> {
        let conn = self.conn();
        let affected = conn
            .execute(
                "UPDATE videos SET title = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
                params![title, description, Utc::now().to_rfc3339(), id.to_string()],
            )
            .map_err(db_err)?;
        if affected == 0 {
            return Err(Error::NotFound(format!("video not found: {}", id)));
        }
        Ok(())
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("invalid timestamp in catalog: {}", e)))
}
