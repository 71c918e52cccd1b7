pub mod catalog;
pub mod lock;
pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use atlas_types::error::CatalogError;
use rusqlite::Connection;
use tracing::info;

const READER_POOL_SIZE: usize = 4;

/// SQLite storage with a reader/writer split: one writer connection plus a
/// small pool of read-only connections so catalog reads do not queue behind
/// mutations.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&Connection) -> Result<T, CatalogError>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| CatalogError::Fatal(format!("reader lock poisoned: {e}")))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&Connection) -> Result<T, CatalogError>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|e| CatalogError::Fatal(format!("writer lock poisoned: {e}")))?;
        f(&conn)
    }
}

/// Map a rusqlite error into the shared taxonomy. Uniqueness violations
/// become `Conflict`; everything else is a retryable storage hiccup.
pub(crate) fn db_err(e: rusqlite::Error) -> CatalogError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            CatalogError::conflict(e.to_string())
        }
        _ => CatalogError::Transient(e.to_string()),
    }
}
