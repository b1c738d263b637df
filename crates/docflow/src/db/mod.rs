//! SQLite storage for registry snapshots.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

pub mod error;
pub mod migrations;
pub mod snapshot_repo;

pub use error::DatabaseError;
pub use snapshot_repo::SqliteSnapshotStore;

const FILE_NAME: &str = "docflow.db";

/// Shared handle to one SQLite connection. Clones share the connection;
/// callers are serialized by its mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl Database {
    /// Opens or creates the database file and applies pending schema steps.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Directory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        // Snapshots are the only copy of the registry; trade write speed for
        // durability.
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal mode: {}", mode);
        conn.pragma_update(None, "synchronous", "FULL")?;

        let db = Self::init(conn, path.display().to_string())?;
        log::info!("Registry database ready at {}", db.location);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::init(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> Result<Self, DatabaseError> {
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    /// Runs `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        f(&self.lock())
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    // A panic mid-statement leaves SQLite itself consistent; the guard is
    // safe to reuse.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Database connection lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// `<data>/database/docflow.db`
pub fn database_path(data_directory: &Path) -> PathBuf {
    data_directory.join("database").join(FILE_NAME)
}
