//! Snapshot repository for the `registry_snapshots` table.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};
use crate::error::PersistenceError;
use crate::registry::SnapshotStore;

const PRIMARY: &str = "primary";
const BACKUP: &str = "backup";

/// Reads the payload stored in a slot.
pub fn read_slot(db: &Database, slot: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let payload = conn
            .query_row(
                "SELECT payload FROM registry_snapshots WHERE slot = ?1",
                params![slot],
                |r| r.get(0),
            )
            .optional()?;
        Ok(payload)
    })
}

/// Moves the current primary into the backup slot and stores a new primary,
/// in one transaction.
pub fn rotate_and_write(db: &Database, payload: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let has_primary: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM registry_snapshots WHERE slot = ?1)",
            params![PRIMARY],
            |r| r.get(0),
        )?;
        if has_primary {
            tx.execute(
                "DELETE FROM registry_snapshots WHERE slot = ?1",
                params![BACKUP],
            )?;
            tx.execute(
                "UPDATE registry_snapshots SET slot = ?1 WHERE slot = ?2",
                params![BACKUP, PRIMARY],
            )?;
        }
        tx.execute(
            "INSERT INTO registry_snapshots (slot, payload, saved_at) VALUES (?1, ?2, ?3)",
            params![PRIMARY, payload, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    })
}

/// Registry snapshots kept in SQLite, primary plus one backup slot.
pub struct SqliteSnapshotStore {
    db: Database,
}

impl SqliteSnapshotStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn read_primary(&self) -> Result<Option<String>, PersistenceError> {
        Ok(read_slot(&self.db, PRIMARY)?)
    }

    fn read_backup(&self) -> Result<Option<String>, PersistenceError> {
        Ok(read_slot(&self.db, BACKUP)?)
    }

    fn write(&self, payload: &str) -> Result<(), PersistenceError> {
        Ok(rotate_and_write(&self.db, payload)?)
    }

    fn location(&self) -> String {
        self.db.location().to_string()
    }

    fn has_backup(&self) -> bool {
        match read_slot(&self.db, BACKUP) {
            Ok(backup) => backup.is_some(),
            Err(e) => {
                log::warn!("Failed to check registry backup: {}", e);
                false
            }
        }
    }
}
