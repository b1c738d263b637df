//! Versioned schema steps for the registry database.
//!
//! Applied versions are recorded in `schema_history`. Each step runs in its
//! own transaction together with its history row.

use chrono::Utc;
use rusqlite::{params, Connection};

use super::error::DatabaseError;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    name: "registry_snapshots",
    sql: include_str!("sql/001_create_registry_snapshots.sql"),
}];

/// Highest schema version this build knows.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |s| s.version)
}

/// Schema version currently recorded in the database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    ensure_history(conn)?;
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_history",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/// Brings the schema up to [`latest_version`].
///
/// Refuses to touch a database written by a newer build.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    let current = current_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(DatabaseError::SchemaTooNew {
            found: current,
            supported: latest,
        });
    }

    for step in STEPS.iter().filter(|s| s.version > current) {
        log::info!("Applying schema step {} ({})", step.version, step.name);
        let failed = |e: rusqlite::Error| DatabaseError::Migration {
            version: step.version,
            name: step.name,
            reason: e.to_string(),
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(step.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO schema_history (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![step.version, step.name, Utc::now().to_rfc3339()],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;
    }
    Ok(())
}

fn ensure_history(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_history (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        conn
    }

    #[test]
    fn test_fresh_database_reaches_latest() {
        let conn = fresh();
        assert_eq!(current_version(&conn).unwrap(), latest_version());

        // Running again applies nothing new.
        run_all(&conn).unwrap();
        let rows: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_history", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows as usize, STEPS.len());
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let conn = fresh();
        conn.execute(
            "INSERT INTO schema_history (version, name, applied_at) VALUES (99, 'future', 'x')",
            [],
        )
        .unwrap();

        let err = run_all(&conn).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::SchemaTooNew { found: 99, .. }
        ));
    }

    #[test]
    fn test_only_two_snapshot_slots() {
        let conn = fresh();
        let insert = |slot: &str| {
            conn.execute(
                "INSERT INTO registry_snapshots (slot, payload, saved_at) VALUES (?1, '{}', 'x')",
                params![slot],
            )
        };
        assert!(insert("primary").is_ok());
        assert!(insert("backup").is_ok());
        assert!(insert("third").is_err());
    }
}
