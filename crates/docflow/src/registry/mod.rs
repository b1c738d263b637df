//! Persisted document registry.
//!
//! The registry is the durable source of truth for document lifecycle state.
//! Every mutation writes the full state through its [`SnapshotStore`] while
//! holding the write lock, so mutations are serialized and a failed write
//! leaves the in-memory state unchanged.

mod record;
mod snapshot;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::Serialize;

pub use record::{DocumentPaths, DocumentRecord, DocumentStatus, OutputLayout};
pub(crate) use record::safe_file_name;
pub use snapshot::{FileSnapshotStore, SnapshotStore, SNAPSHOT_VERSION};

use crate::error::{DocflowError, PersistenceError, Result, StorageError};
use crate::extract::ExtractedInfo;

type Records = BTreeMap<String, DocumentRecord>;

/// Where the registry state came from when it was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// No snapshot existed yet.
    Fresh,
    Primary,
    /// The primary was unreadable and the backup was used.
    Backup,
    /// Both snapshots were unreadable; the registry started empty.
    Empty,
}

/// Result of [`DocumentRegistry::claim_for_parsing`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParseClaim {
    /// The document moved to `parsing`; the caller owns the job.
    Claimed(DocumentRecord),
    AlreadyParsing,
    AlreadyParsed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub counts_by_status: BTreeMap<DocumentStatus, usize>,
    pub store_location: String,
    pub backup_available: bool,
}

pub struct DocumentRegistry {
    records: RwLock<Records>,
    store: Box<dyn SnapshotStore>,
    layout: OutputLayout,
    load_source: LoadSource,
}

impl DocumentRegistry {
    /// Loads the registry from `store`, falling back to the backup and then
    /// to an empty registry. Never fails on unreadable snapshots.
    pub fn open(store: Box<dyn SnapshotStore>, layout: OutputLayout) -> Self {
        let (records, load_source) = load(store.as_ref(), &layout);
        log::info!(
            "Document registry loaded {} record(s) from {} ({:?})",
            records.len(),
            store.location(),
            load_source
        );
        Self {
            records: RwLock::new(records),
            store,
            layout,
            load_source,
        }
    }

    pub fn load_source(&self) -> LoadSource {
        self.load_source
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Creates a record in `uploaded` state and its output folder.
    pub fn create(&self, original_name: &str, source_path: &Path) -> Result<DocumentRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let paths = self.layout.paths_for(&id, original_name);

        std::fs::create_dir_all(&paths.output_folder).map_err(|e| {
            StorageError::CreateDirectory {
                path: paths.output_folder.clone(),
                source: e,
            }
        })?;

        let now = Utc::now();
        let record = DocumentRecord {
            id: id.clone(),
            original_name: original_name.to_string(),
            status: DocumentStatus::Uploaded,
            source_path: source_path.to_path_buf(),
            paths,
            extracted_info: None,
            error_message: None,
            upload_time: now,
            last_modified: now,
        };

        let created = record.clone();
        if let Err(e) = self.mutate(move |records| {
            records.insert(id, record);
            Ok(())
        }) {
            if let Err(cleanup) = std::fs::remove_dir_all(&created.paths.output_folder) {
                log::warn!(
                    "Failed to remove output folder of unregistered document {}: {}",
                    created.id,
                    cleanup
                );
            }
            return Err(e);
        }

        log::info!(
            "Registered document {} ({})",
            created.id,
            crate::sanitize::redact_name(original_name)
        );
        Ok(created)
    }

    pub fn get(&self, id: &str) -> Option<DocumentRecord> {
        self.read().get(id).cloned()
    }

    /// Like [`get`](Self::get), but unknown IDs are an error.
    pub fn require(&self, id: &str) -> Result<DocumentRecord> {
        self.get(id).ok_or_else(|| DocflowError::not_found(id))
    }

    /// Lists records ordered by upload time, optionally filtered by status.
    pub fn list(&self, filter: Option<DocumentStatus>) -> Vec<DocumentRecord> {
        let mut records: Vec<DocumentRecord> = self
            .read()
            .values()
            .filter(|r| filter.map_or(true, |status| r.status == status))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.upload_time.cmp(&b.upload_time).then(a.id.cmp(&b.id)));
        records
    }

    /// Sets the status of a document. `error_message` only applies when the
    /// new status is `error`; any other status clears it.
    pub fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<DocumentRecord> {
        let updated = self.mutate(|records| {
            let record = records
                .get_mut(id)
                .ok_or_else(|| DocflowError::not_found(id))?;
            record.apply_status(status, error_message);
            Ok(record.clone())
        })?;
        log::debug!("Document {} is now {}", id, status);
        Ok(updated)
    }

    /// Atomically moves a document into `parsing` unless it is already
    /// parsing or parsed.
    pub fn claim_for_parsing(&self, id: &str) -> Result<ParseClaim> {
        self.mutate(|records| {
            let record = records
                .get_mut(id)
                .ok_or_else(|| DocflowError::not_found(id))?;
            match record.status {
                DocumentStatus::Parsing => Ok(ParseClaim::AlreadyParsing),
                DocumentStatus::Parsed => Ok(ParseClaim::AlreadyParsed),
                DocumentStatus::Uploaded | DocumentStatus::Error => {
                    record.apply_status(DocumentStatus::Parsing, None);
                    Ok(ParseClaim::Claimed(record.clone()))
                }
            }
        })
    }

    pub fn update_extracted_info(&self, id: &str, info: ExtractedInfo) -> Result<()> {
        self.mutate(|records| {
            let record = records
                .get_mut(id)
                .ok_or_else(|| DocflowError::not_found(id))?;
            record.extracted_info = Some(info);
            record.last_modified = Utc::now();
            Ok(())
        })
    }

    /// Removes the record only. Artifact cleanup is the caller's job and
    /// should happen first.
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.mutate(|records| Ok(records.remove(id).is_some()))
    }

    /// Moves every `parsing` record to `error`. Used at startup, when no job
    /// from a previous process can still be running.
    pub fn fail_interrupted(&self, message: &str) -> Result<Vec<String>> {
        let any_parsing = self
            .read()
            .values()
            .any(|r| r.status == DocumentStatus::Parsing);
        if !any_parsing {
            return Ok(Vec::new());
        }

        let interrupted = self.mutate(|records| {
            let mut ids = Vec::new();
            for record in records.values_mut() {
                if record.status == DocumentStatus::Parsing {
                    record.apply_status(DocumentStatus::Error, Some(message));
                    ids.push(record.id.clone());
                }
            }
            Ok(ids)
        })?;
        if !interrupted.is_empty() {
            log::warn!(
                "Marked {} interrupted document(s) as failed",
                interrupted.len()
            );
        }
        Ok(interrupted)
    }

    pub fn stats(&self) -> RegistryStats {
        let records = self.read();
        let mut counts_by_status: BTreeMap<DocumentStatus, usize> =
            DocumentStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for record in records.values() {
            *counts_by_status.entry(record.status).or_default() += 1;
        }
        RegistryStats {
            total: records.len(),
            counts_by_status,
            store_location: self.store.location(),
            backup_available: self.store.has_backup(),
        }
    }

    // ─── Helpers ────────────────────────────────────────────────────────────

    /// Applies `f` to a copy of the records, persists the copy and only then
    /// publishes it. Nothing changes if `f` or the write fails.
    fn mutate<T>(&self, f: impl FnOnce(&mut Records) -> Result<T>) -> Result<T> {
        let mut guard = self.write();
        let mut next = guard.clone();
        let out = f(&mut next)?;

        let payload = snapshot::encode(&next)?;
        if let Err(e) = self.store.write(&payload) {
            log::error!(
                "Failed to persist document registry to {}: {}",
                self.store.location(),
                e
            );
            return Err(e.into());
        }

        *guard = next;
        Ok(out)
    }

    fn read(&self) -> RwLockReadGuard<'_, Records> {
        match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Records> {
        match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn load(store: &dyn SnapshotStore, layout: &OutputLayout) -> (Records, LoadSource) {
    let location = store.location();

    let primary_err = match store.read_primary() {
        Ok(None) => match store.read_backup() {
            Ok(None) => return (Records::new(), LoadSource::Fresh),
            // A backup without a primary means a write was cut short.
            _ => PersistenceError::Corrupt {
                location: location.clone(),
                reason: "primary snapshot is missing but a backup exists".to_string(),
            },
        },
        Ok(Some(payload)) => match snapshot::decode(&payload, &location, layout) {
            Ok(records) => return (records, LoadSource::Primary),
            Err(e) => e,
        },
        Err(e) => e,
    };
    log::error!("Failed to load document registry: {}", primary_err);

    match read_backup(store, layout, &location) {
        Ok(records) => {
            log::warn!(
                "Recovered document registry from backup ({} record(s))",
                records.len()
            );
            (records, LoadSource::Backup)
        }
        Err(e) => {
            log::error!(
                "Failed to load registry backup: {}. Starting with an empty registry; previously registered documents are lost",
                e
            );
            (Records::new(), LoadSource::Empty)
        }
    }
}

fn read_backup(
    store: &dyn SnapshotStore,
    layout: &OutputLayout,
    location: &str,
) -> std::result::Result<Records, PersistenceError> {
    let payload = store.read_backup()?.ok_or_else(|| PersistenceError::Corrupt {
        location: format!("{} (backup)", location),
        reason: "no backup snapshot".to_string(),
    })?;
    snapshot::decode(&payload, location, layout)
}
