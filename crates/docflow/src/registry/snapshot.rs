//! Snapshot persistence for the document registry.
//!
//! The registry writes its full state on every mutation. Stores keep the
//! previous snapshot as a single-generation backup so a corrupt primary can
//! be recovered from.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{DocumentRecord, DocumentStatus, OutputLayout};
use crate::error::PersistenceError;
use crate::extract::ExtractedInfo;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Storage backend for registry snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Returns the current snapshot, or `None` when nothing was written yet.
    fn read_primary(&self) -> Result<Option<String>, PersistenceError>;

    /// Returns the previous snapshot, if one was kept.
    fn read_backup(&self) -> Result<Option<String>, PersistenceError>;

    /// Rotates the current snapshot into the backup slot and stores `payload`
    /// as the new primary.
    fn write(&self, payload: &str) -> Result<(), PersistenceError>;

    /// Human-readable location of the store, for stats and logs.
    fn location(&self) -> String;

    fn has_backup(&self) -> bool;
}

// ─── File store ─────────────────────────────────────────────────────────────

/// JSON file store: `<dir>/documents.json` with `documents.json.bak` beside it.
pub struct FileSnapshotStore {
    primary: PathBuf,
    backup: PathBuf,
    staging: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(directory: &Path) -> Self {
        Self::at(directory.join("documents.json"))
    }

    pub fn at(primary: PathBuf) -> Self {
        let backup = with_suffix(&primary, "bak");
        let staging = with_suffix(&primary, "tmp");
        Self {
            primary,
            backup,
            staging,
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn read_optional(path: &Path) -> Result<Option<String>, PersistenceError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PersistenceError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn read_primary(&self) -> Result<Option<String>, PersistenceError> {
        read_optional(&self.primary)
    }

    fn read_backup(&self) -> Result<Option<String>, PersistenceError> {
        read_optional(&self.backup)
    }

    fn write(&self, payload: &str) -> Result<(), PersistenceError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PersistenceError::Io { path, source }
        };

        if let Some(parent) = self.primary.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        // Stage first so a failed write never touches the current snapshot.
        let mut staged = fs::File::create(&self.staging).map_err(io_err(&self.staging))?;
        staged
            .write_all(payload.as_bytes())
            .and_then(|_| staged.sync_all())
            .map_err(io_err(&self.staging))?;
        drop(staged);

        // Copy, not rename: the primary path always holds a full snapshot.
        if self.primary.exists() {
            let backup_staging = with_suffix(&self.backup, "tmp");
            fs::copy(&self.primary, &backup_staging).map_err(io_err(&backup_staging))?;
            fs::rename(&backup_staging, &self.backup).map_err(io_err(&self.backup))?;
        }
        fs::rename(&self.staging, &self.primary).map_err(io_err(&self.primary))?;
        Ok(())
    }

    fn location(&self) -> String {
        self.primary.display().to_string()
    }

    fn has_backup(&self) -> bool {
        self.backup.exists()
    }
}

// ─── Encoding ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    documents: &'a BTreeMap<String, DocumentRecord>,
}

pub(crate) fn encode(records: &BTreeMap<String, DocumentRecord>) -> Result<String, PersistenceError> {
    let snapshot = SnapshotOut {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        documents: records,
    };
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

/// A record as it may appear in older or partially written snapshots.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredRecord {
    id: Option<String>,
    #[serde(alias = "original_filename")]
    original_name: Option<String>,
    status: Option<String>,
    #[serde(alias = "upload_path")]
    source_path: Option<PathBuf>,
    output_folder: Option<PathBuf>,
    #[serde(alias = "raw_copy_path")]
    canonical_copy_path: Option<PathBuf>,
    #[serde(alias = "html_path")]
    rendered_output_path: Option<PathBuf>,
    markdown_path: Option<PathBuf>,
    extracted_info_path: Option<PathBuf>,
    metadata_path: Option<PathBuf>,
    extracted_info: Option<ExtractedInfo>,
    error_message: Option<String>,
    #[serde(alias = "upload_date")]
    upload_time: Option<DateTime<Utc>>,
    last_modified: Option<DateTime<Utc>>,
}

impl StoredRecord {
    fn repair(self, key: &str, layout: &OutputLayout) -> DocumentRecord {
        let id = self.id.unwrap_or_else(|| key.to_string());
        let original_name = self.original_name.unwrap_or_else(|| {
            log::warn!("Document {} has no original name, using 'document'", id);
            "document".to_string()
        });
        let derived = layout.paths_for(&id, &original_name);

        let status = match self.status.as_deref().map(DocumentStatus::parse) {
            Some(Some(status)) => status,
            _ => {
                log::warn!(
                    "Unknown status {:?} for document {}, defaulting to uploaded",
                    self.status,
                    id
                );
                DocumentStatus::Uploaded
            }
        };

        // Older snapshots stored markdown output; those documents are
        // re-rendered under the current extension.
        let rendered_output_path = self.rendered_output_path.unwrap_or_else(|| {
            self.markdown_path
                .map(|p| p.with_extension(layout.rendered_extension()))
                .unwrap_or_else(|| derived.rendered_output_path.clone())
        });

        let upload_time = self.upload_time.unwrap_or_else(|| {
            log::warn!("Document {} has no upload time, using now", id);
            Utc::now()
        });
        let error_message = match status {
            DocumentStatus::Error => Some(
                self.error_message
                    .unwrap_or_else(|| "unspecified error".to_string()),
            ),
            _ => None,
        };

        DocumentRecord {
            source_path: self
                .source_path
                .unwrap_or_else(|| derived.canonical_copy_path.clone()),
            paths: super::record::DocumentPaths {
                output_folder: self.output_folder.unwrap_or(derived.output_folder),
                canonical_copy_path: self
                    .canonical_copy_path
                    .unwrap_or(derived.canonical_copy_path),
                rendered_output_path,
                extracted_info_path: self
                    .extracted_info_path
                    .unwrap_or(derived.extracted_info_path),
                metadata_path: self.metadata_path.unwrap_or(derived.metadata_path),
            },
            extracted_info: self.extracted_info,
            error_message,
            last_modified: self.last_modified.unwrap_or(upload_time),
            upload_time,
            original_name,
            status,
            id,
        }
    }
}

/// Decodes a snapshot, repairing records field by field.
///
/// Accepts both the versioned envelope and a bare `{id: record}` map. Fails
/// only when the payload itself is not a JSON object.
pub(crate) fn decode(
    payload: &str,
    location: &str,
    layout: &OutputLayout,
) -> Result<BTreeMap<String, DocumentRecord>, PersistenceError> {
    let corrupt = |reason: String| PersistenceError::Corrupt {
        location: location.to_string(),
        reason,
    };

    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| corrupt(e.to_string()))?;
    let mut root = match value {
        serde_json::Value::Object(map) => map,
        _ => return Err(corrupt("snapshot is not a JSON object".to_string())),
    };

    let documents = match root.remove("documents") {
        Some(serde_json::Value::Object(docs)) => docs,
        Some(_) => return Err(corrupt("'documents' is not an object".to_string())),
        None => root,
    };

    let mut records = BTreeMap::new();
    for (key, raw) in documents {
        match serde_json::from_value::<StoredRecord>(raw) {
            Ok(stored) => {
                let record = stored.repair(&key, layout);
                records.insert(record.id.clone(), record);
            }
            Err(e) => {
                log::error!("Dropping unreadable document record {}: {}", key, e);
            }
        }
    }
    Ok(records)
}
