//! On-disk artifacts for each document.
//!
//! Uploads are staged under `uploads/`; everything derived from a document
//! lives in its output folder (see [`OutputLayout`](crate::registry::OutputLayout)).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DocflowError, Result, StorageError};
use crate::extract::ExtractedInfo;
use crate::registry::{safe_file_name, DocumentRecord, DocumentStatus};

/// Contents of `metadata.json`.
#[derive(Debug, Serialize)]
pub struct DocumentMetadata<'a> {
    pub document_id: &'a str,
    pub original_name: &'a str,
    pub upload_time: DateTime<Utc>,
    pub status: DocumentStatus,
    pub mime_type: String,
    pub file_size: u64,
    pub source_path: &'a Path,
    pub canonical_copy_path: &'a Path,
    pub rendered_output_path: &'a Path,
    pub created_at: DateTime<Utc>,
}

/// A cleanup step that did not succeed during deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub error: String,
}

pub struct ArtifactStore {
    uploads_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(uploads_dir: P) -> Self {
        Self {
            uploads_dir: uploads_dir.as_ref().to_path_buf(),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Copies an incoming file into `uploads/` under a unique name.
    pub fn stage_upload(&self, source: &Path, original_name: &str) -> Result<PathBuf> {
        ensure_directory(&self.uploads_dir)?;
        let name = format!(
            "{}_{}",
            uuid::Uuid::new_v4().simple(),
            safe_file_name(original_name)
        );
        let staged = self.uploads_dir.join(name);
        copy(source, &staged)?;
        log::debug!(
            "Staged upload {} as {}",
            crate::sanitize::redact_path(source),
            crate::sanitize::redact_path(&staged)
        );
        Ok(staged)
    }

    /// Copies the upload to the canonical path and writes `metadata.json`.
    pub fn materialize(&self, record: &DocumentRecord) -> Result<()> {
        ensure_directory(&record.paths.output_folder)?;
        copy(&record.source_path, &record.paths.canonical_copy_path)?;

        let file_size = std::fs::metadata(&record.paths.canonical_copy_path)
            .map(|m| m.len())
            .unwrap_or(0);
        let metadata = DocumentMetadata {
            document_id: &record.id,
            original_name: &record.original_name,
            upload_time: record.upload_time,
            status: record.status,
            mime_type: mime_guess::from_path(&record.original_name)
                .first_or_octet_stream()
                .to_string(),
            file_size,
            source_path: &record.source_path,
            canonical_copy_path: &record.paths.canonical_copy_path,
            rendered_output_path: &record.paths.rendered_output_path,
            created_at: Utc::now(),
        };
        write_json(&record.paths.metadata_path, &metadata)
    }

    /// Makes sure the converter input exists, re-copying it from the upload
    /// when the canonical copy went missing.
    pub fn ensure_canonical_copy(&self, record: &DocumentRecord) -> Result<PathBuf> {
        let canonical = &record.paths.canonical_copy_path;
        if canonical.is_file() {
            return Ok(canonical.clone());
        }
        if !record.source_path.is_file() {
            return Err(StorageError::SourceMissing(record.source_path.clone()).into());
        }
        log::warn!(
            "Canonical copy for document {} is missing, restoring from upload",
            record.id
        );
        ensure_directory(&record.paths.output_folder)?;
        copy(&record.source_path, canonical)?;
        Ok(canonical.clone())
    }

    /// Removes the staged upload and the whole output folder. Failures are
    /// collected, not returned.
    pub fn remove(&self, record: &DocumentRecord) -> Vec<CleanupFailure> {
        let mut failures = Vec::new();

        // Only files this store staged are removed; ingesting never takes
        // ownership of the caller's original.
        if record.source_path.starts_with(&self.uploads_dir) {
            if let Err(e) = std::fs::remove_file(&record.source_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    failures.push(CleanupFailure {
                        path: record.source_path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = std::fs::remove_dir_all(&record.paths.output_folder) {
            if e.kind() != std::io::ErrorKind::NotFound {
                failures.push(CleanupFailure {
                    path: record.paths.output_folder.clone(),
                    error: e.to_string(),
                });
            }
        }

        for failure in &failures {
            log::warn!(
                "Failed to remove {} for document {}: {}",
                failure.path.display(),
                record.id,
                failure.error
            );
        }
        failures
    }
}

pub async fn write_rendered(record: &DocumentRecord, text: &str) -> Result<()> {
    let path = &record.paths.rendered_output_path;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    tokio::fs::write(path, text)
        .await
        .map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
    Ok(())
}

/// Reads the rendered output of a parsed document. A missing or empty file
/// means the record and the disk disagree.
pub async fn read_rendered(record: &DocumentRecord) -> Result<String> {
    let path = &record.paths.rendered_output_path;
    match tokio::fs::read_to_string(path).await {
        Ok(text) if text.trim().is_empty() => Err(DocflowError::Inconsistent {
            id: record.id.clone(),
            reason: format!("rendered output {} is empty", path.display()),
        }),
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DocflowError::Inconsistent {
            id: record.id.clone(),
            reason: format!("rendered output {} is missing", path.display()),
        }),
        Err(e) => Err(StorageError::ReadFile {
            path: path.clone(),
            source: e,
        }
        .into()),
    }
}

pub async fn write_extracted_info(record: &DocumentRecord, info: &ExtractedInfo) -> Result<()> {
    let path = &record.paths.extracted_info_path;
    let json = serde_json::to_string_pretty(info).map_err(|e| StorageError::WriteFile {
        path: path.clone(),
        source: std::io::Error::other(e),
    })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
    Ok(())
}

fn ensure_directory(path: &Path) -> std::result::Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}

fn copy(from: &Path, to: &Path) -> std::result::Result<(), StorageError> {
    if !from.is_file() {
        return Err(StorageError::SourceMissing(from.to_path_buf()));
    }
    std::fs::copy(from, to).map_err(|e| StorageError::CopyFile {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: std::io::Error::other(e),
    })?;
    std::fs::write(path, json).map_err(|e| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
