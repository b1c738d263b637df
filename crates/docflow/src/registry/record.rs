//! Document records and the on-disk layout derived from their IDs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::ExtractedInfo;

/// Lifecycle status of a document.
///
/// `uploaded → parsing → (parsed | error)`, and `error → parsing` on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Parsing,
    Parsed,
    Error,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 4] = [
        DocumentStatus::Uploaded,
        DocumentStatus::Parsing,
        DocumentStatus::Parsed,
        DocumentStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Parsing => "parsing",
            DocumentStatus::Parsed => "parsed",
            DocumentStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(DocumentStatus::Uploaded),
            "parsing" => Some(DocumentStatus::Parsing),
            "parsed" => Some(DocumentStatus::Parsed),
            "error" => Some(DocumentStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record for a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub original_name: String,
    pub status: DocumentStatus,
    pub source_path: PathBuf,
    #[serde(flatten)]
    pub paths: DocumentPaths,
    pub extracted_info: Option<ExtractedInfo>,
    pub error_message: Option<String>,
    pub upload_time: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl DocumentRecord {
    /// Sets the status, keeping `error_message` in sync with it.
    pub(crate) fn apply_status(&mut self, status: DocumentStatus, error_message: Option<&str>) {
        self.status = status;
        self.error_message = match status {
            DocumentStatus::Error => {
                Some(error_message.unwrap_or("unspecified error").to_string())
            }
            _ => None,
        };
        self.last_modified = Utc::now();
    }
}

/// Artifact locations for one document. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPaths {
    pub output_folder: PathBuf,
    pub canonical_copy_path: PathBuf,
    pub rendered_output_path: PathBuf,
    pub extracted_info_path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Computes artifact paths under a single outputs directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    outputs_dir: PathBuf,
    rendered_extension: String,
}

impl OutputLayout {
    pub fn new(outputs_dir: impl Into<PathBuf>, rendered_extension: &str) -> Self {
        Self {
            outputs_dir: outputs_dir.into(),
            rendered_extension: rendered_extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    pub fn rendered_extension(&self) -> &str {
        &self.rendered_extension
    }

    /// `<outputs>/<id>/` plus the per-document files inside it.
    pub fn paths_for(&self, id: &str, original_name: &str) -> DocumentPaths {
        let output_folder = self.outputs_dir.join(id);
        let file_name = safe_file_name(original_name);
        let stem = Path::new(&file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("document")
            .to_string();

        DocumentPaths {
            canonical_copy_path: output_folder.join(&file_name),
            rendered_output_path: output_folder
                .join(format!("{}.{}", stem, self.rendered_extension)),
            extracted_info_path: output_folder.join("extracted_info.json"),
            metadata_path: output_folder.join("metadata.json"),
            output_folder,
        }
    }
}

/// Strips directory components so a client-supplied name cannot escape the
/// output folder.
pub(crate) fn safe_file_name(original_name: &str) -> String {
    let name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match name {
        "" | "." | ".." => "document".to_string(),
        other => other.to_string(),
    }
}
