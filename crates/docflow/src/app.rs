//! Top-level handle that owns every component and exposes the document
//! operations a request layer needs.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{Config, RegistryBackend};
use crate::convert::{CommandConverter, Converter};
use crate::db::{self, Database, SqliteSnapshotStore};
use crate::error::{DocflowError, PersistenceError, Result, StorageError};
use crate::extract::{extractor_from_config, ExtractedInfo, ExtractionService, Extractor};
use crate::jobs::{BatchSummary, JobRunner, StartOutcome};
use crate::progress::{ProgressEvent, ProgressRecord, ProgressStatus, ProgressTracker};
use crate::registry::{
    DocumentRecord, DocumentRegistry, DocumentStatus, FileSnapshotStore, OutputLayout,
    RegistryStats, SnapshotStore,
};
use crate::storage::{self, ArtifactStore, CleanupFailure};

const INTERRUPTED: &str = "Interrupted by restart";

/// Progress as reported to callers. Falls back to the document status when
/// the tracker has nothing for the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    pub document_id: String,
    pub status: String,
    pub percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub last_updated: DateTime<Utc>,
    /// `false` when the view was built from the registry alone.
    pub live: bool,
}

impl ProgressView {
    fn from_tracker(document_id: &str, record: ProgressRecord) -> Self {
        Self {
            document_id: document_id.to_string(),
            status: record.status.to_string(),
            percentage: record.percentage,
            task: record.task,
            progress_info: record.progress_info,
            error_message: record.error_message,
            last_updated: record.last_updated,
            live: true,
        }
    }

    fn from_document(record: &DocumentRecord) -> Self {
        let percentage = if record.status == DocumentStatus::Parsed {
            100
        } else {
            0
        };
        Self {
            document_id: record.id.clone(),
            status: record.status.to_string(),
            percentage,
            task: None,
            progress_info: None,
            error_message: record.error_message.clone(),
            last_updated: record.last_modified,
            live: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub document_id: String,
    pub original_name: String,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub upload_time: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub has_extracted_info: bool,
    /// Only set for parsed documents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_output: Option<RenderedOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedOutput {
    pub available: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub document_id: String,
    pub cleanup_failures: Vec<CleanupFailure>,
}

impl DeleteReport {
    pub fn is_clean(&self) -> bool {
        self.cleanup_failures.is_empty()
    }
}

/// Owns the registry, tracker, runner and extraction service for one data
/// directory. Call [`Docflow::shutdown`] to wait for running parses;
/// dropping the handle leaves them running detached.
pub struct Docflow {
    registry: Arc<DocumentRegistry>,
    tracker: Arc<ProgressTracker>,
    artifacts: Arc<ArtifactStore>,
    runner: JobRunner,
    extraction: ExtractionService,
}

impl Docflow {
    /// Opens the data directory described by `config` and wires everything
    /// together with the configured converter and extractor.
    pub fn open(config: &Config) -> Result<Self> {
        let converter: Arc<dyn Converter> =
            Arc::new(CommandConverter::from_config(&config.converter));
        let extractor = extractor_from_config(&config.extraction)?;
        Self::open_with(config, converter, extractor)
    }

    /// Like [`Docflow::open`], with caller-supplied converter and extractor.
    pub fn open_with(
        config: &Config,
        converter: Arc<dyn Converter>,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        let data_dir = config.data_dir();
        for dir in [config.uploads_dir(), config.outputs_dir(), config.database_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| StorageError::CreateDirectory {
                path: dir.clone(),
                source: e,
            })?;
        }

        let store: Box<dyn SnapshotStore> = match config.registry.backend {
            RegistryBackend::File => Box::new(FileSnapshotStore::new(&config.database_dir())),
            RegistryBackend::Sqlite => {
                let database = Database::open(&db::database_path(&data_dir))
                    .map_err(PersistenceError::from)?;
                Box::new(SqliteSnapshotStore::new(database))
            }
        };
        let layout = OutputLayout::new(config.outputs_dir(), &config.converter.rendered_extension);
        let registry = Arc::new(DocumentRegistry::open(store, layout));

        let interrupted = registry.fail_interrupted(INTERRUPTED)?;
        if !interrupted.is_empty() {
            log::warn!(
                "{} document(s) were parsing when the previous process stopped: {}",
                interrupted.len(),
                interrupted.join(", ")
            );
        }

        let tracker = Arc::new(ProgressTracker::new(config.jobs.progress_channel_capacity));
        let artifacts = Arc::new(ArtifactStore::new(config.uploads_dir()));
        let runner = JobRunner::new(
            Arc::clone(&registry),
            Arc::clone(&tracker),
            Arc::clone(&artifacts),
            converter,
        )
        .with_max_concurrent(config.jobs.max_concurrent);
        let extraction = ExtractionService::new(Arc::clone(&registry), extractor);

        log::info!("docflow opened at {}", data_dir.display());
        Ok(Self {
            registry,
            tracker,
            artifacts,
            runner,
            extraction,
        })
    }

    pub fn registry(&self) -> &Arc<DocumentRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    // ─── Documents ───

    /// Stages `source` as a new upload and registers it in `uploaded` state.
    pub fn ingest(&self, original_name: &str, source: &Path) -> Result<DocumentRecord> {
        let staged = self.artifacts.stage_upload(source, original_name)?;
        let record = self.registry.create(original_name, &staged)?;
        if let Err(e) = self.artifacts.materialize(&record) {
            log::error!("Failed to materialize document {}: {}", record.id, e);
            self.artifacts.remove(&record);
            self.registry.delete(&record.id)?;
            return Err(e);
        }
        Ok(record)
    }

    pub fn document(&self, id: &str) -> Result<DocumentRecord> {
        self.registry.require(id)
    }

    pub fn list(&self, filter: Option<DocumentStatus>) -> Vec<DocumentRecord> {
        self.registry.list(filter)
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn status(&self, id: &str) -> Result<StatusView> {
        let record = self.registry.require(id)?;
        let rendered_output = (record.status == DocumentStatus::Parsed).then(|| {
            match std::fs::metadata(&record.paths.rendered_output_path) {
                Ok(meta) => RenderedOutput {
                    available: meta.len() > 0,
                    size_bytes: meta.len(),
                },
                Err(_) => RenderedOutput {
                    available: false,
                    size_bytes: 0,
                },
            }
        });
        Ok(StatusView {
            document_id: record.id,
            original_name: record.original_name,
            status: record.status,
            error_message: record.error_message,
            upload_time: record.upload_time,
            last_modified: record.last_modified,
            has_extracted_info: record.extracted_info.is_some(),
            rendered_output,
        })
    }

    /// Rendered text of a parsed document.
    pub async fn rendered_content(&self, id: &str) -> Result<String> {
        let record = self.registry.require(id)?;
        if record.status != DocumentStatus::Parsed {
            return Err(DocflowError::InvalidState {
                id: id.to_string(),
                status: record.status,
                operation: "read rendered content",
            });
        }
        storage::read_rendered(&record).await
    }

    /// Removes a document's files and then its record. Cleanup failures are
    /// reported but do not keep the record alive.
    pub async fn delete_document(&self, id: &str) -> Result<DeleteReport> {
        let record = self.registry.require(id)?;
        if record.status == DocumentStatus::Parsing {
            log::warn!("Deleting document {} while it is being parsed", id);
        }

        let artifacts = Arc::clone(&self.artifacts);
        let target = record.clone();
        let cleanup = tokio::task::spawn_blocking(move || artifacts.remove(&target)).await;
        let cleanup_failures = match cleanup {
            Ok(failures) => failures,
            Err(e) => vec![CleanupFailure {
                path: record.paths.output_folder.clone(),
                error: format!("cleanup task failed: {}", e),
            }],
        };

        self.tracker.clear(id);
        if !self.registry.delete(id)? {
            return Err(DocflowError::not_found(id));
        }

        log::info!(
            "Deleted document {} ({} cleanup failure(s))",
            id,
            cleanup_failures.len()
        );
        Ok(DeleteReport {
            document_id: id.to_string(),
            cleanup_failures,
        })
    }

    // ─── Progress ───

    pub fn progress(&self, id: &str) -> Result<ProgressView> {
        let record = self.registry.require(id)?;
        Ok(match self.tracker.get(id) {
            Some(progress) => ProgressView::from_tracker(id, progress),
            None => ProgressView::from_document(&record),
        })
    }

    /// Raw tracker state; `None` means no progress was observed.
    pub fn tracked_progress(&self, id: &str) -> Option<ProgressRecord> {
        self.tracker.get(id)
    }

    pub fn subscribe_progress(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.tracker.subscribe()
    }

    // ─── Parsing ───

    pub async fn start_parse(&self, id: &str) -> Result<StartOutcome> {
        self.runner.start_parse(id).await
    }

    pub async fn parse_batch(&self, ids: &[String]) -> BatchSummary {
        self.runner.parse_batch(ids).await
    }

    pub async fn wait_idle(&self) {
        self.runner.wait_idle().await;
    }

    // ─── Extraction ───

    pub async fn extract(&self, id: &str) -> Result<ExtractedInfo> {
        self.extraction.extract(id).await
    }

    pub fn extracted(&self, id: &str) -> Result<ExtractedInfo> {
        self.extraction.extracted(id)
    }

    /// Stops accepting parse requests and waits for running ones.
    pub async fn shutdown(&self) {
        self.runner.shutdown().await;
        let processing = self
            .tracker
            .all()
            .values()
            .filter(|r| r.status == ProgressStatus::Processing)
            .count();
        if processing > 0 {
            log::warn!("{} tracker record(s) still processing at shutdown", processing);
        }
        log::info!("docflow shut down");
    }
}
