//! Background conversion jobs.
//!
//! `start_parse` claims the document, makes sure its input exists and hands
//! the conversion to a Tokio task, returning immediately. `parse_batch` runs
//! the same pipeline inline, one document after another.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use super::batch::{BatchFailure, BatchSummary};
use super::job::{JobReport, JobState, ParseJob};
use crate::convert::{Converter, DiagnosticSink};
use crate::error::{ConversionError, DocflowError, Result, StorageError};
use crate::progress::{LogSink, ProgressSink, ProgressStatus, ProgressTracker};
use crate::registry::{DocumentRecord, DocumentRegistry, DocumentStatus, ParseClaim};
use crate::sanitize::redact_name;
use crate::storage::{self, ArtifactStore};

const SOURCE_MISSING: &str = "Source file not found";
const WAITING_FOR_SLOT: &str = "Waiting for a conversion slot";
const DOCUMENT_DELETED: &str = "Document was deleted during parsing";

/// What `start_parse` did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyInProgress,
    AlreadyParsed,
}

struct JobContext {
    registry: Arc<DocumentRegistry>,
    tracker: Arc<ProgressTracker>,
    artifacts: Arc<ArtifactStore>,
    converter: Arc<dyn Converter>,
    passthrough: Arc<dyn DiagnosticSink>,
    limiter: Option<Arc<Semaphore>>,
}

pub struct JobRunner {
    ctx: Arc<JobContext>,
    tasks: Mutex<JoinSet<()>>,
    accepting: AtomicBool,
}

impl JobRunner {
    pub fn new(
        registry: Arc<DocumentRegistry>,
        tracker: Arc<ProgressTracker>,
        artifacts: Arc<ArtifactStore>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        Self {
            ctx: Arc::new(JobContext {
                registry,
                tracker,
                artifacts,
                converter,
                passthrough: Arc::new(LogSink),
                limiter: None,
            }),
            tasks: Mutex::new(JoinSet::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Bounds concurrent conversions. `None` leaves them unbounded.
    pub fn with_max_concurrent(self, max: Option<usize>) -> Self {
        self.rebuild(|ctx| ctx.limiter = max.map(|n| Arc::new(Semaphore::new(n.max(1)))))
    }

    /// Where non-progress converter output goes. Defaults to [`LogSink`].
    pub fn with_passthrough(self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.rebuild(|ctx| ctx.passthrough = sink)
    }

    fn rebuild(mut self, f: impl FnOnce(&mut JobContext)) -> Self {
        let mut ctx = JobContext {
            registry: Arc::clone(&self.ctx.registry),
            tracker: Arc::clone(&self.ctx.tracker),
            artifacts: Arc::clone(&self.ctx.artifacts),
            converter: Arc::clone(&self.ctx.converter),
            passthrough: Arc::clone(&self.ctx.passthrough),
            limiter: self.ctx.limiter.clone(),
        };
        f(&mut ctx);
        self.ctx = Arc::new(ctx);
        self
    }

    /// Starts converting a document in the background.
    ///
    /// Returns once the document is claimed; the conversion result is
    /// observable through the registry and the progress tracker.
    pub async fn start_parse(&self, document_id: &str) -> Result<StartOutcome> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(DocflowError::ShuttingDown);
        }

        let record = match self.ctx.registry.claim_for_parsing(document_id)? {
            ParseClaim::Claimed(record) => record,
            ParseClaim::AlreadyParsing => {
                tracing::debug!(document_id, "Parse already in progress");
                return Ok(StartOutcome::AlreadyInProgress);
            }
            ParseClaim::AlreadyParsed => return Ok(StartOutcome::AlreadyParsed),
        };

        let input = self.ctx.accept(&record)?;

        let ctx = Arc::clone(&self.ctx);
        let mut tasks = self.lock_tasks();
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                tracing::error!("Parse job task failed: {}", e);
            }
        }
        tasks.spawn(async move {
            run_job(ctx, record, input).await;
        });

        Ok(StartOutcome::Started)
    }

    /// Converts each document in turn and waits for all of them.
    ///
    /// Documents already being parsed are skipped without being listed; they
    /// still count towards `total_requested`.
    pub async fn parse_batch(&self, document_ids: &[String]) -> BatchSummary {
        let mut summary = BatchSummary::new(document_ids.len());

        for id in document_ids {
            if !self.accepting.load(Ordering::SeqCst) {
                summary.failed.push(BatchFailure::new(id, &DocflowError::ShuttingDown.to_string()));
                continue;
            }

            let record = match self.ctx.registry.claim_for_parsing(id) {
                Ok(ParseClaim::Claimed(record)) => record,
                Ok(ParseClaim::AlreadyParsed) => {
                    summary.already_parsed.push(id.clone());
                    continue;
                }
                Ok(ParseClaim::AlreadyParsing) => {
                    tracing::debug!(document_id = %id, "Skipping document already being parsed");
                    continue;
                }
                Err(DocflowError::NotFound { .. }) => {
                    summary.not_found.push(id.clone());
                    continue;
                }
                Err(e) => {
                    summary.failed.push(BatchFailure::new(id, &e.to_string()));
                    continue;
                }
            };

            let input = match self.ctx.accept(&record) {
                Ok(input) => input,
                Err(e) => {
                    summary.failed.push(BatchFailure::new(id, &e.to_string()));
                    continue;
                }
            };

            let report = run_job(Arc::clone(&self.ctx), record, input).await;
            match report.state {
                JobState::Completed => summary.processed.push(report.document_id),
                JobState::Failed(error) => summary.failed.push(BatchFailure {
                    document_id: report.document_id,
                    error,
                }),
                JobState::Idle | JobState::Parsing => {
                    tracing::error!(
                        document_id = %report.document_id,
                        "Job returned in non-terminal state {:?}",
                        report.state
                    );
                }
            }
        }

        let summary = summary.finish();
        tracing::info!(
            total = summary.total_requested,
            processed = summary.processed.len(),
            already_parsed = summary.already_parsed.len(),
            failed = summary.failed.len(),
            not_found = summary.not_found.len(),
            "Batch parse finished ({}% success)",
            summary.success_rate
        );
        summary
    }

    /// Waits for every background job started so far.
    pub async fn wait_idle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.lock_tasks());
            if tasks.is_empty() {
                return;
            }
            while let Some(finished) = tasks.join_next().await {
                if let Err(e) = finished {
                    tracing::error!("Parse job task failed: {}", e);
                }
            }
        }
    }

    /// Stops accepting work and waits for in-flight jobs. Running
    /// conversions are not cancelled.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.wait_idle().await;
        tracing::info!("Job runner stopped");
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("Job set lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Jobs still running when the runner is dropped keep running on the
/// runtime; dropping never cancels a conversion.
impl Drop for JobRunner {
    fn drop(&mut self) {
        let tasks = match self.tasks.get_mut() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !tasks.is_empty() {
            tracing::warn!(
                "Job runner dropped with {} job(s) in flight, detaching them",
                tasks.len()
            );
            tasks.detach_all();
        }
    }
}

impl JobContext {
    /// Prepares a claimed document: resolves the converter input and resets
    /// its progress. On failure the document is marked as failed.
    fn accept(&self, record: &DocumentRecord) -> Result<PathBuf> {
        match self.artifacts.ensure_canonical_copy(record) {
            Ok(input) => {
                self.tracker.clear(&record.id);
                self.tracker
                    .set_status(&record.id, ProgressStatus::Processing, None);
                Ok(input)
            }
            Err(e) => {
                tracing::error!(document_id = %record.id, "Cannot start parse: {}", e);
                let message = match &e {
                    DocflowError::Storage(StorageError::SourceMissing(_)) => {
                        SOURCE_MISSING.to_string()
                    }
                    other => failure_message(other),
                };
                self.record_failure(&record.id, &message);
                Err(e)
            }
        }
    }

    fn record_failure(&self, document_id: &str, message: &str) {
        if let Err(e) =
            self.registry
                .update_status(document_id, DocumentStatus::Error, Some(message))
        {
            tracing::error!(document_id, "Failed to record job failure: {}", e);
        }
        self.tracker
            .set_status(document_id, ProgressStatus::Error, Some(message));
    }
}

async fn run_job(ctx: Arc<JobContext>, record: DocumentRecord, input: PathBuf) -> JobReport {
    let span = tracing::info_span!(
        "parse_job",
        document_id = %record.id,
        filename = %redact_name(&record.original_name),
        converter = %ctx.converter.name(),
    );
    execute(ctx, record, input).instrument(span).await
}

async fn execute(ctx: Arc<JobContext>, record: DocumentRecord, input: PathBuf) -> JobReport {
    let mut job = ParseJob::new(&record.id);
    job.start();
    tracing::info!("Parse started");

    let _permit = match &ctx.limiter {
        Some(limiter) => {
            ctx.tracker
                .update_progress(&record.id, WAITING_FOR_SLOT, 0, None);
            match Arc::clone(limiter).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    let message = format!("OCR processing failed: {}", e);
                    ctx.record_failure(&record.id, &message);
                    return job.fail(message);
                }
            }
        }
        None => None,
    };

    if let Err(e) = convert_and_store(&ctx, &record, input).await {
        if ctx.registry.get(&record.id).is_none() {
            return discard_deleted(&ctx, &record, job);
        }
        let message = failure_message(&e);
        tracing::warn!("Parse failed: {}", message);
        ctx.record_failure(&record.id, &message);
        return job.fail(message);
    }

    // Registry first, then tracker, so the tracker never reports completion
    // for a result that was not recorded.
    match ctx
        .registry
        .update_status(&record.id, DocumentStatus::Parsed, None)
    {
        Ok(_) => {
            ctx.tracker
                .set_status(&record.id, ProgressStatus::Completed, None);
            let report = job.complete();
            tracing::info!(elapsed_ms = report.elapsed.as_millis() as u64, "Parse completed");
            report
        }
        Err(DocflowError::NotFound { .. }) => discard_deleted(&ctx, &record, job),
        Err(e) => {
            let message = format!("Failed to record conversion result: {}", e);
            tracing::error!("{}", message);
            ctx.record_failure(&record.id, &message);
            job.fail(message)
        }
    }
}

async fn convert_and_store(
    ctx: &JobContext,
    record: &DocumentRecord,
    input: PathBuf,
) -> Result<()> {
    let sink = ProgressSink::new(
        &record.id,
        Arc::clone(&ctx.tracker),
        Arc::clone(&ctx.passthrough),
    );
    let converter = Arc::clone(&ctx.converter);

    // The converter runs in its own task so a panic inside it fails this
    // job instead of leaving the document stuck in `parsing`.
    let conversion = tokio::spawn(
        async move { converter.convert(&input, &sink).await }.in_current_span(),
    );
    let text = match conversion.await {
        Ok(result) => result?,
        Err(e) => {
            return Err(ConversionError::Failed(format!("converter task aborted: {}", e)).into())
        }
    };

    if text.trim().is_empty() {
        return Err(ConversionError::EmptyOutput.into());
    }
    if ctx.registry.get(&record.id).is_none() {
        return Err(DocflowError::not_found(&record.id));
    }
    storage::write_rendered(record, &text).await
}

/// The document was deleted while its job ran: drop whatever the job left
/// behind instead of recording a result.
fn discard_deleted(ctx: &JobContext, record: &DocumentRecord, job: ParseJob) -> JobReport {
    tracing::info!("Document deleted during parse, discarding result");
    match std::fs::remove_dir_all(&record.paths.output_folder) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove output folder: {}", e),
    }
    ctx.tracker.clear(&record.id);
    job.fail(DOCUMENT_DELETED)
}

fn failure_message(err: &DocflowError) -> String {
    match err {
        DocflowError::Conversion(inner) => format!("OCR processing failed: {}", inner),
        other => format!("OCR processing failed: {}", other),
    }
}
