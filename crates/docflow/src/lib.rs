//! docflow: document conversion with a persisted lifecycle registry and
//! live progress tracking.
//!
//! [`Docflow`] is the entry point. It owns the [`DocumentRegistry`], the
//! [`ProgressTracker`], the background [`JobRunner`] and the extraction
//! service.

pub mod app;
pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod logging;
pub mod progress;
pub mod registry;
pub mod sanitize;
pub mod secrets;
pub mod storage;

pub use app::{DeleteReport, Docflow, ProgressView, RenderedOutput, StatusView};
pub use config::{load_config, Config};
pub use convert::{CommandConverter, Converter, DiagnosticSink};
pub use error::{DocflowError, Result};
pub use extract::{ExtractedInfo, Extractor};
pub use jobs::{BatchFailure, BatchSummary, JobRunner, StartOutcome};
pub use logging::init_logging;
pub use progress::{parse_line, LineKind, ProgressRecord, ProgressStatus, ProgressTracker};
pub use registry::{DocumentRecord, DocumentRegistry, DocumentStatus};
