//! Conversion jobs: the per-attempt state machine, the runner that drives
//! the converter, and batch summaries.

mod batch;
mod job;
mod runner;

pub use batch::{BatchFailure, BatchSummary};
pub use job::{JobReport, JobState, ParseJob};
pub use runner::{JobRunner, StartOutcome};
