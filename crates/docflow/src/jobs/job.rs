use std::time::{Duration, Instant};

use serde::Serialize;

/// State of a single parse attempt.
///
/// `Idle → Parsing → (Completed | Failed)`. Terminal states are final; a
/// retry is a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "error")]
pub enum JobState {
    Idle,
    Parsing,
    Completed,
    Failed(String),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed(_))
    }
}

/// One conversion attempt for one document.
#[derive(Debug)]
pub struct ParseJob {
    document_id: String,
    state: JobState,
    started: Option<Instant>,
}

impl ParseJob {
    pub fn new(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            state: JobState::Idle,
            started: None,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn start(&mut self) {
        if self.state == JobState::Idle {
            self.state = JobState::Parsing;
            self.started = Some(Instant::now());
        } else {
            log::warn!(
                "Ignoring start for job {} in state {:?}",
                self.document_id,
                self.state
            );
        }
    }

    pub fn complete(self) -> JobReport {
        self.finish(JobState::Completed)
    }

    pub fn fail(self, message: impl Into<String>) -> JobReport {
        self.finish(JobState::Failed(message.into()))
    }

    // Consumes the job, so a finished job cannot be finished again.
    fn finish(self, outcome: JobState) -> JobReport {
        JobReport {
            document_id: self.document_id,
            state: outcome,
            elapsed: self.started.map(|s| s.elapsed()).unwrap_or_default(),
        }
    }
}

/// Outcome of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub document_id: String,
    pub state: JobState,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl JobReport {
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed(message) => Some(message),
            _ => None,
        }
    }
}
