//! Live conversion progress.
//!
//! [`ProgressSink`] is the per-job diagnostic sink: it runs each converter
//! line through [`parse_line`] and feeds the result into the shared
//! [`ProgressTracker`].

mod parser;
mod tracker;

use std::sync::Arc;

pub use parser::{parse_line, LineKind, ProgressUpdate};
pub use tracker::{ProgressEvent, ProgressRecord, ProgressStatus, ProgressTracker};

use crate::convert::DiagnosticSink;

/// Forwards non-progress lines to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn write_line(&self, line: &str) {
        tracing::debug!(target: "docflow::converter", "{}", line);
    }
}

/// Diagnostic sink bound to a single document's conversion job.
pub struct ProgressSink {
    document_id: String,
    tracker: Arc<ProgressTracker>,
    passthrough: Arc<dyn DiagnosticSink>,
}

impl ProgressSink {
    pub fn new(
        document_id: &str,
        tracker: Arc<ProgressTracker>,
        passthrough: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            document_id: document_id.to_string(),
            tracker,
            passthrough,
        }
    }
}

impl DiagnosticSink for ProgressSink {
    fn write_line(&self, line: &str) {
        match parse_line(line) {
            LineKind::Progress(update) => self.tracker.update_progress(
                &self.document_id,
                &update.task,
                update.percentage,
                update.progress_info.as_deref(),
            ),
            LineKind::FormatDrift(raw) => {
                tracing::warn!(
                    document_id = %self.document_id,
                    "Progress line matched no known format: {}",
                    raw
                );
            }
            LineKind::Passthrough => self.passthrough.write_line(line),
            LineKind::Blank => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl DiagnosticSink for Collect {
        fn write_line(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    #[test]
    fn test_sink_routes_lines() {
        let tracker = Arc::new(ProgressTracker::default());
        let collected = Arc::new(Collect::default());
        let sink = ProgressSink::new("doc", Arc::clone(&tracker), collected.clone());

        sink.write_line("Loading weights from cache");
        sink.write_line("Recognizing Text: 30%|###       | 3/10 [00:01<00:02, 3.00it/s]");
        sink.write_line("|###| 30% ???");
        sink.write_line("");

        let record = tracker.get("doc").unwrap();
        assert_eq!(record.task.as_deref(), Some("Recognizing Text"));
        assert_eq!(record.percentage, 30);
        assert_eq!(record.progress_info.as_deref(), Some("3/10"));

        let passed = collected.0.lock().unwrap();
        assert_eq!(passed.as_slice(), ["Loading weights from cache"]);
    }

    #[test]
    fn test_sinks_do_not_share_documents() {
        let tracker = Arc::new(ProgressTracker::default());
        let a = ProgressSink::new("a", Arc::clone(&tracker), Arc::new(LogSink));
        let b = ProgressSink::new("b", Arc::clone(&tracker), Arc::new(LogSink));

        a.write_line("Layout: 10%");
        b.write_line("Layout: 90%");

        assert_eq!(tracker.get("a").unwrap().percentage, 10);
        assert_eq!(tracker.get("b").unwrap().percentage, 90);
    }
}
