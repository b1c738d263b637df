//! In-memory progress tracker with a broadcast feed for live viewers.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Status of the current conversion attempt for a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Processing,
    Completed,
    Error,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressStatus::Processing => write!(f, "processing"),
            ProgressStatus::Completed => write!(f, "completed"),
            ProgressStatus::Error => write!(f, "error"),
        }
    }
}

/// Latest progress snapshot for one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
    /// Sub-stage label reported by the converter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub percentage: u8,
    /// Detail such as `"12/40"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_info: Option<String>,
    pub status: ProgressStatus,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProgressRecord {
    fn empty(status: ProgressStatus) -> Self {
        Self {
            task: None,
            percentage: 0,
            progress_info: None,
            status,
            last_updated: Utc::now(),
            error_message: None,
        }
    }
}

/// A change to a document's progress, as seen by subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub document_id: String,
    /// `None` once the record was cleared.
    pub record: Option<ProgressRecord>,
}

/// Thread-safe map from document ID to its latest [`ProgressRecord`].
///
/// Nothing here touches disk; all records are gone after a restart.
pub struct ProgressTracker {
    records: Mutex<HashMap<String, ProgressRecord>>,
    sender: broadcast::Sender<ProgressEvent>,
}

impl ProgressTracker {
    /// Creates a tracker whose subscribers can lag by at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            records: Mutex::new(HashMap::new()),
            sender,
        }
    }

    /// Records a progress event. Sets status to processing and clears any
    /// earlier error. Later calls overwrite earlier ones.
    pub fn update_progress(
        &self,
        document_id: &str,
        task: &str,
        percentage: u8,
        progress_info: Option<&str>,
    ) {
        let record = {
            let mut records = self.lock();
            let record = records
                .entry(document_id.to_string())
                .or_insert_with(|| ProgressRecord::empty(ProgressStatus::Processing));
            record.task = Some(task.to_string());
            record.percentage = percentage.min(100);
            record.progress_info = progress_info.map(str::to_string);
            record.status = ProgressStatus::Processing;
            record.error_message = None;
            record.last_updated = Utc::now();
            record.clone()
        };
        self.publish(document_id, Some(record));
    }

    /// Sets the status. The error message is kept only for `Error`.
    pub fn set_status(
        &self,
        document_id: &str,
        status: ProgressStatus,
        error_message: Option<&str>,
    ) {
        let record = {
            let mut records = self.lock();
            let record = records
                .entry(document_id.to_string())
                .or_insert_with(|| ProgressRecord::empty(status));
            record.status = status;
            record.error_message = match status {
                ProgressStatus::Error => error_message.map(str::to_string),
                _ => None,
            };
            if status == ProgressStatus::Completed {
                record.percentage = 100;
            }
            record.last_updated = Utc::now();
            record.clone()
        };
        self.publish(document_id, Some(record));
    }

    pub fn get(&self, document_id: &str) -> Option<ProgressRecord> {
        self.lock().get(document_id).cloned()
    }

    pub fn clear(&self, document_id: &str) {
        let removed = self.lock().remove(document_id).is_some();
        if removed {
            self.publish(document_id, None);
        }
    }

    /// Snapshot of every tracked document, for debugging.
    pub fn all(&self) -> HashMap<String, ProgressRecord> {
        self.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, document_id: &str, record: Option<ProgressRecord>) {
        // No active receivers is fine
        let _ = self.sender.send(ProgressEvent {
            document_id: document_id.to_string(),
            record,
        });
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProgressRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Progress tracker lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_update_progress_sets_processing() {
        let tracker = ProgressTracker::default();
        tracker.update_progress("doc", "Recognizing Text", 40, Some("4/10"));

        let record = tracker.get("doc").unwrap();
        assert_eq!(record.task.as_deref(), Some("Recognizing Text"));
        assert_eq!(record.percentage, 40);
        assert_eq!(record.progress_info.as_deref(), Some("4/10"));
        assert_eq!(record.status, ProgressStatus::Processing);
        assert_eq!(record.error_message, None);
    }

    #[test]
    fn test_out_of_order_updates_overwrite() {
        let tracker = ProgressTracker::default();
        tracker.update_progress("doc", "Layout", 80, None);
        tracker.update_progress("doc", "Layout", 30, None);
        assert_eq!(tracker.get("doc").unwrap().percentage, 30);
    }

    #[test]
    fn test_percentage_is_clamped() {
        let tracker = ProgressTracker::default();
        tracker.update_progress("doc", "Layout", 250, None);
        assert_eq!(tracker.get("doc").unwrap().percentage, 100);
    }

    #[test]
    fn test_error_message_only_kept_for_error() {
        let tracker = ProgressTracker::default();
        tracker.set_status("doc", ProgressStatus::Error, Some("OCR processing failed: x"));
        assert_eq!(
            tracker.get("doc").unwrap().error_message.as_deref(),
            Some("OCR processing failed: x")
        );

        tracker.set_status("doc", ProgressStatus::Processing, Some("stale"));
        assert_eq!(tracker.get("doc").unwrap().error_message, None);

        tracker.set_status("doc", ProgressStatus::Error, Some("again"));
        tracker.update_progress("doc", "Retry", 5, None);
        let record = tracker.get("doc").unwrap();
        assert_eq!(record.status, ProgressStatus::Processing);
        assert_eq!(record.error_message, None);
    }

    #[test]
    fn test_completed_reports_full_percentage() {
        let tracker = ProgressTracker::default();
        tracker.update_progress("doc", "Layout", 70, None);
        tracker.set_status("doc", ProgressStatus::Completed, None);
        let record = tracker.get("doc").unwrap();
        assert_eq!(record.status, ProgressStatus::Completed);
        assert_eq!(record.percentage, 100);
    }

    #[test]
    fn test_clear_and_absent() {
        let tracker = ProgressTracker::default();
        assert!(tracker.get("doc").is_none());
        tracker.update_progress("doc", "Layout", 10, None);
        tracker.clear("doc");
        assert!(tracker.get("doc").is_none());
        assert!(tracker.all().is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let tracker = ProgressTracker::default();
        let mut rx = tracker.subscribe();

        tracker.update_progress("doc", "Layout", 10, None);
        tracker.clear("doc");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.document_id, "doc");
        assert_eq!(first.record.unwrap().percentage, 10);

        let second = rx.recv().await.unwrap();
        assert!(second.record.is_none());
    }

    #[test]
    fn test_concurrent_updates_are_isolated_per_document() {
        let tracker = Arc::new(ProgressTracker::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let id = format!("doc-{}", i);
                    for pct in 0..=100u8 {
                        tracker.update_progress(&id, "Layout", pct, None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let all = tracker.all();
        assert_eq!(all.len(), 8);
        assert!(all.values().all(|r| r.percentage == 100));
    }
}
