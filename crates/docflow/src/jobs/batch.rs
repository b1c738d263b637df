use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub document_id: String,
    pub error: String,
}

impl BatchFailure {
    pub fn new(document_id: &str, error: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            error: error.to_string(),
        }
    }
}

/// Result of a synchronous batch parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total_requested: usize,
    pub processed: Vec<String>,
    pub already_parsed: Vec<String>,
    pub failed: Vec<BatchFailure>,
    pub not_found: Vec<String>,
    /// Documents parsed after the batch: newly processed plus already parsed.
    pub total_processed: usize,
    /// Percentage of requested documents that are parsed after the batch,
    /// rounded to two decimals.
    pub success_rate: f64,
}

impl BatchSummary {
    pub(crate) fn new(total_requested: usize) -> Self {
        Self {
            total_requested,
            processed: Vec::new(),
            already_parsed: Vec::new(),
            failed: Vec::new(),
            not_found: Vec::new(),
            total_processed: 0,
            success_rate: 0.0,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.total_processed = self.processed.len() + self.already_parsed.len();
        self.success_rate = success_rate(self.total_processed, self.total_requested);
        self
    }
}

fn success_rate(succeeded: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = succeeded as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}
