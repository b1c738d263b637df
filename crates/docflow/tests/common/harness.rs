//! Test harness for isolated docflow instances.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use docflow::config::Config;
use docflow::error::ConversionError;
use docflow::extract::DisabledExtractor;
use docflow::{Converter, DiagnosticSink, Docflow};

/// Progress lines in the shapes the converter is known to print.
pub const FULL_LINE: &str = "Recognizing Text: 30%|###       | 12/40 [00:05<00:12,  2.10it/s]";
pub const MEDIUM_LINE: &str = "Detecting layout: 55% done, page 11/20";
pub const MINIMAL_LINE: &str = "Loading models: 80%";
pub const DRIFT_LINE: &str = "[stage] 40% | working";

/// Converter that writes scripted lines to its sink, optionally waits for
/// a gate to open, then returns a fixed outcome.
pub struct ScriptedConverter {
    lines: Vec<String>,
    outcome: Result<String, String>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl ScriptedConverter {
    pub fn succeeding(text: &str) -> Self {
        Self {
            lines: Vec::new(),
            outcome: Ok(text.to_string()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            ..Self::succeeding("")
        }
    }

    pub fn with_lines(mut self, lines: &[&str]) -> Self {
        self.lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Holds every conversion after its lines until `open_gate` is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1024);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for ScriptedConverter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn convert(
        &self,
        input: &Path,
        sink: &dyn DiagnosticSink,
    ) -> Result<String, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.is_file(), "converter input {} missing", input.display());

        for line in &self.lines {
            sink.write_line(line);
        }
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        self.outcome.clone().map_err(ConversionError::Failed)
    }
}

/// Isolated environment: a temp data directory and an input directory.
pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Harness whose default config is adjusted by `f` before use.
    pub fn with_config(f: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        let mut config = Config::with_data_directory(temp_dir.path().join("data"));
        config.extraction.enabled = false;
        f(&mut config);

        Self {
            temp_dir,
            input_dir,
            config,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    /// Opens a `Docflow` over this harness's data directory.
    pub fn open(&self, converter: Arc<ScriptedConverter>) -> Docflow {
        Docflow::open_with(
            &self.config,
            converter,
            Arc::new(DisabledExtractor::new("disabled in tests")),
        )
        .expect("Failed to open docflow")
    }

    /// Writes an input file and ingests it.
    pub fn ingest(&self, docflow: &Docflow, filename: &str) -> String {
        let source = self.write_input(filename, b"%PDF-1.7 test document");
        docflow
            .ingest(filename, &source)
            .expect("Failed to ingest document")
            .id
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
