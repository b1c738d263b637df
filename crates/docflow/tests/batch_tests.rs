//! Synchronous batch parsing.

mod common;

use std::sync::Arc;

use common::{ScriptedConverter, TestHarness};
use docflow::{DocumentStatus, ProgressStatus};

#[tokio::test]
async fn test_batch_classifies_every_outcome() {
    let harness = TestHarness::new();
    let docflow = harness.open(Arc::new(ScriptedConverter::succeeding("<p>ok</p>")));

    let fresh = harness.ingest(&docflow, "fresh.pdf");
    let parsed = harness.ingest(&docflow, "parsed.pdf");
    let busy = harness.ingest(&docflow, "busy.pdf");
    let orphan = harness.ingest(&docflow, "orphan.pdf");

    docflow.parse_batch(&[parsed.clone()]).await;
    docflow
        .registry()
        .update_status(&busy, DocumentStatus::Parsing, None)
        .unwrap();

    let record = docflow.document(&orphan).unwrap();
    std::fs::remove_file(&record.paths.canonical_copy_path).unwrap();
    std::fs::remove_file(&record.source_path).unwrap();

    let ids = vec![
        fresh.clone(),
        parsed.clone(),
        busy.clone(),
        "does-not-exist".to_string(),
        orphan.clone(),
    ];
    let summary = docflow.parse_batch(&ids).await;

    assert_eq!(summary.total_requested, 5);
    assert_eq!(summary.processed, vec![fresh.clone()]);
    assert_eq!(summary.already_parsed, vec![parsed]);
    assert_eq!(summary.not_found, vec!["does-not-exist".to_string()]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].document_id, orphan);
    assert_eq!(summary.total_processed, 2);
    // 2 of 5; the skipped document still counts in the denominator.
    assert_eq!(summary.success_rate, 40.0);

    assert_eq!(docflow.document(&fresh).unwrap().status, DocumentStatus::Parsed);
    assert_eq!(docflow.document(&busy).unwrap().status, DocumentStatus::Parsing);

    let orphan_record = docflow.document(&orphan).unwrap();
    assert_eq!(orphan_record.status, DocumentStatus::Error);
    assert_eq!(
        orphan_record.error_message.as_deref(),
        Some("Source file not found")
    );
}

#[tokio::test]
async fn test_batch_returns_after_all_conversions_finish() {
    let harness = TestHarness::new();
    let converter = Arc::new(ScriptedConverter::succeeding("<p>ok</p>"));
    let docflow = harness.open(Arc::clone(&converter));
    let ids: Vec<String> = (0..3)
        .map(|i| harness.ingest(&docflow, &format!("doc-{}.pdf", i)))
        .collect();

    let summary = docflow.parse_batch(&ids).await;

    assert_eq!(summary.processed, ids);
    assert_eq!(summary.success_rate, 100.0);
    assert_eq!(converter.calls(), 3);
    for id in &ids {
        assert_eq!(docflow.document(id).unwrap().status, DocumentStatus::Parsed);
        assert_eq!(
            docflow.tracked_progress(id).unwrap().status,
            ProgressStatus::Completed
        );
    }
}

#[tokio::test]
async fn test_batch_reports_conversion_failures() {
    let harness = TestHarness::new();
    let docflow = harness.open(Arc::new(ScriptedConverter::failing("unreadable page")));
    let a = harness.ingest(&docflow, "a.pdf");
    let b = harness.ingest(&docflow, "b.pdf");

    let summary = docflow.parse_batch(&[a.clone(), b.clone()]).await;

    assert!(summary.processed.is_empty());
    assert_eq!(summary.failed.len(), 2);
    assert_eq!(summary.failed[0].error, "OCR processing failed: unreadable page");
    assert_eq!(summary.success_rate, 0.0);
    assert_eq!(docflow.document(&a).unwrap().status, DocumentStatus::Error);
    assert_eq!(docflow.document(&b).unwrap().status, DocumentStatus::Error);
}

#[tokio::test]
async fn test_empty_batch() {
    let harness = TestHarness::new();
    let docflow = harness.open(Arc::new(ScriptedConverter::succeeding("x")));

    let summary = docflow.parse_batch(&[]).await;
    assert_eq!(summary.total_requested, 0);
    assert_eq!(summary.success_rate, 0.0);
}

#[tokio::test]
async fn test_duplicate_ids_parse_once() {
    let harness = TestHarness::new();
    let converter = Arc::new(ScriptedConverter::succeeding("<p>ok</p>"));
    let docflow = harness.open(Arc::clone(&converter));
    let id = harness.ingest(&docflow, "a.pdf");

    let summary = docflow.parse_batch(&[id.clone(), id.clone()]).await;

    assert_eq!(summary.processed, vec![id.clone()]);
    assert_eq!(summary.already_parsed, vec![id]);
    assert_eq!(summary.total_processed, 2);
    assert_eq!(summary.success_rate, 100.0);
    assert_eq!(converter.calls(), 1);
}
