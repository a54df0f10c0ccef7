//! Error summary tests
//!
//! These tests verify:
//! - Failures are recorded per table with the status reached
//! - A later failure of the same table replaces the earlier one

use dumpload::checkpoint::CheckpointStatus;
use dumpload::restore::{ErrorSummaries, ErrorSummary};

#[test]
fn test_record_failures() {
    let summaries = ErrorSummaries::new();
    assert!(summaries.is_empty());

    summaries.record("first", "a1 error", CheckpointStatus::Analyzed);
    summaries.record("second", "b2 error", CheckpointStatus::AllWritten);

    assert_eq!(summaries.len(), 2);
    assert_eq!(
        summaries.get("first"),
        Some(ErrorSummary {
            status: CheckpointStatus::Analyzed,
            error: "a1 error".to_string(),
        })
    );
    assert_eq!(summaries.get("second").unwrap().status, CheckpointStatus::AllWritten);
    assert_eq!(summaries.get("third"), None);
    summaries.emit_log();
}

#[test]
fn test_later_failure_replaces_earlier() {
    let summaries = ErrorSummaries::new();
    summaries.record("first", "a1 error", CheckpointStatus::Loaded);
    summaries.record("first", "a2 error", CheckpointStatus::Closed);

    assert_eq!(summaries.len(), 1);
    let summary = summaries.get("first").unwrap();
    assert_eq!(summary.error, "a2 error");
    assert_eq!(summary.status, CheckpointStatus::Closed);
}
