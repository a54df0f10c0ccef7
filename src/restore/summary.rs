//! Per-table failure records collected during a run.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::checkpoint::CheckpointStatus;

/// Last error of a failed table and the status it had reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSummary {
    pub status: CheckpointStatus,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ErrorSummaries {
    summary: Mutex<BTreeMap<String, ErrorSummary>>,
}

impl ErrorSummaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a table failure; a later failure of the same table replaces it
    pub fn record(&self, table: &str, error: impl ToString, status: CheckpointStatus) {
        self.summary.lock().insert(
            table.to_string(),
            ErrorSummary {
                status,
                error: error.to_string(),
            },
        );
    }

    pub fn get(&self, table: &str) -> Option<ErrorSummary> {
        self.summary.lock().get(table).cloned()
    }

    pub fn len(&self) -> usize {
        self.summary.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.summary.lock().is_empty()
    }

    /// Log every failed table
    pub fn emit_log(&self) {
        let summary = self.summary.lock();
        if summary.is_empty() {
            return;
        }
        tracing::error!(count = summary.len(), "tables failed to be imported");
        for (table, entry) in summary.iter() {
            tracing::error!(
                table = %table,
                status = %entry.status,
                error = %entry.error,
                "import failed"
            );
        }
    }
}
