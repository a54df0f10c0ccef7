//! Progress hooks.

use crate::checkpoint::ChunkCheckpointKey;

/// Receives progress events from the restore pipeline
pub trait ProgressObserver: Send + Sync {
    /// A batch reached both engine writers
    fn batch_delivered(&self, _table: &str, _engine_id: i32, _kvs: u64, _bytes: u64) {}

    fn chunk_finished(&self, _table: &str, _engine_id: i32, _key: &ChunkCheckpointKey) {}

    fn engine_imported(&self, _table: &str, _engine_id: i32) {}
}

/// Ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}
