//! Backend Module
//!
//! Storage backends receive encoded KV pairs through per-chunk engine
//! writers and later import whole engines into the target.
//!
//! ## Engine Lifecycle
//! ```text
//!   open_engine ──► OpenedEngine ──local_writer()──► EngineWriter (per chunk)
//!        │
//!        └─ close() ──► ClosedEngine ──import()──► cleanup()
//! ```
//! Engines are identified by `(table, engine_id)`; engine `-1` is the
//! table's index engine.

pub mod local;

use std::sync::Arc;

use crate::error::{LoadError, Result};
use crate::kv::{Encoder, KvPair, TableKvEncoder};
use crate::schema::TableInfo;

pub use local::LocalBackend;

// =============================================================================
// Traits
// =============================================================================

/// Receives the KV pairs of one chunk for one engine
pub trait EngineWriter: Send {
    /// Append pairs. `columns` names the source columns, in source order.
    fn append_rows(&mut self, table: &str, columns: &[String], rows: Vec<KvPair>) -> Result<()>;

    /// True once everything appended so far is durable
    fn is_synced(&self) -> bool;

    /// Flush and release the writer
    fn close(&mut self) -> Result<()>;
}

/// Local disk usage of one engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineUsage {
    pub table: String,
    pub engine_id: i32,
    pub disk_size: u64,
}

/// A storage backend
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    fn open_engine(&self, table: &str, engine_id: i32) -> Result<()>;

    fn local_writer(&self, table: &str, engine_id: i32) -> Result<Box<dyn EngineWriter>>;

    fn close_engine(&self, table: &str, engine_id: i32) -> Result<()>;

    fn import_engine(&self, table: &str, engine_id: i32) -> Result<()>;

    fn cleanup_engine(&self, table: &str, engine_id: i32) -> Result<()>;

    fn new_encoder(&self, info: Arc<TableInfo>) -> Result<Box<dyn Encoder>> {
        Ok(Box::new(TableKvEncoder::new(info)))
    }

    /// Make every writer's buffered data durable (used by the quota checker)
    fn flush_all_engines(&self) -> Result<()> {
        Ok(())
    }

    /// Import what an open engine holds so far and empty it, keeping it
    /// open for further writes
    fn import_and_reset(&self, table: &str, engine_id: i32) -> Result<()> {
        Err(LoadError::Backend(format!(
            "{} backend cannot import open engine {}:{}",
            self.name(),
            table,
            engine_id
        )))
    }

    /// Disk usage per open engine, largest first
    fn engine_disk_usage(&self) -> Vec<EngineUsage> {
        Vec::new()
    }
}

// =============================================================================
// Typestate Handles
// =============================================================================

/// An engine accepting writes
pub struct OpenedEngine {
    backend: Arc<dyn Backend>,
    table: String,
    engine_id: i32,
}

impl OpenedEngine {
    pub fn open(backend: Arc<dyn Backend>, table: &str, engine_id: i32) -> Result<Self> {
        backend.open_engine(table, engine_id)?;
        tracing::debug!(table = %table, engine_id, backend = backend.name(), "open engine");
        Ok(Self {
            backend,
            table: table.to_string(),
            engine_id,
        })
    }

    pub fn engine_id(&self) -> i32 {
        self.engine_id
    }

    pub fn local_writer(&self) -> Result<Box<dyn EngineWriter>> {
        self.backend.local_writer(&self.table, self.engine_id)
    }

    /// Stop accepting writes
    pub fn close(self) -> Result<ClosedEngine> {
        self.backend.close_engine(&self.table, self.engine_id)?;
        tracing::debug!(table = %self.table, engine_id = self.engine_id, "close engine");
        Ok(ClosedEngine {
            backend: self.backend,
            table: self.table,
            engine_id: self.engine_id,
        })
    }
}

/// An engine that no longer accepts writes
pub struct ClosedEngine {
    backend: Arc<dyn Backend>,
    table: String,
    engine_id: i32,
}

impl ClosedEngine {
    /// Handle for an engine already closed in an earlier run
    pub fn unsafe_closed(backend: Arc<dyn Backend>, table: &str, engine_id: i32) -> Result<Self> {
        backend.close_engine(table, engine_id)?;
        Ok(Self {
            backend,
            table: table.to_string(),
            engine_id,
        })
    }

    pub fn engine_id(&self) -> i32 {
        self.engine_id
    }

    pub fn import(&self) -> Result<()> {
        self.backend.import_engine(&self.table, self.engine_id)
    }

    pub fn cleanup(self) -> Result<()> {
        self.backend.cleanup_engine(&self.table, self.engine_id)
    }
}
