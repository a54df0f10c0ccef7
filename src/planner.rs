//! Chunk Planner
//!
//! Turns a table's source files into the checkpoint tree: chunks with
//! disjoint row-id reservations, grouped into data engines, plus the
//! index engine.
//!
//! Planning is all-or-nothing per table; a non-empty checkpoint is never
//! replanned.

use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::checkpoint::{
    ChunkCheckpoint, CheckpointStatus, EngineCheckpoint, TableCheckpoint, INDEX_ENGINE_ID,
};
use crate::concurrency::{CancelToken, WorkerPool};
use crate::config::Config;
use crate::error::Result;
use crate::schema::{parse_column_permutation, TableInfo};
use crate::source::{split_regions, SourceStore, TableMeta};

/// Seconds since the Unix epoch
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Builds checkpoint trees for tables
pub struct ChunkPlanner<'a> {
    cfg: &'a Config,
    store: &'a dyn SourceStore,
    io_workers: &'a WorkerPool,
    cancel: &'a CancelToken,
    clock: Box<dyn Fn() -> i64 + Send + Sync + 'a>,
}

impl<'a> ChunkPlanner<'a> {
    pub fn new(
        cfg: &'a Config,
        store: &'a dyn SourceStore,
        io_workers: &'a WorkerPool,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            cfg,
            store,
            io_workers,
            cancel,
            clock: Box::new(unix_now),
        }
    }

    /// Replace the clock used for chunk timestamps
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Fill an empty checkpoint with the planned engines and chunks.
    /// `cp` is left untouched on error.
    pub fn populate_chunks(
        &self,
        meta: &TableMeta,
        info: &TableInfo,
        ignore_columns: &[String],
        cp: &mut TableCheckpoint,
    ) -> Result<()> {
        if !cp.is_empty() {
            return Ok(());
        }

        let table = meta.unique_name();
        let start = Instant::now();
        tracing::info!(table = %table, files = meta.data_files.len(), "load engines and files");

        let regions = split_regions(self.cfg, self.store, meta, info, self.io_workers, self.cancel)?;
        let timestamp = (self.clock)();

        let mut engines: BTreeMap<i32, EngineCheckpoint> = BTreeMap::new();
        let mut max_row_id = 0;
        for region in regions {
            let mut chunk = ChunkCheckpoint::new(region.file, region.chunk, timestamp);
            if !chunk.chunk.columns.is_empty() {
                chunk.column_permutation =
                    parse_column_permutation(info, &chunk.chunk.columns, ignore_columns)?;
            }
            max_row_id = max_row_id.max(chunk.chunk.row_id_max);
            engines
                .entry(region.engine_id)
                .or_insert_with(|| EngineCheckpoint::new(CheckpointStatus::Loaded))
                .chunks
                .push(chunk);
        }
        engines.insert(INDEX_ENGINE_ID, EngineCheckpoint::new(CheckpointStatus::Loaded));

        let chunks: usize = engines.values().map(|e| e.chunks.len()).sum();
        tracing::info!(
            table = %table,
            engines = engines.len(),
            chunks,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "load engines and files completed"
        );

        cp.engines = engines;
        cp.alloc_base = cp.alloc_base.max(max_row_id);
        if cp.status < CheckpointStatus::Loaded {
            cp.status = CheckpointStatus::Loaded;
        }
        Ok(())
    }
}
