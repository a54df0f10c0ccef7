//! Table Restore
//!
//! Drives one table from plan to verified import:
//!
//! ```text
//!   plan (if empty) ─► data engines in order ─► AllWritten ─► index engine ─► Imported ─► Checksummed
//!                        │
//!                        ├─ status >= Imported: skip
//!                        ├─ status >= Closed:   import only
//!                        └─ otherwise: restore pending chunks on the region pool,
//!                           close, import, cleanup
//! ```
//!
//! Status changes are applied to the in-memory checkpoint and queued on the
//! save channel. Statuses only move forward.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel;
use parking_lot::Mutex;

use super::Controller;
use crate::backend::{ClosedEngine, OpenedEngine};
use crate::checkpoint::{
    ChunkCheckpoint, CheckpointStatus, SaveCheckpoint, TableCheckpoint, INDEX_ENGINE_ID,
};
use crate::error::{LoadError, Result};
use crate::kv::compare_checksum;
use crate::pipeline::{save_checkpoint, ChunkRestore, PipelineContext, TableContext};
use crate::planner::ChunkPlanner;
use crate::schema::TableInfo;
use crate::source::TableMeta;

pub struct TableRestore {
    table_name: String,
    meta: TableMeta,
    info: Arc<TableInfo>,
    checkpoint: TableCheckpoint,
    ignore_columns: Vec<String>,
}

impl TableRestore {
    pub fn new(
        meta: TableMeta,
        info: Arc<TableInfo>,
        checkpoint: TableCheckpoint,
        ignore_columns: Vec<String>,
    ) -> Self {
        Self {
            table_name: info.unique_name(),
            meta,
            info,
            checkpoint,
            ignore_columns,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn checkpoint(&self) -> &TableCheckpoint {
        &self.checkpoint
    }

    pub fn status(&self) -> CheckpointStatus {
        self.checkpoint.status
    }

    /// Restore every pending engine, import the index engine and verify
    /// the result.
    pub fn restore(&mut self, rc: &Controller, pipeline: &PipelineContext) -> Result<()> {
        let start = Instant::now();
        if self.checkpoint.is_empty() {
            self.populate_chunks(rc)?;
        }
        tracing::info!(
            table = %self.table_name,
            status = %self.checkpoint.status,
            engines = self.checkpoint.engines.len(),
            chunks = self.checkpoint.count_chunks(),
            "restore table start"
        );

        self.restore_engines(rc, pipeline)?;
        self.post_process(rc, pipeline)?;

        tracing::info!(
            table = %self.table_name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "restore table completed"
        );
        Ok(())
    }

    fn populate_chunks(&mut self, rc: &Controller) -> Result<()> {
        let clock = Arc::clone(&rc.clock);
        let planner = ChunkPlanner::new(&rc.cfg, rc.store.as_ref(), &rc.io_workers, &rc.cancel)
            .with_clock(move || (*clock)());
        planner.populate_chunks(&self.meta, &self.info, &self.ignore_columns, &mut self.checkpoint)?;
        rc.checkpoints.insert_engines(&self.table_name, &self.checkpoint)
    }

    // =========================================================================
    // Engines
    // =========================================================================

    fn restore_engines(&mut self, rc: &Controller, pipeline: &PipelineContext) -> Result<()> {
        let index_status = self.engine_status(INDEX_ENGINE_ID);
        let mut index_engine = None;

        if self.checkpoint.status < CheckpointStatus::AllWritten {
            if index_status < CheckpointStatus::Closed {
                index_engine = Some(OpenedEngine::open(
                    Arc::clone(&rc.backend),
                    &self.table_name,
                    INDEX_ENGINE_ID,
                )?);
            }

            let data_engines: Vec<(i32, CheckpointStatus)> = self
                .checkpoint
                .engines
                .iter()
                .filter(|(&id, _)| id != INDEX_ENGINE_ID)
                .map(|(&id, engine)| (id, engine.status))
                .collect();

            for (engine_id, status) in data_engines {
                if status >= CheckpointStatus::Imported {
                    continue;
                }
                let closed = if status >= CheckpointStatus::Closed {
                    ClosedEngine::unsafe_closed(Arc::clone(&rc.backend), &self.table_name, engine_id)?
                } else {
                    let Some(index) = &index_engine else {
                        return Err(LoadError::Checkpoint(format!(
                            "index engine of {} is closed while engine {} is still open",
                            self.table_name, engine_id
                        )));
                    };
                    self.restore_engine(rc, pipeline, engine_id, index)?
                };
                self.import_kv(pipeline, closed)?;
            }

            self.set_table_status(pipeline, CheckpointStatus::AllWritten);
        }

        if index_status >= CheckpointStatus::Imported {
            return Ok(());
        }
        let closed = match index_engine {
            Some(index) => index.close()?,
            None => ClosedEngine::unsafe_closed(Arc::clone(&rc.backend), &self.table_name, INDEX_ENGINE_ID)?,
        };
        self.set_engine_status(pipeline, INDEX_ENGINE_ID, CheckpointStatus::Closed);
        self.import_kv(pipeline, closed)?;
        self.set_table_status(pipeline, CheckpointStatus::Imported);
        Ok(())
    }

    /// Restore the unfinished chunks of one data engine, then close it
    fn restore_engine(
        &mut self,
        rc: &Controller,
        pipeline: &PipelineContext,
        engine_id: i32,
        index_engine: &OpenedEngine,
    ) -> Result<ClosedEngine> {
        let start = Instant::now();
        let data_engine = OpenedEngine::open(Arc::clone(&rc.backend), &self.table_name, engine_id)?;

        let pending: Vec<ChunkCheckpoint> = self
            .checkpoint
            .engines
            .get(&engine_id)
            .map(|engine| {
                engine
                    .chunks
                    .iter()
                    .filter(|c| c.status < CheckpointStatus::AllWritten && !c.chunk.is_finished())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        tracing::info!(
            table = %self.table_name,
            engine_id,
            pending = pending.len(),
            "restore engine start"
        );

        let table = TableContext::new(Arc::clone(&self.info), self.ignore_columns.clone());
        let finished = Mutex::new(Vec::with_capacity(pending.len()));
        let first_error: Mutex<Option<LoadError>> = Mutex::new(None);
        let workers = rc.region_workers.limit().min(pending.len()).max(1);

        let (job_tx, job_rx) = channel::unbounded();
        for chunk in pending {
            let _ = job_tx.send(chunk);
        }
        drop(job_tx);

        let this = &*self;
        thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| {
                    while let Ok(chunk) = job_rx.recv() {
                        if first_error.lock().is_some() || pipeline.cancel.is_canceled() {
                            break;
                        }
                        match this.restore_chunk(rc, pipeline, &table, engine_id, &data_engine, index_engine, chunk) {
                            Ok(done) => finished.lock().push(done),
                            Err(e) => {
                                first_error.lock().get_or_insert(e);
                                break;
                            }
                        }
                    }
                });
            }
        });

        for done in finished.into_inner() {
            self.replace_chunk(engine_id, done);
        }
        if let Some(e) = first_error.into_inner() {
            return Err(e);
        }
        pipeline.cancel.check()?;

        let closed = data_engine.close()?;
        self.set_engine_status(pipeline, engine_id, CheckpointStatus::Closed);
        tracing::info!(
            table = %self.table_name,
            engine_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "restore engine completed"
        );
        Ok(closed)
    }

    #[allow(clippy::too_many_arguments)]
    fn restore_chunk(
        &self,
        rc: &Controller,
        pipeline: &PipelineContext,
        table: &TableContext,
        engine_id: i32,
        data_engine: &OpenedEngine,
        index_engine: &OpenedEngine,
        chunk: ChunkCheckpoint,
    ) -> Result<ChunkCheckpoint> {
        let key = chunk.key.clone();
        let _worker = rc.region_workers.apply(&pipeline.cancel)?;
        let start = Instant::now();

        match self.run_chunk(rc, pipeline, table, engine_id, data_engine, index_engine, chunk) {
            Ok(done) => {
                pipeline.save(SaveCheckpoint::ChunkStatus {
                    table: self.table_name.clone(),
                    engine_id,
                    key: key.clone(),
                    status: CheckpointStatus::AllWritten,
                });
                pipeline.observer.chunk_finished(&self.table_name, engine_id, &key);
                tracing::info!(
                    table = %self.table_name,
                    engine_id,
                    chunk = %key,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "restore chunk completed"
                );
                Ok(done)
            }
            Err(e) => {
                if !e.is_canceled() {
                    tracing::error!(table = %self.table_name, engine_id, chunk = %key, error = %e, "restore chunk failed");
                    pipeline.save(SaveCheckpoint::ChunkStatus {
                        table: self.table_name.clone(),
                        engine_id,
                        key,
                        status: CheckpointStatus::Failed,
                    });
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_chunk(
        &self,
        rc: &Controller,
        pipeline: &PipelineContext,
        table: &TableContext,
        engine_id: i32,
        data_engine: &OpenedEngine,
        index_engine: &OpenedEngine,
        chunk: ChunkCheckpoint,
    ) -> Result<ChunkCheckpoint> {
        let mut cr = ChunkRestore::new(&rc.cfg, chunk, rc.store.as_ref(), &rc.io_workers, &pipeline.cancel)?;
        let mut encoder = rc.backend.new_encoder(Arc::clone(&self.info))?;
        let mut data_writer = data_engine.local_writer()?;
        let mut index_writer = index_engine.local_writer()?;

        let restored = cr.restore(
            pipeline,
            table,
            engine_id,
            encoder.as_mut(),
            data_writer.as_mut(),
            index_writer.as_mut(),
        );
        encoder.close();
        if let Err(e) = cr.close() {
            tracing::warn!(chunk = %cr.chunk.key, error = %e, "failed to close parser");
        }

        if let Err(e) = restored {
            for writer in [&mut data_writer, &mut index_writer] {
                if let Err(close_err) = writer.close() {
                    tracing::warn!(chunk = %cr.chunk.key, error = %close_err, "failed to close writer");
                }
            }
            return Err(e);
        }

        data_writer.close()?;
        index_writer.close()?;
        // Both writers are synced once closed
        save_checkpoint(pipeline, &self.table_name, engine_id, &cr.chunk);
        cr.chunk.status = CheckpointStatus::AllWritten;
        Ok(cr.chunk)
    }

    /// Import a closed engine into the target and drop its local data
    fn import_kv(&mut self, pipeline: &PipelineContext, closed: ClosedEngine) -> Result<()> {
        let engine_id = closed.engine_id();
        let start = Instant::now();
        closed.import()?;
        self.set_engine_status(pipeline, engine_id, CheckpointStatus::Imported);
        pipeline.observer.engine_imported(&self.table_name, engine_id);
        closed.cleanup()?;
        tracing::info!(
            table = %self.table_name,
            engine_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "import engine completed"
        );
        Ok(())
    }

    // =========================================================================
    // Post-processing
    // =========================================================================

    fn post_process(&mut self, rc: &Controller, pipeline: &PipelineContext) -> Result<()> {
        if self.checkpoint.status >= CheckpointStatus::Checksummed || !rc.cfg.checksum {
            return Ok(());
        }
        let Some(manager) = &rc.checksum_manager else {
            tracing::warn!(table = %self.table_name, "no checksum manager, skip checksum");
            return Ok(());
        };

        let local = self.checkpoint.checksum();
        let remote = manager.checksum(&self.info)?;
        compare_checksum(&self.table_name, &remote, &local)?;
        self.set_table_status(pipeline, CheckpointStatus::Checksummed);
        Ok(())
    }

    // =========================================================================
    // Checkpoint Helpers
    // =========================================================================

    fn engine_status(&self, engine_id: i32) -> CheckpointStatus {
        self.checkpoint
            .engines
            .get(&engine_id)
            .map(|e| e.status)
            .unwrap_or(CheckpointStatus::Missing)
    }

    fn set_engine_status(&mut self, pipeline: &PipelineContext, engine_id: i32, status: CheckpointStatus) {
        if self.engine_status(engine_id) >= status {
            return;
        }
        let update = SaveCheckpoint::EngineStatus {
            table: self.table_name.clone(),
            engine_id,
            status,
        };
        self.checkpoint.apply(&update);
        pipeline.save(update);
    }

    fn set_table_status(&mut self, pipeline: &PipelineContext, status: CheckpointStatus) {
        if self.checkpoint.status >= status {
            return;
        }
        let update = SaveCheckpoint::TableStatus {
            table: self.table_name.clone(),
            status,
        };
        self.checkpoint.apply(&update);
        pipeline.save(update);
    }

    /// Record a failure of this table, even if it had advanced further
    pub(super) fn mark_failed(&self, pipeline: &PipelineContext) {
        let update = SaveCheckpoint::TableStatus {
            table: self.table_name.clone(),
            status: CheckpointStatus::Failed,
        };
        pipeline.save(update);
    }

    fn replace_chunk(&mut self, engine_id: i32, done: ChunkCheckpoint) {
        let Some(engine) = self.checkpoint.engines.get_mut(&engine_id) else {
            return;
        };
        if let Some(slot) = engine.chunks.iter_mut().find(|c| c.key == done.key) {
            *slot = done;
        }
    }
}
