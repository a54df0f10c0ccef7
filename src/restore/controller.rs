//! Restore Controller
//!
//! Owns everything shared by a run and drives all tables through
//! `TableRestore`.
//!
//! ## Threads
//! ```text
//!   restore_tables
//!     ├── checkpoint-saver        drains SaveCheckpoint updates into the store
//!     ├── disk-quota checker      every interval: exclusive lock + import large engines
//!     └── one thread per table    gated by the table worker pool
//!           └── region workers    gated by the region worker pool
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam::channel;

use super::{ErrorSummaries, TableRestore};
use crate::backend::{Backend, EngineUsage};
use crate::checkpoint::{CheckpointSaver, CheckpointStatus, CheckpointStore};
use crate::concurrency::{CancelToken, DiskQuotaLock, Pauser, WorkerPool};
use crate::config::Config;
use crate::error::{LoadError, Result};
use crate::kv::ChecksumManager;
use crate::pipeline::{NoopObserver, PipelineContext, ProgressObserver};
use crate::planner::unix_now;
use crate::schema::TableInfo;
use crate::source::{SourceStore, TableMeta};
use crate::validate::{check_large_csv, schema_is_valid};

/// Clock used for chunk timestamps
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub struct Controller {
    pub(super) cfg: Config,
    pub(super) store: Arc<dyn SourceStore>,
    pub(super) backend: Arc<dyn Backend>,
    pub(super) checkpoints: Arc<dyn CheckpointStore>,
    pub(super) checksum_manager: Option<Arc<dyn ChecksumManager>>,
    pub(super) observer: Arc<dyn ProgressObserver>,
    pub(super) clock: Clock,

    pub(super) cancel: CancelToken,
    pauser: Arc<Pauser>,
    disk_quota_lock: Arc<DiskQuotaLock>,

    table_workers: WorkerPool,
    pub(super) region_workers: WorkerPool,
    pub(super) io_workers: WorkerPool,

    tables: Vec<(TableMeta, Arc<TableInfo>)>,
    error_summaries: ErrorSummaries,
}

impl Controller {
    pub fn new(
        cfg: Config,
        store: Arc<dyn SourceStore>,
        backend: Arc<dyn Backend>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            table_workers: WorkerPool::new(cfg.table_concurrency, "table"),
            region_workers: WorkerPool::new(cfg.region_concurrency, "region"),
            io_workers: WorkerPool::new(cfg.io_concurrency, "io"),
            cfg,
            store,
            backend,
            checkpoints,
            checksum_manager: None,
            observer: Arc::new(NoopObserver),
            clock: Arc::new(unix_now),
            cancel: CancelToken::new(),
            pauser: Arc::new(Pauser::new()),
            disk_quota_lock: Arc::new(DiskQuotaLock::new()),
            tables: Vec::new(),
            error_summaries: ErrorSummaries::new(),
        })
    }

    pub fn with_checksum_manager(mut self, manager: Arc<dyn ChecksumManager>) -> Self {
        self.checksum_manager = Some(manager);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Register a table to restore
    pub fn add_table(&mut self, meta: TableMeta, info: TableInfo) {
        self.tables.push((meta, Arc::new(info)));
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn pauser(&self) -> &Arc<Pauser> {
        &self.pauser
    }

    pub fn disk_quota_lock(&self) -> &Arc<DiskQuotaLock> {
        &self.disk_quota_lock
    }

    pub fn error_summaries(&self) -> &ErrorSummaries {
        &self.error_summaries
    }

    // =========================================================================
    // Pre-checks
    // =========================================================================

    /// Validate every table's source columns against its target schema.
    /// Returns the problems found; the large CSV check only warns.
    pub fn pre_check(&self) -> Result<Vec<String>> {
        let mut msgs = Vec::new();
        for (meta, info) in &self.tables {
            msgs.extend(schema_is_valid(&self.cfg, self.store.as_ref(), meta, Some(info))?);
        }

        let metas: Vec<TableMeta> = self.tables.iter().map(|(meta, _)| meta.clone()).collect();
        let large_csv = check_large_csv(&self.cfg, &metas);
        tracing::info!(passed = large_csv.passed, "{}", large_csv.message);

        for msg in &msgs {
            tracing::error!(check = "schema", "{}", msg);
        }
        Ok(msgs)
    }

    // =========================================================================
    // Restore
    // =========================================================================

    /// Restore every registered table. Failed tables are recorded in
    /// `error_summaries` and do not stop the others.
    pub fn restore_tables(&self) -> Result<()> {
        let start = Instant::now();
        let (save_tx, saver) =
            CheckpointSaver::spawn(Arc::clone(&self.checkpoints), self.cfg.checkpoint_queue_size)?;
        let pipeline = PipelineContext::new(&self.cfg, self.cancel.clone())
            .with_pauser(Arc::clone(&self.pauser))
            .with_disk_quota_lock(Arc::clone(&self.disk_quota_lock))
            .with_save_channel(save_tx)
            .with_observer(Arc::clone(&self.observer));

        tracing::info!(tables = self.tables.len(), "restore all tables data start");
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        thread::scope(|s| {
            if self.cfg.disk_quota.is_some() {
                s.spawn(|| self.run_quota_checker(&stop_rx));
            }

            let handles: Vec<_> = self
                .tables
                .iter()
                .map(|(meta, info)| {
                    let pipeline = &pipeline;
                    s.spawn(move || self.restore_table(pipeline, meta, info))
                })
                .collect();
            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!("table restore thread panicked");
                }
            }
            drop(stop_tx);
        });

        drop(pipeline);
        let saved = saver.join();

        if self.cancel.is_canceled() {
            tracing::warn!("restore all tables data canceled");
            return Err(LoadError::Canceled);
        }
        if !self.error_summaries.is_empty() {
            self.error_summaries.emit_log();
            return Err(LoadError::TablesFailed(self.error_summaries.len()));
        }
        saved?;
        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "restore all tables data completed"
        );
        Ok(())
    }

    fn restore_table(&self, pipeline: &PipelineContext, meta: &TableMeta, info: &Arc<TableInfo>) {
        let table_name = info.unique_name();
        let _worker = match self.table_workers.apply(&self.cancel) {
            Ok(worker) => worker,
            Err(_) => return,
        };

        let ignore = self.cfg.ignored_columns_for(&info.db, &info.name);
        let checkpoint = match self.checkpoints.load(&table_name) {
            Ok(cp) => cp,
            Err(e) => {
                tracing::error!(table = %table_name, error = %e, "failed to load checkpoint");
                self.error_summaries
                    .record(&table_name, e, CheckpointStatus::Missing);
                return;
            }
        };

        let mut tr = TableRestore::new(meta.clone(), Arc::clone(info), checkpoint, ignore);
        if let Err(e) = tr.restore(self, pipeline) {
            if e.is_canceled() {
                return;
            }
            tracing::error!(table = %table_name, status = %tr.status(), error = %e, "restore table failed");
            self.error_summaries.record(&table_name, &e, tr.status());
            tr.mark_failed(pipeline);
        }
    }

    // =========================================================================
    // Disk Quota
    // =========================================================================

    fn run_quota_checker(&self, stop: &channel::Receiver<()>) {
        let interval = self.cfg.disk_quota_check_interval;
        loop {
            let tick = crossbeam::select! {
                recv(stop) -> _ => false,
                recv(self.cancel.done()) -> _ => false,
                default(interval) => true,
            };
            if !tick {
                break;
            }
            if let Err(e) = self.enforce_disk_quota() {
                tracing::warn!(error = %e, "disk quota check failed");
            }
        }
        tracing::debug!("disk quota checker stopped");
    }

    /// Import the largest open engines until local usage fits the quota.
    /// Every deliverer is held off while this runs. Returns whether any
    /// engine was imported.
    pub fn enforce_disk_quota(&self) -> Result<bool> {
        let Some(quota) = self.cfg.disk_quota else {
            return Ok(false);
        };
        let usage = self.backend.engine_disk_usage();
        let large = large_engines(&usage, quota);
        if large.is_empty() {
            return Ok(false);
        }

        let total: u64 = usage.iter().map(|u| u.disk_size).sum();
        tracing::warn!(
            total_size = total,
            quota,
            engines = large.len(),
            "disk quota exceeded, importing largest engines"
        );

        let _exclusive = self.disk_quota_lock.write();
        self.backend.flush_all_engines()?;
        for engine in &large {
            self.backend.import_and_reset(&engine.table, engine.engine_id)?;
        }
        tracing::info!(engines = large.len(), "disk quota enforced");
        Ok(true)
    }
}

/// Engines to import, largest first, until the rest fits under `quota`
pub fn large_engines(usage: &[EngineUsage], quota: u64) -> Vec<EngineUsage> {
    let mut sorted = usage.to_vec();
    sorted.sort_by(|a, b| b.disk_size.cmp(&a.disk_size));

    let mut total: u64 = sorted.iter().map(|u| u.disk_size).sum();
    let mut large = Vec::new();
    for engine in sorted {
        if total <= quota {
            break;
        }
        total -= engine.disk_size;
        large.push(engine);
    }
    large
}
