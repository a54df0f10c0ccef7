//! Chunk Pipeline
//!
//! Restores one chunk with two cooperating loops:
//!
//! ```text
//!   RowParser ──► encode_loop ──Vec<DeliveredKvs>──► deliver_loop ──► data writer
//!                 (caller thread)   bounded channel   (scoped thread) └─► index writer
//!                        ▲                                   │
//!                        └────────── deliver done ◄──────────┘
//!                                                            │
//!                                       SaveCheckpoint ◄─────┘ (Rebase + Chunk)
//! ```
//!
//! ## Responsibilities
//! - Batch encoded rows by size and count
//! - Keep data writes ahead of index writes for every batch
//! - Advance the chunk checkpoint only after writers report synced
//! - Stop promptly on cancellation, on the first error of either loop,
//!   and while the disk quota lock is held exclusively

mod chunk;
mod deliver;
mod encode;
mod observer;

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Sender;

use crate::checkpoint::SaveCheckpoint;
use crate::concurrency::{CancelToken, DiskQuotaLock, Pauser};
use crate::config::Config;
use crate::kv::{KvChecksum, KvPair};
use crate::schema::TableInfo;

pub use chunk::ChunkRestore;
pub use deliver::deliver_loop;
pub(crate) use deliver::save_checkpoint;
pub use encode::encode_loop;
pub use observer::{NoopObserver, ProgressObserver};

/// Pairs of one encoded row, with the parser position after it
#[derive(Debug, Clone)]
pub struct DeliveredKvs {
    pub kvs: Vec<KvPair>,
    pub columns: Arc<[String]>,
    /// Byte offset just past the row
    pub offset: u64,
    pub row_id: i64,
}

/// The table a chunk belongs to
#[derive(Debug, Clone)]
pub struct TableContext {
    /// "`db`.`table`"
    pub name: String,
    pub info: Arc<TableInfo>,
    /// Lower-cased source columns to drop
    pub ignore_columns: Vec<String>,
}

impl TableContext {
    pub fn new(info: Arc<TableInfo>, ignore_columns: Vec<String>) -> Self {
        Self {
            name: info.unique_name(),
            info,
            ignore_columns,
        }
    }
}

/// Shared knobs and handles of a restore run
#[derive(Clone)]
pub struct PipelineContext {
    /// Rows per batch before it is sent
    pub max_kv_pairs: usize,
    /// Bytes per batch (encode) and per write (deliver)
    pub min_deliver_bytes: u64,
    pub kv_queue_size: usize,
    pub cancel: CancelToken,
    pub pauser: Arc<Pauser>,
    pub disk_quota_lock: Arc<DiskQuotaLock>,
    /// Checkpoint updates; `None` disables saving
    pub save_tx: Option<Sender<SaveCheckpoint>>,
    pub observer: Arc<dyn ProgressObserver>,
}

impl PipelineContext {
    pub fn new(cfg: &Config, cancel: CancelToken) -> Self {
        Self {
            max_kv_pairs: cfg.max_kv_pairs.max(1),
            min_deliver_bytes: cfg.min_deliver_bytes,
            kv_queue_size: cfg.kv_queue_size,
            cancel,
            pauser: Arc::new(Pauser::new()),
            disk_quota_lock: Arc::new(DiskQuotaLock::new()),
            save_tx: None,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_pauser(mut self, pauser: Arc<Pauser>) -> Self {
        self.pauser = pauser;
        self
    }

    pub fn with_disk_quota_lock(mut self, lock: Arc<DiskQuotaLock>) -> Self {
        self.disk_quota_lock = lock;
        self
    }

    pub fn with_save_channel(mut self, tx: Sender<SaveCheckpoint>) -> Self {
        self.save_tx = Some(tx);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Queue a checkpoint update. Dropped silently if saving is disabled
    /// or the saver has stopped.
    pub fn save(&self, update: SaveCheckpoint) {
        if let Some(tx) = &self.save_tx {
            if tx.send(update).is_err() {
                tracing::warn!("checkpoint saver is gone, update dropped");
            }
        }
    }
}

/// Result of a finished encode loop
#[derive(Debug, Clone, Default)]
pub struct EncodeSummary {
    /// Parser position at the end of the loop
    pub offset: u64,
    pub row_id: i64,
    /// Checksum over every encoded pair
    pub checksum: KvChecksum,
    pub read_duration: Duration,
    pub encode_duration: Duration,
}
