//! Tests for deliver_loop
//!
//! These tests verify:
//! - Data pairs are written before index pairs for every batch
//! - The chunk advances and a checkpoint is saved when writers are synced
//! - Nothing is saved while a writer is unsynced
//! - Cancellation leaves the checkpoint at the last delivered batch
//! - Writer failures carry the chunk position
//! - Pending pairs are dropped when the channel closes without an end marker
//! - Exclusive disk quota holds block delivery

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver};
use dumpload::backend::EngineWriter;
use dumpload::checkpoint::{ChunkCheckpoint, SaveCheckpoint};
use dumpload::concurrency::{CancelToken, DiskQuotaLock};
use dumpload::config::Config;
use dumpload::kv::KvPair;
use dumpload::pipeline::{deliver_loop, DeliveredKvs, PipelineContext};
use dumpload::{LoadError, Result};
use parking_lot::Mutex;

use crate::common::{CountingObserver, MockWriter};
use crate::{csv_chunk, delivered, TABLE};

// =============================================================================
// Helper Functions
// =============================================================================

/// Writer appending its name to a log shared with the other writer
struct LogWriter {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl EngineWriter for LogWriter {
    fn append_rows(&mut self, _table: &str, _columns: &[String], _rows: Vec<KvPair>) -> Result<()> {
        self.log.lock().push(self.name);
        Ok(())
    }

    fn is_synced(&self) -> bool {
        true
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

fn context(cfg: Config) -> (PipelineContext, Receiver<SaveCheckpoint>) {
    let (save_tx, save_rx) = channel::unbounded();
    let ctx = PipelineContext::new(&cfg, CancelToken::new()).with_save_channel(save_tx);
    (ctx, save_rx)
}

fn per_batch() -> Config {
    Config::builder().min_deliver_bytes(1).build()
}

fn chunk() -> ChunkCheckpoint {
    csv_chunk(0, 18, 0, 3)
}

fn run(
    ctx: &PipelineContext,
    chunk: &mut ChunkCheckpoint,
    packets: Vec<Vec<DeliveredKvs>>,
    data: &mut dyn EngineWriter,
    index: &mut dyn EngineWriter,
) -> Result<Duration> {
    let (tx, rx) = channel::unbounded();
    for packet in packets {
        tx.send(packet).unwrap();
    }
    drop(tx);
    deliver_loop(ctx, TABLE, 0, chunk, &rx, data, index)
}

// =============================================================================
// Delivery
// =============================================================================

#[test]
fn test_data_written_before_index() {
    let (ctx, _save_rx) = context(per_batch());
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut data = LogWriter { name: "data", log: Arc::clone(&log) };
    let mut index = LogWriter { name: "index", log: Arc::clone(&log) };
    let mut chunk = chunk();

    run(
        &ctx,
        &mut chunk,
        vec![vec![delivered(1, 6)], vec![delivered(2, 12)], Vec::new()],
        &mut data,
        &mut index,
    )
    .unwrap();

    assert_eq!(*log.lock(), vec!["data", "index", "data", "index"]);
}

#[test]
fn test_synced_batches_are_checkpointed() {
    let observer = Arc::new(CountingObserver::default());
    let (ctx, save_rx) = context(per_batch());
    let ctx = ctx.with_observer(observer.clone());
    let mut data = MockWriter::new();
    let mut index = MockWriter::new();
    let mut chunk = chunk();

    run(
        &ctx,
        &mut chunk,
        vec![vec![delivered(1, 6), delivered(2, 12)], vec![delivered(3, 18)], Vec::new()],
        &mut data,
        &mut index,
    )
    .unwrap();

    assert_eq!(chunk.chunk.offset, 18);
    assert_eq!(chunk.chunk.prev_row_id_max, 3);
    assert_eq!(chunk.checksum.sum_kvs(), 6);
    assert_eq!(data.pairs().len(), 3);
    assert_eq!(index.pairs().len(), 3);
    assert!(data.pairs().iter().all(KvPair::is_record));
    assert_eq!(observer.batches.load(Ordering::SeqCst), 2);
    assert_eq!(observer.kvs.load(Ordering::SeqCst), 6);

    let saves: Vec<SaveCheckpoint> = save_rx.try_iter().collect();
    assert_eq!(saves.len(), 4);
    match (&saves[2], &saves[3]) {
        (SaveCheckpoint::Rebase { alloc_base, .. }, SaveCheckpoint::Chunk(delta)) => {
            assert_eq!(*alloc_base, 3);
            assert_eq!(delta.pos, 18);
            assert_eq!(delta.row_id, 3);
            assert_eq!(delta.checksum, chunk.checksum);
        }
        other => panic!("unexpected saves {:?}", other),
    }
}

#[test]
fn test_batches_accumulate_to_threshold() {
    let (ctx, _save_rx) = context(Config::builder().min_deliver_bytes(1 << 30).build());
    let mut data = MockWriter::new();
    let mut index = MockWriter::new();
    let mut chunk = chunk();

    run(
        &ctx,
        &mut chunk,
        vec![vec![delivered(1, 6)], vec![delivered(2, 12)], Vec::new()],
        &mut data,
        &mut index,
    )
    .unwrap();

    assert_eq!(data.appends.load(Ordering::SeqCst), 1);
    assert_eq!(data.pairs().len(), 2);
    assert_eq!(chunk.chunk.offset, 12);
}

#[test]
fn test_unsynced_writer_defers_checkpoint() {
    let (ctx, save_rx) = context(per_batch());
    let mut data = MockWriter::new();
    data.unsynced.store(true, Ordering::SeqCst);
    let mut index = MockWriter::new();
    let mut chunk = chunk();

    run(
        &ctx,
        &mut chunk,
        vec![vec![delivered(1, 6)], Vec::new()],
        &mut data,
        &mut index,
    )
    .unwrap();

    assert_eq!(chunk.chunk.offset, 6);
    assert!(save_rx.try_recv().is_err());
}

#[test]
fn test_empty_stream() {
    let (ctx, save_rx) = context(per_batch());
    let mut data = MockWriter::new();
    let mut index = MockWriter::new();
    let mut chunk = chunk();

    run(&ctx, &mut chunk, vec![Vec::new()], &mut data, &mut index).unwrap();
    assert_eq!(chunk, self::chunk());
    assert!(save_rx.try_recv().is_err());
    assert_eq!(data.appends.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_writer_failure_carries_position() {
    let (ctx, save_rx) = context(per_batch());
    let mut data = MockWriter::failing();
    let mut index = MockWriter::new();
    let mut chunk = chunk();

    let err = run(
        &ctx,
        &mut chunk,
        vec![vec![delivered(1, 6)], Vec::new()],
        &mut data,
        &mut index,
    )
    .unwrap_err();

    assert!(matches!(err.root_cause(), LoadError::Backend(_)));
    assert_eq!(
        err.to_string(),
        "in file db.table.1.csv:0 at offset 6: backend error: mock write failure"
    );
    assert!(index.pairs().is_empty());
    assert_eq!(chunk.chunk.offset, 0);
    assert!(save_rx.try_recv().is_err());
}

#[test]
fn test_disconnect_drops_pending_pairs() {
    let (ctx, _save_rx) = context(Config::builder().min_deliver_bytes(1 << 30).build());
    let mut data = MockWriter::new();
    let mut index = MockWriter::new();
    let mut chunk = chunk();

    run(&ctx, &mut chunk, vec![vec![delivered(1, 6)]], &mut data, &mut index).unwrap();
    assert!(data.pairs().is_empty());
    assert_eq!(chunk.chunk.offset, 0);
}

#[test]
fn test_cancel_keeps_last_delivered_batch() {
    let (ctx, save_rx) = context(per_batch());
    let (tx, rx) = channel::unbounded();
    let mut data = MockWriter::new();
    let mut index = MockWriter::new();
    let mut chunk = chunk();

    let result = thread::scope(|s| {
        let handle = s.spawn(|| deliver_loop(&ctx, TABLE, 0, &mut chunk, &rx, &mut data, &mut index));

        tx.send(vec![delivered(1, 6)]).unwrap();
        // Rebase, then the chunk delta of the first batch
        save_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        save_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        ctx.cancel.cancel();
        handle.join().unwrap()
    });

    assert!(matches!(result, Err(LoadError::Canceled)));
    assert_eq!(chunk.chunk.offset, 6);
    assert_eq!(chunk.chunk.prev_row_id_max, 1);
    assert!(save_rx.try_recv().is_err());
}

#[test]
fn test_exclusive_quota_blocks_delivery() {
    let lock = Arc::new(DiskQuotaLock::new());
    let (ctx, _save_rx) = context(per_batch());
    let ctx = ctx.with_disk_quota_lock(Arc::clone(&lock));
    let data = MockWriter::new();
    let appends = Arc::clone(&data.appends);

    let exclusive = lock.write();
    let handle = {
        let ctx = ctx.clone();
        let mut data = data.clone();
        thread::spawn(move || {
            let mut index = MockWriter::new();
            let mut chunk = chunk();
            run(
                &ctx,
                &mut chunk,
                vec![vec![delivered(1, 6)], Vec::new()],
                &mut data,
                &mut index,
            )
            .map(|_| chunk)
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(appends.load(Ordering::SeqCst), 0);
    drop(exclusive);

    let chunk = handle.join().unwrap().unwrap();
    assert_eq!(appends.load(Ordering::SeqCst), 1);
    assert_eq!(chunk.chunk.offset, 6);
}
