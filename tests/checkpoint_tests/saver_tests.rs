//! Tests for CheckpointSaver
//!
//! These tests verify:
//! - Every update sent is applied before `join` returns
//! - Updates from several senders all land
//! - Store failures are reported by `join`

use std::sync::Arc;
use std::thread;

use dumpload::checkpoint::{
    CheckpointSaver, CheckpointStatus, CheckpointStore, MemoryCheckpointStore, SaveCheckpoint,
    TableCheckpoint,
};
use dumpload::{LoadError, Result};

use crate::{delta, planned_table, TABLE};

/// Store whose writes always fail
struct BrokenStore;

impl CheckpointStore for BrokenStore {
    fn load(&self, _table: &str) -> Result<TableCheckpoint> {
        Ok(TableCheckpoint::default())
    }

    fn insert_engines(&self, _table: &str, _checkpoint: &TableCheckpoint) -> Result<()> {
        Ok(())
    }

    fn apply(&self, _updates: &[SaveCheckpoint]) -> Result<()> {
        Err(LoadError::Checkpoint("disk full".to_string()))
    }
}

#[test]
fn test_saver_drains_channel() {
    let store = Arc::new(MemoryCheckpointStore::new());
    store.insert_engines(TABLE, &planned_table()).unwrap();

    let (tx, saver) = CheckpointSaver::spawn(store.clone(), 2).unwrap();
    for i in 1..=10u64 {
        tx.send(SaveCheckpoint::Chunk(delta(i * 10, i as i64 * 2, i))).unwrap();
    }
    tx.send(SaveCheckpoint::TableStatus {
        table: TABLE.to_string(),
        status: CheckpointStatus::AllWritten,
    })
    .unwrap();
    drop(tx);
    saver.join().unwrap();

    let cp = store.load(TABLE).unwrap();
    assert_eq!(cp.engines[&0].chunks[0].chunk.offset, 100);
    assert_eq!(cp.engines[&0].chunks[0].chunk.prev_row_id_max, 20);
    assert_eq!(cp.status, CheckpointStatus::AllWritten);
}

#[test]
fn test_saver_multiple_senders() {
    let store = Arc::new(MemoryCheckpointStore::new());
    store.insert_engines(TABLE, &planned_table()).unwrap();
    let (tx, saver) = CheckpointSaver::spawn(store.clone(), 4).unwrap();

    let handles: Vec<_> = (0..4i64)
        .map(|i| {
            let tx = tx.clone();
            thread::spawn(move || {
                tx.send(SaveCheckpoint::Rebase {
                    table: TABLE.to_string(),
                    alloc_base: i * 100,
                })
                .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    drop(tx);
    saver.join().unwrap();

    assert_eq!(store.load(TABLE).unwrap().alloc_base, 300);
}

#[test]
fn test_saver_reports_store_error() {
    let (tx, saver) = CheckpointSaver::spawn(Arc::new(BrokenStore), 1).unwrap();
    tx.send(SaveCheckpoint::Chunk(delta(1, 1, 1))).unwrap();
    drop(tx);

    let err = saver.join().unwrap_err();
    assert!(err.to_string().contains("disk full"));
}
