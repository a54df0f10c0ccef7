//! Checkpoint Saver
//!
//! Background thread draining the save channel into a `CheckpointStore`.
//! Updates that arrive together are applied as one batch. The thread exits
//! once every sender is dropped.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use super::{CheckpointStore, SaveCheckpoint};
use crate::error::{LoadError, Result};

/// Max updates merged into one store write
const MAX_BATCH: usize = 256;

pub struct CheckpointSaver {
    handle: JoinHandle<Result<()>>,
}

impl CheckpointSaver {
    /// Start the saver. Returns the channel to send updates on.
    pub fn spawn(
        store: Arc<dyn CheckpointStore>,
        capacity: usize,
    ) -> Result<(Sender<SaveCheckpoint>, Self)> {
        let (tx, rx) = channel::bounded(capacity.max(1));
        let handle = thread::Builder::new()
            .name("checkpoint-saver".to_string())
            .spawn(move || Self::run(store, rx))?;
        Ok((tx, Self { handle }))
    }

    fn run(store: Arc<dyn CheckpointStore>, rx: Receiver<SaveCheckpoint>) -> Result<()> {
        let mut first_error = None;
        let mut batch = Vec::with_capacity(MAX_BATCH);

        while let Ok(update) = rx.recv() {
            batch.push(update);
            while batch.len() < MAX_BATCH {
                match rx.try_recv() {
                    Ok(update) => batch.push(update),
                    Err(_) => break,
                }
            }

            if let Err(e) = store.apply(&batch) {
                tracing::error!(error = %e, updates = batch.len(), "failed to save checkpoint");
                first_error.get_or_insert(e);
            }
            batch.clear();
        }

        tracing::debug!("checkpoint saver stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait for the saver to drain and stop. Drop every sender first.
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| LoadError::Checkpoint("checkpoint saver panicked".to_string()))?
    }
}
