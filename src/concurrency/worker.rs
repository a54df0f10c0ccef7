//! Worker Pool
//!
//! A bounded pool of tokens. A token is handed out by `apply` and goes
//! back into the pool when the `Worker` is dropped.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};

use super::CancelToken;
use crate::error::{LoadError, Result};

/// Bounded token pool limiting concurrency of one kind of work
#[derive(Clone)]
pub struct WorkerPool {
    name: Arc<str>,
    limit: usize,
    tokens_tx: Sender<usize>,
    tokens_rx: Receiver<usize>,
}

impl WorkerPool {
    pub fn new(limit: usize, name: &str) -> Self {
        let limit = limit.max(1);
        let (tokens_tx, tokens_rx) = channel::bounded(limit);
        for id in 0..limit {
            // Capacity equals the number of tokens, so this never blocks.
            let _ = tokens_tx.send(id);
        }
        Self {
            name: Arc::from(name),
            limit,
            tokens_tx,
            tokens_rx,
        }
    }

    /// Block until a token frees up or the run is cancelled
    pub fn apply(&self, cancel: &CancelToken) -> Result<Worker> {
        cancel.check()?;
        crossbeam::select! {
            recv(self.tokens_rx) -> token => {
                let id = token.map_err(|_| {
                    LoadError::Delivery(format!("worker pool {} closed", self.name))
                })?;
                Ok(self.worker(id))
            }
            recv(cancel.done()) -> _ => Err(LoadError::Canceled),
        }
    }

    /// Take a token if one is free
    pub fn try_apply(&self) -> Option<Worker> {
        self.tokens_rx.try_recv().ok().map(|id| self.worker(id))
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Tokens currently free
    pub fn available(&self) -> usize {
        self.tokens_rx.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn worker(&self, id: usize) -> Worker {
        Worker {
            id,
            tokens_tx: self.tokens_tx.clone(),
        }
    }
}

/// A held pool token
pub struct Worker {
    pub id: usize,
    tokens_tx: Sender<usize>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.tokens_tx.send(self.id);
    }
}
