//! Local engine writer: buffers pairs in memory and spills them to sorted
//! runs once the buffer reaches the flush size.

use std::sync::Arc;

use parking_lot::Mutex;

use super::manager::RunDirectory;
use super::sstable::{SortedRun, SortedRunBuilder};
use crate::backend::EngineWriter;
use crate::error::{LoadError, Result};
use crate::kv::KvPair;

/// Unflushed pairs of one writer
pub(crate) struct WriteBuffer {
    pairs: Vec<KvPair>,
    bytes: usize,
    runs: Arc<RunDirectory>,
}

impl WriteBuffer {
    pub fn new(runs: Arc<RunDirectory>) -> Self {
        Self {
            pairs: Vec::new(),
            bytes: 0,
            runs,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Sort the buffered pairs and write them as one run.
    /// Identical keys keep the first value appended.
    pub fn flush(&mut self) -> Result<Option<SortedRun>> {
        if self.pairs.is_empty() {
            return Ok(None);
        }
        let mut pairs = std::mem::take(&mut self.pairs);
        self.bytes = 0;
        pairs.sort_by(|a, b| a.key.cmp(&b.key));
        pairs.dedup_by(|later, earlier| later.key == earlier.key);

        let path = self.runs.next_run_path();
        let mut builder = SortedRunBuilder::new(&path)?;
        for pair in &pairs {
            builder.add(&pair.key, &pair.val)?;
        }
        let run = builder.finish()?;
        tracing::debug!(path = %run.path.display(), pairs = run.entry_count, "flushed sorted run");
        Ok(Some(run))
    }
}

/// `EngineWriter` of the local backend
pub struct LocalWriter {
    buffer: Arc<Mutex<WriteBuffer>>,
    flush_size: usize,
    closed: bool,
}

impl LocalWriter {
    pub(crate) fn new(buffer: Arc<Mutex<WriteBuffer>>, flush_size: usize) -> Self {
        Self {
            buffer,
            flush_size,
            closed: false,
        }
    }
}

impl EngineWriter for LocalWriter {
    fn append_rows(&mut self, _table: &str, _columns: &[String], rows: Vec<KvPair>) -> Result<()> {
        if self.closed {
            return Err(LoadError::Backend("writer already closed".to_string()));
        }
        let mut buffer = self.buffer.lock();
        buffer.bytes += rows.iter().map(|p| p.size() as usize).sum::<usize>();
        buffer.pairs.extend(rows);
        if buffer.bytes >= self.flush_size {
            buffer.flush()?;
        }
        Ok(())
    }

    fn is_synced(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.buffer.lock().flush()?;
        Ok(())
    }
}
