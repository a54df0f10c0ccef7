//! In-memory checkpoint store (lost on exit)

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{apply_all, CheckpointStore, SaveCheckpoint, TableCheckpoint};
use crate::error::Result;

#[derive(Default)]
pub struct MemoryCheckpointStore {
    tables: RwLock<BTreeMap<String, TableCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every recorded table
    pub fn tables(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, table: &str) -> Result<TableCheckpoint> {
        Ok(self.tables.read().get(table).cloned().unwrap_or_default())
    }

    fn insert_engines(&self, table: &str, checkpoint: &TableCheckpoint) -> Result<()> {
        self.tables.write().insert(table.to_string(), checkpoint.clone());
        Ok(())
    }

    fn apply(&self, updates: &[SaveCheckpoint]) -> Result<()> {
        apply_all(&mut self.tables.write(), updates);
        Ok(())
    }
}
