//! Checkpoint Module
//!
//! The checkpoint tree records how every table was planned and how far
//! every chunk got, so an interrupted run resumes without re-importing
//! completed work.
//!
//! ## Tree
//! ```text
//!   TableCheckpoint {status, alloc_base}
//!     ├── engine -1 (index)   EngineCheckpoint {status, chunks: []}
//!     ├── engine 0            EngineCheckpoint {status, chunks}
//!     │     ├── ChunkCheckpoint "db.t.1.sql:0"   (prev_row_id_max, row_id_max]
//!     │     └── ChunkCheckpoint "db.t.2.sql:0"
//!     └── engine 1 ...
//! ```
//!
//! ## Responsibilities
//! - Checkpoint data model and status ladder
//! - `SaveCheckpoint` update messages with idempotent merge rules
//! - `CheckpointStore` trait plus in-memory and file-backed stores
//! - Background saver draining the save channel

mod file;
mod memory;
mod saver;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kv::KvChecksum;
use crate::source::SourceFile;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use saver::CheckpointSaver;

/// Engine id of the index engine
pub const INDEX_ENGINE_ID: i32 = -1;

// =============================================================================
// Status
// =============================================================================

/// Progress of a table, engine or chunk. Ordered: later stages compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CheckpointStatus {
    /// Last attempt failed
    Failed,
    /// Node does not exist yet
    Missing,
    Loaded,
    AllWritten,
    Closed,
    Imported,
    Checksummed,
    Analyzed,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Failed => "failed",
            CheckpointStatus::Missing => "missing",
            CheckpointStatus::Loaded => "loaded",
            CheckpointStatus::AllWritten => "written",
            CheckpointStatus::Closed => "closed",
            CheckpointStatus::Imported => "imported",
            CheckpointStatus::Checksummed => "checksummed",
            CheckpointStatus::Analyzed => "analyzed",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tree Nodes
// =============================================================================

/// Identity of a chunk: source path plus starting offset
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkCheckpointKey {
    pub path: String,
    pub offset: u64,
}

impl ChunkCheckpointKey {
    pub fn new(path: impl Into<String>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }
}

impl fmt::Display for ChunkCheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.offset)
    }
}

/// A byte range of one source file and its reserved row ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Next byte to read; advances as batches are delivered
    pub offset: u64,
    pub end_offset: u64,
    /// Row id of the last delivered row (start of reservation before any)
    pub prev_row_id_max: i64,
    /// Last row id reserved for this chunk
    pub row_id_max: i64,
    /// Header columns for a split CSV file, else empty
    pub columns: Vec<String>,
}

impl Chunk {
    pub fn is_finished(&self) -> bool {
        self.offset >= self.end_offset
    }
}

/// Persistent state of one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCheckpoint {
    pub key: ChunkCheckpointKey,
    pub file: SourceFile,
    pub chunk: Chunk,
    pub column_permutation: Vec<i32>,
    pub checksum: KvChecksum,
    pub timestamp: i64,
    pub status: CheckpointStatus,
}

impl ChunkCheckpoint {
    pub fn new(file: SourceFile, chunk: Chunk, timestamp: i64) -> Self {
        Self {
            key: ChunkCheckpointKey::new(file.path.clone(), chunk.offset),
            file,
            chunk,
            column_permutation: Vec::new(),
            checksum: KvChecksum::default(),
            timestamp,
            status: CheckpointStatus::Loaded,
        }
    }
}

/// Persistent state of one engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCheckpoint {
    pub status: CheckpointStatus,
    pub chunks: Vec<ChunkCheckpoint>,
}

impl EngineCheckpoint {
    pub fn new(status: CheckpointStatus) -> Self {
        Self {
            status,
            chunks: Vec::new(),
        }
    }

    fn chunk_mut(&mut self, key: &ChunkCheckpointKey) -> Option<&mut ChunkCheckpoint> {
        self.chunks.iter_mut().find(|c| &c.key == key)
    }
}

/// Persistent state of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCheckpoint {
    pub status: CheckpointStatus,
    /// Highest row id known to be in use
    pub alloc_base: i64,
    pub engines: BTreeMap<i32, EngineCheckpoint>,
}

impl Default for TableCheckpoint {
    fn default() -> Self {
        Self {
            status: CheckpointStatus::Missing,
            alloc_base: 0,
            engines: BTreeMap::new(),
        }
    }
}

impl TableCheckpoint {
    /// True if the table has not been planned
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn count_chunks(&self) -> usize {
        self.engines.values().map(|e| e.chunks.len()).sum()
    }

    /// Sum of every chunk's checksum
    pub fn checksum(&self) -> KvChecksum {
        let mut sum = KvChecksum::default();
        for engine in self.engines.values() {
            for chunk in &engine.chunks {
                sum.add(&chunk.checksum);
            }
        }
        sum
    }

    /// Merge one update. Applying the same update twice is harmless.
    pub fn apply(&mut self, update: &SaveCheckpoint) {
        match update {
            SaveCheckpoint::Rebase { alloc_base, .. } => {
                self.alloc_base = self.alloc_base.max(*alloc_base);
            }
            SaveCheckpoint::Chunk(delta) => {
                let Some(chunk) = self
                    .engines
                    .get_mut(&delta.engine_id)
                    .and_then(|e| e.chunk_mut(&delta.key))
                else {
                    tracing::warn!(table = %delta.table, key = %delta.key, "update for unknown chunk");
                    return;
                };
                // Deliveries are monotonic; an older delta arriving late is dropped.
                if delta.pos >= chunk.chunk.offset {
                    chunk.chunk.offset = delta.pos;
                    chunk.chunk.prev_row_id_max = delta.row_id;
                    chunk.checksum = delta.checksum;
                    chunk.column_permutation = delta.column_permutation.clone();
                }
            }
            SaveCheckpoint::ChunkStatus {
                engine_id,
                key,
                status,
                ..
            } => {
                if let Some(chunk) = self.engines.get_mut(engine_id).and_then(|e| e.chunk_mut(key)) {
                    chunk.status = *status;
                }
            }
            SaveCheckpoint::EngineStatus {
                engine_id, status, ..
            } => {
                if let Some(engine) = self.engines.get_mut(engine_id) {
                    engine.status = *status;
                }
            }
            SaveCheckpoint::TableStatus { status, .. } => {
                self.status = *status;
            }
        }
    }
}

// =============================================================================
// Updates
// =============================================================================

/// Progress of one chunk after a delivered batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub table: String,
    pub engine_id: i32,
    pub key: ChunkCheckpointKey,
    /// Cumulative checksum of the chunk
    pub checksum: KvChecksum,
    /// New chunk offset
    pub pos: u64,
    /// New `prev_row_id_max`
    pub row_id: i64,
    pub column_permutation: Vec<i32>,
}

/// A checkpoint update travelling over the save channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveCheckpoint {
    Rebase {
        table: String,
        alloc_base: i64,
    },
    Chunk(ChunkDelta),
    ChunkStatus {
        table: String,
        engine_id: i32,
        key: ChunkCheckpointKey,
        status: CheckpointStatus,
    },
    EngineStatus {
        table: String,
        engine_id: i32,
        status: CheckpointStatus,
    },
    TableStatus {
        table: String,
        status: CheckpointStatus,
    },
}

impl SaveCheckpoint {
    pub fn table(&self) -> &str {
        match self {
            SaveCheckpoint::Rebase { table, .. }
            | SaveCheckpoint::ChunkStatus { table, .. }
            | SaveCheckpoint::EngineStatus { table, .. }
            | SaveCheckpoint::TableStatus { table, .. } => table,
            SaveCheckpoint::Chunk(delta) => &delta.table,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Persistence for checkpoint trees
pub trait CheckpointStore: Send + Sync {
    /// Checkpoint of a table; empty (`Missing`, no engines) if unknown
    fn load(&self, table: &str) -> Result<TableCheckpoint>;

    /// Record a freshly planned table
    fn insert_engines(&self, table: &str, checkpoint: &TableCheckpoint) -> Result<()>;

    /// Merge a batch of updates
    fn apply(&self, updates: &[SaveCheckpoint]) -> Result<()>;
}

/// Merge updates into a set of table checkpoints
pub(crate) fn apply_all(tables: &mut BTreeMap<String, TableCheckpoint>, updates: &[SaveCheckpoint]) {
    for update in updates {
        match tables.get_mut(update.table()) {
            Some(cp) => cp.apply(update),
            None => tracing::warn!(table = %update.table(), "update for unknown table"),
        }
    }
}
