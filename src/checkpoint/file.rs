//! File Checkpoint Store
//!
//! Keeps every table checkpoint in memory and rewrites a single snapshot
//! file after each change.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                       │
//! │   Magic: "DLCP" (4) | Version: u16 (2) | Len: u64 (8)   │
//! │   PayloadCRC: u32 (4)                                   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Payload (Len bytes)                                     │
//! │   bincode(BTreeMap<table name, TableCheckpoint>)        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//! The snapshot is written to `<path>.tmp` and renamed over the old file,
//! so a crash leaves either the old or the new snapshot.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{apply_all, CheckpointStore, SaveCheckpoint, TableCheckpoint};
use crate::error::{LoadError, Result};

/// Magic bytes identifying a checkpoint snapshot
const MAGIC: &[u8; 4] = b"DLCP";

/// Current snapshot format version
const VERSION: u16 = 1;

/// Magic (4) + Version (2) + Len (8) + CRC (4)
const HEADER_SIZE: usize = 18;

pub struct FileCheckpointStore {
    path: PathBuf,
    tables: Mutex<BTreeMap<String, TableCheckpoint>>,
}

impl FileCheckpointStore {
    /// Open the snapshot at `path`, or start empty if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tables = if path.exists() {
            Self::read_snapshot(&path)?
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), tables = tables.len(), "opened checkpoint file");

        Ok(Self {
            path,
            tables: Mutex::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of every recorded table
    pub fn tables(&self) -> Vec<String> {
        self.tables.lock().keys().cloned().collect()
    }

    fn read_snapshot(path: &Path) -> Result<BTreeMap<String, TableCheckpoint>> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;

        if data.len() < HEADER_SIZE {
            return Err(LoadError::Checkpoint(format!(
                "checkpoint file {} is truncated",
                path.display()
            )));
        }
        if &data[0..4] != MAGIC {
            return Err(LoadError::Checkpoint(format!(
                "invalid checkpoint magic: expected DLCP, got {:?}",
                &data[0..4]
            )));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(LoadError::Checkpoint(format!(
                "unsupported checkpoint version: {}",
                version
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&data[6..14]);
        let len = u64::from_le_bytes(len_bytes) as usize;
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&data[14..18]);
        let expected_crc = u32::from_le_bytes(crc_bytes);

        let payload = data.get(HEADER_SIZE..HEADER_SIZE + len).ok_or_else(|| {
            LoadError::Checkpoint(format!("checkpoint file {} is truncated", path.display()))
        })?;
        if crc32fast::hash(payload) != expected_crc {
            return Err(LoadError::Checkpoint(format!(
                "checkpoint file {} failed CRC check",
                path.display()
            )));
        }

        Ok(bincode::deserialize(payload)?)
    }

    fn write_snapshot(&self, tables: &BTreeMap<String, TableCheckpoint>) -> Result<()> {
        let payload = bincode::serialize(tables)?;
        let tmp_path = self.path.with_extension("tmp");

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(payload.len() as u64).to_le_bytes())?;
        writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
        writer.write_all(&payload)?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| LoadError::Checkpoint(format!("failed to flush checkpoint: {}", e)))?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, table: &str) -> Result<TableCheckpoint> {
        Ok(self.tables.lock().get(table).cloned().unwrap_or_default())
    }

    fn insert_engines(&self, table: &str, checkpoint: &TableCheckpoint) -> Result<()> {
        let mut tables = self.tables.lock();
        tables.insert(table.to_string(), checkpoint.clone());
        self.write_snapshot(&tables)
    }

    fn apply(&self, updates: &[SaveCheckpoint]) -> Result<()> {
        let mut tables = self.tables.lock();
        apply_all(&mut tables, updates);
        self.write_snapshot(&tables)
    }
}
