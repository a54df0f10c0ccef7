//! Local Backend
//!
//! Writes engines as sorted run files on local disk. Importing an engine
//! merges its runs into one sorted file under the table's imported area.
//!
//! ## Layout
//! ```text
//!   <sorted_kv_dir>/
//!     engines/<db>.<table>/<engine_id>/run_000001.sst ...
//!     imported/<db>.<table>/engine_<engine_id>_000001.sst ...
//! ```
//!
//! ## Concurrency
//! - `engines`: Mutex over engine states (open/close/import are rare)
//! - each writer owns a buffer behind its own Mutex; the engine keeps weak
//!   references so `flush_all_engines` can spill them

mod manager;
pub mod sstable;
mod writer;

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{Backend, EngineUsage, EngineWriter};
use crate::config::Config;
use crate::error::{LoadError, Result};
use crate::kv::{ChecksumManager, KvChecksum, KvPair, RemoteChecksum};
use crate::schema::TableInfo;
use manager::RunDirectory;
use sstable::{SortedRun, SortedRunBuilder, SortedRunReader};
use writer::WriteBuffer;

pub use writer::LocalWriter;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EngineKey {
    table: String,
    engine_id: i32,
}

struct EngineState {
    runs: Arc<RunDirectory>,
    closed: bool,
    buffers: Vec<Weak<Mutex<WriteBuffer>>>,
}

impl EngineState {
    fn live_buffers(&mut self) -> Vec<Arc<Mutex<WriteBuffer>>> {
        self.buffers.retain(|b| b.strong_count() > 0);
        self.buffers.iter().filter_map(Weak::upgrade).collect()
    }

    fn flush_buffers(&mut self) -> Result<()> {
        for buffer in self.live_buffers() {
            buffer.lock().flush()?;
        }
        Ok(())
    }
}

pub struct LocalBackend {
    root: PathBuf,
    flush_size: usize,
    engines: Mutex<BTreeMap<EngineKey, EngineState>>,
    /// Serializes merges into the imported area
    import_lock: Mutex<()>,
}

/// Directory name for a table: "`db`.`t`" → "db.t"
fn table_dir_name(table: &str) -> String {
    table
        .chars()
        .filter(|&c| c != '`')
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

impl LocalBackend {
    pub fn open(cfg: &Config) -> Result<Self> {
        Self::with_root(&cfg.sorted_kv_dir, cfg.local_writer_flush_size)
    }

    pub fn with_root(root: &Path, flush_size: usize) -> Result<Self> {
        fs::create_dir_all(root.join("engines"))?;
        fs::create_dir_all(root.join("imported"))?;
        tracing::info!(root = %root.display(), "local backend opened");
        Ok(Self {
            root: root.to_path_buf(),
            flush_size: flush_size.max(1),
            engines: Mutex::new(BTreeMap::new()),
            import_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn engine_dir(&self, table: &str, engine_id: i32) -> PathBuf {
        self.root
            .join("engines")
            .join(table_dir_name(table))
            .join(engine_id.to_string())
    }

    fn imported_dir(&self, table: &str) -> PathBuf {
        self.root.join("imported").join(table_dir_name(table))
    }

    /// Path for the next imported file of an engine
    fn next_imported_path(&self, table: &str, engine_id: i32) -> Result<PathBuf> {
        let prefix = format!("engine_{}_", engine_id);
        let seq = self
            .imported_files(table)?
            .iter()
            .filter_map(|p| {
                let stem = p.file_stem()?.to_string_lossy().into_owned();
                stem.strip_prefix(&prefix)?.parse::<u64>().ok()
            })
            .max()
            .unwrap_or(0);
        Ok(self
            .imported_dir(table)
            .join(format!("{}{:06}.sst", prefix, seq + 1)))
    }

    fn key(table: &str, engine_id: i32) -> EngineKey {
        EngineKey {
            table: table.to_string(),
            engine_id,
        }
    }

    /// Every imported pair of a table, engine by engine
    pub fn imported_pairs(&self, table: &str) -> Result<Vec<KvPair>> {
        let mut pairs = Vec::new();
        for path in self.imported_files(table)? {
            let mut reader = SortedRunReader::open(&path)?;
            for pair in reader.iter()? {
                pairs.push(pair?);
            }
        }
        Ok(pairs)
    }

    /// Imported files of a table, in name order
    pub fn imported_files(&self, table: &str) -> Result<Vec<PathBuf>> {
        let dir = self.imported_dir(table);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "sst") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Merge every current run of an engine into a new imported file and
    /// delete the merged runs
    fn import_runs(&self, table: &str, engine_id: i32, runs: &RunDirectory) -> Result<()> {
        let _importing = self.import_lock.lock();
        let paths = runs.run_paths()?;
        if paths.is_empty() {
            tracing::debug!(table = %table, engine_id, "nothing to import");
            return Ok(());
        }
        fs::create_dir_all(self.imported_dir(table))?;
        let output = self.next_imported_path(table, engine_id)?;
        let merged = merge_runs(&paths, &output)?;
        for path in &paths {
            fs::remove_file(path)?;
        }
        tracing::info!(
            table = %table,
            engine_id,
            runs = paths.len(),
            pairs = merged.entry_count,
            path = %merged.path.display(),
            "engine imported"
        );
        Ok(())
    }
}

/// Merge sorted runs into one. A key present in several runs keeps the
/// value of the earliest run.
fn merge_runs(paths: &[PathBuf], output: &Path) -> Result<SortedRun> {
    let mut readers = paths
        .iter()
        .map(|p| SortedRunReader::open(p))
        .collect::<Result<Vec<_>>>()?;
    let mut iters = readers
        .iter_mut()
        .map(|r| r.iter())
        .collect::<Result<Vec<_>>>()?;

    let mut heap = BinaryHeap::new();
    for (i, iter) in iters.iter_mut().enumerate() {
        if let Some(pair) = iter.next() {
            let pair = pair?;
            heap.push(Reverse((pair.key, i, pair.val)));
        }
    }

    let mut builder = SortedRunBuilder::new(output)?;
    let mut last_key: Option<bytes::Bytes> = None;
    while let Some(Reverse((key, i, val))) = heap.pop() {
        if let Some(next) = iters[i].next() {
            let next = next?;
            heap.push(Reverse((next.key, i, next.val)));
        }
        if last_key.as_ref() == Some(&key) {
            continue;
        }
        builder.add(&key, &val)?;
        last_key = Some(key);
    }
    builder.finish()
}

impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn open_engine(&self, table: &str, engine_id: i32) -> Result<()> {
        let mut engines = self.engines.lock();
        let key = Self::key(table, engine_id);
        if let Some(state) = engines.get_mut(&key) {
            state.closed = false;
            return Ok(());
        }
        let runs = RunDirectory::open(&self.engine_dir(table, engine_id))?;
        engines.insert(
            key,
            EngineState {
                runs: Arc::new(runs),
                closed: false,
                buffers: Vec::new(),
            },
        );
        Ok(())
    }

    fn local_writer(&self, table: &str, engine_id: i32) -> Result<Box<dyn EngineWriter>> {
        let mut engines = self.engines.lock();
        let state = engines
            .get_mut(&Self::key(table, engine_id))
            .filter(|s| !s.closed)
            .ok_or_else(|| {
                LoadError::Backend(format!("engine {}:{} is not open", table, engine_id))
            })?;
        let buffer = Arc::new(Mutex::new(WriteBuffer::new(Arc::clone(&state.runs))));
        state.buffers.push(Arc::downgrade(&buffer));
        Ok(Box::new(LocalWriter::new(buffer, self.flush_size)))
    }

    fn close_engine(&self, table: &str, engine_id: i32) -> Result<()> {
        let mut engines = self.engines.lock();
        let key = Self::key(table, engine_id);
        if !engines.contains_key(&key) {
            let runs = RunDirectory::open(&self.engine_dir(table, engine_id))?;
            engines.insert(
                key.clone(),
                EngineState {
                    runs: Arc::new(runs),
                    closed: true,
                    buffers: Vec::new(),
                },
            );
        }
        if let Some(state) = engines.get_mut(&key) {
            state.flush_buffers()?;
            state.closed = true;
        }
        Ok(())
    }

    fn import_engine(&self, table: &str, engine_id: i32) -> Result<()> {
        let runs = {
            let engines = self.engines.lock();
            let state = engines
                .get(&Self::key(table, engine_id))
                .filter(|s| s.closed)
                .ok_or_else(|| {
                    LoadError::Backend(format!("engine {}:{} is not closed", table, engine_id))
                })?;
            Arc::clone(&state.runs)
        };
        self.import_runs(table, engine_id, &runs)
    }

    fn import_and_reset(&self, table: &str, engine_id: i32) -> Result<()> {
        let runs = {
            let mut engines = self.engines.lock();
            let state = engines.get_mut(&Self::key(table, engine_id)).ok_or_else(|| {
                LoadError::Backend(format!("engine {}:{} is not open", table, engine_id))
            })?;
            if state.closed {
                // Imported as a whole by its owner
                return Ok(());
            }
            state.flush_buffers()?;
            Arc::clone(&state.runs)
        };
        self.import_runs(table, engine_id, &runs)
    }

    fn cleanup_engine(&self, table: &str, engine_id: i32) -> Result<()> {
        self.engines.lock().remove(&Self::key(table, engine_id));
        let dir = self.engine_dir(table, engine_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn flush_all_engines(&self) -> Result<()> {
        let mut engines = self.engines.lock();
        for state in engines.values_mut() {
            state.flush_buffers()?;
        }
        Ok(())
    }

    fn engine_disk_usage(&self) -> Vec<EngineUsage> {
        let mut engines = self.engines.lock();
        let mut usage: Vec<EngineUsage> = engines
            .iter_mut()
            .filter(|(_, state)| !state.closed)
            .map(|(key, state)| {
                let buffered: usize = state.live_buffers().iter().map(|b| b.lock().bytes()).sum();
                EngineUsage {
                    table: key.table.clone(),
                    engine_id: key.engine_id,
                    disk_size: state.runs.disk_size().unwrap_or_default() + buffered as u64,
                }
            })
            .collect();
        usage.sort_by(|a, b| b.disk_size.cmp(&a.disk_size));
        usage
    }
}

impl ChecksumManager for LocalBackend {
    fn checksum(&self, table: &TableInfo) -> Result<RemoteChecksum> {
        let mut sum = KvChecksum::default();
        for path in self.imported_files(&table.unique_name())? {
            let mut reader = SortedRunReader::open(&path)?;
            for pair in reader.iter()? {
                let pair = pair?;
                sum.update_one(&pair.key, &pair.val);
            }
        }
        Ok(RemoteChecksum {
            schema: table.db.clone(),
            table: table.name.clone(),
            checksum: sum.sum(),
            total_kvs: sum.sum_kvs(),
            total_bytes: sum.sum_size(),
        })
    }
}
