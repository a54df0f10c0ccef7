//! Run Directory
//!
//! One directory of sorted runs belonging to a single engine.
//!
//! ## Responsibilities
//! - Discover existing runs when an engine is reopened
//! - Hand out unique run file names
//! - Report the directory's disk usage

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

pub(crate) struct RunDirectory {
    dir: PathBuf,
    /// Next run id (ids start at 1)
    next_run_id: AtomicU64,
}

impl RunDirectory {
    /// Open or create the directory, continuing after the highest run id
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let next_id = Self::run_ids(dir)?.last().map(|&id| id + 1).unwrap_or(1);
        Ok(Self {
            dir: dir.to_path_buf(),
            next_run_id: AtomicU64::new(next_id),
        })
    }

    /// Path for a new run
    pub fn next_run_path(&self) -> PathBuf {
        let id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        Self::run_path(&self.dir, id)
    }

    /// Every run in the directory, oldest first
    pub fn run_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        Ok(Self::run_ids(&self.dir)?
            .into_iter()
            .map(|id| Self::run_path(&self.dir, id))
            .collect())
    }

    /// Total size of the runs on disk
    pub fn disk_size(&self) -> Result<u64> {
        let mut total = 0;
        for path in self.run_paths()? {
            total += fs::metadata(&path)?.len();
        }
        Ok(total)
    }

    fn run_ids(dir: &Path) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(id) = Self::parse_run_id(&path) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn run_path(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("run_{:06}.sst", id))
    }

    /// "run_000042.sst" → Some(42)
    fn parse_run_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        name.strip_prefix("run_")?.parse().ok()
    }
}
