//! Source Storage
//!
//! Read-only access to the dump directory. Paths are relative to the
//! store root and use `/` separators.

use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use crate::error::{LoadError, Result};

/// A readable, seekable source file handle
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Storage holding the dumped source files
pub trait SourceStore: Send + Sync {
    /// Open a file for reading
    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek>>;

    /// Size of a file in bytes
    fn file_size(&self, path: &str) -> Result<u64>;

    /// List every file as `(path, size)`, sorted by path
    fn walk(&self) -> Result<Vec<(String, u64)>>;
}

/// `SourceStore` over a local directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(LoadError::Config(format!(
                "source directory {} does not exist",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn walk_dir(&self, dir: &Path, out: &mut Vec<(String, u64)>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                self.walk_dir(&path, out)?;
            } else if meta.is_file() {
                let rel = path
                    .strip_prefix(&self.root)
                    .map_err(|e| LoadError::Config(e.to_string()))?;
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push((rel, meta.len()));
            }
        }
        Ok(())
    }
}

impl SourceStore for LocalStore {
    fn open(&self, path: &str) -> Result<Box<dyn ReadSeek>> {
        let file = File::open(self.full_path(path))?;
        Ok(Box::new(file))
    }

    fn file_size(&self, path: &str) -> Result<u64> {
        Ok(fs::metadata(self.full_path(path))?.len())
    }

    fn walk(&self) -> Result<Vec<(String, u64)>> {
        let mut files = Vec::new();
        self.walk_dir(&self.root, &mut files)?;
        files.sort();
        Ok(files)
    }
}
