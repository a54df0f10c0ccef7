//! Sorted Run Builder
//!
//! Streams pairs in ascending key order into a new run file. The file is
//! written under a `.tmp` name and renamed into place by `finish`, so a
//! directory listing never sees a partial run.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{SortedRun, HEADER_SIZE, MAGIC, VERSION};
use crate::error::{LoadError, Result};

pub struct SortedRunBuilder {
    path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    entry_count: u64,
    /// Current write position
    offset: u64,
    min_key: Option<Vec<u8>>,
    last_key: Option<Vec<u8>>,
    /// Running CRC over the data block
    data_hasher: crc32fast::Hasher,
}

impl SortedRunBuilder {
    /// Create the file and write a header with a zero count
    pub fn new(path: &Path) -> Result<Self> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer,
            entry_count: 0,
            offset: HEADER_SIZE,
            min_key: None,
            last_key: None,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Append a pair. Keys must be strictly ascending.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(LoadError::Backend(format!(
                    "keys out of order in {}",
                    self.path.display()
                )));
            }
        }

        let key_len = (key.len() as u32).to_le_bytes();
        let val_len = (value.len() as u32).to_le_bytes();
        for part in [&key_len[..], &val_len[..], key, value] {
            self.writer.write_all(part)?;
            self.data_hasher.update(part);
        }

        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.last_key = Some(key.to_vec());
        self.offset += 8 + key.len() as u64 + value.len() as u64;
        self.entry_count += 1;
        Ok(())
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Write the range block and footer, patch the count, and sync
    pub fn finish(mut self) -> Result<SortedRun> {
        let data_end = self.offset;
        let min_key = self.min_key.take().unwrap_or_default();
        let max_key = self.last_key.take().unwrap_or_default();

        for key in [&min_key, &max_key] {
            self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
            self.writer.write_all(key)?;
        }

        let data_crc = self.data_hasher.finalize();
        self.writer.write_all(&data_end.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;
        self.writer.flush()?;

        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| LoadError::Backend(format!("failed to flush sorted run: {}", e)))?;
        // Count sits right after magic + version
        file.seek(SeekFrom::Start(6))?;
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();
        drop(file);
        fs::rename(&self.tmp_path, &self.path)?;
        Ok(SortedRun {
            path: self.path,
            entry_count: self.entry_count,
            min_key,
            max_key,
            file_size,
        })
    }
}
