//! Sorted Run Reader
//!
//! Validates a run file and hands out sequential iterators.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::iterator::SortedRunIterator;
use super::{SortedRun, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};
use crate::error::{LoadError, Result};

pub struct SortedRunReader {
    path: PathBuf,
    file: BufReader<File>,
    entry_count: u64,
    data_end: u64,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    file_size: u64,
}

fn u32_at(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(pos..pos + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

fn u64_at(buf: &[u8], pos: usize) -> Option<u64> {
    let bytes: [u8; 8] = buf.get(pos..pos + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

impl SortedRunReader {
    /// Open a run, checking magic, version and the data CRC
    pub fn open(path: &Path) -> Result<Self> {
        let corrupt = |what: &str| LoadError::Backend(format!("{}: {}", path.display(), what));

        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt("sorted run is truncated"));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(corrupt(&format!(
                "invalid sorted run magic: expected DLKV, got {:?}",
                &header[0..4]
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(corrupt(&format!("unsupported sorted run version: {}", version)));
        }
        let entry_count = u64_at(&header, 6).ok_or_else(|| corrupt("bad header"))?;

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        let data_end = u64_at(&footer, 0).ok_or_else(|| corrupt("bad footer"))?;
        let data_crc = u32_at(&footer, 8).ok_or_else(|| corrupt("bad footer"))?;
        if data_end < HEADER_SIZE || data_end > file_size - FOOTER_SIZE {
            return Err(corrupt("data block out of bounds"));
        }

        // Data block CRC
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = data_end - HEADER_SIZE;
        let mut buf = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let n = remaining.min(buf.len() as u64) as usize;
            file.read_exact(&mut buf[..n])?;
            hasher.update(&buf[..n]);
            remaining -= n as u64;
        }
        if hasher.finalize() != data_crc {
            return Err(corrupt("sorted run failed CRC check"));
        }

        // Range block
        let range_len = (file_size - FOOTER_SIZE - data_end) as usize;
        let mut range = vec![0u8; range_len];
        file.read_exact(&mut range)?;
        let min_len = u32_at(&range, 0).ok_or_else(|| corrupt("bad range block"))? as usize;
        let min_key = range
            .get(4..4 + min_len)
            .ok_or_else(|| corrupt("bad range block"))?
            .to_vec();
        let max_len = u32_at(&range, 4 + min_len).ok_or_else(|| corrupt("bad range block"))? as usize;
        let max_key = range
            .get(8 + min_len..8 + min_len + max_len)
            .ok_or_else(|| corrupt("bad range block"))?
            .to_vec();

        file.seek(SeekFrom::Start(0))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::new(file),
            entry_count,
            data_end,
            min_key,
            max_key,
            file_size,
        })
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    pub fn summary(&self) -> SortedRun {
        SortedRun {
            path: self.path.clone(),
            entry_count: self.entry_count,
            min_key: self.min_key.clone(),
            max_key: self.max_key.clone(),
            file_size: self.file_size,
        }
    }

    /// Iterate over every pair in key order
    pub fn iter(&mut self) -> Result<SortedRunIterator<'_>> {
        SortedRunIterator::new(&mut self.file, self.data_end)
    }
}
