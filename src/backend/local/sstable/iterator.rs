//! Sequential iteration over a sorted run.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use super::HEADER_SIZE;
use crate::error::Result;
use crate::kv::KvPair;

pub struct SortedRunIterator<'a> {
    file: &'a mut BufReader<File>,
    /// Start of the range block
    end_offset: u64,
    offset: u64,
}

impl<'a> SortedRunIterator<'a> {
    pub(super) fn new(file: &'a mut BufReader<File>, end_offset: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end_offset,
            offset: HEADER_SIZE,
        })
    }

    fn read_pair(&mut self) -> Result<KvPair> {
        let mut header = [0u8; 8];
        self.file.read_exact(&mut header)?;
        let key_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let val_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;
        let mut val = vec![0u8; val_len];
        self.file.read_exact(&mut val)?;

        self.offset += 8 + key_len as u64 + val_len as u64;
        Ok(KvPair::new(key, val))
    }
}

impl Iterator for SortedRunIterator<'_> {
    type Item = Result<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end_offset {
            return None;
        }
        let pair = self.read_pair();
        if pair.is_err() {
            // Stop after the first failure
            self.offset = self.end_offset;
        }
        Some(pair)
    }
}
