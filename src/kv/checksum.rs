//! KV Checksum
//!
//! A commutative, associative summary of a set of KV pairs: byte total,
//! pair count and the XOR of per-pair CRC32 digests. Chunk checksums are
//! merged into the table checksum and compared with what the target
//! reports after import.

use serde::{Deserialize, Serialize};

use super::KvPair;
use crate::error::{LoadError, Result};
use crate::schema::TableInfo;

/// Local checksum accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvChecksum {
    bytes: u64,
    kvs: u64,
    checksum: u64,
}

impl KvChecksum {
    pub fn new(bytes: u64, kvs: u64, checksum: u64) -> Self {
        Self {
            bytes,
            kvs,
            checksum,
        }
    }

    pub fn from_pairs(pairs: &[KvPair]) -> Self {
        let mut sum = Self::default();
        sum.update(pairs);
        sum
    }

    /// Fold pairs into the checksum
    pub fn update(&mut self, pairs: &[KvPair]) {
        for pair in pairs {
            self.update_one(&pair.key, &pair.val);
        }
    }

    pub fn update_one(&mut self, key: &[u8], val: &[u8]) {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(key);
        hasher.update(val);
        self.checksum ^= u64::from(hasher.finalize());
        self.bytes += (key.len() + val.len()) as u64;
        self.kvs += 1;
    }

    /// Merge another checksum into this one
    pub fn add(&mut self, other: &KvChecksum) {
        self.bytes += other.bytes;
        self.kvs += other.kvs;
        self.checksum ^= other.checksum;
    }

    pub fn sum_size(&self) -> u64 {
        self.bytes
    }

    pub fn sum_kvs(&self) -> u64 {
        self.kvs
    }

    pub fn sum(&self) -> u64 {
        self.checksum
    }
}

/// Checksum reported by the target for an imported table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteChecksum {
    pub schema: String,
    pub table: String,
    pub checksum: u64,
    pub total_kvs: u64,
    pub total_bytes: u64,
}

/// Computes the target-side checksum of an imported table
pub trait ChecksumManager: Send + Sync {
    fn checksum(&self, table: &TableInfo) -> Result<RemoteChecksum>;
}

/// Fail if the target disagrees with what was delivered
pub fn compare_checksum(table: &str, remote: &RemoteChecksum, local: &KvChecksum) -> Result<()> {
    let mut diffs = Vec::new();
    if remote.checksum != local.sum() {
        diffs.push(format!("(checksum: {} vs {})", remote.checksum, local.sum()));
    }
    if remote.total_kvs != local.sum_kvs() {
        diffs.push(format!("(total_kvs: {} vs {})", remote.total_kvs, local.sum_kvs()));
    }
    if remote.total_bytes != local.sum_size() {
        diffs.push(format!(
            "(total_bytes: {} vs {})",
            remote.total_bytes,
            local.sum_size()
        ));
    }

    if !diffs.is_empty() {
        return Err(LoadError::ChecksumMismatch(diffs.join(" ")));
    }

    tracing::debug!(
        table = %table,
        checksum = local.sum(),
        total_kvs = local.sum_kvs(),
        total_bytes = local.sum_size(),
        "checksum pass"
    );
    Ok(())
}
