//! Sorted Run Files
//!
//! Immutable on-disk runs of sorted KV pairs written by the local backend.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "DLKV" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   ... repeated for each pair, keys ascending ...        │
//! ├─────────────────────────────────────────────────────────┤
//! │ Range Block (variable)                                  │
//! │   [MinLen: u32][MinKey][MaxLen: u32][MaxKey]            │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   DataEnd: u64 (8) | DataCRC: u32 (4) | Padding (4)     │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SortedRunBuilder;
pub use iterator::SortedRunIterator;
pub use reader::SortedRunReader;

/// Magic bytes identifying a sorted run file
pub(crate) const MAGIC: &[u8; 4] = b"DLKV";

pub(crate) const VERSION: u16 = 1;

/// Magic (4) + Version (2) + Count (8)
pub(crate) const HEADER_SIZE: u64 = 14;

/// DataEnd (8) + DataCRC (4) + Padding (4)
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedRun {
    pub path: PathBuf,
    pub entry_count: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub file_size: u64,
}
