//! Tests for the encode/deliver pipeline and chunk restores

#[path = "../common/mod.rs"]
mod common;

mod deliver_tests;

use std::io::Cursor;
use std::sync::Arc;

use bytes::BufMut;
use dumpload::checkpoint::{Chunk, ChunkCheckpoint};
use dumpload::config::CsvConfig;
use dumpload::kv::{encode_i64, index_key_prefix, record_key, KvPair};
use dumpload::pipeline::DeliveredKvs;
use dumpload::source::{CsvParser, SourceFile, SourceType};

// =============================================================================
// Helper Functions
// =============================================================================

pub const TABLE: &str = "`db`.`table`";

/// Chunk of `db.table.1.csv` covering `[offset, end)` with rows `(prev, max]`
pub fn csv_chunk(offset: u64, end: u64, prev: i64, max: i64) -> ChunkCheckpoint {
    let file = SourceFile::new("db.table.1.csv", SourceType::Csv, end);
    let chunk = Chunk {
        offset,
        end_offset: end,
        prev_row_id_max: prev,
        row_id_max: max,
        columns: Vec::new(),
    };
    ChunkCheckpoint::new(file, chunk, 0)
}

pub fn csv_parser(data: &str) -> CsvParser {
    CsvParser::new(CsvConfig::default(), Box::new(Cursor::new(data.as_bytes().to_vec())), 64)
}

/// One row's pairs: a record and one index entry
pub fn delivered(row_id: i64, offset: u64) -> DeliveredKvs {
    let mut index = index_key_prefix(1, 1);
    index.put_slice(b"v");
    encode_i64(&mut index, row_id);
    DeliveredKvs {
        kvs: vec![
            KvPair::new(record_key(1, row_id), format!("row{}", row_id)),
            KvPair::new(index.freeze(), &b"0"[..]),
        ],
        columns: Arc::from(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
        offset,
        row_id,
    }
}
