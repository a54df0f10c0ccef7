//! KV Module
//!
//! Key-value pairs produced by the encoder, their checksums, and the key
//! layout of the default encoder.
//!
//! ## Key Layout
//! ```text
//!   record: 't' | table_id (8) | "_r" | handle (8)
//!   index:  't' | table_id (8) | "_i" | index_id (8) | values.. [| handle (8)]
//! ```
//! Integers are big-endian with the sign bit flipped so that byte order
//! matches numeric order.

pub mod checksum;
pub mod encoder;

use bytes::{BufMut, Bytes, BytesMut};

pub use checksum::{compare_checksum, ChecksumManager, KvChecksum, RemoteChecksum};
pub use encoder::{Encoder, TableKvEncoder};

/// Offset of the record/index marker inside a key
const MARKER_OFFSET: usize = 9;

const RECORD_MARKER: &[u8; 2] = b"_r";
const INDEX_MARKER: &[u8; 2] = b"_i";

/// One encoded key-value pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct KvPair {
    pub key: Bytes,
    pub val: Bytes,
}

impl KvPair {
    pub fn new(key: impl Into<Bytes>, val: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            val: val.into(),
        }
    }

    /// Key plus value length
    pub fn size(&self) -> u64 {
        (self.key.len() + self.val.len()) as u64
    }

    pub fn is_record(&self) -> bool {
        is_record_key(&self.key)
    }
}

/// Total size of a batch of pairs
pub fn kv_size(pairs: &[KvPair]) -> u64 {
    pairs.iter().map(KvPair::size).sum()
}

/// True for row-record keys; everything else goes to the index engine
pub fn is_record_key(key: &[u8]) -> bool {
    key.len() >= MARKER_OFFSET + 2 && &key[MARKER_OFFSET..MARKER_OFFSET + 2] == RECORD_MARKER
}

/// Split pairs into (data, index), preserving order
pub fn split_data_index(pairs: Vec<KvPair>) -> (Vec<KvPair>, Vec<KvPair>) {
    pairs.into_iter().partition(KvPair::is_record)
}

// =============================================================================
// Key Encoding
// =============================================================================

/// Order-preserving i64 encoding
pub fn encode_i64(buf: &mut BytesMut, v: i64) {
    buf.put_u64((v as u64) ^ (1 << 63));
}

pub fn decode_i64(bytes: &[u8]) -> Option<i64> {
    let raw: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
    Some((u64::from_be_bytes(raw) ^ (1 << 63)) as i64)
}

fn table_prefix(buf: &mut BytesMut, table_id: i64) {
    buf.put_u8(b't');
    encode_i64(buf, table_id);
}

pub fn record_key(table_id: i64, handle: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(19);
    table_prefix(&mut buf, table_id);
    buf.put_slice(RECORD_MARKER);
    encode_i64(&mut buf, handle);
    buf.freeze()
}

/// Index key prefix: table, marker and index id. Callers append values.
pub fn index_key_prefix(table_id: i64, index_id: i64) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64);
    table_prefix(&mut buf, table_id);
    buf.put_slice(INDEX_MARKER);
    encode_i64(&mut buf, index_id);
    buf
}

/// Handle stored in a record key
pub fn decode_record_handle(key: &[u8]) -> Option<i64> {
    if !is_record_key(key) {
        return None;
    }
    decode_i64(key.get(MARKER_OFFSET + 2..)?)
}
