//! Row Encoder
//!
//! Turns a parsed source row into the record pair and one pair per index.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::{encode_i64, index_key_prefix, record_key, KvPair};
use crate::error::{LoadError, Result};
use crate::schema::{IndexInfo, TableInfo};
use crate::source::Value;

/// Per-chunk row encoder
pub trait Encoder: Send {
    /// Encode one row.
    ///
    /// `permutation[i]` is the source field feeding target column `i`
    /// (`-1` = use the default). A trailing entry, when present, feeds
    /// the hidden row id. `offset` is the row's end position, used only
    /// for error context.
    fn encode(
        &mut self,
        row: Vec<Value>,
        row_id: i64,
        permutation: &[i32],
        offset: u64,
    ) -> Result<Vec<KvPair>>;

    fn close(&mut self) {}
}

/// Default encoder
///
/// Record value is the bincode encoding of the full target row
/// (`Vec<Value>`). Non-unique index values are `"0"`; unique index values
/// hold the handle.
pub struct TableKvEncoder {
    info: Arc<TableInfo>,
}

impl TableKvEncoder {
    pub fn new(info: Arc<TableInfo>) -> Self {
        Self { info }
    }

    /// Resolve the value of target column `i`
    fn column_value(&self, i: usize, row: &[Value], permutation: &[i32], row_id: i64) -> Result<Value> {
        let column = &self.info.columns[i];
        let source = permutation.get(i).copied().unwrap_or(-1);

        let value = if column.generated || source < 0 {
            None
        } else {
            row.get(source as usize).cloned()
        };

        let missing = value.is_none();
        match value {
            Some(Value::Null) | None => {
                if column.auto_increment {
                    return Ok(Value::Text(row_id.to_string()));
                }
                if column.generated {
                    return Ok(Value::Null);
                }
                if let Some(default) = &column.default {
                    if missing {
                        return Ok(Value::Text(default.clone()));
                    }
                }
                if column.not_null {
                    return Err(LoadError::Encode(format!(
                        "column {} cannot be null",
                        column.name
                    )));
                }
                Ok(Value::Null)
            }
            Some(v) => Ok(v),
        }
    }

    fn handle(&self, values: &[Value], row: &[Value], permutation: &[i32], row_id: i64) -> Result<i64> {
        if let Some(pk) = self.info.handle_column {
            let column = &self.info.columns[pk];
            return match &values[pk] {
                Value::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                    LoadError::Encode(format!(
                        "invalid integer handle {:?} for column {}",
                        s, column.name
                    ))
                }),
                Value::Null => Err(LoadError::Encode(format!(
                    "handle column {} cannot be null",
                    column.name
                ))),
            };
        }

        // Hidden row id, possibly supplied by the source
        let n = self.info.columns.len();
        match permutation.get(n).copied() {
            Some(source) if source >= 0 => match row.get(source as usize) {
                Some(Value::Text(s)) => s.trim().parse::<i64>().map_err(|_| {
                    LoadError::Encode(format!("invalid row id {:?}", s))
                }),
                _ => Ok(row_id),
            },
            _ => Ok(row_id),
        }
    }

    fn index_pair(&self, index: &IndexInfo, values: &[Value], handle: i64) -> KvPair {
        let mut key = index_key_prefix(self.info.id, index.id);
        for &offset in &index.columns {
            match &values[offset] {
                Value::Null => key.put_u8(0),
                Value::Text(s) => {
                    key.put_u8(1);
                    key.put_slice(s.as_bytes());
                    key.put_u8(0);
                }
            }
        }

        let val = if index.unique {
            let mut val = BytesMut::with_capacity(8);
            encode_i64(&mut val, handle);
            val.freeze()
        } else {
            encode_i64(&mut key, handle);
            Bytes::from_static(b"0")
        };
        KvPair {
            key: key.freeze(),
            val,
        }
    }
}

impl Encoder for TableKvEncoder {
    fn encode(
        &mut self,
        row: Vec<Value>,
        row_id: i64,
        permutation: &[i32],
        offset: u64,
    ) -> Result<Vec<KvPair>> {
        let values = (0..self.info.columns.len())
            .map(|i| self.column_value(i, &row, permutation, row_id))
            .collect::<Result<Vec<_>>>()?;
        let handle = self.handle(&values, &row, permutation, row_id)?;

        let record_val = bincode::serialize(&values).map_err(|e| {
            LoadError::Encode(format!("failed to encode row ending at {}: {}", offset, e))
        })?;

        let mut pairs = Vec::with_capacity(1 + self.info.indices.len());
        pairs.push(KvPair::new(record_key(self.info.id, handle), record_val));
        for index in &self.info.indices {
            pairs.push(self.index_pair(index, &values, handle));
        }
        Ok(pairs)
    }
}
