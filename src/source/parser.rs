//! Row Parser
//!
//! Shared row model and the byte-level reader used by the SQL parser.

use std::io::{self, BufRead, BufReader, Seek, SeekFrom};

use serde::{Deserialize, Serialize};

use super::ReadSeek;
use crate::error::{LoadError, Result};

// =============================================================================
// Row Model
// =============================================================================

/// A single parsed field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s),
        }
    }
}

/// A parsed row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Row id assigned by the parser (previous row id + 1)
    pub row_id: i64,
    pub values: Vec<Value>,
    /// Source bytes consumed by this row
    pub length: usize,
}

/// A streaming row reader over one source file
///
/// Positions are byte offsets into the file. After `set_pos(offset, id)`
/// the next row read gets id `id + 1`.
pub trait RowParser: Send {
    /// Current `(byte offset, last row id)`
    fn pos(&self) -> (u64, i64);

    /// Reposition the parser
    fn set_pos(&mut self, pos: u64, row_id: i64) -> Result<()>;

    /// Read the next row; `Ok(None)` at end of input
    fn read_row(&mut self) -> Result<Option<Row>>;

    /// Read a column header at the current position, if the format has one
    fn read_columns(&mut self) -> Result<()>;

    /// Column names (lower-cased) known to the parser, empty if none
    fn columns(&self) -> &[String];

    /// Override the column names, e.g. with a header read during planning
    fn set_columns(&mut self, columns: Vec<String>);

    /// Release the underlying reader. Later reads fail.
    fn close(&mut self) -> Result<()>;
}

// =============================================================================
// Byte Reader
// =============================================================================

/// Buffered byte-at-a-time reader tracking its absolute position
pub(crate) struct ByteReader {
    inner: Option<BufReader<Box<dyn ReadSeek>>>,
    pos: u64,
}

impl ByteReader {
    pub(crate) fn new(reader: Box<dyn ReadSeek>, block_size: usize) -> Self {
        Self {
            inner: Some(BufReader::with_capacity(block_size.max(1), reader)),
            pos: 0,
        }
    }

    pub(crate) fn pos(&self) -> u64 {
        self.pos
    }

    fn reader(&mut self) -> Result<&mut BufReader<Box<dyn ReadSeek>>> {
        self.inner.as_mut().ok_or_else(|| {
            LoadError::Io(io::Error::new(io::ErrorKind::Other, "file already closed"))
        })
    }

    pub(crate) fn peek(&mut self) -> Result<Option<u8>> {
        let buf = self.reader()?.fill_buf()?;
        Ok(buf.first().copied())
    }

    pub(crate) fn next_byte(&mut self) -> Result<Option<u8>> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.reader()?.consume(1);
            self.pos += 1;
        }
        Ok(byte)
    }

    /// Consume the next byte if it equals `expected`
    pub(crate) fn eat(&mut self, expected: u8) -> Result<bool> {
        if self.peek()? == Some(expected) {
            self.next_byte()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(crate) fn seek(&mut self, pos: u64) -> Result<()> {
        self.reader()?.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.inner = None;
    }

    /// Advance past the next line terminator (`\n`, `\r\n` or `\r`).
    /// Returns the position after it, or `None` if input ends first.
    pub(crate) fn skip_line(&mut self) -> Result<Option<u64>> {
        while let Some(b) = self.next_byte()? {
            match b {
                b'\n' => return Ok(Some(self.pos)),
                b'\r' => {
                    self.eat(b'\n')?;
                    return Ok(Some(self.pos));
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

/// Resolve a backslash escape sequence to the byte it stands for
pub(crate) fn unescape(b: u8) -> u8 {
    match b {
        b'n' => b'\n',
        b't' => b'\t',
        b'r' => b'\r',
        b'0' => 0,
        b'b' => 0x08,
        b'Z' => 0x1a,
        other => other,
    }
}
