//! CSV Parser
//!
//! Reads CSV rows with the `csv` crate, configured from the dialect:
//! - quoted fields with doubled-quote escapes
//! - backslash escapes inside quoted fields (optional)
//! - unquoted null marker (`\N` by default)
//! - `\n` and `\r\n` line terminators
//! - an optional header line naming the columns
//!
//! Blank lines are skipped. Positions always sit after a full line
//! terminator, so a region cut by `read_until_terminator` ends exactly
//! where its last row does.

use std::io::{BufRead, BufReader, Seek, SeekFrom};

use csv::{ByteRecord, Position, ReaderBuilder, Terminator};

use super::parser::{Row, RowParser, Value};
use super::ReadSeek;
use crate::config::CsvConfig;
use crate::error::{LoadError, Result};

type Reader = csv::Reader<Box<dyn ReadSeek>>;

/// CSV implementation of `RowParser`
pub struct CsvParser {
    cfg: CsvConfig,
    reader: Option<Reader>,
    block_size: usize,
    record: ByteRecord,
    row_id: i64,
    columns: Vec<String>,
}

impl CsvParser {
    pub fn new(cfg: CsvConfig, reader: Box<dyn ReadSeek>, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(cfg.separator)
            .quote(cfg.delimiter.unwrap_or(b'"'))
            .quoting(cfg.delimiter.is_some())
            .double_quote(true)
            .escape(cfg.backslash_escape.then_some(b'\\'))
            // `\r` of a `\r\n` pair is stripped from the last field
            .terminator(Terminator::Any(b'\n'))
            .buffer_capacity(block_size)
            .from_reader(reader);
        Self {
            cfg,
            reader: Some(reader),
            block_size,
            record: ByteRecord::new(),
            row_id: 0,
            columns: Vec::new(),
        }
    }

    fn reader(&mut self) -> Result<&mut Reader> {
        self.reader.as_mut().ok_or_else(closed)
    }

    fn offset(&self) -> u64 {
        self.reader.as_ref().map_or(0, |r| r.position().byte())
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        let mut position = Position::new();
        position.set_byte(pos);
        self.reader()?.seek_raw(SeekFrom::Start(pos), position)?;
        Ok(())
    }

    /// Skip to the byte after the next `\n`, ignoring quoting.
    /// Only valid for strictly formatted files.
    pub fn read_until_terminator(&mut self) -> Result<Option<u64>> {
        let start = self.offset();
        let block_size = self.block_size;
        let inner = self.reader()?.get_mut();
        inner.seek(SeekFrom::Start(start))?;

        let mut bytes = BufReader::with_capacity(block_size, inner);
        let mut skipped = 0u64;
        let found = loop {
            let buf = bytes.fill_buf()?;
            if buf.is_empty() {
                break false;
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    bytes.consume(i + 1);
                    skipped += i as u64 + 1;
                    break true;
                }
                None => {
                    let len = buf.len();
                    bytes.consume(len);
                    skipped += len as u64;
                }
            }
        };
        drop(bytes);

        let end = start + skipped;
        self.seek(end)?;
        Ok(found.then_some(end))
    }

    /// Read one record's fields; `None` at end of input
    fn read_record(&mut self) -> Result<Option<Vec<Value>>> {
        loop {
            let reader = self.reader.as_mut().ok_or_else(closed)?;
            if !reader.read_byte_record(&mut self.record)? {
                return Ok(None);
            }

            let mut fields: Vec<&[u8]> = self.record.iter().collect();
            if let Some(stripped) = fields.last().copied().and_then(|f| f.strip_suffix(b"\r")) {
                // A bare `\r\n` line
                if fields.len() == 1 && stripped.is_empty() {
                    continue;
                }
                let last = fields.len() - 1;
                fields[last] = stripped;
            }
            if self.cfg.trim_last_sep && fields.len() > 1 && fields.last().is_some_and(|f| f.is_empty()) {
                fields.pop();
            }

            let null = self.cfg.null.as_bytes();
            let values = fields
                .into_iter()
                .map(|f| {
                    if f == null {
                        Value::Null
                    } else {
                        Value::Text(String::from_utf8_lossy(f).into_owned())
                    }
                })
                .collect();
            return Ok(Some(values));
        }
    }
}

fn closed() -> LoadError {
    LoadError::Io(std::io::Error::new(std::io::ErrorKind::Other, "file already closed"))
}

impl RowParser for CsvParser {
    fn pos(&self) -> (u64, i64) {
        (self.offset(), self.row_id)
    }

    fn set_pos(&mut self, pos: u64, row_id: i64) -> Result<()> {
        self.seek(pos)?;
        self.row_id = row_id;
        Ok(())
    }

    fn read_row(&mut self) -> Result<Option<Row>> {
        let start = self.offset();
        match self.read_record()? {
            None => Ok(None),
            Some(values) => {
                self.row_id += 1;
                Ok(Some(Row {
                    row_id: self.row_id,
                    values,
                    length: (self.offset() - start) as usize,
                }))
            }
        }
    }

    fn read_columns(&mut self) -> Result<()> {
        if !self.cfg.header {
            return Ok(());
        }
        if let Some(values) = self.read_record()? {
            let null = self.cfg.null.to_lowercase();
            self.columns = values
                .into_iter()
                .map(|v| match v {
                    Value::Text(s) => s.to_lowercase(),
                    Value::Null => null.clone(),
                })
                .collect();
        }
        Ok(())
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}
