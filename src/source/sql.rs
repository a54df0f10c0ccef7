//! SQL Dump Parser
//!
//! Extracts rows from `INSERT` / `REPLACE` statements:
//!
//! ```text
//!   INSERT [IGNORE] INTO `db`.`tbl` [(`a`, `b`)] VALUES (1, 'x'), (2, NULL);
//!   └───────── header: columns ─────────────┘  └ row ┘  └── row ──┘
//! ```
//!
//! Every other statement (`SET`, `CREATE`, `LOCK TABLES`, ...) and every
//! comment is skipped. The parser position after a row points just past
//! its closing `)`; the separator or `;` that follows is consumed by the
//! next read.

use super::parser::{unescape, ByteReader, Row, RowParser, Value};
use super::ReadSeek;
use crate::error::{LoadError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between statements
    Statement,
    /// Inside the VALUES list of an INSERT
    Values,
}

/// SQL implementation of `RowParser`
pub struct SqlParser {
    reader: ByteReader,
    state: State,
    row_id: i64,
    columns: Vec<String>,
}

impl SqlParser {
    pub fn new(reader: Box<dyn ReadSeek>, block_size: usize) -> Self {
        Self {
            reader: ByteReader::new(reader, block_size),
            state: State::Statement,
            row_id: 0,
            columns: Vec::new(),
        }
    }

    /// Skip to just after the next `;` that ends a line (or the file).
    /// Returns `None` if no such terminator exists. Quotes are not
    /// tracked, so this is only valid for strictly formatted files.
    pub fn read_until_terminator(&mut self) -> Result<Option<u64>> {
        while let Some(b) = self.reader.next_byte()? {
            if b != b';' {
                continue;
            }
            match self.reader.peek()? {
                None => return Ok(Some(self.reader.pos())),
                Some(b'\n') => {
                    self.reader.next_byte()?;
                    return Ok(Some(self.reader.pos()));
                }
                Some(b'\r') => {
                    self.reader.next_byte()?;
                    self.reader.eat(b'\n')?;
                    return Ok(Some(self.reader.pos()));
                }
                Some(_) => {}
            }
        }
        Ok(None)
    }

    // =========================================================================
    // Lexing Helpers
    // =========================================================================

    fn syntax_error(&self, msg: &str) -> LoadError {
        LoadError::Syntax(format!("{} at offset {}", msg, self.reader.pos()))
    }

    /// Skip whitespace and comments
    fn skip_blank(&mut self) -> Result<()> {
        loop {
            match self.reader.peek()? {
                Some(b) if b.is_ascii_whitespace() => {
                    self.reader.next_byte()?;
                }
                Some(b'#') => {
                    self.reader.skip_line()?;
                }
                Some(b'-') => {
                    // "--" starts a comment only when followed by whitespace
                    // or end of line; a single '-' is data.
                    let pos = self.reader.pos();
                    self.reader.next_byte()?;
                    if self.reader.peek()? == Some(b'-') {
                        self.reader.skip_line()?;
                    } else {
                        self.reader.seek(pos)?;
                        return Ok(());
                    }
                }
                Some(b'/') => {
                    let pos = self.reader.pos();
                    self.reader.next_byte()?;
                    if self.reader.eat(b'*')? {
                        self.skip_block_comment()?;
                    } else {
                        self.reader.seek(pos)?;
                        return Ok(());
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        let mut prev = 0u8;
        while let Some(b) = self.reader.next_byte()? {
            if prev == b'*' && b == b'/' {
                return Ok(());
            }
            prev = b;
        }
        Err(self.syntax_error("unterminated comment"))
    }

    /// Read a bare word (letters, digits, `_`, `$`)
    fn read_word(&mut self) -> Result<String> {
        let mut word = Vec::new();
        while let Some(b) = self.reader.peek()? {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'$' {
                word.push(b);
                self.reader.next_byte()?;
            } else {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&word).into_owned())
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        self.skip_blank()?;
        let word = self.read_word()?;
        if word.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(self.syntax_error(&format!("expected {}, found '{}'", keyword, word)))
        }
    }

    /// Read a quoted string; the opening quote was already consumed
    fn read_quoted(&mut self, quote: u8) -> Result<String> {
        let mut text = Vec::new();
        loop {
            match self.reader.next_byte()? {
                None => return Err(self.syntax_error("unterminated string")),
                Some(b) if b == quote => {
                    if self.reader.eat(quote)? {
                        text.push(quote);
                    } else {
                        break;
                    }
                }
                Some(b'\\') if quote != b'`' => {
                    if let Some(next) = self.reader.next_byte()? {
                        text.push(unescape(next));
                    }
                }
                Some(b) => text.push(b),
            }
        }
        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    /// Read an identifier, quoted or bare
    fn read_identifier(&mut self) -> Result<String> {
        self.skip_blank()?;
        match self.reader.peek()? {
            Some(q @ (b'`' | b'"')) => {
                self.reader.next_byte()?;
                self.read_quoted(q)
            }
            _ => {
                let word = self.read_word()?;
                if word.is_empty() {
                    Err(self.syntax_error("expected identifier"))
                } else {
                    Ok(word)
                }
            }
        }
    }

    /// Skip the rest of a statement we do not care about
    fn skip_statement(&mut self) -> Result<()> {
        while let Some(b) = self.reader.next_byte()? {
            match b {
                b';' => return Ok(()),
                b'\'' | b'"' | b'`' => {
                    self.read_quoted(b)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    // =========================================================================
    // Statement Parsing
    // =========================================================================

    /// Consume one statement start. Returns false at end of file.
    fn advance_statement(&mut self) -> Result<bool> {
        match self.reader.peek()? {
            None => return Ok(false),
            // Resumed in the middle of a VALUES list
            Some(b',' | b'(') => {
                self.state = State::Values;
                return Ok(true);
            }
            Some(_) => {}
        }
        let word = self.read_word()?;
        if word.eq_ignore_ascii_case("insert") || word.eq_ignore_ascii_case("replace") {
            self.read_insert_header()?;
        } else {
            self.skip_statement()?;
        }
        Ok(true)
    }

    /// Parse `INTO name [(cols)] VALUES` after INSERT/REPLACE
    fn read_insert_header(&mut self) -> Result<()> {
        self.skip_blank()?;
        let pos = self.reader.pos();
        let word = self.read_word()?;
        if !word.eq_ignore_ascii_case("ignore") {
            self.reader.seek(pos)?;
        }
        self.expect_keyword("into")?;

        self.read_identifier()?;
        self.skip_blank()?;
        if self.reader.eat(b'.')? {
            self.read_identifier()?;
        }

        self.skip_blank()?;
        let mut columns = Vec::new();
        if self.reader.eat(b'(')? {
            loop {
                columns.push(self.read_identifier()?.to_lowercase());
                self.skip_blank()?;
                match self.reader.next_byte()? {
                    Some(b',') => continue,
                    Some(b')') => break,
                    _ => return Err(self.syntax_error("malformed column list")),
                }
            }
        }

        self.skip_blank()?;
        let word = self.read_word()?;
        if !word.eq_ignore_ascii_case("values") && !word.eq_ignore_ascii_case("value") {
            return Err(self.syntax_error(&format!("expected VALUES, found '{}'", word)));
        }
        self.columns = columns;
        self.state = State::Values;
        Ok(())
    }

    /// Parse one `( v, v, ... )` tuple; the `(` was already consumed
    fn read_tuple(&mut self) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        self.skip_blank()?;
        if self.reader.eat(b')')? {
            return Ok(values);
        }
        loop {
            self.skip_blank()?;
            values.push(self.read_value()?);
            self.skip_blank()?;
            match self.reader.next_byte()? {
                Some(b',') => continue,
                Some(b')') => return Ok(values),
                Some(b) => {
                    return Err(self.syntax_error(&format!(
                        "unexpected '{}' in values",
                        b as char
                    )))
                }
                None => return Err(self.syntax_error("unexpected end of file in values")),
            }
        }
    }

    fn read_value(&mut self) -> Result<Value> {
        match self.reader.peek()? {
            Some(q @ (b'\'' | b'"')) => {
                self.reader.next_byte()?;
                Ok(Value::Text(self.read_quoted(q)?))
            }
            _ => {
                let mut token = Vec::new();
                while let Some(b) = self.reader.peek()? {
                    if b == b',' || b == b')' || b.is_ascii_whitespace() {
                        break;
                    }
                    if b == b'\'' && !token.is_empty() {
                        // x'..' / b'..' literals: keep the quoted part verbatim
                        self.reader.next_byte()?;
                        token.push(b'\'');
                        token.extend_from_slice(self.read_quoted(b'\'')?.as_bytes());
                        token.push(b'\'');
                        continue;
                    }
                    token.push(b);
                    self.reader.next_byte()?;
                }
                let token = String::from_utf8_lossy(&token).into_owned();
                if token.is_empty() {
                    return Err(self.syntax_error("empty value"));
                }
                if token.eq_ignore_ascii_case("null") {
                    return Ok(Value::Null);
                }
                // Charset introducer: _binary 'abc'
                if token.starts_with('_') {
                    self.skip_blank()?;
                    if let Some(q @ (b'\'' | b'"')) = self.reader.peek()? {
                        self.reader.next_byte()?;
                        return Ok(Value::Text(self.read_quoted(q)?));
                    }
                }
                Ok(Value::Text(token))
            }
        }
    }
}

impl RowParser for SqlParser {
    fn pos(&self) -> (u64, i64) {
        (self.reader.pos(), self.row_id)
    }

    fn set_pos(&mut self, pos: u64, row_id: i64) -> Result<()> {
        self.reader.seek(pos)?;
        self.row_id = row_id;
        self.state = State::Statement;
        Ok(())
    }

    fn read_row(&mut self) -> Result<Option<Row>> {
        loop {
            self.skip_blank()?;
            match self.state {
                State::Values => match self.reader.peek()? {
                    None => return Ok(None),
                    Some(b',') => {
                        self.reader.next_byte()?;
                    }
                    Some(b';') => {
                        self.reader.next_byte()?;
                        self.state = State::Statement;
                    }
                    Some(b'(') => {
                        let start = self.reader.pos();
                        self.reader.next_byte()?;
                        let values = self.read_tuple()?;
                        self.row_id += 1;
                        return Ok(Some(Row {
                            row_id: self.row_id,
                            values,
                            length: (self.reader.pos() - start) as usize,
                        }));
                    }
                    Some(b) => {
                        return Err(self.syntax_error(&format!(
                            "unexpected '{}' between rows",
                            b as char
                        )))
                    }
                },
                State::Statement => {
                    if !self.advance_statement()? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Parse the next INSERT header without consuming any row
    fn read_columns(&mut self) -> Result<()> {
        while self.state == State::Statement {
            self.skip_blank()?;
            if !self.advance_statement()? {
                break;
            }
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
        self.reader.close();
        Ok(())
    }
}
