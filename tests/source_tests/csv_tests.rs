//! Tests for CsvParser
//!
//! These tests verify:
//! - Quoting, escapes and the null marker
//! - Header handling
//! - Line terminators, blank lines and trailing separators
//! - Positioning and row ids after `set_pos`

use std::io::Cursor;

use dumpload::config::CsvConfig;
use dumpload::source::{CsvParser, RowParser, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn parser_with(cfg: CsvConfig, data: &str) -> CsvParser {
    CsvParser::new(cfg, Box::new(Cursor::new(data.as_bytes().to_vec())), 16)
}

fn parser(data: &str) -> CsvParser {
    parser_with(CsvConfig::default(), data)
}

fn texts(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::text(*v)).collect()
}

// =============================================================================
// Field Parsing
// =============================================================================

#[test]
fn test_plain_rows() {
    let mut p = parser("1,2,3\n4,5,6\n");

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.row_id, 1);
    assert_eq!(row.values, texts(&["1", "2", "3"]));
    assert_eq!(row.length, 6);

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.row_id, 2);
    assert_eq!(row.values, texts(&["4", "5", "6"]));

    assert!(p.read_row().unwrap().is_none());
    assert_eq!(p.pos(), (12, 2));
}

#[test]
fn test_quoted_fields() {
    let mut p = parser("\"a,b\",\"c\"\"d\",e\n");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["a,b", "c\"d", "e"]));
}

#[test]
fn test_quoted_field_with_line_break() {
    let mut p = parser("\"line1\nline2\",x\n");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["line1\nline2", "x"]));
    assert!(p.read_row().unwrap().is_none());
}

#[test]
fn test_null_marker() {
    let mut p = parser("\\N,x\n");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, vec![Value::Null, Value::text("x")]);
}

#[test]
fn test_backslash_escape_in_quoted_field() {
    let mut p = parser("\"a\\\"b\",\"c\\,d\",e\\f\n");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["a\"b", "c,d", "e\\f"]));
}

#[test]
fn test_backslash_escape_disabled() {
    let cfg = CsvConfig {
        backslash_escape: false,
        ..CsvConfig::default()
    };
    let mut p = parser_with(cfg, "\"a\\\",b\n");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["a\\", "b"]));
}

#[test]
fn test_quoting_disabled() {
    let cfg = CsvConfig {
        delimiter: None,
        ..CsvConfig::default()
    };
    let mut p = parser_with(cfg, "\"a\",b\n");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["\"a\"", "b"]));
}

#[test]
fn test_custom_separator() {
    let cfg = CsvConfig {
        separator: b'|',
        ..CsvConfig::default()
    };
    let mut p = parser_with(cfg, "1|a,b|\\N\n");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, vec![Value::text("1"), Value::text("a,b"), Value::Null]);
}

#[test]
fn test_unterminated_quote_runs_to_end_of_input() {
    let mut p = parser("\"abc,1\n2,3\n");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["abc,1\n2,3\n"]));
    assert_eq!(p.pos().0, 11);
    assert!(p.read_row().unwrap().is_none());
}

// =============================================================================
// Lines
// =============================================================================

#[test]
fn test_crlf_and_blank_lines() {
    let mut p = parser("1,2\r\n\r\n3,4\r\n");

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["1", "2"]));
    assert_eq!(p.pos().0, 5);

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.row_id, 2);
    assert_eq!(row.values, texts(&["3", "4"]));
    assert!(p.read_row().unwrap().is_none());
}

#[test]
fn test_trailing_separator() {
    let mut p = parser("1,2,\n");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["1", "2", ""]));

    let cfg = CsvConfig {
        trim_last_sep: true,
        ..CsvConfig::default()
    };
    let mut p = parser_with(cfg, "1,2,\n");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["1", "2"]));
}

#[test]
fn test_last_line_without_terminator() {
    let mut p = parser("1,2\n3,4");
    p.read_row().unwrap().unwrap();
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["3", "4"]));
    assert_eq!(p.pos().0, 7);
}

// =============================================================================
// Header and Positioning
// =============================================================================

#[test]
fn test_read_columns_lowercases_header() {
    let cfg = CsvConfig {
        header: true,
        ..CsvConfig::default()
    };
    let mut p = parser_with(cfg, "A,\"B\",c\n1,2,3\n");
    p.read_columns().unwrap();
    assert_eq!(p.columns(), &["a", "b", "c"]);

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.row_id, 1);
    assert_eq!(row.values, texts(&["1", "2", "3"]));
}

#[test]
fn test_crlf_header_ends_after_line_feed() {
    let cfg = CsvConfig {
        header: true,
        ..CsvConfig::default()
    };
    let mut p = parser_with(cfg, "a,b,c\r\n1,2,3\r\n");
    p.read_columns().unwrap();
    assert_eq!(p.columns(), &["a", "b", "c"]);
    assert_eq!(p.pos().0, 7);

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, texts(&["1", "2", "3"]));
    assert_eq!(row.length, 7);
}

#[test]
fn test_read_columns_without_header_config() {
    let mut p = parser("a,b\n");
    p.read_columns().unwrap();
    assert!(p.columns().is_empty());
    assert_eq!(p.pos().0, 0);
}

#[test]
fn test_set_pos_resumes_row_ids() {
    let mut p = parser("1,2\n3,4\n5,6\n");
    p.set_pos(4, 10).unwrap();

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.row_id, 11);
    assert_eq!(row.values, texts(&["3", "4"]));
    assert_eq!(p.pos(), (8, 11));
}

#[test]
fn test_read_until_terminator() {
    let mut p = parser("abc\ndef\r\nghi");
    p.set_pos(1, 0).unwrap();
    assert_eq!(p.read_until_terminator().unwrap(), Some(4));
    assert_eq!(p.read_until_terminator().unwrap(), Some(9));
    assert_eq!(p.read_until_terminator().unwrap(), None);
}

#[test]
fn test_read_after_close_fails() {
    let mut p = parser("1,2\n");
    p.close().unwrap();
    assert!(p.read_row().is_err());
}
