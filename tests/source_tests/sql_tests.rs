//! Tests for SqlParser
//!
//! These tests verify:
//! - Rows are read from INSERT and REPLACE statements
//! - Other statements and comments are skipped
//! - Quoted strings, escapes, NULL and charset introducers
//! - Column lists and resuming inside a VALUES list
//! - Statement terminators used for splitting

use std::io::Cursor;

use dumpload::source::{RowParser, SqlParser, Value};
use dumpload::LoadError;

// =============================================================================
// Helper Functions
// =============================================================================

fn parser(data: &str) -> SqlParser {
    SqlParser::new(Box::new(Cursor::new(data.as_bytes().to_vec())), 16)
}

fn read_all(p: &mut SqlParser) -> Vec<Vec<Value>> {
    let mut rows = Vec::new();
    while let Some(row) = p.read_row().unwrap() {
        rows.push(row.values);
    }
    rows
}

// =============================================================================
// Statements
// =============================================================================

#[test]
fn test_multi_row_insert() {
    let mut p = parser("INSERT INTO `t` VALUES (1,'a'),(2,NULL);\n");

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.row_id, 1);
    assert_eq!(row.values, vec![Value::text("1"), Value::text("a")]);
    assert_eq!(row.length, 7);

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.row_id, 2);
    assert_eq!(row.values, vec![Value::text("2"), Value::Null]);

    assert!(p.read_row().unwrap().is_none());
    assert!(p.columns().is_empty());
}

#[test]
fn test_replace_and_insert_ignore() {
    let mut p = parser("REPLACE INTO t VALUES (1);\nINSERT IGNORE INTO t VALUES (2);\n");
    let rows = read_all(&mut p);
    assert_eq!(rows, vec![vec![Value::text("1")], vec![Value::text("2")]]);
    assert_eq!(p.pos().1, 2);
}

#[test]
fn test_skips_other_statements_and_comments() {
    let data = "SET NAMES utf8;\n\
                /* block comment */\n\
                -- line comment\n\
                # hash comment\n\
                CREATE TABLE x (a int, b varchar(10));\n\
                INSERT INTO t VALUES (1);\n";
    let mut p = parser(data);
    assert_eq!(read_all(&mut p), vec![vec![Value::text("1")]]);
}

#[test]
fn test_negative_numbers_are_not_comments() {
    let mut p = parser("INSERT INTO t VALUES (-1,-2.5);");
    assert_eq!(
        read_all(&mut p),
        vec![vec![Value::text("-1"), Value::text("-2.5")]]
    );
}

// =============================================================================
// Values
// =============================================================================

#[test]
fn test_quoted_strings_and_escapes() {
    let mut p = parser("INSERT INTO t VALUES ('it''s','a\\nb',\"q\");");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(
        row.values,
        vec![Value::text("it's"), Value::text("a\nb"), Value::text("q")]
    );
}

#[test]
fn test_charset_introducer() {
    let mut p = parser("INSERT INTO t VALUES (_binary 'ab', NULL);");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.values, vec![Value::text("ab"), Value::Null]);
}

#[test]
fn test_malformed_tuple_is_syntax_error() {
    let mut p = parser("INSERT INTO t VALUES (1 2);");
    let err = p.read_row().unwrap_err();
    assert!(matches!(err, LoadError::Syntax(_)));
    assert!(err.to_string().contains("unexpected '2'"));
}

// =============================================================================
// Columns and Positioning
// =============================================================================

#[test]
fn test_column_list_is_lowercased() {
    let mut p = parser("INSERT INTO `db`.`t` (`A`, b) VALUES (1,2);");
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(p.columns(), &["a", "b"]);
    assert_eq!(row.values.len(), 2);
}

#[test]
fn test_read_columns_keeps_rows() {
    let mut p = parser("INSERT INTO t (x) VALUES (5);");
    p.read_columns().unwrap();
    assert_eq!(p.columns(), &["x"]);

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.row_id, 1);
    assert_eq!(row.values, vec![Value::text("5")]);
}

#[test]
fn test_resume_inside_values_list() {
    let data = "INSERT INTO t VALUES (1),(2),(3);\n";
    let mut first = parser(data);
    first.read_row().unwrap().unwrap();
    let (offset, row_id) = first.pos();

    let mut p = parser(data);
    p.set_pos(offset, row_id).unwrap();
    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.row_id, 2);
    assert_eq!(row.values, vec![Value::text("2")]);

    let row = p.read_row().unwrap().unwrap();
    assert_eq!(row.row_id, 3);
    assert!(p.read_row().unwrap().is_none());
}

#[test]
fn test_read_until_terminator() {
    let mut p = parser("INSERT INTO t VALUES ('a;b');\nX;");
    assert_eq!(p.read_until_terminator().unwrap(), Some(30));
    assert_eq!(p.read_until_terminator().unwrap(), Some(32));
    assert_eq!(p.read_until_terminator().unwrap(), None);
}
