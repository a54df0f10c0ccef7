//! Schema check tests
//!
//! These tests verify:
//! - A missing target table is reported
//! - Files without a column list need defaults for trailing columns
//! - Ignored columns must have defaults
//! - Unknown source columns are reported unless ignored
//! - Target columns absent from the source need defaults
//! - Matching schemas and empty tables pass

use dumpload::config::IgnoreColumns;
use dumpload::schema::{ColumnInfo, TableInfo};
use dumpload::source::{LocalStore, TableMeta};
use dumpload::validate::schema_is_valid;
use dumpload::Config;
use tempfile::TempDir;

use crate::common::write_file;

// =============================================================================
// Helper Functions
// =============================================================================

/// One data file for table `db`.`t`
fn setup_temp_table(name: &str, content: &str) -> (TempDir, LocalStore, TableMeta) {
    let temp = TempDir::new().unwrap();
    let mut meta = TableMeta::new("db", "t");
    meta.push_data_file(write_file(temp.path(), name, content));
    let store = LocalStore::new(temp.path()).unwrap();
    (temp, store, meta)
}

/// a NOT NULL, b nullable, c NOT NULL with default
fn target() -> TableInfo {
    TableInfo::new(1, "db", "t")
        .with_column(ColumnInfo::new("a").not_null())
        .with_column(ColumnInfo::new("b"))
        .with_column(ColumnInfo::new("c").not_null().with_default("0"))
}

fn header_config() -> Config {
    Config::builder().csv_header(true).build()
}

fn ignore(columns: &[&str]) -> IgnoreColumns {
    IgnoreColumns {
        db: "db".to_string(),
        table: "t".to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_missing_target_table() {
    let (_temp, store, meta) = setup_temp_table("db.t.1.sql", "INSERT INTO t VALUES (1);\n");
    let msgs = schema_is_valid(&Config::default(), &store, &meta, None).unwrap();
    assert_eq!(msgs, vec!["table `db`.`t` doesn't exist".to_string()]);
}

#[test]
fn test_table_without_data_files() {
    let temp = TempDir::new().unwrap();
    let store = LocalStore::new(temp.path()).unwrap();
    let meta = TableMeta::new("db", "t");

    let msgs = schema_is_valid(&Config::default(), &store, &meta, Some(&target())).unwrap();
    assert!(msgs.is_empty());
}

#[test]
fn test_positional_rows_need_trailing_defaults() {
    let info = TableInfo::new(1, "db", "t")
        .with_column(ColumnInfo::new("a").not_null())
        .with_column(ColumnInfo::new("b").not_null())
        .with_column(ColumnInfo::new("c").not_null())
        .with_column(ColumnInfo::new("d"));
    let (_temp, store, meta) = setup_temp_table("db.t.1.sql", "INSERT INTO t VALUES (1,2);\n");

    let msgs = schema_is_valid(&Config::default(), &store, &meta, Some(&info)).unwrap();
    assert_eq!(
        msgs,
        vec!["table `db`.`t` has 4 columns, and data file has 2 columns, but column c are missing the default value".to_string()]
    );
}

#[test]
fn test_positional_rows_with_defaults_pass() {
    let (_temp, store, meta) = setup_temp_table("db.t.1.csv", "1\n2\n");
    let msgs = schema_is_valid(&Config::default(), &store, &meta, Some(&target())).unwrap();
    assert!(msgs.is_empty());
}

#[test]
fn test_empty_data_file_passes() {
    let (_temp, store, meta) = setup_temp_table("db.t.1.sql", "-- nothing here\n");
    let msgs = schema_is_valid(&Config::default(), &store, &meta, Some(&target())).unwrap();
    assert!(msgs.is_empty());
}

#[test]
fn test_ignored_column_without_default() {
    let cfg = Config::builder()
        .csv_header(true)
        .ignore_columns(ignore(&["A"]))
        .build();
    let (_temp, store, meta) = setup_temp_table("db.t.1.csv", "a,b\n1,2\n");

    let msgs = schema_is_valid(&cfg, &store, &meta, Some(&target())).unwrap();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].starts_with("table `db`.`t`'s column a cannot be ignored"));
}

#[test]
fn test_unknown_source_column() {
    let (_temp, store, meta) = setup_temp_table("db.t.1.csv", "a,X,_row_id\n1,2,3\n");

    let msgs = schema_is_valid(&header_config(), &store, &meta, Some(&target())).unwrap();
    assert_eq!(
        msgs,
        vec!["table `db`.`t` doesn't have column x, please use ignore columns to skip it".to_string()]
    );
}

#[test]
fn test_unknown_source_column_ignored() {
    let cfg = Config::builder()
        .csv_header(true)
        .ignore_columns(ignore(&["x"]))
        .build();
    let (_temp, store, meta) = setup_temp_table("db.t.1.csv", "a,x\n1,2\n");

    let msgs = schema_is_valid(&cfg, &store, &meta, Some(&target())).unwrap();
    assert!(msgs.is_empty());
}

#[test]
fn test_target_column_missing_from_header() {
    let (_temp, store, meta) = setup_temp_table("db.t.1.csv", "b,c\n1,2\n");

    let msgs = schema_is_valid(&header_config(), &store, &meta, Some(&target())).unwrap();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].starts_with("table `db`.`t` doesn't have the default value for a, please give a default value for a"));
}

#[test]
fn test_sql_column_list_checked_like_header() {
    let (_temp, store, meta) =
        setup_temp_table("db.t.1.sql", "INSERT INTO t (B, Y) VALUES (1,2);\n");

    let msgs = schema_is_valid(&Config::default(), &store, &meta, Some(&target())).unwrap();
    assert_eq!(msgs.len(), 2);
    assert!(msgs[0].contains("doesn't have column y"));
    assert!(msgs[1].contains("doesn't have the default value for a"));
}

#[test]
fn test_matching_header_passes() {
    let (_temp, store, meta) = setup_temp_table("db.t.1.csv", "A,b,c\n1,2,3\n");
    let msgs = schema_is_valid(&header_config(), &store, &meta, Some(&target())).unwrap();
    assert!(msgs.is_empty());
}
