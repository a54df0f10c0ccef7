//! Tests for region splitting and engine packing
//!
//! These tests verify:
//! - Unsplit files become one region each with reserved row ids
//! - Strict CSV and SQL files are cut at line / statement terminators
//! - A CSV header is skipped and its columns attached to every region
//! - Rows naming fewer columns than the table reserve more row ids
//! - Regions are packed into engines in file order
//! - Cancellation stops planning

use std::fs;

use dumpload::checkpoint::Chunk;
use dumpload::concurrency::{CancelToken, WorkerPool};
use dumpload::config::Config;
use dumpload::source::region::allocate_engine_ids;
use dumpload::source::{split_regions, FileRegion, LocalStore, SourceFile, SourceType, TableMeta};
use dumpload::LoadError;
use tempfile::TempDir;

use crate::common::{abc_table, setup_temp_dump, setup_temp_partial_dump, sql_row, write_file};

// =============================================================================
// Helper Functions
// =============================================================================

fn split(cfg: &Config, store: &LocalStore, meta: &TableMeta) -> Vec<FileRegion> {
    let io_workers = WorkerPool::new(cfg.io_concurrency, "io");
    let cancel = CancelToken::new();
    split_regions(cfg, store, meta, &abc_table(1), &io_workers, &cancel).unwrap()
}

fn spans(regions: &[FileRegion]) -> Vec<(u64, u64, i64, i64)> {
    regions
        .iter()
        .map(|r| (r.chunk.offset, r.chunk.end_offset, r.chunk.prev_row_id_max, r.chunk.row_id_max))
        .collect()
}

fn single_file(name: &str, content: &str) -> (TempDir, LocalStore, TableMeta) {
    let temp = TempDir::new().unwrap();
    let file = write_file(temp.path(), name, content);
    let mut meta = TableMeta::new("db", "table");
    meta.push_data_file(file);
    let store = LocalStore::new(temp.path()).unwrap();
    (temp, store, meta)
}

fn region(size: u64) -> FileRegion {
    FileRegion {
        engine_id: -7,
        file: SourceFile::new("f.sql", SourceType::Sql, size),
        chunk: Chunk {
            offset: 0,
            end_offset: size,
            prev_row_id_max: 0,
            row_id_max: 0,
            columns: Vec::new(),
        },
    }
}

// =============================================================================
// Whole Files
// =============================================================================

#[test]
fn test_fixture_regions_and_engines() {
    let (_temp, store, meta) = setup_temp_dump();
    let cfg = Config::builder().batch_size(111).build();

    let regions = split(&cfg, &store, &meta);
    assert_eq!(regions.len(), 7);

    let engines: Vec<i32> = regions.iter().map(|r| r.engine_id).collect();
    assert_eq!(engines, vec![0, 0, 0, 1, 1, 1, 2]);

    let maxes: Vec<i64> = regions.iter().map(|r| r.chunk.row_id_max).collect();
    assert_eq!(maxes, vec![7, 14, 21, 28, 35, 42, 46]);

    for pair in regions.windows(2) {
        assert_eq!(pair[1].chunk.prev_row_id_max, pair[0].chunk.row_id_max);
    }
    assert_eq!(regions[6].file.path, "db.table.99.csv");
}

#[test]
fn test_small_table_single_engine() {
    let (_temp, store, meta) = setup_temp_dump();
    let cfg = Config::default();

    let regions = split(&cfg, &store, &meta);
    assert!(regions.iter().all(|r| r.engine_id == 0));
    assert!(regions.iter().all(|r| r.chunk.offset == 0));
}

#[test]
fn test_non_strict_file_is_not_split() {
    let (_temp, store, meta) = single_file("db.table.1.csv", &"1,2,3\n".repeat(10));
    let cfg = Config::builder().max_region_size(12).build();

    let regions = split(&cfg, &store, &meta);
    assert_eq!(spans(&regions), vec![(0, 60, 0, 20)]);
}

// =============================================================================
// Strict Splitting
// =============================================================================

#[test]
fn test_split_strict_csv() {
    let (_temp, store, meta) = single_file("db.table.1.csv", &"1,2,3\n".repeat(10));
    let cfg = Config::builder()
        .max_region_size(12)
        .strict_format(true)
        .build();

    let regions = split(&cfg, &store, &meta);
    assert_eq!(
        spans(&regions),
        vec![(0, 18, 0, 6), (18, 36, 6, 12), (36, 54, 12, 18), (54, 60, 18, 20)]
    );
}

#[test]
fn test_split_strict_sql() {
    let content: String = (1..=4).map(sql_row).collect();
    let (_temp, store, meta) = single_file("db.table.1.sql", &content);
    let cfg = Config::builder()
        .max_region_size(40)
        .strict_format(true)
        .build();

    let regions = split(&cfg, &store, &meta);
    assert_eq!(spans(&regions), vec![(0, 74, 0, 14), (74, 148, 14, 28)]);
}

#[test]
fn test_file_within_threshold_is_not_split() {
    // 10% over max_region_size is tolerated
    let (_temp, store, meta) = single_file("db.table.1.csv", "1,2,3\n1,2,3\n");
    let cfg = Config::builder()
        .max_region_size(11)
        .strict_format(true)
        .build();

    let regions = split(&cfg, &store, &meta);
    assert_eq!(spans(&regions), vec![(0, 12, 0, 4)]);
}

#[test]
fn test_split_csv_with_header() {
    let content = format!("a,b,c\n{}", "1,2,3\n".repeat(4));
    let (_temp, store, meta) = single_file("db.table.1.csv", &content);
    let cfg = Config::builder()
        .max_region_size(10)
        .strict_format(true)
        .csv_header(true)
        .build();

    let regions = split(&cfg, &store, &meta);
    assert_eq!(regions[0].chunk.offset, 6);
    assert_eq!(regions.last().unwrap().chunk.end_offset, 30);
    for r in &regions {
        assert_eq!(r.chunk.columns, vec!["a", "b", "c"]);
    }
}

#[test]
fn test_split_without_trailing_terminator() {
    let mut content = "1,2,3\n".repeat(3);
    content.push_str("4,5,6");
    let (_temp, store, meta) = single_file("db.table.1.csv", &content);
    let cfg = Config::builder()
        .max_region_size(14)
        .strict_format(true)
        .build();

    let regions = split(&cfg, &store, &meta);
    assert_eq!(regions.last().unwrap().chunk.end_offset, 23);
    let covered: u64 = regions.iter().map(FileRegion::size).sum();
    assert_eq!(covered, 23);
}

// =============================================================================
// Row Id Reservations
// =============================================================================

#[test]
fn test_partial_column_lists_reserve_short_rows() {
    let (_temp, store, meta) = setup_temp_partial_dump();
    let cfg = Config::builder().csv_header(true).build();

    let regions = split(&cfg, &store, &meta);
    // 123 bytes of one-column tuples, 84 bytes of two-field lines
    assert_eq!(spans(&regions), vec![(0, 123, 0, 41), (0, 84, 41, 83)]);
}

#[test]
fn test_positional_rows_use_table_columns() {
    let (_temp, store, meta) = single_file("db.table.1.csv", "a,b\n1,2\n");

    let regions = split(&Config::default(), &store, &meta);
    assert_eq!(spans(&regions), vec![(0, 8, 0, 2)]);

    let cfg = Config::builder().csv_header(true).build();
    let regions = split(&cfg, &store, &meta);
    assert_eq!(spans(&regions), vec![(0, 8, 0, 4)]);
}

#[test]
fn test_unterminated_csv_counts_last_row() {
    // Three rows of empty fields, the last without a line feed
    let (_temp, store, meta) = single_file("db.table.1.csv", ",,\n,,\n,,");

    let regions = split(&Config::default(), &store, &meta);
    assert_eq!(spans(&regions), vec![(0, 8, 0, 3)]);
}

#[test]
fn test_unreadable_sql_plans_shortest_rows() {
    let (_temp, store, meta) = single_file("db.table.1.sql", "INSERT INTO `table` (a VALUES (1);\n");

    let regions = split(&Config::default(), &store, &meta);
    assert_eq!(spans(&regions), vec![(0, 35, 0, 11)]);
}

// =============================================================================
// Engine Packing and Failures
// =============================================================================

#[test]
fn test_allocate_engine_ids() {
    let mut regions = vec![region(5), region(5), region(10), region(1)];
    allocate_engine_ids(&mut regions, 10);
    let ids: Vec<i32> = regions.iter().map(|r| r.engine_id).collect();
    assert_eq!(ids, vec![0, 0, 1, 2]);
}

#[test]
fn test_allocate_engine_ids_fits_one_batch() {
    let mut regions = vec![region(5), region(5)];
    allocate_engine_ids(&mut regions, 10);
    assert!(regions.iter().all(|r| r.engine_id == -7));
}

#[test]
fn test_canceled_planning() {
    let (_temp, store, meta) = setup_temp_dump();
    let cfg = Config::default();
    let io_workers = WorkerPool::new(2, "io");
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = split_regions(&cfg, &store, &meta, &abc_table(1), &io_workers, &cancel).unwrap_err();
    assert!(matches!(err, LoadError::Canceled));
}

#[test]
fn test_missing_file_fails() {
    let (temp, store, meta) = setup_temp_dump();
    fs::remove_file(temp.path().join("db.table.3.sql")).unwrap();
    let cfg = Config::builder().max_region_size(10).strict_format(true).build();
    let io_workers = WorkerPool::new(1, "io");
    let cancel = CancelToken::new();

    let result = split_regions(&cfg, &store, &meta, &abc_table(1), &io_workers, &cancel);
    assert!(result.is_err());
}
