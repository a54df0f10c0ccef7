//! Pre-import Checks
//!
//! Read-only checks run before any data is written:
//! - `schema_is_valid` reconciles the first data file's columns with the
//!   target table
//! - `check_large_csv` warns about CSV files too big to import efficiently
//!   when they cannot be split

use std::collections::HashSet;

use crate::config::Config;
use crate::error::Result;
use crate::schema::{TableInfo, ROW_ID_COLUMN};
use crate::source::{open_parser, SourceStore, SourceType, TableMeta};

/// CSV files above this size are only split under strict format
pub const LARGE_CSV_THRESHOLD: u64 = 10 * 1024 * 1024 * 1024;

/// Outcome of a pre-check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub passed: bool,
    pub warnings: usize,
    pub message: String,
}

/// Compare the columns of a table's first data file with the target.
///
/// Returns one message per problem found; an empty list means the table
/// can be imported. `info` is `None` when the target has no such table.
pub fn schema_is_valid(
    cfg: &Config,
    store: &dyn SourceStore,
    meta: &TableMeta,
    info: Option<&TableInfo>,
) -> Result<Vec<String>> {
    let table = meta.unique_name();
    let Some(info) = info else {
        return Ok(vec![format!("table {} doesn't exist", table)]);
    };
    let Some(file) = meta.data_files.first() else {
        return Ok(Vec::new());
    };

    let mut parser = open_parser(cfg, store, file)?;
    let mut source_columns = Vec::new();
    let mut field_count = 0;
    if file.source_type == SourceType::Csv && cfg.csv.header {
        parser.read_columns()?;
        source_columns = parser.columns().to_vec();
    } else {
        match parser.read_row()? {
            Some(row) => {
                field_count = row.values.len();
                source_columns = parser.columns().to_vec();
            }
            None => {
                parser.close()?;
                return Ok(Vec::new());
            }
        }
    }
    parser.close()?;

    let mut msgs = Vec::new();
    if source_columns.is_empty() {
        if info.columns.len() > field_count {
            let missing: Vec<String> = info.columns[field_count..]
                .iter()
                .filter(|c| !c.has_default())
                .map(|c| c.lower_name())
                .collect();
            if !missing.is_empty() {
                msgs.push(format!(
                    "table {} has {} columns, and data file has {} columns, but column {} are missing the default value",
                    table,
                    info.columns.len(),
                    field_count,
                    missing.join(",")
                ));
            }
        }
        return Ok(msgs);
    }

    let ignore: HashSet<String> = cfg.ignored_columns_for(&meta.db, &meta.name).into_iter().collect();
    let header: HashSet<String> = source_columns.iter().map(|c| c.to_lowercase()).collect();

    for column in &info.columns {
        if ignore.contains(&column.lower_name()) && !column.has_default() {
            msgs.push(format!(
                "table {}'s column {} cannot be ignored, because it doesn't have a default value, please set tables.ignoreColumns properly",
                table,
                column.lower_name()
            ));
        }
    }

    for name in &source_columns {
        let name = name.to_lowercase();
        if name != ROW_ID_COLUMN && !ignore.contains(&name) && info.column_offset(&name).is_none() {
            msgs.push(format!(
                "table {} doesn't have column {}, please use ignore columns to skip it",
                table, name
            ));
        }
    }

    for column in &info.columns {
        let name = column.lower_name();
        if ignore.contains(&name) || header.contains(&name) || column.has_default() {
            continue;
        }
        msgs.push(format!(
            "table {} doesn't have the default value for {}, please give a default value for {} or choose another column to ignore or add this column in source file",
            table, name, name
        ));
    }
    Ok(msgs)
}

/// Warn about CSV files that cannot be split and are large enough to hurt
/// import concurrency.
pub fn check_large_csv(cfg: &Config, tables: &[TableMeta]) -> CheckResult {
    if cfg.strict_format {
        return CheckResult {
            passed: true,
            warnings: 0,
            message: "Skip the csv size check, because strict format is enabled".to_string(),
        };
    }

    let large: Vec<&str> = tables
        .iter()
        .flat_map(|t| &t.data_files)
        .filter(|f| f.source_type == SourceType::Csv && f.file_size > LARGE_CSV_THRESHOLD)
        .map(|f| f.path.as_str())
        .collect();

    if large.is_empty() {
        return CheckResult {
            passed: true,
            warnings: 0,
            message: "Source csv files size is proper".to_string(),
        };
    }

    let message = format!(
        "large csv: {} file exists and it will slow down import performance, enable strict format to split it",
        large.join(", ")
    );
    tracing::warn!(files = large.len(), "{}", message);
    CheckResult {
        passed: false,
        warnings: 1,
        message,
    }
}
