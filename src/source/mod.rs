//! Source Module
//!
//! Everything about the dumped input: where it lives, how its files are
//! routed to tables, how rows are parsed and how files are cut into
//! row-addressable regions.
//!
//! ## File Routing
//! ```text
//!   db-schema-create.sql          → (database schema, skipped)
//!   db.table-schema.sql           → TableSchema
//!   db.table-schema-view.sql      → ViewSchema
//!   db.table[.sortkey].sql        → Sql data file
//!   db.table[.sortkey].csv        → Csv data file
//!   db.table[.sortkey].parquet    → Parquet data file
//! ```

pub mod csv;
pub mod parser;
pub mod region;
pub mod sql;
mod store;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{LoadError, Result};

pub use self::csv::CsvParser;
pub use parser::{Row, RowParser, Value};
pub use region::{split_regions, FileRegion};
pub use sql::SqlParser;
pub use store::{LocalStore, ReadSeek, SourceStore};

// =============================================================================
// Source Files
// =============================================================================

/// Kind of a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    Sql,
    Csv,
    TableSchema,
    ViewSchema,
    Parquet,
}

/// An immutable source file description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub source_type: SourceType,
    pub file_size: u64,
    pub sort_key: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, source_type: SourceType, file_size: u64) -> Self {
        Self {
            path: path.into(),
            source_type,
            file_size,
            sort_key: String::new(),
        }
    }

    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = sort_key.into();
        self
    }
}

/// Read-only planner input for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub db: String,
    pub name: String,
    pub schema_file: Option<SourceFile>,
    pub total_size: u64,
    /// Ordered by `sort_key`
    pub data_files: Vec<SourceFile>,
}

impl TableMeta {
    pub fn new(db: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            name: name.into(),
            schema_file: None,
            total_size: 0,
            data_files: Vec::new(),
        }
    }

    /// Append a data file, keeping `total_size` in step
    pub fn push_data_file(&mut self, file: SourceFile) {
        self.total_size += file.file_size;
        self.data_files.push(file);
    }

    /// "`db`.`table`"
    pub fn unique_name(&self) -> String {
        unique_table(&self.db, &self.name)
    }
}

/// Quote a table name the way log lines and checkpoints refer to it
pub fn unique_table(db: &str, table: &str) -> String {
    format!("`{}`.`{}`", db, table)
}

// =============================================================================
// Discovery
// =============================================================================

/// Route every file in the store to its table and return the tables sorted
/// by `(db, name)`. Data files within a table are sorted by sort key.
pub fn discover_tables(store: &dyn SourceStore) -> Result<Vec<TableMeta>> {
    let mut tables: BTreeMap<(String, String), TableMeta> = BTreeMap::new();

    for (path, size) in store.walk()? {
        let file_name = path.rsplit('/').next().unwrap_or(path.as_str());
        let Some(routed) = route_file_name(file_name) else {
            tracing::debug!(path = %path, "skipping unrecognized source file");
            continue;
        };

        let entry = tables
            .entry((routed.db.clone(), routed.table.clone()))
            .or_insert_with(|| TableMeta::new(&routed.db, &routed.table));

        let file = SourceFile::new(path.clone(), routed.source_type, size)
            .with_sort_key(routed.sort_key);
        match routed.source_type {
            SourceType::TableSchema | SourceType::ViewSchema => {
                if entry.schema_file.is_some() {
                    return Err(LoadError::Planning(format!(
                        "duplicate schema file for {}: {}",
                        entry.unique_name(),
                        path
                    )));
                }
                entry.schema_file = Some(file);
            }
            _ => entry.push_data_file(file),
        }
    }

    let mut result: Vec<TableMeta> = tables.into_values().collect();
    for table in &mut result {
        table
            .data_files
            .sort_by(|a, b| compare_sort_keys(&a.sort_key, &b.sort_key).then(a.path.cmp(&b.path)));
    }
    tracing::info!(tables = result.len(), "discovered source tables");
    Ok(result)
}

/// Result of routing one file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedFile {
    pub db: String,
    pub table: String,
    pub source_type: SourceType,
    pub sort_key: String,
}

/// Parse a dump file name. Returns `None` for files that belong to no table.
pub fn route_file_name(name: &str) -> Option<RoutedFile> {
    let (stem, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();

    if ext == "sql" {
        if let Some(base) = stem.strip_suffix("-schema-view") {
            let (db, table) = base.split_once('.')?;
            return Some(RoutedFile::schema(db, table, SourceType::ViewSchema));
        }
        if let Some(base) = stem.strip_suffix("-schema") {
            let (db, table) = base.split_once('.')?;
            return Some(RoutedFile::schema(db, table, SourceType::TableSchema));
        }
        if stem.ends_with("-schema-create") {
            return None;
        }
    }

    let source_type = match ext.as_str() {
        "sql" => SourceType::Sql,
        "csv" => SourceType::Csv,
        "parquet" => SourceType::Parquet,
        _ => return None,
    };

    let mut parts = stem.splitn(3, '.');
    let db = parts.next().filter(|s| !s.is_empty())?;
    let table = parts.next().filter(|s| !s.is_empty())?;
    let sort_key = parts.next().unwrap_or("");
    Some(RoutedFile {
        db: db.to_string(),
        table: table.to_string(),
        source_type,
        sort_key: sort_key.to_string(),
    })
}

impl RoutedFile {
    fn schema(db: &str, table: &str, source_type: SourceType) -> Self {
        Self {
            db: db.to_string(),
            table: table.to_string(),
            source_type,
            sort_key: String::new(),
        }
    }
}

/// Numeric sort keys compare by value; anything else compares as text
fn compare_sort_keys(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

// =============================================================================
// Parser Construction
// =============================================================================

/// Open a parser for a data file, positioned at the start of the file
pub fn open_parser(
    cfg: &Config,
    store: &dyn SourceStore,
    file: &SourceFile,
) -> Result<Box<dyn RowParser>> {
    let reader = store.open(&file.path)?;
    match file.source_type {
        SourceType::Csv => Ok(Box::new(CsvParser::new(
            cfg.csv.clone(),
            reader,
            cfg.read_block_size,
        ))),
        SourceType::Sql => Ok(Box::new(SqlParser::new(reader, cfg.read_block_size))),
        SourceType::Parquet => Err(LoadError::Syntax(format!(
            "parquet source {} is not supported by this loader",
            file.path
        ))),
        SourceType::TableSchema | SourceType::ViewSchema => Err(LoadError::Syntax(format!(
            "{} is a schema file, not a data file",
            file.path
        ))),
    }
}
