//! Target Table Schema
//!
//! The loader does not parse DDL; callers hand it a ready `TableInfo`.
//! This module also maps source columns onto target columns.
//!
//! ## Column Permutation
//! ```text
//!   target columns:   a   b   c   [_row_id]
//!   source header:    b, c, a
//!   permutation:     [2,  0,  1,  -1]
//!                     │   │   │    └─ hidden row id not in source
//!                     └───┴───┴──── source field index per target column
//! ```
//! The hidden row id slot exists only when the table has no explicit
//! integer handle column.

use std::collections::{HashMap, HashSet};

use crate::error::{LoadError, Result};

/// Name of the hidden row id column
pub const ROW_ID_COLUMN: &str = "_row_id";

// =============================================================================
// Schema Types
// =============================================================================

/// One target column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Original-case name
    pub name: String,
    pub not_null: bool,
    /// Literal default value
    pub default: Option<String>,
    pub auto_increment: bool,
    /// Value computed by the target; never read from the source
    pub generated: bool,
}

impl ColumnInfo {
    /// A nullable column without default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            not_null: false,
            default: None,
            auto_increment: false,
            generated: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// Lower-cased name used for matching
    pub fn lower_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// True if an insert may omit this column
    pub fn has_default(&self) -> bool {
        self.default.is_some() || !self.not_null || self.auto_increment || self.generated
    }
}

/// One secondary index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub id: i64,
    pub name: String,
    /// Offsets into `TableInfo::columns`
    pub columns: Vec<usize>,
    pub unique: bool,
}

/// Target table description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub id: i64,
    pub db: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indices: Vec<IndexInfo>,
    /// Integer primary key column used directly as the row handle
    pub handle_column: Option<usize>,
}

impl TableInfo {
    pub fn new(id: i64, db: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            db: db.into(),
            name: name.into(),
            columns: Vec::new(),
            indices: Vec::new(),
            handle_column: None,
        }
    }

    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    /// Add an index over the named columns
    pub fn with_index(mut self, name: &str, columns: &[&str], unique: bool) -> Result<Self> {
        let offsets = columns
            .iter()
            .map(|c| {
                self.column_offset(c).ok_or_else(|| {
                    LoadError::Config(format!("index {} names unknown column {}", name, c))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let id = self.indices.len() as i64 + 1;
        self.indices.push(IndexInfo {
            id,
            name: name.to_string(),
            columns: offsets,
            unique,
        });
        Ok(self)
    }

    /// Use the named column as the integer row handle
    pub fn with_handle_column(mut self, column: &str) -> Result<Self> {
        let offset = self.column_offset(column).ok_or_else(|| {
            LoadError::Config(format!("handle names unknown column {}", column))
        })?;
        self.handle_column = Some(offset);
        Ok(self)
    }

    /// Case-insensitive column lookup
    pub fn column_offset(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.columns.iter().position(|c| c.lower_name() == name)
    }

    /// True if rows are keyed by the hidden row id
    pub fn has_auto_row_id(&self) -> bool {
        self.handle_column.is_none()
    }

    /// "`db`.`table`"
    pub fn unique_name(&self) -> String {
        crate::source::unique_table(&self.db, &self.name)
    }
}

// =============================================================================
// Column Mapping
// =============================================================================

/// Build the permutation for a chunk whose source names `columns`
/// (lower-cased). An empty `columns` means "source matches the table".
pub fn initialize_columns(
    info: &TableInfo,
    columns: &[String],
    ignore_columns: &[String],
) -> Result<Vec<i32>> {
    if columns.is_empty() {
        let mut perm: Vec<i32> = (0..info.columns.len() as i32).collect();
        if info.has_auto_row_id() {
            perm.push(-1);
        }
        return Ok(perm);
    }
    parse_column_permutation(info, columns, ignore_columns)
}

/// Map source column names onto target columns
pub fn parse_column_permutation(
    info: &TableInfo,
    columns: &[String],
    ignore_columns: &[String],
) -> Result<Vec<i32>> {
    let column_map: HashMap<String, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.to_lowercase(), i))
        .collect();
    let ignore: HashSet<String> = ignore_columns.iter().map(|c| c.to_lowercase()).collect();
    let table_columns: HashSet<String> = info.columns.iter().map(|c| c.lower_name()).collect();

    let unknown: Vec<String> = columns
        .iter()
        .map(|c| c.to_lowercase())
        .filter(|c| !table_columns.contains(c) && c != ROW_ID_COLUMN && !ignore.contains(c))
        .collect();
    if !unknown.is_empty() {
        return Err(LoadError::UnknownColumns(unknown));
    }

    let mut perm = Vec::with_capacity(info.columns.len() + 1);
    for column in &info.columns {
        let name = column.lower_name();
        match column_map.get(&name) {
            Some(&i) if !ignore.contains(&name) => perm.push(i as i32),
            Some(_) => {
                tracing::debug!(column = %column.name, "ignoring source column");
                perm.push(-1);
            }
            None => {
                if !column.generated {
                    tracing::warn!(
                        table = %info.unique_name(),
                        column = %column.name,
                        "column missing from data file, going to fill with default value"
                    );
                }
                perm.push(-1);
            }
        }
    }

    if let Some(&i) = column_map.get(ROW_ID_COLUMN) {
        perm.push(i as i32);
    } else if info.has_auto_row_id() {
        perm.push(-1);
    }
    Ok(perm)
}

/// Source column names in source order, recovered from a permutation
pub fn column_names(info: &TableInfo, permutation: &[i32]) -> Vec<String> {
    let mut by_source: Vec<Option<usize>> = vec![None; permutation.len()];
    for (target, &source) in permutation.iter().enumerate() {
        if source >= 0 {
            if let Some(slot) = by_source.get_mut(source as usize) {
                *slot = Some(target);
            }
        }
    }
    by_source
        .into_iter()
        .flatten()
        .map(|target| match info.columns.get(target) {
            Some(column) => column.name.clone(),
            None => ROW_ID_COLUMN.to_string(),
        })
        .collect()
}
