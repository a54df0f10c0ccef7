//! Configuration for dumpload
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LoadError, Result};

/// Main configuration for a restore run
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Planning Configuration
    // -------------------------------------------------------------------------
    /// Target byte size of a data engine (sum of its chunks' byte spans)
    pub batch_size: u64,

    /// Max byte size of a single chunk when a file is split
    pub max_region_size: u64,

    /// Buffer size used when reading source files
    pub read_block_size: usize,

    /// Source files are well formed: CSV line terminators and SQL statement
    /// terminators never appear inside quoted values, so files may be split
    pub strict_format: bool,

    /// CSV dialect
    pub csv: CsvConfig,

    /// Source columns to ignore, per table
    pub ignore_columns: Vec<IgnoreColumns>,

    // -------------------------------------------------------------------------
    // Concurrency Configuration
    // -------------------------------------------------------------------------
    /// Tables restored at the same time
    pub table_concurrency: usize,

    /// Chunks restored at the same time
    pub region_concurrency: usize,

    /// Concurrent source-file I/O operations during planning
    pub io_concurrency: usize,

    // -------------------------------------------------------------------------
    // Pipeline Configuration
    // -------------------------------------------------------------------------
    /// Max rows per encoded batch
    pub max_kv_pairs: usize,

    /// Encoded KV bytes after which a batch is delivered
    pub min_deliver_bytes: u64,

    /// Capacity of the encoder → deliverer channel (in batches)
    pub kv_queue_size: usize,

    /// Capacity of the checkpoint save channel
    pub checkpoint_queue_size: usize,

    // -------------------------------------------------------------------------
    // Disk Quota Configuration
    // -------------------------------------------------------------------------
    /// Max bytes of sorted KV data kept locally before engines are imported
    pub disk_quota: Option<u64>,

    /// How often the disk quota is checked
    pub disk_quota_check_interval: Duration,

    // -------------------------------------------------------------------------
    // Post-processing Configuration
    // -------------------------------------------------------------------------
    /// Compare local and remote checksums after import
    pub checksum: bool,

    // -------------------------------------------------------------------------
    // Local Backend Configuration
    // -------------------------------------------------------------------------
    /// Root directory for sorted engine files
    /// Internal structure:
    ///   {sorted_kv_dir}/
    ///     ├── engines/{table}/{engine_id}/   (engine files)
    ///     └── imported/{table}/              (imported files)
    pub sorted_kv_dir: PathBuf,

    /// Buffered bytes after which a local writer flushes a sorted file
    pub local_writer_flush_size: usize,
}

/// CSV dialect options
#[derive(Debug, Clone)]
pub struct CsvConfig {
    /// Field separator
    pub separator: u8,

    /// Quote character; `None` disables quoting
    pub delimiter: Option<u8>,

    /// First line of each file names the columns
    pub header: bool,

    /// Unquoted field text that stands for NULL
    pub null: String,

    /// Backslash escapes the next character
    pub backslash_escape: bool,

    /// Drop a trailing empty field produced by a separator at end of line
    pub trim_last_sep: bool,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            separator: b',',
            delimiter: Some(b'"'),
            header: false,
            null: "\\N".to_string(),
            backslash_escape: true,
            trim_last_sep: false,
        }
    }
}

/// Columns of a source table that should not be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreColumns {
    pub db: String,
    pub table: String,
    pub columns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 100 * 1024 * 1024 * 1024,   // 100 GiB
            max_region_size: 256 * 1024 * 1024,     // 256 MiB
            read_block_size: 64 * 1024,             // 64 KiB
            strict_format: false,
            csv: CsvConfig::default(),
            ignore_columns: Vec::new(),
            table_concurrency: 6,
            region_concurrency: 8,
            io_concurrency: 5,
            max_kv_pairs: 4096,
            min_deliver_bytes: 96 * 1024,            // 96 KiB
            kv_queue_size: 32,
            checkpoint_queue_size: 1024,
            disk_quota: None,
            disk_quota_check_interval: Duration::from_secs(60),
            checksum: true,
            sorted_kv_dir: PathBuf::from("./dumpload_sorted_kv"),
            local_writer_flush_size: 16 * 1024 * 1024, // 16 MiB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values that would stall or break the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(LoadError::Config("batch_size must be positive".to_string()));
        }
        if self.max_region_size == 0 {
            return Err(LoadError::Config("max_region_size must be positive".to_string()));
        }
        if self.read_block_size == 0 {
            return Err(LoadError::Config("read_block_size must be positive".to_string()));
        }
        if self.table_concurrency == 0 || self.region_concurrency == 0 || self.io_concurrency == 0 {
            return Err(LoadError::Config("concurrency limits must be positive".to_string()));
        }
        if self.max_kv_pairs == 0 {
            return Err(LoadError::Config("max_kv_pairs must be positive".to_string()));
        }
        if self.csv.delimiter == Some(self.csv.separator) {
            return Err(LoadError::Config(
                "csv separator and delimiter must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Ignored source columns (lower-cased) for a table
    pub fn ignored_columns_for(&self, db: &str, table: &str) -> Vec<String> {
        self.ignore_columns
            .iter()
            .filter(|ig| ig.db.eq_ignore_ascii_case(db) && ig.table.eq_ignore_ascii_case(table))
            .flat_map(|ig| ig.columns.iter().map(|c| c.to_lowercase()))
            .collect()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the engine batch size (in bytes)
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the max region size (in bytes)
    pub fn max_region_size(mut self, size: u64) -> Self {
        self.config.max_region_size = size;
        self
    }

    /// Set the source read buffer size (in bytes)
    pub fn read_block_size(mut self, size: usize) -> Self {
        self.config.read_block_size = size;
        self
    }

    /// Declare the sources strictly formatted (enables splitting)
    pub fn strict_format(mut self, strict: bool) -> Self {
        self.config.strict_format = strict;
        self
    }

    /// Set the CSV dialect
    pub fn csv(mut self, csv: CsvConfig) -> Self {
        self.config.csv = csv;
        self
    }

    /// Treat the first CSV line as a header
    pub fn csv_header(mut self, header: bool) -> Self {
        self.config.csv.header = header;
        self
    }

    /// Add a set of ignored columns
    pub fn ignore_columns(mut self, ignore: IgnoreColumns) -> Self {
        self.config.ignore_columns.push(ignore);
        self
    }

    /// Set the number of tables restored concurrently
    pub fn table_concurrency(mut self, count: usize) -> Self {
        self.config.table_concurrency = count;
        self
    }

    /// Set the number of chunks restored concurrently
    pub fn region_concurrency(mut self, count: usize) -> Self {
        self.config.region_concurrency = count;
        self
    }

    /// Set the number of concurrent planning I/O operations
    pub fn io_concurrency(mut self, count: usize) -> Self {
        self.config.io_concurrency = count;
        self
    }

    /// Set the max rows per encoded batch
    pub fn max_kv_pairs(mut self, count: usize) -> Self {
        self.config.max_kv_pairs = count;
        self
    }

    /// Set the delivery threshold (in encoded bytes)
    pub fn min_deliver_bytes(mut self, bytes: u64) -> Self {
        self.config.min_deliver_bytes = bytes;
        self
    }

    /// Set the encoder → deliverer channel capacity
    pub fn kv_queue_size(mut self, size: usize) -> Self {
        self.config.kv_queue_size = size;
        self
    }

    /// Set the checkpoint save channel capacity
    pub fn checkpoint_queue_size(mut self, size: usize) -> Self {
        self.config.checkpoint_queue_size = size;
        self
    }

    /// Set the local disk quota (in bytes)
    pub fn disk_quota(mut self, bytes: u64) -> Self {
        self.config.disk_quota = Some(bytes);
        self
    }

    /// Set the disk quota check interval
    pub fn disk_quota_check_interval(mut self, interval: Duration) -> Self {
        self.config.disk_quota_check_interval = interval;
        self
    }

    /// Enable or disable post-import checksum comparison
    pub fn checksum(mut self, enabled: bool) -> Self {
        self.config.checksum = enabled;
        self
    }

    /// Set the local backend directory
    pub fn sorted_kv_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sorted_kv_dir = path.into();
        self
    }

    /// Set the local writer flush size (in bytes)
    pub fn local_writer_flush_size(mut self, size: usize) -> Self {
        self.config.local_writer_flush_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
