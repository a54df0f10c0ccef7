//! dumpload Binary
//!
//! Plans dump directories into chunks and imports them into a local
//! sorted-file backend.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dumpload::backend::LocalBackend;
use dumpload::checkpoint::{FileCheckpointStore, TableCheckpoint};
use dumpload::concurrency::{CancelToken, WorkerPool};
use dumpload::planner::ChunkPlanner;
use dumpload::schema::{ColumnInfo, TableInfo};
use dumpload::source::{discover_tables, LocalStore, TableMeta};
use dumpload::{Config, Controller, LoadError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// dumpload
#[derive(Parser, Debug)]
#[command(name = "dumpload")]
#[command(about = "Resumable bulk loader for SQL and CSV dump files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the planned engines and chunks of every table
    Plan(SourceArgs),

    /// Import every table into a local sorted-file backend
    Import {
        #[command(flatten)]
        source: SourceArgs,

        /// Directory receiving engine and imported files
        #[arg(short, long, default_value = "./dumpload_output")]
        output: PathBuf,

        /// Checkpoint file
        #[arg(short = 'p', long, default_value = "./dumpload.checkpoint")]
        checkpoint: PathBuf,

        /// Index over comma-separated columns; may repeat
        #[arg(short, long)]
        index: Vec<String>,

        /// Skip verifying imported tables against the delivered checksum
        #[arg(long)]
        no_checksum: bool,
    },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Directory holding the dump files
    #[arg(short, long)]
    source: PathBuf,

    /// Target columns, comma-separated. `name!` is NOT NULL,
    /// `name=value` has a default.
    #[arg(short, long)]
    columns: String,

    /// Bytes of source data per engine, in MB
    #[arg(long, default_value = "100")]
    batch_size: u64,

    /// Bytes per region of a splittable file, in MB
    #[arg(long, default_value = "256")]
    max_region_size: u64,

    /// CSV files start with a header line
    #[arg(long)]
    csv_header: bool,

    /// Source files have no line breaks inside values, so they may be split
    #[arg(long)]
    strict_format: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dumpload=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let cli = Cli::parse();
    tracing::info!("dumpload v{}", dumpload::VERSION);

    let result = match cli.command {
        Commands::Plan(source) => plan(&source),
        Commands::Import {
            source,
            output,
            checkpoint,
            index,
            no_checksum,
        } => import(&source, output, checkpoint, &index, !no_checksum),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn base_config(args: &SourceArgs) -> dumpload::config::ConfigBuilder {
    Config::builder()
        .batch_size(args.batch_size * 1024 * 1024)
        .max_region_size(args.max_region_size * 1024 * 1024)
        .csv_header(args.csv_header)
        .strict_format(args.strict_format)
}

/// "id!,name,age=0" → columns
fn parse_columns(list: &str) -> Result<Vec<ColumnInfo>> {
    let mut columns = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, default) = match part.split_once('=') {
            Some((name, default)) => (name, Some(default)),
            None => (part, None),
        };
        let (name, not_null) = match name.strip_suffix('!') {
            Some(name) => (name, true),
            None => (name, false),
        };
        let mut column = ColumnInfo::new(name);
        if not_null {
            column = column.not_null();
        }
        if let Some(default) = default {
            column = column.with_default(default);
        }
        columns.push(column);
    }
    if columns.is_empty() {
        return Err(LoadError::Config("no target columns given".to_string()));
    }
    Ok(columns)
}

fn table_info(id: i64, meta: &TableMeta, columns: &[ColumnInfo], indices: &[String]) -> Result<TableInfo> {
    let mut info = TableInfo::new(id, &meta.db, &meta.name);
    for column in columns {
        info = info.with_column(column.clone());
    }
    for index in indices {
        let cols: Vec<&str> = index.split(',').map(str::trim).collect();
        let name = format!("idx_{}", cols.join("_"));
        info = info.with_index(&name, &cols, false)?;
    }
    Ok(info)
}

fn plan(args: &SourceArgs) -> Result<()> {
    let cfg = base_config(args).build();
    cfg.validate()?;
    let store = LocalStore::new(&args.source)?;
    let columns = parse_columns(&args.columns)?;
    let io_workers = WorkerPool::new(cfg.io_concurrency, "io");
    let cancel = CancelToken::new();
    let planner = ChunkPlanner::new(&cfg, &store, &io_workers, &cancel);

    for (i, meta) in discover_tables(&store)?.iter().enumerate() {
        let info = table_info(i as i64 + 1, meta, &columns, &[])?;
        let ignore = cfg.ignored_columns_for(&meta.db, &meta.name);
        let mut cp = TableCheckpoint::default();
        planner.populate_chunks(meta, &info, &ignore, &mut cp)?;

        println!("{}", meta.unique_name());
        for (engine_id, engine) in &cp.engines {
            println!("  engine {}", engine_id);
            for chunk in &engine.chunks {
                println!(
                    "    {}  [{}, {})  rows ({}, {}]",
                    chunk.key,
                    chunk.chunk.offset,
                    chunk.chunk.end_offset,
                    chunk.chunk.prev_row_id_max,
                    chunk.chunk.row_id_max
                );
            }
        }
    }
    Ok(())
}

fn import(
    args: &SourceArgs,
    output: PathBuf,
    checkpoint: PathBuf,
    indices: &[String],
    checksum: bool,
) -> Result<()> {
    let cfg = base_config(args)
        .sorted_kv_dir(output)
        .checksum(checksum)
        .build();
    let store = Arc::new(LocalStore::new(&args.source)?);
    let backend = Arc::new(LocalBackend::open(&cfg)?);
    let checkpoints = Arc::new(FileCheckpointStore::open(&checkpoint)?);
    let columns = parse_columns(&args.columns)?;

    let tables = discover_tables(store.as_ref())?;
    let mut controller = Controller::new(cfg, store, backend.clone(), checkpoints)?
        .with_checksum_manager(backend);
    for (i, meta) in tables.into_iter().enumerate() {
        let info = table_info(i as i64 + 1, &meta, &columns, indices)?;
        controller.add_table(meta, info);
    }

    let problems = controller.pre_check()?;
    if !problems.is_empty() {
        return Err(LoadError::Config(problems.join("; ")));
    }
    controller.restore_tables()
}
