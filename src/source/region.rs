//! Region Splitting
//!
//! Cuts a table's data files into byte ranges, reserves row ids for each
//! range and packs the ranges into engines.
//!
//! ```text
//!   file:    |hdr|───────── max ─────────|──┐ advance to terminator
//!                 [start             end)  [start           end=size)
//!   rows:    (end - start) / bytes_per_row, bytes_per_row = fields (+2 for SQL)
//!   engines: greedy in file order, a new engine once the sum ≥ batch_size
//! ```

use std::io::{Read, Seek, SeekFrom};
use std::thread;

use crossbeam::channel;

use super::{CsvParser, RowParser, SourceFile, SourceStore, SourceType, SqlParser, TableMeta};
use crate::checkpoint::Chunk;
use crate::concurrency::{CancelToken, WorkerPool};
use crate::config::Config;
use crate::error::{LoadError, Result};
use crate::schema::TableInfo;

/// One planned chunk before it becomes a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRegion {
    pub engine_id: i32,
    pub file: SourceFile,
    pub chunk: Chunk,
}

impl FileRegion {
    pub fn size(&self) -> u64 {
        self.chunk.end_offset - self.chunk.offset
    }
}

/// A byte range of one file, before row ids are known
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileRange {
    start: u64,
    end: u64,
    columns: Vec<String>,
}

/// Plan every data file of a table into regions, in file order.
///
/// Files are scanned concurrently under `io_workers`; row ids and engine
/// ids are assigned afterwards, sequentially.
pub fn split_regions(
    cfg: &Config,
    store: &dyn SourceStore,
    meta: &TableMeta,
    info: &TableInfo,
    io_workers: &WorkerPool,
    cancel: &CancelToken,
) -> Result<Vec<FileRegion>> {
    let files = &meta.data_files;
    let threads = io_workers.limit().min(files.len()).max(1);

    let (job_tx, job_rx) = channel::unbounded::<usize>();
    for i in 0..files.len() {
        let _ = job_tx.send(i);
    }
    drop(job_tx);

    let mut results: Vec<(usize, Result<FilePlan>)> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let job_rx = job_rx.clone();
                s.spawn(move || {
                    let mut out = Vec::new();
                    while let Ok(i) = job_rx.recv() {
                        let result = io_workers
                            .apply(cancel)
                            .and_then(|_worker| file_ranges(cfg, store, &files[i]));
                        let failed = result.is_err();
                        out.push((i, result));
                        if failed {
                            break;
                        }
                    }
                    out
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_default())
            .collect()
    });
    results.sort_by_key(|(i, _)| *i);

    let mut regions = Vec::new();
    let mut prev_row_id_max = 0i64;
    let mut seen = 0;
    for (i, result) in results {
        let plan = result?;
        seen += 1;
        let file = &files[i];
        let divisor = bytes_per_row(info, file.source_type, plan.fields);
        let last = plan.ranges.len().saturating_sub(1);
        for (n, range) in plan.ranges.into_iter().enumerate() {
            let mut len = range.end - range.start;
            if n == last && plan.unterminated {
                len += 1;
            }
            let rows = (len / divisor) as i64;
            let row_id_max = prev_row_id_max + rows;
            regions.push(FileRegion {
                engine_id: 0,
                file: file.clone(),
                chunk: Chunk {
                    offset: range.start,
                    end_offset: range.end,
                    prev_row_id_max,
                    row_id_max,
                    columns: range.columns,
                },
            });
            prev_row_id_max = row_id_max;
        }
    }
    if seen != files.len() {
        cancel.check()?;
        return Err(LoadError::Planning(format!(
            "planning {} stopped after {} of {} files",
            meta.unique_name(),
            seen,
            files.len()
        )));
    }

    allocate_engine_ids(&mut regions, cfg.batch_size);
    Ok(regions)
}

/// Lower bound on the bytes one row occupies.
///
/// Every row carries `fields` values when the file names its columns,
/// otherwise one per table column. Each value takes at least one byte
/// including its separator or terminator.
fn bytes_per_row(info: &TableInfo, source_type: SourceType, fields: Option<usize>) -> u64 {
    let fields = fields.unwrap_or(info.columns.len()).max(1) as u64;
    match source_type {
        // "(" + ")" around every tuple
        SourceType::Sql => fields + 2,
        _ => fields,
    }
}

/// Pack regions into engines greedily, in order
pub fn allocate_engine_ids(regions: &mut [FileRegion], batch_size: u64) {
    let total: u64 = regions.iter().map(FileRegion::size).sum();
    if total <= batch_size {
        return;
    }

    let mut engine_id = 0;
    let mut engine_size = 0u64;
    for region in regions {
        region.engine_id = engine_id;
        engine_size += region.size();
        if engine_size >= batch_size {
            engine_size = 0;
            engine_id += 1;
        }
    }
}

/// Byte ranges of one file plus the field count its rows carry
struct FilePlan {
    ranges: Vec<FileRange>,
    fields: Option<usize>,
    /// Last CSV row has no terminator, one byte short of `bytes_per_row`
    unterminated: bool,
}

fn file_ranges(cfg: &Config, store: &dyn SourceStore, file: &SourceFile) -> Result<FilePlan> {
    let fields = named_fields(cfg, store, file)?;
    let threshold = cfg.max_region_size + cfg.max_region_size / 10;
    let splittable = matches!(file.source_type, SourceType::Csv | SourceType::Sql);
    let ranges = if cfg.strict_format && splittable && file.file_size > threshold {
        split_large_file(cfg, store, file)?
    } else {
        vec![FileRange {
            start: 0,
            end: file.file_size,
            columns: Vec::new(),
        }]
    };
    let unterminated = file.source_type == SourceType::Csv && !ends_with_newline(store, file)?;
    Ok(FilePlan {
        ranges,
        fields,
        unterminated,
    })
}

fn ends_with_newline(store: &dyn SourceStore, file: &SourceFile) -> Result<bool> {
    if file.file_size == 0 {
        return Ok(true);
    }
    let mut reader = store.open(&file.path)?;
    reader.seek(SeekFrom::Start(file.file_size - 1))?;
    let mut last = [0u8; 1];
    reader.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Number of columns a file names for its rows: the CSV header, or the
/// column list of the first INSERT statement. `None` when rows are
/// positional.
///
/// A dump file uses one column list throughout, so the first statement
/// speaks for the whole file.
fn named_fields(cfg: &Config, store: &dyn SourceStore, file: &SourceFile) -> Result<Option<usize>> {
    let mut parser: Box<dyn RowParser> = match file.source_type {
        SourceType::Csv if cfg.csv.header => {
            Box::new(CsvParser::new(cfg.csv.clone(), store.open(&file.path)?, cfg.read_block_size))
        }
        SourceType::Sql => Box::new(SqlParser::new(store.open(&file.path)?, cfg.read_block_size)),
        _ => return Ok(None),
    };

    let read = match file.source_type {
        SourceType::Csv => parser.read_columns(),
        _ => parser.read_row().map(|_| ()),
    };
    let fields = match read {
        Ok(()) => Some(parser.columns().len()).filter(|&n| n > 0),
        Err(err) => {
            // Restore reports it with a position
            tracing::debug!(path = %file.path, error = %err, "cannot read column names");
            Some(1)
        }
    };
    parser.close()?;
    Ok(fields)
}

/// Parser able to skip to the next safe cut point
enum Splitter {
    Csv(CsvParser),
    Sql(SqlParser),
}

impl Splitter {
    fn parser(&mut self) -> &mut dyn RowParser {
        match self {
            Splitter::Csv(p) => p,
            Splitter::Sql(p) => p,
        }
    }

    fn read_until_terminator(&mut self) -> Result<Option<u64>> {
        match self {
            Splitter::Csv(p) => p.read_until_terminator(),
            Splitter::Sql(p) => p.read_until_terminator(),
        }
    }
}

fn split_large_file(cfg: &Config, store: &dyn SourceStore, file: &SourceFile) -> Result<Vec<FileRange>> {
    let reader = store.open(&file.path)?;
    let mut splitter = match file.source_type {
        SourceType::Csv => Splitter::Csv(CsvParser::new(cfg.csv.clone(), reader, cfg.read_block_size)),
        _ => Splitter::Sql(SqlParser::new(reader, cfg.read_block_size)),
    };

    let mut columns = Vec::new();
    let mut start = 0;
    if file.source_type == SourceType::Csv && cfg.csv.header {
        let parser = splitter.parser();
        parser.read_columns()?;
        columns = parser.columns().to_vec();
        start = parser.pos().0;
    }

    let size = file.file_size;
    let mut ranges = Vec::new();
    let mut end = (start + cfg.max_region_size).min(size);
    loop {
        if end < size {
            splitter.parser().set_pos(end, 0)?;
            end = match splitter.read_until_terminator()? {
                Some(pos) => pos,
                None => {
                    tracing::warn!(path = %file.path, "file contains no terminator at end");
                    size
                }
            };
        }
        ranges.push(FileRange {
            start,
            end,
            columns: columns.clone(),
        });
        if end >= size {
            break;
        }
        start = end;
        end = (start + cfg.max_region_size).min(size);
    }

    splitter.parser().close()?;
    tracing::debug!(path = %file.path, regions = ranges.len(), "split large file");
    Ok(ranges)
}
