//! Per-chunk restore: a parser positioned at the chunk's checkpoint and the
//! encode/deliver pair driving it.

use std::thread;

use crossbeam::channel;

use super::{deliver_loop, encode_loop, DeliveredKvs, PipelineContext, TableContext};
use crate::backend::EngineWriter;
use crate::checkpoint::ChunkCheckpoint;
use crate::concurrency::{CancelToken, WorkerPool};
use crate::config::Config;
use crate::error::{LoadError, Result};
use crate::kv::Encoder;
use crate::source::{open_parser, RowParser, SourceStore, SourceType};

pub struct ChunkRestore {
    pub chunk: ChunkCheckpoint,
    parser: Box<dyn RowParser>,
}

impl ChunkRestore {
    /// Open the chunk's file and position the parser at `chunk.chunk.offset`.
    ///
    /// A CSV header is only read when the chunk starts at the beginning of
    /// the file; split chunks carry their header in `chunk.chunk.columns`.
    pub fn new(
        cfg: &Config,
        chunk: ChunkCheckpoint,
        store: &dyn SourceStore,
        io_workers: &WorkerPool,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let mut parser = {
            let _worker = io_workers.apply(cancel)?;
            open_parser(cfg, store, &chunk.file)?
        };

        parser.set_pos(chunk.chunk.offset, chunk.chunk.prev_row_id_max)?;
        if chunk.file.source_type == SourceType::Csv && cfg.csv.header && chunk.chunk.offset == 0 {
            parser.read_columns()?;
        }
        if !chunk.chunk.columns.is_empty() {
            parser.set_columns(chunk.chunk.columns.clone());
        }
        Ok(Self { chunk, parser })
    }

    pub fn close(&mut self) -> Result<()> {
        self.parser.close()
    }

    /// Resolve the column permutation before any row is encoded, so every
    /// checkpoint delta carries it.
    fn prepare_columns(&mut self, table: &TableContext) -> Result<()> {
        if !self.chunk.column_permutation.is_empty() {
            return Ok(());
        }
        if self.chunk.file.source_type == SourceType::Sql {
            self.parser.read_columns()?;
        }
        self.chunk.column_permutation = crate::schema::initialize_columns(
            &table.info,
            self.parser.columns(),
            &table.ignore_columns,
        )
        .map_err(|e| e.in_file(&self.chunk.key, self.parser.pos().0))?;
        Ok(())
    }

    /// Encode and deliver the rest of the chunk.
    ///
    /// Delivery runs on a scoped thread; encoding runs here. The first error
    /// from either side is returned. On success `self.chunk` reflects every
    /// delivered row.
    pub fn restore(
        &mut self,
        ctx: &PipelineContext,
        table: &TableContext,
        engine_id: i32,
        encoder: &mut dyn Encoder,
        data_writer: &mut dyn EngineWriter,
        index_writer: &mut dyn EngineWriter,
    ) -> Result<()> {
        self.prepare_columns(table)?;

        let (kvs_tx, kvs_rx) = channel::bounded::<Vec<DeliveredKvs>>(ctx.kv_queue_size);
        let (done_tx, done_rx) = channel::bounded::<Result<()>>(1);
        let mut encode_view = self.chunk.clone();
        let Self { chunk, parser } = self;

        let encoded = thread::scope(|s| {
            let deliver = s.spawn(move || {
                let result = deliver_loop(ctx, &table.name, engine_id, chunk, &kvs_rx, data_writer, index_writer)
                    .map(|_| ());
                let _ = done_tx.send(result);
            });

            let encoded = encode_loop(
                ctx,
                table,
                &mut encode_view,
                parser.as_mut(),
                encoder,
                &kvs_tx,
                &done_rx,
            );
            drop(kvs_tx);
            if deliver.join().is_err() {
                return Err(LoadError::Delivery("deliver loop panicked".to_string()));
            }
            encoded
        });

        // A deliver failure is the root cause of whatever the encoder saw
        match (encoded, done_rx.try_recv()) {
            (_, Ok(Err(e))) => Err(e),
            (Err(e), _) => Err(e),
            (Ok(_), Ok(Ok(()))) => Ok(()),
            (Ok(_), Err(_)) => Err(LoadError::Delivery(
                "deliver loop finished without a result".to_string(),
            )),
        }
    }
}
