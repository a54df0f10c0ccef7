//! Encode loop: parse rows, encode them and send size-bounded batches.

use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{Receiver, Sender};
use crossbeam::select;

use super::{DeliveredKvs, EncodeSummary, PipelineContext, TableContext};
use crate::checkpoint::ChunkCheckpoint;
use crate::error::{LoadError, Result};
use crate::kv::{kv_size, Encoder};
use crate::schema::{column_names, initialize_columns};
use crate::source::RowParser;

/// Encode the rows of `chunk` from the parser's current position up to
/// `chunk.chunk.end_offset`.
///
/// Batches close once they reach `min_deliver_bytes`, `max_kv_pairs` rows,
/// or the chunk end. A final empty batch marks completion. Fails early if
/// the deliver loop reports back on `deliver_done` before encoding is done.
pub fn encode_loop(
    ctx: &PipelineContext,
    table: &TableContext,
    chunk: &mut ChunkCheckpoint,
    parser: &mut dyn RowParser,
    encoder: &mut dyn Encoder,
    kvs_tx: &Sender<Vec<DeliveredKvs>>,
    deliver_done: &Receiver<Result<()>>,
) -> Result<EncodeSummary> {
    let mut summary = EncodeSummary::default();
    let end_offset = chunk.chunk.end_offset;
    let mut columns: Option<(Arc<[String]>, usize)> = None;
    let mut reach_eof = false;

    while !reach_eof {
        ctx.pauser.wait(&ctx.cancel)?;
        let (offset, _) = parser.pos();
        if offset >= end_offset {
            break;
        }

        let mut batch = Vec::with_capacity(ctx.max_kv_pairs.min(1024));
        let mut batch_size = 0u64;
        loop {
            ctx.cancel.check()?;

            let read_start = Instant::now();
            let row = parser
                .read_row()
                .map_err(|e| e.in_file(&chunk.key, parser.pos().0))?;
            summary.read_duration += read_start.elapsed();
            let (new_offset, row_id) = parser.pos();
            let Some(row) = row else {
                reach_eof = true;
                break;
            };

            let (names, expected) = if let Some(known) = columns.clone() {
                known
            } else {
                if chunk.column_permutation.is_empty() {
                    chunk.column_permutation =
                        initialize_columns(&table.info, parser.columns(), &table.ignore_columns)
                            .map_err(|e| e.in_file(&chunk.key, new_offset))?;
                }
                let expected = if parser.columns().is_empty() {
                    chunk.column_permutation.iter().max().map_or(0, |&i| (i + 1).max(0) as usize)
                } else {
                    parser.columns().len()
                };
                let names: Arc<[String]> = column_names(&table.info, &chunk.column_permutation).into();
                columns = Some((Arc::clone(&names), expected));
                (names, expected)
            };

            if row.values.len() != expected {
                return Err(LoadError::ColumnCountMismatch {
                    expected,
                    got: row.values.len(),
                }
                .in_file(&chunk.key, new_offset));
            }
            if row_id > chunk.chunk.row_id_max {
                return Err(LoadError::Encode(format!(
                    "row id {} is beyond the reserved range ending at {}",
                    row_id, chunk.chunk.row_id_max
                ))
                .in_file(&chunk.key, new_offset));
            }

            let encode_start = Instant::now();
            let kvs = encoder
                .encode(row.values, row_id, &chunk.column_permutation, new_offset)
                .map_err(|e| e.in_file(&chunk.key, new_offset))?;
            summary.encode_duration += encode_start.elapsed();

            summary.checksum.update(&kvs);
            batch_size += kv_size(&kvs);
            batch.push(DeliveredKvs {
                kvs,
                columns: names,
                offset: new_offset,
                row_id,
            });

            if batch_size >= ctx.min_deliver_bytes
                || batch.len() >= ctx.max_kv_pairs
                || new_offset >= end_offset
            {
                break;
            }
        }

        if !batch.is_empty() {
            send(ctx, kvs_tx, deliver_done, batch)?;
        }
    }

    let (offset, row_id) = parser.pos();
    summary.offset = offset;
    summary.row_id = row_id;
    send(ctx, kvs_tx, deliver_done, Vec::new())?;

    tracing::debug!(
        table = %table.name,
        key = %chunk.key,
        kvs = summary.checksum.sum_kvs(),
        read_ms = summary.read_duration.as_millis() as u64,
        encode_ms = summary.encode_duration.as_millis() as u64,
        "encode kv data and write completed"
    );
    Ok(summary)
}

/// Send one batch, giving up if the deliver loop finished or the run was canceled
fn send(
    ctx: &PipelineContext,
    kvs_tx: &Sender<Vec<DeliveredKvs>>,
    deliver_done: &Receiver<Result<()>>,
    batch: Vec<DeliveredKvs>,
) -> Result<()> {
    select! {
        send(kvs_tx, batch) -> res => res.map_err(|_| {
            LoadError::Delivery("deliver loop stopped before encoding completed".to_string())
        }),
        recv(deliver_done) -> res => match res {
            Ok(Err(e)) => Err(e),
            _ => Err(LoadError::Delivery(
                "deliver loop stopped before encoding completed".to_string(),
            )),
        },
        recv(ctx.cancel.done()) -> _ => Err(LoadError::Canceled),
    }
}
