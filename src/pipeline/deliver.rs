//! Deliver loop: write encoded batches to the engines and advance the
//! chunk checkpoint.

use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use crossbeam::select;

use super::{DeliveredKvs, PipelineContext};
use crate::backend::EngineWriter;
use crate::checkpoint::{ChunkCheckpoint, ChunkDelta, SaveCheckpoint};
use crate::error::{LoadError, Result};
use crate::kv::KvChecksum;

/// Receive batches until the empty end marker and write them.
///
/// Batches accumulate until `min_deliver_bytes` worth of pairs is pending.
/// Every write goes to the data writer first, then the index writer, while
/// holding a shared disk quota guard. After each non-empty write the
/// chunk's offset, `prev_row_id_max` and checksum advance; a checkpoint is
/// saved once both writers report synced.
///
/// If the channel disconnects without an end marker, pending pairs are
/// dropped and the loop stops.
pub fn deliver_loop(
    ctx: &PipelineContext,
    table: &str,
    engine_id: i32,
    chunk: &mut ChunkCheckpoint,
    kvs_rx: &Receiver<Vec<DeliveredKvs>>,
    data_writer: &mut dyn EngineWriter,
    index_writer: &mut dyn EngineWriter,
) -> Result<Duration> {
    let mut total = Duration::ZERO;
    let mut data_synced = true;
    let mut channel_closed = false;

    while !channel_closed {
        let mut data_kvs = Vec::new();
        let mut index_kvs = Vec::new();
        let mut data_checksum = KvChecksum::default();
        let mut index_checksum = KvChecksum::default();
        let mut columns: Vec<String> = Vec::new();
        // Nothing delivered keeps the checkpoint where it is
        let mut offset = chunk.chunk.offset;
        let mut row_id = chunk.chunk.prev_row_id_max;

        // At least one packet is received per round
        while data_checksum.sum_size() + index_checksum.sum_size() < ctx.min_deliver_bytes.max(1) {
            let received = select! {
                recv(kvs_rx) -> packet => Some(packet),
                recv(ctx.cancel.done()) -> _ => None,
            };
            let packet = match received {
                None => return Err(LoadError::Canceled),
                Some(Err(_)) => {
                    tracing::debug!(table = %table, key = %chunk.key, "kv channel closed without end marker");
                    return Ok(total);
                }
                Some(Ok(packet)) if packet.is_empty() => {
                    channel_closed = true;
                    break;
                }
                Some(Ok(packet)) => packet,
            };
            for delivered in packet {
                for pair in delivered.kvs {
                    if pair.is_record() {
                        data_checksum.update_one(&pair.key, &pair.val);
                        data_kvs.push(pair);
                    } else {
                        index_checksum.update_one(&pair.key, &pair.val);
                        index_kvs.push(pair);
                    }
                }
                if columns.len() != delivered.columns.len() {
                    columns = delivered.columns.to_vec();
                }
                offset = delivered.offset;
                row_id = delivered.row_id;
            }
        }

        let delivered_kvs = data_checksum.sum_kvs() + index_checksum.sum_kvs();
        if delivered_kvs == 0 {
            continue;
        }

        {
            let _guard = loop {
                if let Some(guard) = ctx.disk_quota_lock.try_read() {
                    break guard;
                }
                // Quota enforcement flushed the engines; record progress
                // made durable by that flush.
                if !data_synced {
                    data_synced = maybe_save_checkpoint(
                        ctx, table, engine_id, chunk, &*data_writer, &*index_writer,
                    );
                }
                ctx.cancel.sleep(Duration::from_millis(1))?;
            };

            let start = Instant::now();
            if !data_kvs.is_empty() {
                data_writer
                    .append_rows(table, &columns, data_kvs)
                    .map_err(|e| {
                        tracing::error!(table = %table, error = %e, "write to data engine failed");
                        e.in_file(&chunk.key, offset)
                    })?;
            }
            if !index_kvs.is_empty() {
                index_writer
                    .append_rows(table, &columns, index_kvs)
                    .map_err(|e| {
                        tracing::error!(table = %table, error = %e, "write to index engine failed");
                        e.in_file(&chunk.key, offset)
                    })?;
            }
            total += start.elapsed();
        }

        chunk.checksum.add(&data_checksum);
        chunk.checksum.add(&index_checksum);
        chunk.chunk.offset = offset;
        chunk.chunk.prev_row_id_max = row_id;
        ctx.observer.batch_delivered(
            table,
            engine_id,
            delivered_kvs,
            data_checksum.sum_size() + index_checksum.sum_size(),
        );

        data_synced = maybe_save_checkpoint(ctx, table, engine_id, chunk, &*data_writer, &*index_writer);
    }

    tracing::debug!(table = %table, key = %chunk.key, deliver_ms = total.as_millis() as u64, "deliver completed");
    Ok(total)
}

/// Save the chunk's progress if both writers have made it durable
fn maybe_save_checkpoint(
    ctx: &PipelineContext,
    table: &str,
    engine_id: i32,
    chunk: &ChunkCheckpoint,
    data_writer: &dyn EngineWriter,
    index_writer: &dyn EngineWriter,
) -> bool {
    if !(data_writer.is_synced() && index_writer.is_synced()) {
        return false;
    }
    save_checkpoint(ctx, table, engine_id, chunk);
    true
}

/// Queue the row id rebase and the chunk delta
pub(crate) fn save_checkpoint(ctx: &PipelineContext, table: &str, engine_id: i32, chunk: &ChunkCheckpoint) {
    ctx.save(SaveCheckpoint::Rebase {
        table: table.to_string(),
        alloc_base: chunk.chunk.prev_row_id_max,
    });
    ctx.save(SaveCheckpoint::Chunk(ChunkDelta {
        table: table.to_string(),
        engine_id,
        key: chunk.key.clone(),
        checksum: chunk.checksum,
        pos: chunk.chunk.offset,
        row_id: chunk.chunk.prev_row_id_max,
        column_permutation: chunk.column_permutation.clone(),
    }));
}
