//! Bulk chunk writes and fan-out chunk reads

use super::telemetry;
use super::{ObjectClient, COLUMN, COLUMN_FAMILY};
use crate::backend::{DataClient, Mutation, Row, RowSet};
use crate::chunk::{Chunk, ChunkCodec, DecodeContext};
use crate::config::ChunkStoreConfig;
use crate::context::RequestContext;
use crate::schema::SchemaRouter;
use crate::{Error, Result};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// [`ObjectClient`] storing one chunk per row of a wide-column table
pub struct ColumnObjectClient {
    data: Arc<dyn DataClient>,
    schema: Arc<dyn SchemaRouter>,
    codec: Arc<dyn ChunkCodec>,
    max_row_reads: usize,
}

/// Keys requested from one table, in request order, plus the identity each
/// key stands for.
#[derive(Default)]
struct TableRead {
    keys: Vec<String>,
    chunks: HashMap<String, Chunk>,
}

impl ColumnObjectClient {
    pub fn new(
        data: Arc<dyn DataClient>,
        schema: Arc<dyn SchemaRouter>,
        codec: Arc<dyn ChunkCodec>,
        config: &ChunkStoreConfig,
    ) -> Self {
        Self {
            data,
            schema,
            codec,
            max_row_reads: config.max_row_read_batch_size.max(1),
        }
    }

    pub fn max_row_reads(&self) -> usize {
        self.max_row_reads
    }
}

#[async_trait]
impl ObjectClient for ColumnObjectClient {
    async fn put_chunks(&self, ctx: &RequestContext, chunks: &[Chunk]) -> Result<()> {
        let start = Instant::now();
        let mut batches: BTreeMap<String, Vec<(String, Mutation)>> = BTreeMap::new();
        let mut bytes = 0u64;

        for chunk in chunks {
            let buf = self.codec.encode(chunk)?;
            bytes += buf.len() as u64;
            let key = chunk.external_key();
            let table = self.schema.table_for(chunk.from)?;
            batches
                .entry(table)
                .or_default()
                .push((key, Mutation::new().set(COLUMN_FAMILY, COLUMN, None, buf)));
        }

        // Tables are applied one after another; a failure leaves earlier
        // tables written.
        for (table, rows) in batches {
            ctx.check()?;
            let row_count = rows.len();
            let errs = self
                .data
                .apply_bulk(ctx, &table, rows)
                .await
                .map_err(|e| Error::backend("client.ApplyBulk", e))?;
            if let Some(status) = errs.into_iter().flatten().next() {
                warn!(table = %table, rows = row_count, "Bulk apply had failing rows");
                return Err(Error::backend("client.ApplyBulk", status));
            }
            debug!(table = %table, rows = row_count, "Applied chunk batch");
        }

        telemetry::record_put(start.elapsed().as_secs_f64(), chunks.len() as u64, bytes);
        Ok(())
    }

    async fn get_chunks(&self, ctx: &RequestContext, input: Vec<Chunk>) -> Result<Vec<Chunk>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        // Repeated identities are read and returned once.
        let mut reads: HashMap<String, TableRead> = HashMap::new();
        let mut total = 0usize;
        for chunk in input {
            let table = self.schema.table_for(chunk.from)?;
            let key = chunk.external_key();
            let read = reads.entry(table).or_default();
            if read.chunks.contains_key(&key) {
                continue;
            }
            read.keys.push(key.clone());
            read.chunks.insert(key, chunk);
            total += 1;
        }

        // Sized so that no page task ever blocks on send.
        let (out_tx, mut out_rx) = mpsc::channel::<Chunk>(total);
        let (err_tx, mut err_rx) = mpsc::channel::<Error>(total);

        let mut pages = 0u64;
        for (table, read) in reads {
            let table: Arc<str> = Arc::from(table);
            let chunks = Arc::new(read.chunks);
            for page in read.keys.chunks(self.max_row_reads) {
                pages += 1;
                tokio::spawn(read_page(PageRead {
                    data: Arc::clone(&self.data),
                    codec: Arc::clone(&self.codec),
                    ctx: ctx.clone(),
                    table: Arc::clone(&table),
                    page: page.to_vec(),
                    chunks: Arc::clone(&chunks),
                    outs: out_tx.clone(),
                    errs: err_tx.clone(),
                }));
            }
        }
        drop(out_tx);
        drop(err_tx);
        telemetry::record_read_pages(pages);
        debug!(chunks = total, pages, "Fanned out chunk reads");

        let mut output = Vec::with_capacity(total);
        while output.len() < total {
            tokio::select! {
                biased;
                err = ctx.done() => {
                    telemetry::record_get(start.elapsed().as_secs_f64(), 0, "cancelled");
                    return Err(err);
                }
                Some(err) = err_rx.recv() => {
                    telemetry::record_get(start.elapsed().as_secs_f64(), 0, "error");
                    return Err(err);
                }
                // Tasks report errors before dropping their senders, so a
                // closed channel here means a task died without reporting.
                chunk = out_rx.recv() => match chunk {
                    Some(chunk) => output.push(chunk),
                    None => {
                        telemetry::record_get(start.elapsed().as_secs_f64(), 0, "error");
                        return Err(Error::Internal(format!(
                            "read tasks finished after returning {} of {} chunks",
                            output.len(),
                            total
                        )));
                    }
                },
            }
        }

        telemetry::record_get(start.elapsed().as_secs_f64(), total as u64, "ok");
        Ok(output)
    }

    async fn delete_chunk(&self, _ctx: &RequestContext, _chunk_id: &str) -> Result<()> {
        Err(Error::MethodNotImplemented)
    }
}

/// Everything one page task owns
struct PageRead {
    data: Arc<dyn DataClient>,
    codec: Arc<dyn ChunkCodec>,
    ctx: RequestContext,
    table: Arc<str>,
    page: Vec<String>,
    chunks: Arc<HashMap<String, Chunk>>,
    outs: mpsc::Sender<Chunk>,
    errs: mpsc::Sender<Error>,
}

/// Read one page of keys and report each decoded chunk, or the first error.
///
/// Sends never block: both channels have room for every requested chunk.
/// A closed channel means the caller gave up; the task then stops quietly.
async fn read_page(read: PageRead) {
    let PageRead {
        data,
        codec,
        ctx,
        table,
        page,
        chunks,
        outs,
        errs,
    } = read;

    let requested = page.len();
    let mut decode_ctx = DecodeContext::new();
    let mut processing_err: Option<Error> = None;
    let mut received = 0usize;

    // Rows arrive in key order, not request order.
    let result = data
        .read_rows(&ctx, &table, RowSet::Keys(page), &mut |row: Row| {
            let Some(chunk) = chunks.get(row.key()) else {
                processing_err = Some(Error::UnknownRow(row.key().to_string()));
                return false;
            };
            let Some(value) = row.first_value(COLUMN_FAMILY) else {
                processing_err = Some(Error::Decode(format!(
                    "row {} has no cell in family {}",
                    row.key(),
                    COLUMN_FAMILY
                )));
                return false;
            };

            let mut chunk = chunk.clone();
            if let Err(e) = codec.decode(&mut decode_ctx, &mut chunk, value.clone()) {
                processing_err = Some(e);
                return false;
            }

            received += 1;
            outs.try_send(chunk).is_ok()
        })
        .await;

    let err = if let Some(e) = processing_err {
        Some(e)
    } else if let Err(status) = result {
        Some(Error::backend("bigtable.ReadRows", status))
    } else if received < requested {
        Some(Error::ShortRead {
            requested,
            received,
        })
    } else {
        None
    };

    if let Some(err) = err {
        if errs.try_send(err).is_err() {
            debug!(table = %table, "Dropping page error, caller already returned");
        }
    }
}
