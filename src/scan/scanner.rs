//! Streams the chunks of one (table, tenant, shard) unit

use super::Shard;
use crate::backend::{DataClient, Row, RowRange, RowSet};
use crate::chunk::{Chunk, ChunkCodec, DecodeContext};
use crate::context::RequestContext;
use crate::storage::COLUMN_FAMILY;
use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Rows fetched per range read
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 1000;
/// Chunks per batch sent downstream
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 100;

/// One unit of scan work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub table: String,
    pub user: String,
    pub shard: Shard,
    /// Only chunks overlapping `[from, through)` are forwarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<(i64, i64)>,
}

/// Reads every chunk of a shard range and forwards them in batches
pub struct Scanner {
    data: Arc<dyn DataClient>,
    codec: Arc<dyn ChunkCodec>,
    page_size: usize,
    batch_size: usize,
}

impl Scanner {
    pub fn new(data: Arc<dyn DataClient>, codec: Arc<dyn ChunkCodec>) -> Self {
        Self {
            data,
            codec,
            page_size: DEFAULT_SCAN_PAGE_SIZE,
            batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Scan `req` and send decoded chunks to `out`. Returns the number of
    /// chunks forwarded.
    ///
    /// Fails with [`Error::Cancelled`] if `out` is closed before the scan
    /// finishes.
    pub async fn scan(
        &self,
        ctx: &RequestContext,
        req: &ScanRequest,
        out: &mpsc::Sender<Vec<Chunk>>,
    ) -> Result<usize> {
        let range = req.shard.row_range(&req.user);
        let mut cursor = range.start.clone();
        let mut decode_ctx = DecodeContext::new();
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut forwarded = 0usize;
        let mut pages = 0usize;

        loop {
            ctx.check()?;
            let page = RowRange::new(cursor.clone(), range.end.clone()).with_limit(self.page_size);
            let mut rows: Vec<Row> = Vec::with_capacity(self.page_size);
            self.data
                .read_rows(ctx, &req.table, RowSet::Range(page), &mut |row: Row| {
                    rows.push(row);
                    true
                })
                .await
                .map_err(|e| Error::backend("bigtable.ReadRows", e))?;
            pages += 1;

            let full_page = rows.len() >= self.page_size;
            if let Some(last) = rows.last() {
                // Smallest key strictly after the last one read.
                cursor = format!("{}\0", last.key());
            }

            for row in rows {
                let mut chunk = Chunk::parse_external_key(&req.user, row.key())?;
                if let Some((from, through)) = req.interval {
                    if !chunk.overlaps(from, through) {
                        continue;
                    }
                }
                let value = row.first_value(COLUMN_FAMILY).ok_or_else(|| {
                    Error::Decode(format!(
                        "row {} has no cell in family {}",
                        row.key(),
                        COLUMN_FAMILY
                    ))
                })?;
                self.codec.decode(&mut decode_ctx, &mut chunk, value.clone())?;
                batch.push(chunk);

                if batch.len() >= self.batch_size {
                    forwarded += batch.len();
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                    send(ctx, out, full).await?;
                }
            }

            if !full_page {
                break;
            }
        }

        if !batch.is_empty() {
            forwarded += batch.len();
            send(ctx, out, batch).await?;
        }

        debug!(pages, decoded = decode_ctx.decoded(), "Scan pages read");
        info!(
            table = %req.table,
            user = %req.user,
            shard = %req.shard,
            chunks = forwarded,
            "Shard scanned"
        );
        Ok(forwarded)
    }
}

async fn send(ctx: &RequestContext, out: &mpsc::Sender<Vec<Chunk>>, batch: Vec<Chunk>) -> Result<()> {
    tokio::select! {
        biased;
        err = ctx.done() => Err(err),
        sent = out.send(batch) => sent.map_err(|_| Error::Cancelled),
    }
}
