//! Shard-by-shard chunk migration
//!
//! A migration is planned as (table, tenant, shard) scan requests. The
//! [`Reader`] works through them with a fixed pool of workers: each worker
//! scans one request, renames tenants through the optional [`Mapper`] and
//! hands the chunks to a [`ChunkSink`]. Requests are independent, so a large
//! migration can be split across processes by shard range.

mod mapper;
mod planner;
mod sink;

pub use mapper::Mapper;
pub use planner::{Planner, PlannerConfig};
pub use sink::{ChunkSink, ObjectClientSink};

use crate::backend::DataClient;
use crate::chunk::{Chunk, ChunkCodec};
use crate::context::RequestContext;
use crate::scan::{ScanRequest, Scanner, DEFAULT_SCAN_BATCH_SIZE, DEFAULT_SCAN_PAGE_SIZE};
use crate::{Error, Result};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Transfer driver configuration
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub planner: PlannerConfig,
    /// Scan requests processed concurrently
    pub num_workers: usize,
    pub scan_page_size: usize,
    pub scan_batch_size: usize,
    /// Scanned batches buffered per worker before the scan waits on the sink
    pub buffer_batches: usize,
    /// Optional YAML tenant mapper file
    pub mapper_path: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            planner: PlannerConfig::default(),
            num_workers: 1,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            buffer_batches: 4,
            mapper_path: None,
        }
    }
}

/// Totals of a finished transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Scan requests completed
    pub requests: u64,
    /// Chunks written to the sink
    pub chunks: u64,
}

impl std::ops::AddAssign for TransferStats {
    fn add_assign(&mut self, other: Self) {
        self.requests += other.requests;
        self.chunks += other.chunks;
    }
}

/// Copies chunks from a source table store into a [`ChunkSink`]
pub struct Reader {
    config: ReaderConfig,
    planner: Planner,
    scanner: Arc<Scanner>,
    sink: Arc<dyn ChunkSink>,
    mapper: Option<Arc<Mapper>>,
}

impl Reader {
    pub fn new(
        config: ReaderConfig,
        data: Arc<dyn DataClient>,
        codec: Arc<dyn ChunkCodec>,
        sink: Arc<dyn ChunkSink>,
    ) -> Result<Self> {
        if config.num_workers == 0 {
            return Err(Error::Config("num_workers must be greater than 0".to_string()));
        }
        let planner = Planner::new(config.planner.clone())?;
        let mapper = match &config.mapper_path {
            Some(path) => Some(Arc::new(Mapper::load(path)?)),
            None => None,
        };
        let scanner = Scanner::new(data, codec)
            .with_page_size(config.scan_page_size)
            .with_batch_size(config.scan_batch_size);

        Ok(Self {
            config,
            planner,
            scanner: Arc::new(scanner),
            sink,
            mapper,
        })
    }

    /// Replace the mapper loaded from `mapper_path`, if any.
    pub fn with_mapper(mut self, mapper: Mapper) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Run every planned request to completion.
    pub async fn transfer_data(&self, ctx: &RequestContext) -> Result<TransferStats> {
        self.transfer_requests(ctx, self.planner.plan()).await
    }

    /// Run an externally supplied list of requests, such as a slice of the
    /// `migrate_plan` output, to completion.
    ///
    /// The first failing worker cancels the others; its error is returned.
    pub async fn transfer_requests(
        &self,
        ctx: &RequestContext,
        requests: impl IntoIterator<Item = ScanRequest>,
    ) -> Result<TransferStats> {
        let queue: Arc<Mutex<VecDeque<ScanRequest>>> =
            Arc::new(Mutex::new(requests.into_iter().collect()));
        let total = queue.lock().len();
        let workers = self.config.num_workers.min(total.max(1));
        info!(requests = total, workers, "Starting transfer");

        let ctx = ctx.child();
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = Worker {
                id,
                ctx: ctx.clone(),
                queue: Arc::clone(&queue),
                scanner: Arc::clone(&self.scanner),
                sink: Arc::clone(&self.sink),
                mapper: self.mapper.clone(),
                buffer: self.config.buffer_batches.max(1),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        let mut stats = TransferStats::default();
        let mut first_err: Option<Error> = None;
        for handle in handles {
            let err = match handle.await {
                Ok(Ok(worker_stats)) => {
                    stats += worker_stats;
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) => {
                    ctx.cancel();
                    Error::Internal(format!("transfer worker panicked: {e}"))
                }
            };
            // Workers cancelled by another's failure report a context error;
            // keep the cause instead.
            let replace = match &first_err {
                None => true,
                Some(existing) => existing.is_context() && !err.is_context(),
            };
            if replace {
                first_err = Some(err);
            }
        }

        if let Some(e) = first_err {
            error!(error = %e, requests = stats.requests, chunks = stats.chunks, "Transfer failed");
            return Err(e);
        }
        info!(requests = stats.requests, chunks = stats.chunks, "Transfer complete");
        Ok(stats)
    }
}

struct Worker {
    id: usize,
    ctx: RequestContext,
    queue: Arc<Mutex<VecDeque<ScanRequest>>>,
    scanner: Arc<Scanner>,
    sink: Arc<dyn ChunkSink>,
    mapper: Option<Arc<Mapper>>,
    buffer: usize,
}

impl Worker {
    async fn run(self) -> Result<TransferStats> {
        let mut stats = TransferStats::default();
        loop {
            let next = self.queue.lock().pop_front();
            let Some(req) = next else {
                return Ok(stats);
            };
            match self.transfer(&req).await {
                Ok(chunks) => {
                    stats.requests += 1;
                    stats.chunks += chunks;
                    info!(
                        worker = self.id,
                        table = %req.table,
                        user = %req.user,
                        shard = %req.shard,
                        chunks,
                        "Request transferred"
                    );
                }
                Err(e) => {
                    if !e.is_context() {
                        warn!(
                            worker = self.id,
                            table = %req.table,
                            user = %req.user,
                            shard = %req.shard,
                            error = %e,
                            "Request failed, cancelling transfer"
                        );
                    }
                    self.ctx.cancel();
                    return Err(e);
                }
            }
        }
    }

    /// Scan one request while writing its batches, and return the number of
    /// chunks written.
    async fn transfer(&self, req: &ScanRequest) -> Result<u64> {
        let (tx, mut rx) = mpsc::channel::<Vec<Chunk>>(self.buffer);

        let scan = async {
            let tx = tx;
            self.scanner.scan(&self.ctx, req, &tx).await
        };
        let write = async {
            let mut written = 0u64;
            while let Some(batch) = rx.recv().await {
                let batch = match &self.mapper {
                    Some(mapper) => mapper.map_chunks(batch),
                    None => batch,
                };
                written += batch.len() as u64;
                self.sink.write(&self.ctx, batch).await?;
            }
            Ok::<u64, Error>(written)
        };

        let (scanned, written) = tokio::join!(scan, write);
        // A sink failure closes the channel and surfaces in the scan as
        // `Cancelled`, so report the sink error first.
        let written = written?;
        scanned?;
        Ok(written)
    }
}
