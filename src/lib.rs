//! # chunktable
//!
//! Time-series chunk storage on a wide-column (Bigtable-style) store.
//!
//! Chunks are opaque, checksummed blobs of samples for one series of one
//! tenant over a time range. Each chunk is stored as a single row keyed by
//! its external key, in a table chosen by the schema for the chunk's start
//! time.
//!
//! ## Components
//!
//! - **Storage**: [`storage::ColumnObjectClient`] writes chunks in per-table
//!   bulk batches and reads them with a bounded-page concurrent fan-out;
//!   [`storage::ColumnTableClient`] manages tables behind a TTL metadata cache
//! - **Backend**: the [`backend::AdminClient`] / [`backend::DataClient`] seam
//!   to the wide-column store, with an in-memory implementation for
//!   development
//! - **Scan**: 240-way fingerprint-prefix sharding of each tenant's keyspace
//!   and a paging shard scanner
//! - **Migrate**: planner, tenant mapper and transfer driver that copy chunks
//!   shard by shard into another store

pub mod backend;
pub mod chunk;
pub mod config;
pub mod context;
pub mod migrate;
pub mod scan;
pub mod schema;
pub mod storage;
pub mod telemetry;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::backend::{AdminClient, DataClient, InMemoryBackend};
    pub use crate::chunk::{Chunk, ChunkCodec, DefaultChunkCodec, Fingerprint, Labels};
    pub use crate::config::ChunkStoreConfig;
    pub use crate::context::RequestContext;
    pub use crate::scan::{ScanRequest, Scanner, Shard};
    pub use crate::schema::{PeriodConfig, SchemaConfig, SchemaRouter};
    pub use crate::storage::{
        ColumnObjectClient, ColumnTableClient, ObjectClient, TableClient, TableDesc,
    };
    pub use crate::{Error, Result};
}
