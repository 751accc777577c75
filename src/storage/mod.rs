//! Chunk storage on a wide-column backing store
//!
//! Chunks live one per row, keyed by their external key, in a single cell of
//! column family [`COLUMN_FAMILY`], column [`COLUMN`]. Which table a chunk
//! lands in is decided by the [`SchemaRouter`](crate::schema::SchemaRouter).

mod object_client;
mod table_cache;
mod table_client;
pub(crate) mod telemetry;

pub use object_client::ColumnObjectClient;
pub use table_cache::TableInfoCache;
pub use table_client::ColumnTableClient;

use crate::chunk::Chunk;
use crate::context::RequestContext;
use crate::Result;

use async_trait::async_trait;

/// Column family holding chunk payloads
pub const COLUMN_FAMILY: &str = "f";
/// Column holding chunk payloads
pub const COLUMN: &str = "c";

/// Table description
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDesc {
    pub name: String,
}

impl TableDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Table lifecycle interface
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Tables that are ready to hold chunks
    async fn list_tables(&self, ctx: &RequestContext) -> Result<Vec<String>>;

    /// Create a table and its column family. Idempotent.
    async fn create_table(&self, ctx: &RequestContext, desc: TableDesc) -> Result<()>;

    async fn delete_table(&self, ctx: &RequestContext, name: &str) -> Result<()>;

    /// Returns the description and whether the table is active.
    async fn describe_table(&self, ctx: &RequestContext, name: &str) -> Result<(TableDesc, bool)>;

    async fn update_table(
        &self,
        ctx: &RequestContext,
        current: TableDesc,
        expected: TableDesc,
    ) -> Result<()>;
}

/// Chunk read/write interface
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn put_chunks(&self, ctx: &RequestContext, chunks: &[Chunk]) -> Result<()>;

    /// Fetch full chunks for the given identities. Result order is
    /// unspecified; either every chunk comes back or an error does.
    async fn get_chunks(&self, ctx: &RequestContext, chunks: Vec<Chunk>) -> Result<Vec<Chunk>>;

    async fn delete_chunk(&self, ctx: &RequestContext, chunk_id: &str) -> Result<()>;
}
