//! Migration destinations

use crate::chunk::Chunk;
use crate::context::RequestContext;
use crate::storage::ObjectClient;
use crate::Result;

use async_trait::async_trait;
use std::sync::Arc;

/// Where migrated chunks go
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn write(&self, ctx: &RequestContext, chunks: Vec<Chunk>) -> Result<()>;
}

/// Writes migrated chunks through an [`ObjectClient`]
pub struct ObjectClientSink {
    client: Arc<dyn ObjectClient>,
}

impl ObjectClientSink {
    pub fn new(client: Arc<dyn ObjectClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChunkSink for ObjectClientSink {
    async fn write(&self, ctx: &RequestContext, chunks: Vec<Chunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        self.client.put_chunks(ctx, &chunks).await
    }
}
