//! Table lifecycle on the wide-column store

use super::table_cache::TableInfoCache;
use super::telemetry;
use super::{TableClient, TableDesc, COLUMN_FAMILY};
use crate::backend::AdminClient;
use crate::config::ChunkStoreConfig;
use crate::context::RequestContext;
use crate::{Error, Result};

use async_trait::async_trait;
use std::sync::Arc;
use tonic::Code;
use tracing::{debug, info};

/// [`TableClient`] over an [`AdminClient`], caching per-table metadata
pub struct ColumnTableClient {
    admin: Arc<dyn AdminClient>,
    cache: TableInfoCache,
}

impl ColumnTableClient {
    pub fn new(admin: Arc<dyn AdminClient>, config: &ChunkStoreConfig) -> Self {
        Self {
            admin,
            cache: TableInfoCache::new(config.table_cache_enabled, config.table_cache_expiration),
        }
    }

    /// The metadata cache, for inspection
    pub fn cache(&self) -> &TableInfoCache {
        &self.cache
    }
}

fn already_exists(status: &tonic::Status) -> bool {
    status.code() == Code::AlreadyExists
}

#[async_trait]
impl TableClient for ColumnTableClient {
    async fn list_tables(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        let tables = self
            .admin
            .tables(ctx)
            .await
            .map_err(|e| Error::backend("client.Tables", e))?;

        if self.cache.expire_if_stale() {
            debug!(expires_at = ?self.cache.expires_at(), "Table metadata cache expired, cleared");
            telemetry::record_table_cache_refresh();
        }

        // Only tables that carry the chunk column family are usable.
        let mut output = Vec::with_capacity(tables.len());
        for table in tables {
            let info = match self.cache.get(&table) {
                Some(info) => info,
                None => {
                    let info = self
                        .admin
                        .table_info(ctx, &table)
                        .await
                        .map_err(|e| Error::backend("client.TableInfo", e))?;
                    telemetry::record_table_info_fetch();
                    self.cache.insert(&table, info.clone());
                    info
                }
            };

            if info.has_family(COLUMN_FAMILY) {
                output.push(table);
            } else {
                debug!(table = %table, "Skipping table without chunk column family");
            }
        }

        Ok(output)
    }

    async fn create_table(&self, ctx: &RequestContext, desc: TableDesc) -> Result<()> {
        if let Err(e) = self.admin.create_table(ctx, &desc.name).await {
            if !already_exists(&e) {
                return Err(Error::backend("client.CreateTable", e));
            }
        }

        if let Err(e) = self
            .admin
            .create_column_family(ctx, &desc.name, COLUMN_FAMILY)
            .await
        {
            if !already_exists(&e) {
                return Err(Error::backend("client.CreateColumnFamily", e));
            }
        }

        // A cached "no family" entry is now wrong.
        self.cache.evict(&desc.name);
        info!(table = %desc.name, "Table ready");
        Ok(())
    }

    async fn delete_table(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        self.admin
            .delete_table(ctx, name)
            .await
            .map_err(|e| Error::backend("client.DeleteTable", e))?;
        self.cache.evict(name);
        info!(table = %name, "Table deleted");
        Ok(())
    }

    async fn describe_table(
        &self,
        _ctx: &RequestContext,
        name: &str,
    ) -> Result<(TableDesc, bool)> {
        Ok((TableDesc::new(name), true))
    }

    async fn update_table(
        &self,
        _ctx: &RequestContext,
        _current: TableDesc,
        _expected: TableDesc,
    ) -> Result<()> {
        Ok(())
    }
}
