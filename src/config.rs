//! Chunk store configuration
//!
//! Defaults suit a production deployment. [`ChunkStoreConfig::from_env`]
//! overrides them from environment variables so the same binary can be
//! tuned per environment without flags.

use crate::{Error, Result};

use std::time::Duration;
use tracing::info;

/// Longest accepted `table_cache_expiration`
pub const MAX_TABLE_CACHE_EXPIRATION: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Configuration of the table and object clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkStoreConfig {
    /// Cache per-table metadata in `list_tables`
    pub table_cache_enabled: bool,
    /// How long the whole metadata cache stays fresh
    pub table_cache_expiration: Duration,
    /// Most keys read in one backing-store read request
    pub max_row_read_batch_size: usize,
}

impl Default for ChunkStoreConfig {
    fn default() -> Self {
        Self {
            table_cache_enabled: true,
            table_cache_expiration: Duration::from_secs(30 * 60),
            max_row_read_batch_size: 1000,
        }
    }
}

impl ChunkStoreConfig {
    /// Build from environment, falling back to defaults
    ///
    /// Environment variables:
    /// - CHUNKTABLE_TABLE_CACHE_ENABLED: "true"/"1" or "false"/"0" (default: true)
    /// - CHUNKTABLE_TABLE_CACHE_EXPIRATION_SECS: cache lifetime (default: 1800)
    /// - CHUNKTABLE_MAX_ROW_READ_BATCH_SIZE: keys per read request (default: 1000)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("CHUNKTABLE_TABLE_CACHE_ENABLED") {
            config.table_cache_enabled = parse_bool("CHUNKTABLE_TABLE_CACHE_ENABLED", &value)?;
        }
        if let Some(value) = lookup("CHUNKTABLE_TABLE_CACHE_EXPIRATION_SECS") {
            let secs: u64 = value.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "CHUNKTABLE_TABLE_CACHE_EXPIRATION_SECS must be a whole number of seconds, got {value:?}"
                ))
            })?;
            config.table_cache_expiration = Duration::from_secs(secs);
        }
        if let Some(value) = lookup("CHUNKTABLE_MAX_ROW_READ_BATCH_SIZE") {
            config.max_row_read_batch_size = value.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "CHUNKTABLE_MAX_ROW_READ_BATCH_SIZE must be a positive integer, got {value:?}"
                ))
            })?;
        }

        config.validate()?;
        info!(
            table_cache_enabled = config.table_cache_enabled,
            table_cache_expiration_secs = config.table_cache_expiration.as_secs(),
            max_row_read_batch_size = config.max_row_read_batch_size,
            "Loaded chunk store configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_row_read_batch_size == 0 {
            return Err(Error::Config(
                "max_row_read_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.table_cache_expiration > MAX_TABLE_CACHE_EXPIRATION {
            return Err(Error::Config(format!(
                "table_cache_expiration must be at most {}s, got {}s",
                MAX_TABLE_CACHE_EXPIRATION.as_secs(),
                self.table_cache_expiration.as_secs()
            )));
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim();
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::Config(format!(
            "{name} must be true or false, got {value:?}"
        )))
    }
}
