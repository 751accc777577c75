//! Keyspace sharding for full-table scans
//!
//! Row keys are `{user}/{fingerprint hex}:...`. Fingerprints are written
//! without leading zeros, so the first two hex digits of any fingerprint of
//! 16 or more fall in `10..=ff`: 240 two-character prefixes. Shard `i` owns
//! prefix `i + 0x10`, which splits one tenant's keyspace into 240 disjoint
//! row ranges that can be scanned independently.

mod scanner;

pub use crate::backend::prefix_successor;
pub use scanner::{ScanRequest, Scanner, DEFAULT_SCAN_BATCH_SIZE, DEFAULT_SCAN_PAGE_SIZE};

use crate::backend::RowRange;
use crate::chunk::Fingerprint;
use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of keyspace shards
pub const NUM_SHARDS: u8 = 240;

const PREFIX_OFFSET: u16 = 0x10;

/// One of the [`NUM_SHARDS`] fingerprint-prefix shards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Shard(u8);

impl Shard {
    pub fn new(index: u8) -> Result<Self> {
        if index >= NUM_SHARDS {
            return Err(Error::InvalidShard(format!(
                "shard {index} out of range, expected 0..{NUM_SHARDS}"
            )));
        }
        Ok(Shard(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Two lowercase hex characters, `10` for shard 0 up to `ff` for shard 239
    pub fn prefix(self) -> String {
        format!("{:02x}", u16::from(self.0) + PREFIX_OFFSET)
    }

    /// Shard owning a two-character hex prefix
    pub fn for_prefix(prefix: &str) -> Result<Self> {
        if prefix.len() != 2 {
            return Err(Error::InvalidShard(format!(
                "prefix {prefix:?} should be two hex characters"
            )));
        }
        let value = u16::from_str_radix(prefix, 16)
            .map_err(|e| Error::InvalidShard(format!("prefix {prefix:?}: {e}")))?;
        if value < PREFIX_OFFSET {
            return Err(Error::InvalidShard(format!(
                "prefix {prefix:?} has a leading zero and belongs to no shard"
            )));
        }
        Self::new((value - PREFIX_OFFSET) as u8)
    }

    /// Shard holding rows of chunks with this fingerprint. Fingerprints below
    /// 16 have a single hex digit and belong to no shard.
    pub fn for_fingerprint(fp: Fingerprint) -> Option<Self> {
        let hex = format!("{:x}", fp.0);
        hex.get(..2).and_then(|prefix| Self::for_prefix(prefix).ok())
    }

    pub fn all() -> impl Iterator<Item = Shard> {
        (0..NUM_SHARDS).map(Shard)
    }

    /// Rows of `user` whose fingerprint starts with this shard's prefix
    pub fn row_range(self, user: &str) -> RowRange {
        RowRange::prefix(&format!("{user}/{}", self.prefix()))
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Shard {
    type Error = Error;

    fn try_from(index: u8) -> Result<Self> {
        Self::new(index)
    }
}

impl From<Shard> for u8 {
    fn from(shard: Shard) -> u8 {
        shard.0
    }
}
