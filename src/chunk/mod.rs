//! Chunk model
//!
//! A chunk is an opaque blob of samples for one series of one tenant over a
//! half-open time range. Its storage identity is the external key, derived
//! from tenant, fingerprint, time range and payload checksum.

mod codec;

pub use codec::{ChunkCodec, DecodeContext, DefaultChunkCodec};

use crate::{Error, Result};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Hash of a metric's label set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl From<u64> for Fingerprint {
    fn from(v: u64) -> Self {
        Fingerprint(v)
    }
}

/// A single label pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// Sorted label set identifying a metric. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels(Arc<[Label]>);

impl Default for Labels {
    fn default() -> Self {
        Labels(Arc::from(Vec::new()))
    }
}

impl Labels {
    pub fn new(mut labels: Vec<Label>) -> Self {
        labels.sort();
        Labels(labels.into())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, value)| Label {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Label] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A time-series chunk.
///
/// Read requests only need the identity fields (`user_id`, `fingerprint`,
/// `from`, `through`, `checksum`); decoding fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Tenant
    pub user_id: String,
    pub fingerprint: Fingerprint,
    pub metric: Labels,
    /// Inclusive start, milliseconds since the epoch
    pub from: i64,
    /// Exclusive end, milliseconds since the epoch
    pub through: i64,
    /// CRC32 of `data`
    pub checksum: u32,
    /// Sample encoding tag
    pub encoding: u8,
    pub data: Bytes,
}

impl Chunk {
    /// Build a chunk and compute its checksum from `data`.
    pub fn new(
        user_id: impl Into<String>,
        fingerprint: impl Into<Fingerprint>,
        metric: Labels,
        from: i64,
        through: i64,
        encoding: u8,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            user_id: user_id.into(),
            fingerprint: fingerprint.into(),
            metric,
            from,
            through,
            checksum: crc32fast::hash(&data),
            encoding,
            data,
        }
    }

    /// The row key of this chunk in the backing store.
    ///
    /// `{user}/{fingerprint}:{from}:{through}:{checksum}`, all numbers lowercase
    /// hex without padding.
    pub fn external_key(&self) -> String {
        format!(
            "{}/{:x}:{:x}:{:x}:{:x}",
            self.user_id, self.fingerprint.0, self.from, self.through, self.checksum
        )
    }

    /// Rebuild chunk identity from a row key belonging to `user_id`.
    ///
    /// Only identity fields are populated; `metric`, `encoding` and `data`
    /// are filled in by decoding the row value.
    pub fn parse_external_key(user_id: &str, key: &str) -> Result<Self> {
        let rest = key
            .strip_prefix(user_id)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| {
                Error::InvalidKey(format!("{key:?} does not belong to user {user_id:?}"))
            })?;

        let parts: Vec<&str> = rest.split(':').collect();
        let [fingerprint, from, through, checksum] = parts.as_slice() else {
            return Err(Error::InvalidKey(format!(
                "{key:?} should have 4 ':'-separated fields, found {}",
                parts.len()
            )));
        };
        let fingerprint = parse_hex_u64(fingerprint, key)?;
        let from = parse_hex_i64(from, key)?;
        let through = parse_hex_i64(through, key)?;
        let checksum = u32::from_str_radix(checksum, 16)
            .map_err(|e| Error::InvalidKey(format!("{key:?}: bad checksum: {e}")))?;

        Ok(Self {
            user_id: user_id.to_string(),
            fingerprint: Fingerprint(fingerprint),
            metric: Labels::default(),
            from,
            through,
            checksum,
            encoding: 0,
            data: Bytes::new(),
        })
    }

    /// True if the chunk's `[from, through)` overlaps `[start, end)`.
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.from < end && start < self.through
    }
}

fn parse_hex_u64(s: &str, key: &str) -> Result<u64> {
    u64::from_str_radix(s, 16).map_err(|e| Error::InvalidKey(format!("{key:?}: {e}")))
}

// Negative timestamps are written by `{:x}` as their two's-complement bits.
fn parse_hex_i64(s: &str, key: &str) -> Result<i64> {
    parse_hex_u64(s, key).map(|v| v as i64)
}
