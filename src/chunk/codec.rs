//! Chunk payload serialization
//!
//! Row value layout:
//!
//! ```text
//! | header len (u32 BE) | JSON header | data len (u32 BE) | data |
//! ```
//!
//! The header repeats the chunk identity so a decoder can verify that the
//! row it was handed really is the chunk it asked for.

use super::{Chunk, Fingerprint, Label, Labels};
use crate::{Error, Result};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serializes chunks to and from row values.
pub trait ChunkCodec: Send + Sync {
    /// Encode a complete chunk into a row value.
    fn encode(&self, chunk: &Chunk) -> Result<Bytes>;

    /// Decode `buf` into `chunk`, which carries the identity that was asked
    /// for. Fills in metric, encoding and data.
    fn decode(&self, ctx: &mut DecodeContext, chunk: &mut Chunk, buf: Bytes) -> Result<()>;
}

/// Per-batch decode state.
///
/// Chunks decoded together usually share series; the context keeps label
/// sets by fingerprint so a repeated series skips label deserialization and
/// shares one allocation.
#[derive(Debug, Default)]
pub struct DecodeContext {
    metrics: HashMap<Fingerprint, Labels>,
    decoded: usize,
}

impl DecodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks decoded through this context.
    pub fn decoded(&self) -> usize {
        self.decoded
    }
}

#[derive(Serialize)]
struct HeaderOut<'a> {
    user_id: &'a str,
    fingerprint: u64,
    from: i64,
    through: i64,
    checksum: u32,
    encoding: u8,
    metric: &'a [Label],
}

#[derive(Deserialize)]
struct HeaderIdentity {
    user_id: String,
    fingerprint: u64,
    from: i64,
    through: i64,
    checksum: u32,
    encoding: u8,
}

#[derive(Deserialize)]
struct HeaderMetric {
    metric: Vec<Label>,
}

/// Length-prefixed JSON header followed by raw chunk data.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultChunkCodec;

impl DefaultChunkCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkCodec for DefaultChunkCodec {
    fn encode(&self, chunk: &Chunk) -> Result<Bytes> {
        let actual = crc32fast::hash(&chunk.data);
        if actual != chunk.checksum {
            return Err(Error::Encode(format!(
                "checksum mismatch for {}: header {:x}, data {:x}",
                chunk.external_key(),
                chunk.checksum,
                actual
            )));
        }

        let header = serde_json::to_vec(&HeaderOut {
            user_id: &chunk.user_id,
            fingerprint: chunk.fingerprint.0,
            from: chunk.from,
            through: chunk.through,
            checksum: chunk.checksum,
            encoding: chunk.encoding,
            metric: chunk.metric.as_slice(),
        })
        .map_err(|e| Error::Encode(e.to_string()))?;

        let header_len = u32::try_from(header.len())
            .map_err(|_| Error::Encode("chunk header too large".to_string()))?;
        let data_len = u32::try_from(chunk.data.len())
            .map_err(|_| Error::Encode("chunk data too large".to_string()))?;

        let mut buf = BytesMut::with_capacity(8 + header.len() + chunk.data.len());
        buf.put_u32(header_len);
        buf.put_slice(&header);
        buf.put_u32(data_len);
        buf.put_slice(&chunk.data);
        Ok(buf.freeze())
    }

    fn decode(&self, ctx: &mut DecodeContext, chunk: &mut Chunk, mut buf: Bytes) -> Result<()> {
        let header = take_section(&mut buf, "header")?;
        let data = take_section(&mut buf, "data")?;
        if buf.has_remaining() {
            return Err(Error::Decode(format!(
                "{} trailing bytes after chunk data",
                buf.remaining()
            )));
        }

        let identity: HeaderIdentity =
            serde_json::from_slice(&header).map_err(|e| Error::Decode(e.to_string()))?;
        if identity.user_id != chunk.user_id
            || identity.fingerprint != chunk.fingerprint.0
            || identity.from != chunk.from
            || identity.through != chunk.through
            || identity.checksum != chunk.checksum
        {
            return Err(Error::Decode(format!(
                "wrong chunk metadata: asked for {}, row holds {}/{:x}:{:x}:{:x}:{:x}",
                chunk.external_key(),
                identity.user_id,
                identity.fingerprint,
                identity.from,
                identity.through,
                identity.checksum
            )));
        }

        let actual = crc32fast::hash(&data);
        if actual != identity.checksum {
            return Err(Error::Decode(format!(
                "checksum mismatch for {}: expected {:x}, got {:x}",
                chunk.external_key(),
                identity.checksum,
                actual
            )));
        }

        let metric = match ctx.metrics.get(&chunk.fingerprint) {
            Some(labels) => labels.clone(),
            None => {
                let parsed: HeaderMetric =
                    serde_json::from_slice(&header).map_err(|e| Error::Decode(e.to_string()))?;
                let labels = Labels::new(parsed.metric);
                ctx.metrics.insert(chunk.fingerprint, labels.clone());
                labels
            }
        };

        chunk.metric = metric;
        chunk.encoding = identity.encoding;
        chunk.data = data;
        ctx.decoded += 1;
        Ok(())
    }
}

fn take_section(buf: &mut Bytes, what: &str) -> Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(Error::Decode(format!("truncated {what} length")));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(Error::Decode(format!(
            "truncated {what}: want {len} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(buf.split_to(len))
}
