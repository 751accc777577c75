//! Wide-column backing-store seam
//!
//! The chunk access layer talks to the backing store only through the
//! [`AdminClient`] (table administration) and [`DataClient`] (row mutation
//! and reads) traits. Failures are reported as gRPC [`Status`] values, the
//! error model of Bigtable-style transports; callers wrap them with the name
//! of the failing call.

mod memory;

pub use memory::{BackendOp, BackendStats, InMemoryBackend};

use crate::context::RequestContext;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tonic::Status;

/// Result of a backing-store call
pub type StatusResult<T> = std::result::Result<T, Status>;

/// Column family metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyInfo {
    pub name: String,
}

/// Table metadata as reported by the admin API
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableInfo {
    pub families: Vec<FamilyInfo>,
}

impl TableInfo {
    pub fn has_family(&self, name: &str) -> bool {
        self.families.iter().any(|f| f.name == name)
    }
}

/// One cell write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCell {
    pub family: String,
    pub column: String,
    /// `None` lets the store assign the timestamp
    pub timestamp: Option<i64>,
    pub value: Bytes,
}

/// Mutation applied to a single row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    pub cells: Vec<SetCell>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        mut self,
        family: impl Into<String>,
        column: impl Into<String>,
        timestamp: Option<i64>,
        value: Bytes,
    ) -> Self {
        self.cells.push(SetCell {
            family: family.into(),
            column: column.into(),
            timestamp,
            value,
        });
        self
    }
}

/// A cell returned by a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadItem {
    pub column: String,
    pub timestamp: i64,
    pub value: Bytes,
}

/// A row returned by a read, cells grouped by family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: String,
    pub families: BTreeMap<String, Vec<ReadItem>>,
}

impl Row {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cells(&self, family: &str) -> &[ReadItem] {
        self.families.get(family).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Value of the first cell in `family`, if any.
    pub fn first_value(&self, family: &str) -> Option<&Bytes> {
        self.cells(family).first().map(|item| &item.value)
    }
}

/// Lexicographic key range `[start, end)`, optionally capped at `limit` rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRange {
    pub start: String,
    /// Exclusive end; `None` is unbounded
    pub end: Option<String>,
    pub limit: Option<usize>,
}

impl RowRange {
    pub fn new(start: impl Into<String>, end: Option<String>) -> Self {
        Self {
            start: start.into(),
            end,
            limit: None,
        }
    }

    /// All keys starting with `prefix`.
    pub fn prefix(prefix: &str) -> Self {
        Self::new(prefix, prefix_successor(prefix))
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        key >= self.start.as_str() && self.end.as_deref().map_or(true, |end| key < end)
    }
}

/// Rows selected by a read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSet {
    /// Exact keys; missing keys are skipped silently
    Keys(Vec<String>),
    Range(RowRange),
}

/// Smallest string greater than every string starting with `prefix`, or
/// `None` if no such bound exists (empty prefix or all `0xff` bytes).
pub fn prefix_successor(prefix: &str) -> Option<String> {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(last) = bytes.pop() {
        if last < 0x7f {
            bytes.push(last + 1);
            // Incrementing an ASCII byte keeps the string valid UTF-8.
            return String::from_utf8(bytes).ok();
        }
    }
    None
}

/// Table administration
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Names of every table in the instance
    async fn tables(&self, ctx: &RequestContext) -> StatusResult<Vec<String>>;

    async fn table_info(&self, ctx: &RequestContext, table: &str) -> StatusResult<TableInfo>;

    /// Fails with `AlreadyExists` if the table exists.
    async fn create_table(&self, ctx: &RequestContext, table: &str) -> StatusResult<()>;

    /// Fails with `AlreadyExists` if the family exists.
    async fn create_column_family(
        &self,
        ctx: &RequestContext,
        table: &str,
        family: &str,
    ) -> StatusResult<()>;

    async fn delete_table(&self, ctx: &RequestContext, table: &str) -> StatusResult<()>;
}

/// Row reads and writes
#[async_trait]
pub trait DataClient: Send + Sync {
    /// Apply one mutation per row. The outer error fails the whole call; the
    /// returned vector holds one slot per input row, `Some` where that row
    /// failed.
    async fn apply_bulk(
        &self,
        ctx: &RequestContext,
        table: &str,
        rows: Vec<(String, Mutation)>,
    ) -> StatusResult<Vec<Option<Status>>>;

    /// Stream matching rows to `f` in key order (not request order). Reading
    /// stops early, successfully, when `f` returns `false`.
    async fn read_rows(
        &self,
        ctx: &RequestContext,
        table: &str,
        rows: RowSet,
        f: &mut (dyn FnMut(Row) -> bool + Send),
    ) -> StatusResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_successor_increments_last_byte() {
        assert_eq!(prefix_successor("1/ab").as_deref(), Some("1/ac"));
        assert_eq!(prefix_successor("1/af").as_deref(), Some("1/ag"));
        assert_eq!(prefix_successor("1/a9").as_deref(), Some("1/a:"));
        assert_eq!(prefix_successor(""), None);
    }

    #[test]
    fn prefix_range_contains_only_prefixed_keys() {
        let range = RowRange::prefix("1/ab");
        assert!(range.contains("1/ab"));
        assert!(range.contains("1/abffff:0:0:0"));
        assert!(!range.contains("1/ac"));
        assert!(!range.contains("1/aa"));
        assert!(!range.contains("2/ab"));
    }

    #[test]
    fn unbounded_range() {
        let range = RowRange::new("m", None);
        assert!(range.contains("zzz"));
        assert!(!range.contains("a"));
    }

    #[test]
    fn mutation_builder_collects_cells() {
        let m = Mutation::new()
            .set("f", "c", None, Bytes::from_static(b"1"))
            .set("f", "d", Some(7), Bytes::from_static(b"2"));
        assert_eq!(m.cells.len(), 2);
        assert_eq!(m.cells[1].timestamp, Some(7));
    }
}
