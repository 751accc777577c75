//! In-memory wide-column store for development and testing
//!
//! Implements both [`AdminClient`] and [`DataClient`] over a map of tables.
//! Rows keep only the latest cell per column. Reads return rows in key
//! order, like a real wide-column store, regardless of request order.

use super::{
    AdminClient, DataClient, FamilyInfo, Mutation, ReadItem, Row, RowSet, StatusResult, TableInfo,
};
use crate::context::RequestContext;
use crate::Error;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tonic::Status;

/// Backend calls, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    Tables,
    TableInfo,
    CreateTable,
    CreateColumnFamily,
    DeleteTable,
    ApplyBulk,
    ReadRows,
}

/// Snapshot of call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub tables_calls: u64,
    pub table_info_calls: u64,
    pub apply_bulk_calls: u64,
    pub read_rows_calls: u64,
    /// Largest key count seen in a single keyed read
    pub max_keys_per_read: usize,
    /// Most reads in flight at once
    pub max_concurrent_reads: usize,
}

#[derive(Debug, Default)]
struct Counters {
    tables_calls: AtomicU64,
    table_info_calls: AtomicU64,
    apply_bulk_calls: AtomicU64,
    read_rows_calls: AtomicU64,
    max_keys_per_read: AtomicUsize,
    reads_in_flight: AtomicUsize,
    max_concurrent_reads: AtomicUsize,
}

type Cells = BTreeMap<String, BTreeMap<String, (i64, Bytes)>>;

#[derive(Debug, Default)]
struct MemTable {
    families: BTreeSet<String>,
    rows: BTreeMap<String, Cells>,
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: DashMap<String, MemTable>,
    /// Artificial latency added to every read
    read_latency: Option<Duration>,
    /// One-shot failures returned by the next call of each op
    failures: Mutex<HashMap<BackendOp, Status>>,
    counters: Counters,
    /// Server-assigned cell timestamps (micros)
    clock: AtomicI64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `read_rows` call by `latency`.
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = Some(latency);
        self
    }

    /// Make the next call of `op` fail with `status`.
    pub fn fail_next(&self, op: BackendOp, status: Status) {
        self.failures.lock().insert(op, status);
    }

    pub fn stats(&self) -> BackendStats {
        let c = &self.counters;
        BackendStats {
            tables_calls: c.tables_calls.load(Ordering::Relaxed),
            table_info_calls: c.table_info_calls.load(Ordering::Relaxed),
            apply_bulk_calls: c.apply_bulk_calls.load(Ordering::Relaxed),
            read_rows_calls: c.read_rows_calls.load(Ordering::Relaxed),
            max_keys_per_read: c.max_keys_per_read.load(Ordering::Relaxed),
            max_concurrent_reads: c.max_concurrent_reads.load(Ordering::Relaxed),
        }
    }

    /// Number of rows stored in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }

    fn preflight(&self, ctx: &RequestContext, op: BackendOp) -> StatusResult<()> {
        if let Some(err) = ctx.err() {
            return Err(context_status(err));
        }
        match self.failures.lock().remove(&op) {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn collect_rows(&self, table: &str, rows: &RowSet) -> StatusResult<Vec<Row>> {
        let guard = self
            .tables
            .get(table)
            .ok_or_else(|| Status::not_found(format!("table {table} not found")))?;

        let to_row = |key: &String, cells: &Cells| Row {
            key: key.clone(),
            families: cells
                .iter()
                .map(|(family, columns)| {
                    let items = columns
                        .iter()
                        .map(|(column, (timestamp, value))| ReadItem {
                            column: column.clone(),
                            timestamp: *timestamp,
                            value: value.clone(),
                        })
                        .collect();
                    (family.clone(), items)
                })
                .collect(),
        };

        let out = match rows {
            RowSet::Keys(keys) => {
                let wanted: BTreeSet<&String> = keys.iter().collect();
                wanted
                    .into_iter()
                    .filter_map(|key| guard.rows.get(key).map(|cells| to_row(key, cells)))
                    .collect()
            }
            RowSet::Range(range) => {
                let iter = guard
                    .rows
                    .range(range.start.clone()..)
                    .take_while(|(key, _)| range.contains(key))
                    .map(|(key, cells)| to_row(key, cells));
                match range.limit {
                    Some(limit) => iter.take(limit).collect(),
                    None => iter.collect(),
                }
            }
        };
        Ok(out)
    }

    fn next_timestamp(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn context_status(err: Error) -> Status {
    match err {
        Error::DeadlineExceeded => Status::deadline_exceeded(err.to_string()),
        other => Status::cancelled(other.to_string()),
    }
}

#[async_trait]
impl AdminClient for InMemoryBackend {
    async fn tables(&self, ctx: &RequestContext) -> StatusResult<Vec<String>> {
        self.counters.tables_calls.fetch_add(1, Ordering::Relaxed);
        self.preflight(ctx, BackendOp::Tables)?;
        let mut names: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn table_info(&self, ctx: &RequestContext, table: &str) -> StatusResult<TableInfo> {
        self.counters.table_info_calls.fetch_add(1, Ordering::Relaxed);
        self.preflight(ctx, BackendOp::TableInfo)?;
        let guard = self
            .tables
            .get(table)
            .ok_or_else(|| Status::not_found(format!("table {table} not found")))?;
        Ok(TableInfo {
            families: guard
                .families
                .iter()
                .map(|name| FamilyInfo { name: name.clone() })
                .collect(),
        })
    }

    async fn create_table(&self, ctx: &RequestContext, table: &str) -> StatusResult<()> {
        self.preflight(ctx, BackendOp::CreateTable)?;
        match self.tables.entry(table.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(Status::already_exists(format!("table {table} already exists")))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(MemTable::default());
                Ok(())
            }
        }
    }

    async fn create_column_family(
        &self,
        ctx: &RequestContext,
        table: &str,
        family: &str,
    ) -> StatusResult<()> {
        self.preflight(ctx, BackendOp::CreateColumnFamily)?;
        let mut guard = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Status::not_found(format!("table {table} not found")))?;
        if !guard.families.insert(family.to_string()) {
            return Err(Status::already_exists(format!(
                "family {family} already exists in {table}"
            )));
        }
        Ok(())
    }

    async fn delete_table(&self, ctx: &RequestContext, table: &str) -> StatusResult<()> {
        self.preflight(ctx, BackendOp::DeleteTable)?;
        self.tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| Status::not_found(format!("table {table} not found")))
    }
}

#[async_trait]
impl DataClient for InMemoryBackend {
    async fn apply_bulk(
        &self,
        ctx: &RequestContext,
        table: &str,
        rows: Vec<(String, Mutation)>,
    ) -> StatusResult<Vec<Option<Status>>> {
        self.counters.apply_bulk_calls.fetch_add(1, Ordering::Relaxed);
        self.preflight(ctx, BackendOp::ApplyBulk)?;

        let mut guard = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Status::not_found(format!("table {table} not found")))?;
        let mut results = Vec::with_capacity(rows.len());
        for (key, mutation) in rows {
            if let Some(cell) = mutation
                .cells
                .iter()
                .find(|c| !guard.families.contains(&c.family))
            {
                results.push(Some(Status::failed_precondition(format!(
                    "family {} not found in {}",
                    cell.family, table
                ))));
                continue;
            }
            let row = guard.rows.entry(key).or_default();
            for cell in mutation.cells {
                let ts = cell.timestamp.unwrap_or_else(|| self.next_timestamp());
                row.entry(cell.family)
                    .or_default()
                    .insert(cell.column, (ts, cell.value));
            }
            results.push(None);
        }
        Ok(results)
    }

    async fn read_rows(
        &self,
        ctx: &RequestContext,
        table: &str,
        rows: RowSet,
        f: &mut (dyn FnMut(Row) -> bool + Send),
    ) -> StatusResult<()> {
        let c = &self.counters;
        c.read_rows_calls.fetch_add(1, Ordering::Relaxed);
        if let RowSet::Keys(keys) = &rows {
            c.max_keys_per_read.fetch_max(keys.len(), Ordering::Relaxed);
        }
        self.preflight(ctx, BackendOp::ReadRows)?;

        let in_flight = c.reads_in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        c.max_concurrent_reads.fetch_max(in_flight, Ordering::AcqRel);
        let result = self.read_rows_inner(ctx, table, &rows, f).await;
        c.reads_in_flight.fetch_sub(1, Ordering::AcqRel);
        result
    }
}

impl InMemoryBackend {
    async fn read_rows_inner(
        &self,
        ctx: &RequestContext,
        table: &str,
        rows: &RowSet,
        f: &mut (dyn FnMut(Row) -> bool + Send),
    ) -> StatusResult<()> {
        if let Some(latency) = self.read_latency {
            tokio::select! {
                biased;
                err = ctx.done() => return Err(context_status(err)),
                _ = tokio::time::sleep(latency) => {}
            }
        }

        let matched = self.collect_rows(table, rows)?;
        for row in matched {
            if let Some(err) = ctx.err() {
                return Err(context_status(err));
            }
            if !f(row) {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RowRange;

    async fn backend_with_table() -> InMemoryBackend {
        let ctx = RequestContext::background();
        let backend = InMemoryBackend::new();
        backend.create_table(&ctx, "t").await.unwrap();
        backend.create_column_family(&ctx, "t", "f").await.unwrap();
        backend
    }

    fn put(key: &str, value: &'static [u8]) -> (String, Mutation) {
        (
            key.to_string(),
            Mutation::new().set("f", "c", None, Bytes::from_static(value)),
        )
    }

    async fn read_keys(backend: &InMemoryBackend, rows: RowSet) -> Vec<String> {
        let mut keys = Vec::new();
        backend
            .read_rows(&RequestContext::background(), "t", rows, &mut |row: Row| {
                keys.push(row.key);
                true
            })
            .await
            .unwrap();
        keys
    }

    #[tokio::test]
    async fn create_is_not_idempotent_at_this_level() {
        let backend = backend_with_table().await;
        let ctx = RequestContext::background();
        let err = backend.create_table(&ctx, "t").await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::AlreadyExists);
        let err = backend.create_column_family(&ctx, "t", "f").await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::AlreadyExists);
    }

    #[tokio::test]
    async fn reads_come_back_in_key_order() {
        let backend = backend_with_table().await;
        let ctx = RequestContext::background();
        let errs = backend
            .apply_bulk(&ctx, "t", vec![put("b", b"2"), put("a", b"1"), put("c", b"3")])
            .await
            .unwrap();
        assert!(errs.iter().all(Option::is_none));

        let keys = read_keys(
            &backend,
            RowSet::Keys(vec!["c".into(), "a".into(), "missing".into()]),
        )
        .await;
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn range_reads_honour_limit() {
        let backend = backend_with_table().await;
        let ctx = RequestContext::background();
        backend
            .apply_bulk(&ctx, "t", vec![put("a", b"1"), put("b", b"2"), put("c", b"3")])
            .await
            .unwrap();

        let keys = read_keys(
            &backend,
            RowSet::Range(RowRange::new("a", Some("c".into())).with_limit(1)),
        )
        .await;
        assert_eq!(keys, vec!["a"]);
    }

    #[tokio::test]
    async fn missing_family_fails_per_row() {
        let backend = backend_with_table().await;
        let ctx = RequestContext::background();
        let errs = backend
            .apply_bulk(
                &ctx,
                "t",
                vec![
                    put("a", b"1"),
                    (
                        "b".into(),
                        Mutation::new().set("other", "c", None, Bytes::new()),
                    ),
                ],
            )
            .await
            .unwrap();
        assert!(errs[0].is_none());
        assert_eq!(
            errs[1].as_ref().map(|s| s.code()),
            Some(tonic::Code::FailedPrecondition)
        );
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let backend = backend_with_table().await;
        let ctx = RequestContext::background();
        backend.fail_next(BackendOp::Tables, Status::unavailable("down"));
        assert!(backend.tables(&ctx).await.is_err());
        assert_eq!(backend.tables(&ctx).await.unwrap(), vec!["t"]);
    }

    #[tokio::test]
    async fn cancelled_context_fails_reads() {
        let backend = backend_with_table().await;
        let ctx = RequestContext::background();
        ctx.cancel();
        let err = backend
            .read_rows(&ctx, "t", RowSet::Keys(vec!["a".into()]), &mut |_| true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Cancelled);
    }
}
