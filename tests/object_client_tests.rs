//! Bulk write and read paths against the in-memory backend
//!
//! These tests cover routing across periodic tables:
//! - chunks land in the table of their start time
//! - reads fan out over every table touched
//! - timestamps before the first period are rejected

use chunktable::backend::{AdminClient, InMemoryBackend};
use chunktable::chunk::{Chunk, DefaultChunkCodec, Labels};
use chunktable::config::ChunkStoreConfig;
use chunktable::context::RequestContext;
use chunktable::schema::{PeriodConfig, SchemaConfig, SchemaRouter};
use chunktable::storage::{ColumnObjectClient, ColumnTableClient, ObjectClient, TableClient, TableDesc};
use chunktable::Error;

use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;

const DAY_MS: i64 = 24 * 3600 * 1000;

fn weekly_schema() -> SchemaConfig {
    SchemaConfig::new(vec![
        PeriodConfig {
            from: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            prefix: "legacy".to_string(),
            period_secs: 0,
        },
        PeriodConfig {
            from: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            prefix: "chunks_".to_string(),
            period_secs: 7 * 24 * 3600,
        },
    ])
    .unwrap()
}

fn start_of(y: i32, m: u32, d: u32) -> i64 {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp_millis()
}

/// Chunks spread over the legacy table and three weekly tables
fn spread_chunks() -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let starts = [
        start_of(2020, 6, 1),
        start_of(2021, 3, 1),
        start_of(2021, 3, 1) + 7 * DAY_MS,
        start_of(2021, 3, 1) + 14 * DAY_MS,
    ];
    for (i, from) in starts.into_iter().enumerate() {
        for j in 0..25u64 {
            chunks.push(Chunk::new(
                "tenant-a",
                0x1_0000 * (i as u64 + 1) + j,
                Labels::from_pairs([("__name__", "requests_total"), ("pod", "web-0")]),
                from,
                from + 3_600_000,
                1,
                format!("samples-{i}-{j}"),
            ));
        }
    }
    chunks
}

async fn setup(
    schema: &SchemaConfig,
    chunks: &[Chunk],
    page_size: usize,
) -> (Arc<InMemoryBackend>, ColumnObjectClient) {
    let backend = Arc::new(InMemoryBackend::new());
    let ctx = RequestContext::background();
    let config = ChunkStoreConfig {
        max_row_read_batch_size: page_size,
        ..Default::default()
    };

    let tables = ColumnTableClient::new(backend.clone(), &config);
    let names: BTreeSet<String> = chunks
        .iter()
        .map(|c| schema.table_for(c.from).unwrap())
        .collect();
    for name in names {
        tables.create_table(&ctx, TableDesc::new(name)).await.unwrap();
    }

    let client = ColumnObjectClient::new(
        backend.clone(),
        Arc::new(schema.clone()),
        Arc::new(DefaultChunkCodec::new()),
        &config,
    );
    (backend, client)
}

fn identity(c: &Chunk) -> Chunk {
    Chunk::parse_external_key(&c.user_id, &c.external_key()).unwrap()
}

#[tokio::test]
async fn test_chunks_route_to_period_tables() {
    let schema = weekly_schema();
    let chunks = spread_chunks();
    let (backend, client) = setup(&schema, &chunks, 10).await;
    let ctx = RequestContext::background();

    client.put_chunks(&ctx, &chunks).await.unwrap();

    let tables = backend.tables(&ctx).await.unwrap();
    assert_eq!(tables.len(), 4);
    assert!(tables.contains(&"legacy".to_string()));
    for table in &tables {
        assert_eq!(backend.row_count(table), 25, "{table}");
    }
    // One bulk apply per table
    assert_eq!(backend.stats().apply_bulk_calls, 4);
}

#[tokio::test]
async fn test_reads_span_tables_and_pages() {
    let schema = weekly_schema();
    let chunks = spread_chunks();
    let (backend, client) = setup(&schema, &chunks, 10).await;
    let ctx = RequestContext::background();
    client.put_chunks(&ctx, &chunks).await.unwrap();

    let mut got = client
        .get_chunks(&ctx, chunks.iter().map(identity).collect())
        .await
        .unwrap();
    got.sort_by_key(|c| c.fingerprint);
    let mut want = chunks.clone();
    want.sort_by_key(|c| c.fingerprint);
    assert_eq!(got, want);

    // 25 keys per table in pages of 10: three pages per table
    let stats = backend.stats();
    assert_eq!(stats.read_rows_calls, 12);
    assert_eq!(stats.max_keys_per_read, 10);
}

#[tokio::test]
async fn test_timestamp_before_first_period_is_rejected() {
    let schema = weekly_schema();
    let (_backend, client) = setup(&schema, &[], 10).await;
    let early = Chunk::new("tenant-a", 0xabcdu64, Labels::default(), 0, 1000, 1, "x");

    let err = client
        .put_chunks(&RequestContext::background(), &[early.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Schema(_)), "{err}");

    let err = client
        .get_chunks(&RequestContext::background(), vec![identity(&early)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Schema(_)), "{err}");
}

#[tokio::test]
async fn test_tampered_row_fails_the_read() {
    let schema = weekly_schema();
    let chunks = spread_chunks();
    let (_backend, client) = setup(&schema, &chunks, 100).await;
    let ctx = RequestContext::background();
    client.put_chunks(&ctx, &chunks).await.unwrap();

    // Ask for a chunk under a checksum that does not match the stored row:
    // the key differs, so the row is simply missing.
    let mut wrong = identity(&chunks[0]);
    wrong.checksum ^= 1;
    let err = client.get_chunks(&ctx, vec![wrong]).await.unwrap_err();
    assert!(
        matches!(err, Error::ShortRead { requested: 1, received: 0 }),
        "{err}"
    );
}

#[tokio::test]
async fn test_cancelled_before_put() {
    let schema = weekly_schema();
    let chunks = spread_chunks();
    let (backend, client) = setup(&schema, &chunks, 100).await;
    let ctx = RequestContext::background();
    ctx.cancel();

    let err = client.put_chunks(&ctx, &chunks).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(backend.stats().apply_bulk_calls, 0);
}
