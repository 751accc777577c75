//! Bulk read fan-out benchmark

use chunktable::backend::{AdminClient, InMemoryBackend};
use chunktable::chunk::{Chunk, DefaultChunkCodec, Labels};
use chunktable::config::ChunkStoreConfig;
use chunktable::context::RequestContext;
use chunktable::schema::{PeriodConfig, SchemaConfig};
use chunktable::storage::{ColumnObjectClient, ObjectClient, COLUMN_FAMILY};

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

const TABLE: &str = "chunks";
const CHUNKS: u64 = 5_000;

fn create_chunks(n: u64) -> Vec<Chunk> {
    let payload = Bytes::from(vec![0x5au8; 1024]);
    (0..n)
        .map(|i| {
            Chunk::new(
                "bench",
                0x1000_0000 + i,
                Labels::from_pairs([("__name__", "cpu_usage"), ("host", "server-1")]),
                0,
                3_600_000,
                1,
                payload.clone(),
            )
        })
        .collect()
}

fn identities(chunks: &[Chunk]) -> Vec<Chunk> {
    chunks
        .iter()
        .map(|c| Chunk::parse_external_key(&c.user_id, &c.external_key()).unwrap())
        .collect()
}

fn create_client(rt: &tokio::runtime::Runtime, page_size: usize, chunks: &[Chunk]) -> ColumnObjectClient {
    let backend = Arc::new(InMemoryBackend::new());
    let schema = SchemaConfig::new(vec![PeriodConfig {
        from: chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
        prefix: TABLE.to_string(),
        period_secs: 0,
    }])
    .unwrap();
    let config = ChunkStoreConfig {
        max_row_read_batch_size: page_size,
        ..Default::default()
    };
    let client = ColumnObjectClient::new(
        backend.clone(),
        Arc::new(schema),
        Arc::new(DefaultChunkCodec::new()),
        &config,
    );

    rt.block_on(async {
        let ctx = RequestContext::background();
        backend.create_table(&ctx, TABLE).await.unwrap();
        backend
            .create_column_family(&ctx, TABLE, COLUMN_FAMILY)
            .await
            .unwrap();
        client.put_chunks(&ctx, chunks).await.unwrap();
    });
    client
}

fn benchmark_get_chunks(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let chunks = create_chunks(CHUNKS);
    let request = identities(&chunks);

    let mut group = c.benchmark_group("get_chunks");
    group.throughput(Throughput::Elements(CHUNKS));

    for page_size in [100usize, 1000, 5000] {
        let client = create_client(&rt, page_size, &chunks);
        group.bench_with_input(BenchmarkId::from_parameter(page_size), &page_size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let got = client
                    .get_chunks(&RequestContext::background(), request.clone())
                    .await
                    .unwrap();
                black_box(got);
            });
        });
    }

    group.finish();
}

fn benchmark_put_chunks(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let chunks = create_chunks(CHUNKS);
    let client = create_client(&rt, 1000, &[]);

    let mut group = c.benchmark_group("put_chunks");
    group.throughput(Throughput::Elements(CHUNKS));
    group.bench_function("single_table", |b| {
        b.to_async(&rt).iter(|| async {
            client
                .put_chunks(&RequestContext::background(), &chunks)
                .await
                .unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_get_chunks, benchmark_put_chunks);
criterion_main!(benches);
