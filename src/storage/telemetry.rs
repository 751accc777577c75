//! Storage telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct StorageInstruments {
    chunks_written: Counter<u64>,
    chunk_bytes_written: Counter<u64>,
    put_duration_seconds: Histogram<f64>,
    chunks_read: Counter<u64>,
    read_pages: Counter<u64>,
    get_duration_seconds: Histogram<f64>,
    get_outcomes: Counter<u64>,
    table_cache_refreshes: Counter<u64>,
    table_info_fetches: Counter<u64>,
}

fn instruments() -> &'static StorageInstruments {
    static INSTRUMENTS: OnceLock<StorageInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("chunktable.storage");
        StorageInstruments {
            chunks_written: meter
                .u64_counter("chunktable.storage.put.chunks")
                .with_description("Chunks written through the bulk write path")
                .init(),
            chunk_bytes_written: meter
                .u64_counter("chunktable.storage.put.bytes")
                .with_description("Encoded chunk bytes written")
                .with_unit("By")
                .init(),
            put_duration_seconds: meter
                .f64_histogram("chunktable.storage.put.duration")
                .with_description("Bulk write duration")
                .with_unit("s")
                .init(),
            chunks_read: meter
                .u64_counter("chunktable.storage.get.chunks")
                .with_description("Chunks returned by the bulk read path")
                .init(),
            read_pages: meter
                .u64_counter("chunktable.storage.get.pages")
                .with_description("Row-read pages issued by the bulk read path")
                .init(),
            get_duration_seconds: meter
                .f64_histogram("chunktable.storage.get.duration")
                .with_description("Bulk read duration")
                .with_unit("s")
                .init(),
            get_outcomes: meter
                .u64_counter("chunktable.storage.get.outcomes")
                .with_description("Bulk read outcomes")
                .init(),
            table_cache_refreshes: meter
                .u64_counter("chunktable.storage.table_cache.refreshes")
                .with_description("Table metadata cache expirations")
                .init(),
            table_info_fetches: meter
                .u64_counter("chunktable.storage.table_cache.fetches")
                .with_description("Table metadata fetched from the backing store")
                .init(),
        }
    })
}

pub fn record_put(duration_seconds: f64, chunks: u64, bytes: u64) {
    let i = instruments();
    i.chunks_written.add(chunks, &[]);
    i.chunk_bytes_written.add(bytes, &[]);
    i.put_duration_seconds.record(duration_seconds, &[]);
}

pub fn record_read_pages(pages: u64) {
    instruments().read_pages.add(pages, &[]);
}

pub fn record_get(duration_seconds: f64, chunks: u64, outcome: &'static str) {
    let i = instruments();
    i.chunks_read.add(chunks, &[]);
    i.get_duration_seconds.record(duration_seconds, &[]);
    i.get_outcomes.add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn record_table_cache_refresh() {
    instruments().table_cache_refreshes.add(1, &[]);
}

pub fn record_table_info_fetch() {
    instruments().table_info_fetches.add(1, &[]);
}
