//! Hash table and codec benchmarks
//!
//! Run with:
//! ```bash
//! cargo bench -p relaymcp-core --bench core_benchmarks
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use relaymcp_core::hashmap::{IntMap, StringMap};
use relaymcp_core::jsonrpc;
use serde_json::json;
use std::hint::black_box;

fn bench_table_put_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_put_get");

    for size in [64u64, 1_024, 16_384] {
        group.throughput(Throughput::Elements(size));

        group.bench_with_input(BenchmarkId::new("int_keys", size), &size, |b, &size| {
            b.iter(|| {
                let mut table: IntMap<u64, u64> = IntMap::new();
                for i in 0..size {
                    table.put(i, i).ok();
                }
                for i in 0..size {
                    black_box(table.get(&i));
                }
            });
        });

        let keys: Vec<String> = (0..size).map(|i| format!("example://resource/{i}")).collect();
        group.bench_with_input(BenchmarkId::new("string_keys", size), &keys, |b, keys| {
            b.iter(|| {
                let mut table: StringMap<usize> = StringMap::new();
                for (i, key) in keys.iter().enumerate() {
                    table.put(key.clone(), i).ok();
                }
                for key in keys {
                    black_box(table.get(key.as_str()));
                }
            });
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("jsonrpc_codec");

    let params = json!({"name": "echo", "arguments": {"text": "x".repeat(256)}});
    group.bench_function("format_request", |b| {
        b.iter(|| black_box(jsonrpc::format_request(42, "call_tool", Some(&params))));
    });

    let response = jsonrpc::format_success_response(42, &json!({"message": "pong"}));
    group.bench_function("parse_response", |b| {
        b.iter(|| black_box(jsonrpc::parse_response(&response)));
    });

    let batch: Vec<String> = (1..=16)
        .map(|id| jsonrpc::format_request(id, "ping", None))
        .collect();
    let batch = format!("[{}]", batch.join(","));
    group.bench_function("parse_batch_16", |b| {
        b.iter(|| black_box(jsonrpc::parse_payload(&batch)));
    });

    group.bench_function("extract_id", |b| {
        b.iter(|| black_box(jsonrpc::extract_id(response.as_bytes())));
    });

    group.finish();
}

criterion_group!(benches, bench_table_put_get, bench_codec);
criterion_main!(benches);
