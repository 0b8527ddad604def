//! Storage engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dbsync_bench::{generate_snapshot, SCHEMA};
use dbsync_storage::{
    execute_script, FileEngine, InMemoryEngine, MaxRowsPolicy, Query, StorageEngine,
};
use tempfile::tempdir;

/// Benchmark single-row upserts.
fn bench_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("upsert");

    for size in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let engine = InMemoryEngine::new();
            execute_script(&engine, SCHEMA).unwrap();
            let rows = generate_snapshot(size);

            b.iter(|| {
                for row in &rows {
                    engine
                        .update_or_insert_row("processes", black_box(row))
                        .unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Benchmark full-table selects.
fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let engine = InMemoryEngine::new();
            execute_script(&engine, SCHEMA).unwrap();
            engine
                .bulk_insert("processes", &generate_snapshot(size))
                .unwrap();
            let query = Query::all();

            b.iter(|| engine.select("processes", black_box(&query)).unwrap());
        });
    }
    group.finish();
}

/// Benchmark writing the database file.
fn bench_file_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_flush");

    for size in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = tempdir().unwrap();
            let engine =
                FileEngine::create(&dir.path().join("bench.db"), MaxRowsPolicy::Reject).unwrap();
            execute_script(&engine, SCHEMA).unwrap();
            let rows = generate_snapshot(size);
            engine.bulk_insert("processes", &rows).unwrap();

            b.iter(|| {
                engine
                    .update_or_insert_row("processes", black_box(&rows[0]))
                    .unwrap();
                engine.set_schema_version(0).unwrap();
                engine.flush().unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_upsert, bench_select, bench_file_flush);
criterion_main!(benches);
