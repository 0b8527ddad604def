//! Synchronization benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dbsync_bench::{generate_snapshot, next_snapshot, SCHEMA};
use dbsync_core::{DbSync, EngineConfig, Handle, SnapshotRequest, SyncRequest, TransactionRequest};

fn open(dbsync: &DbSync) -> Handle {
    dbsync
        .open(&EngineConfig::new().creation_statement(SCHEMA))
        .unwrap()
}

fn snapshot(data: Vec<dbsync_core::Row>) -> SnapshotRequest {
    SnapshotRequest {
        table: "processes".into(),
        data,
    }
}

/// Benchmark refreshing with an unchanged snapshot.
fn bench_refresh_unchanged(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_unchanged");

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dbsync = DbSync::new();
            let handle = open(&dbsync);
            let request = snapshot(generate_snapshot(size));
            dbsync.refresh_snapshot(handle, &request, |_| {}).unwrap();

            b.iter(|| {
                let mut events = 0usize;
                dbsync
                    .refresh_snapshot(handle, black_box(&request), |_| events += 1)
                    .unwrap();
                events
            });
        });
    }
    group.finish();
}

/// Benchmark refreshing with ten percent churn.
fn bench_refresh_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_churn");

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dbsync = DbSync::new();
            let handle = open(&dbsync);
            let first = generate_snapshot(size);
            let second = next_snapshot(&first, 0.1);
            let first = snapshot(first);
            let second = snapshot(second);

            b.iter(|| {
                dbsync.refresh_snapshot(handle, &first, |_| {}).unwrap();
                dbsync
                    .refresh_snapshot(handle, black_box(&second), |e| {
                        black_box(e);
                    })
                    .unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark a full transaction: create, sync, report and close.
fn bench_transaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("transaction");

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dbsync = DbSync::new();
            let handle = open(&dbsync);
            let first = generate_snapshot(size);
            let second = next_snapshot(&first, 0.1);
            let first = SyncRequest {
                table: "processes".into(),
                data: first,
            };
            let second = SyncRequest {
                table: "processes".into(),
                data: second,
            };
            let tables = TransactionRequest::new(["processes"]);

            b.iter(|| {
                dbsync.sync_row_data(handle, &first, |_| {}).unwrap();
                let txn = dbsync.create_transaction(handle, &tables).unwrap();
                dbsync
                    .sync_txn_row_data(handle, txn, black_box(&second), |_| {})
                    .unwrap();
                let deleted = dbsync.get_deleted(handle, txn, |_| {}).unwrap();
                dbsync.close_transaction(handle, txn).unwrap();
                deleted
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_refresh_unchanged,
    bench_refresh_churn,
    bench_transaction
);
criterion_main!(benches);
