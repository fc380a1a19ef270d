//! Document sealing benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fleetstore_bench::{generate_fleet, generate_users};
use fleetstore_core::crypto::DocumentCipher;
use fleetstore_core::models::Document;

fn document_bytes(users: usize) -> Vec<u8> {
    let mut doc = Document::new();
    doc.users = generate_users(users);
    doc.orchestrator_hosts = generate_fleet(users / 10);
    doc.to_json_pretty().unwrap()
}

/// Benchmark key derivation from a passphrase.
fn bench_derive(c: &mut Criterion) {
    c.bench_function("derive_key", |b| {
        b.iter(|| DocumentCipher::from_passphrase(black_box("bench-passphrase")).unwrap());
    });
}

/// Benchmark sealing and opening documents of growing size.
fn bench_seal_open(c: &mut Criterion) {
    let cipher = DocumentCipher::from_passphrase("bench-passphrase").unwrap();
    let mut seal = c.benchmark_group("seal");
    for users in [10, 100, 1000] {
        let plain = document_bytes(users);
        seal.throughput(Throughput::Bytes(plain.len() as u64));
        seal.bench_with_input(BenchmarkId::from_parameter(users), &plain, |b, plain| {
            b.iter(|| cipher.seal(black_box(plain)).unwrap());
        });
    }
    seal.finish();

    let mut open = c.benchmark_group("open");
    for users in [10, 100, 1000] {
        let sealed = cipher.seal(&document_bytes(users)).unwrap();
        open.throughput(Throughput::Bytes(sealed.len() as u64));
        open.bench_with_input(BenchmarkId::from_parameter(users), &sealed, |b, sealed| {
            b.iter(|| cipher.open(black_box(sealed)).unwrap());
        });
    }
    open.finish();
}

criterion_group!(benches, bench_derive, bench_seal_open);
criterion_main!(benches);
