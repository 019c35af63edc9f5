//! Performance benchmarks for mining operations

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use fcm_miner::{crypto::KeccakHasher, Address, MinerMessage, Nonce, Preimage};

const MINER: &str = "GAAACAQDAQCQMBYIBEFAWDANBYHRAEISCMKBKFQXDAMRUGY4DUPB7JZX";

fn preimage() -> Preimage {
    let miner: Address = MINER.parse().unwrap();
    let message = MinerMessage::new("hello").unwrap();
    Preimage::new(5, &message, &[0u8; 32], Nonce::new(0), &miner)
}

fn bench_hash_computation(c: &mut Criterion) {
    let preimage = preimage();
    let mut hasher = KeccakHasher::new();

    c.bench_function("keccak256_preimage", |b| {
        b.iter(|| {
            black_box(hasher.hash(black_box(preimage.bytes())));
        });
    });
}

fn bench_nonce_operations(c: &mut Criterion) {
    let mut preimage = preimage();
    let nonce = Nonce::new(12345678);

    c.bench_function("set_nonce", |b| {
        b.iter(|| {
            preimage.set_nonce(black_box(nonce));
        });
    });
}

fn bench_trial(c: &mut Criterion) {
    let mut preimage = preimage();
    let mut hasher = KeccakHasher::new();
    let mut nonce = Nonce::new(0);

    c.bench_function("mining_trial", |b| {
        b.iter(|| {
            preimage.set_nonce(nonce);
            let result = hasher.hash_and_check(preimage.bytes(), 8);
            nonce = nonce.next().unwrap_or_default();
            black_box(result)
        });
    });
}

criterion_group!(
    benches,
    bench_hash_computation,
    bench_nonce_operations,
    bench_trial
);
criterion_main!(benches);
