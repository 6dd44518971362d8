//! Box performance benchmarks
//!
//! Run with: cargo bench -p meshsim-crypto

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use meshsim_crypto::{KeyPair, open, seal};

fn bench_key_generation(c: &mut Criterion) {
    c.bench_function("keypair_generate", |b| b.iter(KeyPair::generate));
}

fn bench_seal_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("box");
    let alice = KeyPair::generate().unwrap();
    let bob = KeyPair::generate().unwrap();

    for size in [64usize, 1024, 16 * 1024] {
        let msg = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("seal", size), &msg, |b, msg| {
            b.iter(|| seal(black_box(msg), alice.secret(), &bob.public()).unwrap())
        });

        let sealed = seal(&msg, alice.secret(), &bob.public()).unwrap();
        group.bench_with_input(BenchmarkId::new("open", size), &sealed, |b, sealed| {
            b.iter(|| {
                open(
                    black_box(&sealed.ciphertext),
                    &sealed.nonce,
                    &alice.public(),
                    bob.secret(),
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_key_generation, bench_seal_open);
criterion_main!(benches);
