use abyss_rs::kmer::{Direction, Kmer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const K: usize = 25;

fn sample_kmer() -> Kmer {
    let seq: Vec<u8> = (0..K).map(|i| b"ACGT"[i % 4]).collect();
    Kmer::from_ascii(&seq, false).unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let kmer = sample_kmer();

    c.bench_function("kmer_shift", |b| {
        b.iter(|| black_box(kmer.clone()).shift(Direction::Sense, black_box(2)))
    });

    c.bench_function("kmer_shifted", |b| {
        b.iter(|| black_box(&kmer).shifted(Direction::Sense, black_box(2)))
    });

    c.bench_function("kmer_reverse_complement", |b| {
        b.iter(|| black_box(&kmer).reverse_complement())
    });

    c.bench_function("kmer_canonical", |b| b.iter(|| black_box(&kmer).canonical()));

    c.bench_function("kmer_hash", |b| b.iter(|| black_box(&kmer).hash()));

    c.bench_function("kmer_from_ascii", |b| {
        let seq: Vec<u8> = (0..K).map(|i| b"ACGT"[i % 4]).collect();
        b.iter(|| Kmer::from_ascii(black_box(&seq), false).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
