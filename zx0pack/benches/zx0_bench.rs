//! Compression benchmarks.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use zx0pack::{Zx0Compressor, Zx0Config};

fn text_corpus(len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        data.extend_from_slice(b"The quick brown fox jumps over the lazy dog. ");
    }
    data.truncate(len);
    data
}

fn binary_corpus(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 17 + 13) % 256) as u8).collect()
}

fn run_corpus(len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    let mut byte = 0u8;
    while data.len() < len {
        data.extend_from_slice(&[byte; 200]);
        byte = byte.wrapping_add(37);
    }
    data.truncate(len);
    data
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    group.sample_size(10);

    let mut compressor = Zx0Compressor::new(Zx0Config::V2);
    for (name, data) in [
        ("text_16k", text_corpus(16 * 1024)),
        ("binary_16k", binary_corpus(16 * 1024)),
        ("runs_16k", run_corpus(16 * 1024)),
        ("text_64k", text_corpus(64 * 1024)),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| compressor.compress(black_box(&data)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compress);
criterion_main!(benches);
