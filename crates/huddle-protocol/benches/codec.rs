//! Codec benchmarks for huddle-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use huddle_protocol::{codec, ChatEvent, Frame};

fn chat_frame(len: usize) -> Frame {
    Frame::event("room/bench", ChatEvent::chat("userA", "x".repeat(len)))
}

fn bench_binary(c: &mut Criterion) {
    let frame = chat_frame(64);
    let encoded = codec::encode(&frame).unwrap();

    let mut group = c.benchmark_group("binary");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("encode_64B", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.bench_function("decode_64B", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.finish();
}

fn bench_text(c: &mut Criterion) {
    let frame = chat_frame(64);
    let encoded = codec::encode_text(&frame).unwrap();

    let mut group = c.benchmark_group("text");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("encode_64B", |b| {
        b.iter(|| codec::encode_text(black_box(&frame)))
    });
    group.bench_function("decode_64B", |b| {
        b.iter(|| codec::decode_text(black_box(&encoded)))
    });
    group.finish();
}

criterion_group!(benches, bench_binary, bench_text);
criterion_main!(benches);
