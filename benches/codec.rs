use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use udpft::{integrity, Frame, Segment, MAX_PAYLOAD_SIZE};

fn full_segment() -> Segment {
    let payload = Bytes::from(vec![0x5Au8; MAX_PAYLOAD_SIZE]);
    Segment::new(42, integrity::digest(&payload), "bench_payload.bin", payload).unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let segment = full_segment();
    let mut group = c.benchmark_group("segment");
    group.throughput(Throughput::Bytes(MAX_PAYLOAD_SIZE as u64));

    group.bench_function("encode", |b| b.iter(|| Frame::encode_segment(black_box(&segment))));

    let frame = Frame::encode_segment(&segment);
    group.bench_function("decode", |b| b.iter(|| Frame::from_bytes(black_box(&frame)).unwrap()));

    group.bench_function("decode_and_verify", |b| {
        b.iter(|| match Frame::from_bytes(black_box(&frame)).unwrap() {
            Frame::Segment(segment) => integrity::verify_segment(&segment).unwrap(),
            Frame::Control(_) => unreachable!(),
        })
    });

    group.finish();
}

fn bench_digest(c: &mut Criterion) {
    let payload = vec![0xA5u8; MAX_PAYLOAD_SIZE];
    let mut group = c.benchmark_group("integrity");
    group.throughput(Throughput::Bytes(MAX_PAYLOAD_SIZE as u64));
    group.bench_function("md5_digest", |b| b.iter(|| integrity::digest(black_box(&payload))));
    group.finish();
}

criterion_group!(benches, bench_encode, bench_digest);
criterion_main!(benches);
