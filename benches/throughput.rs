//! Throughput benchmarks for the keyspace and the RESP codec.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use emberkv::protocol::{encoder, RespDecoder, RespValue};
use emberkv::storage::{Keyspace, List, Str};

fn bench_keyspace_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyspace_write");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut ks = Keyspace::new();
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i);
            *ks.find_or_create::<Str>(key.as_bytes()).unwrap() = Bytes::from_static(b"small");
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut ks = Keyspace::new();
        let value = Bytes::from("x".repeat(1024));
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i);
            *ks.find_or_create::<Str>(key.as_bytes()).unwrap() = value.clone();
            i += 1;
        });
    });

    group.bench_function("rpush", |b| {
        let mut ks = Keyspace::new();
        b.iter(|| {
            ks.find_or_create::<List>(b"list")
                .unwrap()
                .push_back(Bytes::from_static(b"element"));
        });
    });

    group.finish();
}

fn bench_keyspace_reads(c: &mut Criterion) {
    let mut ks = Keyspace::new();
    for i in 0..100_000u64 {
        let key = format!("key:{}", i);
        *ks.find_or_create::<Str>(key.as_bytes()).unwrap() =
            Bytes::from(format!("value:{}", i));
    }

    let mut group = c.benchmark_group("keyspace_read");
    group.throughput(Throughput::Elements(1));

    group.bench_function("find_hit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(ks.find::<Str>(key.as_bytes()).ok());
            i += 1;
        });
    });

    group.bench_function("find_miss", |b| {
        b.iter(|| {
            black_box(ks.find::<Str>(b"missing").err());
        });
    });

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let request = RespValue::array(vec![
        RespValue::bulk_string("SET"),
        RespValue::bulk_string("user:1000:profile"),
        RespValue::bulk_string("x".repeat(128)),
    ]);
    let encoded = encoder::serialize(&request);

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    group.bench_function("encode_set_command", |b| {
        let mut buf = BytesMut::with_capacity(512);
        b.iter(|| {
            buf.clear();
            encoder::serialize_into(black_box(&request), &mut buf);
        });
    });

    group.bench_function("decode_set_command", |b| {
        let mut decoder = RespDecoder::new();
        b.iter(|| {
            let result = decoder.feed(black_box(&encoded));
            black_box(&result);
            decoder.reset();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_keyspace_writes,
    bench_keyspace_reads,
    bench_codec
);
criterion_main!(benches);
