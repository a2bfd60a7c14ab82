//! Codec microbenchmarks

use std::io::Cursor;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use redis_leaf::protocol::{Payload, RespDecoder};

fn bench_encoding(c: &mut Criterion) {
    c.bench_function("encode_command", |b| {
        b.iter(|| {
            let payload = Payload::command(black_box(["SET", "some:key", "some value"]));
            black_box(payload);
        });
    });

    c.bench_function("encode_pipeline_of_ten", |b| {
        b.iter(|| {
            let payload = Payload::pipeline(
                (0..10).map(|i| Payload::command(vec!["GET".to_string(), black_box(format!("key:{i}"))])),
            );
            black_box(payload);
        });
    });
}

fn bench_decoding(c: &mut Criterion) {
    c.bench_function("decode_simple_string", |b| {
        let data = b"+OK\r\n";
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(&data[..]));
            black_box(RespDecoder::decode(&mut cursor).unwrap());
        });
    });

    c.bench_function("decode_array_of_bulk", |b| {
        let data = b"*3\r\n$3\r\nfoo\r\n$3\r\nbar\r\n$3\r\nbaz\r\n";
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(&data[..]));
            black_box(RespDecoder::decode(&mut cursor).unwrap());
        });
    });

    c.bench_function("decode_hello_map", |b| {
        let data = b"%2\r\n$5\r\nproto\r\n:3\r\n$4\r\nrole\r\n$6\r\nmaster\r\n";
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(&data[..]));
            black_box(RespDecoder::decode(&mut cursor).unwrap());
        });
    });
}

criterion_group!(benches, bench_encoding, bench_decoding);
criterion_main!(benches);
