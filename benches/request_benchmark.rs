// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use pyspeed::request::{ParseStatus, ParserLimits, Request, RequestParser};

const SIMPLE: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost:8080\r\nUser-Agent: Test\r\n\r\n";

const COMPLEX: &[u8] = b"GET /path/to/resource?id=123&name=test HTTP/1.1\r\n\
                    Host: localhost:8080\r\n\
                    User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64)\r\n\
                    Accept: text/html,application/xhtml+xml\r\n\
                    Accept-Language: en-US,en;q=0.9\r\n\
                    Accept-Encoding: gzip, deflate, br\r\n\
                    Connection: keep-alive\r\n\
                    Upgrade-Insecure-Requests: 1\r\n\
                    \r\n";

/// 逐个取出缓冲区中的完整请求，返回请求数。
fn drain(parser: &mut RequestParser, buf: &mut BytesMut) -> usize {
    let mut count = 0;
    while let Ok(ParseStatus::Complete(request)) = parser.parse(buf) {
        black_box(request);
        count += 1;
    }
    count
}

fn simple_request_parse_benchmark(c: &mut Criterion) {
    c.bench_function("simple_request_parse", |b| {
        b.iter(|| Request::try_from(black_box(SIMPLE), 0).unwrap());
    });
}

fn complex_request_parse_benchmark(c: &mut Criterion) {
    c.bench_function("complex_request_parse", |b| {
        b.iter(|| {
            let request = Request::try_from(black_box(COMPLEX), 0).unwrap();
            black_box(request.accept_encoding());
            black_box(request.query_params());
        });
    });
}

fn request_parse_methods_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_methods");

    let requests = [
        ("GET", b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n".as_slice()),
        ("HEAD", b"HEAD / HTTP/1.1\r\nHost: localhost\r\n\r\n".as_slice()),
        (
            "POST",
            b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n".as_slice(),
        ),
        ("OPTIONS", b"OPTIONS * HTTP/1.1\r\nHost: localhost\r\n\r\n".as_slice()),
    ];

    for (method, request) in requests.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(method), request, |b, request| {
            b.iter(|| Request::try_from(black_box(request), 0).unwrap());
        });
    }

    group.finish();
}

fn request_parse_body_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_body");

    for size in [64usize, 4096, 65536].iter() {
        let mut raw = format!(
            "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            size
        )
        .into_bytes();
        raw.extend(std::iter::repeat(b' ').take(*size));
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::new("content_length", size), &raw, |b, raw| {
            b.iter(|| Request::try_from(black_box(raw), 0).unwrap());
        });

        let mut chunked =
            b"POST /echo HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        for piece in vec![b' '; *size].chunks(1024) {
            chunked.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
            chunked.extend_from_slice(piece);
            chunked.extend_from_slice(b"\r\n");
        }
        chunked.extend_from_slice(b"0\r\n\r\n");
        group.bench_with_input(BenchmarkId::new("chunked", size), &chunked, |b, raw| {
            b.iter(|| Request::try_from(black_box(raw), 0).unwrap());
        });
    }

    group.finish();
}

fn pipelined_parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_pipelined");

    for count in [10usize, 100, 1000].iter() {
        let batch = COMPLEX.repeat(*count);
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &batch, |b, batch| {
            b.iter(|| {
                let mut parser = RequestParser::new(ParserLimits::default());
                let mut buf = BytesMut::from(&batch[..]);
                assert_eq!(drain(&mut parser, &mut buf), *count);
            });
        });
    }

    group.finish();
}

fn fragmented_parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_fragmented");

    // 模拟网络分片：每次只追加若干字节后继续解析
    for step in [1usize, 16, 256].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(step), step, |b, &step| {
            b.iter(|| {
                let mut parser = RequestParser::new(ParserLimits::default());
                let mut buf = BytesMut::new();
                let mut parsed = 0;
                for piece in COMPLEX.chunks(step) {
                    buf.extend_from_slice(piece);
                    parsed += drain(&mut parser, &mut buf);
                }
                assert_eq!(parsed, 1);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    simple_request_parse_benchmark,
    complex_request_parse_benchmark,
    request_parse_methods_benchmark,
    request_parse_body_benchmark,
    pipelined_parse_benchmark,
    fragmented_parse_benchmark
);
criterion_main!(benches);
