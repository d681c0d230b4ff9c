//! Micro benchmarks for the protocol codec and the password mechanisms
//!
//! Run with: cargo bench --bench codec_benchmarks

use bytes::{BufMut, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pg_probe::auth::{md5, ScramClient};
use pg_probe::protocol::{decode_message, encode_message, FrontendMessage};
use pg_probe::Row;

fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Backend traffic for one successful `SELECT version();`
fn version_reply() -> Vec<u8> {
    let version = b"PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by gcc (GCC) 12.2.0, 64-bit";

    let mut row_desc = BytesMut::new();
    row_desc.put_i16(1);
    row_desc.put_slice(b"version\0");
    row_desc.put_i32(0);
    row_desc.put_i16(0);
    row_desc.put_i32(25);
    row_desc.put_i16(-1);
    row_desc.put_i32(-1);
    row_desc.put_i16(0);

    let mut data_row = BytesMut::new();
    data_row.put_i16(1);
    data_row.put_i32(version.len() as i32);
    data_row.put_slice(version);

    let mut out = frame(b'T', &row_desc);
    out.extend(frame(b'D', &data_row));
    out.extend(frame(b'C', b"SELECT 1\0"));
    out.extend(frame(b'Z', b"I"));
    out
}

fn decode_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let reply = version_reply();
    group.throughput(Throughput::Bytes(reply.len() as u64));

    group.bench_function("version_reply", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(&reply[..]);
            let mut count = 0;
            while let Ok(Some(msg)) = decode_message(&mut buf) {
                black_box(msg);
                count += 1;
            }
            assert_eq!(count, 4);
        })
    });

    group.bench_function("partial_frame", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(&reply[..reply.len() / 2]);
            while let Ok(Some(msg)) = decode_message(&mut buf) {
                black_box(msg);
            }
        })
    });

    group.finish();
}

fn encode_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let startup = FrontendMessage::Startup {
        version: pg_probe::protocol::constants::PROTOCOL_VERSION,
        params: vec![
            ("user".into(), "postgres".into()),
            ("database".into(), "church_ssl".into()),
            ("client_encoding".into(), "UTF8".into()),
            ("application_name".into(), "pg-probe".into()),
        ],
    };
    group.bench_function("startup", |b| {
        b.iter(|| black_box(encode_message(black_box(&startup))))
    });

    let query = FrontendMessage::Query("SELECT version();".into());
    group.bench_function("query", |b| {
        b.iter(|| black_box(encode_message(black_box(&query))))
    });

    group.finish();
}

fn auth_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("auth");

    group.bench_function("md5_password_message", |b| {
        b.iter(|| black_box(md5::password_message("postgres", "password", [1, 2, 3, 4])))
    });

    // Dominated by PBKDF2 at the server-chosen iteration count
    group.sample_size(10);
    group.bench_function("scram_client_final_4096", |b| {
        b.iter(|| {
            let mut client = ScramClient::new("postgres", "password");
            let first = client.client_first();
            let nonce = first.rsplit_once(",r=").map(|(_, n)| n).unwrap_or_default();
            let server_first = format!("r={}server,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096", nonce);
            black_box(client.client_final(&server_first))
        })
    });

    group.finish();
}

fn row_benchmarks(c: &mut Criterion) {
    let row = Row::new(
        vec!["version".into(), "note".into()],
        vec![
            Some(
                "PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by gcc (GCC) 12.2.0, 64-bit"
                    .into(),
            ),
            None,
        ],
    );
    c.bench_function("row_display", |b| b.iter(|| black_box(row.to_string())));
}

criterion_group!(
    benches,
    decode_benchmarks,
    encode_benchmarks,
    auth_benchmarks,
    row_benchmarks
);
criterion_main!(benches);
