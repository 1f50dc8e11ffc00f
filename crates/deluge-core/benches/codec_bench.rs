//! Criterion benchmarks for the rencode codec and frame layer.
//!
//! Run with:
//! ```bash
//! cargo bench --package deluge-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use deluge_core::codec::{deserialize, serialize};
use deluge_core::{encode_frame, FrameDecoder, Value, PROTOCOL_VERSION};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_version_reply() -> Value {
    Value::List(vec![Value::Int(1), Value::Int(2), Value::bytes("2.1.1")])
}

/// A `core.get_torrents_status` reply for `n` torrents.
fn make_status_reply(n: usize) -> Value {
    let torrents = (0..n)
        .map(|i| {
            (
                Value::bytes(format!("{i:040x}")),
                Value::Dict(vec![
                    (Value::bytes("name"), Value::bytes(format!("torrent-{i}.iso"))),
                    (Value::bytes("progress"), Value::Float(i as f64 / n as f64 * 100.0)),
                    (Value::bytes("total_size"), Value::Int(4_700_000_000 + i as i64)),
                    (Value::bytes("state"), Value::bytes("Downloading")),
                    (Value::bytes("is_finished"), Value::Bool(false)),
                ]),
            )
        })
        .collect();
    Value::List(vec![Value::Int(1), Value::Int(5), Value::Dict(torrents)])
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize");
    group.bench_function("version_reply", |b| {
        let v = make_version_reply();
        b.iter(|| serialize(black_box(&v)))
    });
    for n in [10usize, 100, 1000] {
        let v = make_status_reply(n);
        group.bench_with_input(BenchmarkId::new("status_reply", n), &v, |b, v| {
            b.iter(|| serialize(black_box(v)))
        });
    }
    group.finish();
}

fn bench_deserialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("deserialize");
    for n in [10usize, 100, 1000] {
        let bytes = serialize(&make_status_reply(n));
        group.bench_with_input(BenchmarkId::new("status_reply", n), &bytes, |b, bytes| {
            b.iter(|| deserialize(black_box(bytes), true).unwrap())
        });
    }
    group.finish();
}

fn bench_frame_roundtrip(c: &mut Criterion) {
    let payload = serialize(&make_status_reply(100));
    c.bench_function("frame_roundtrip/status_reply_100", |b| {
        b.iter(|| {
            let frame = encode_frame(PROTOCOL_VERSION, black_box(&payload)).unwrap();
            let mut decoder = FrameDecoder::new(PROTOCOL_VERSION);
            decoder.push(&frame);
            decoder.next_frame().unwrap().unwrap()
        })
    });
}

criterion_group!(benches, bench_serialize, bench_deserialize, bench_frame_roundtrip);
criterion_main!(benches);
