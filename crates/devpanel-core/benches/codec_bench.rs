//! Benchmarks for the serialization boundary.
//!
//! The double-encoded evaluation path runs once per outbound device message,
//! so its cost is on the hot path of chatty plugins (profilers, network
//! inspectors). Run with `cargo bench --package devpanel-core`.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use devpanel_core::protocol::codec::{decode_binding_payload, encode_eval_expression, wrap_frame};
use devpanel_core::protocol::messages::BRIDGE_DOMAIN;
use serde_json::json;

fn bench_encode_eval_expression(c: &mut Criterion) {
    let message = json!({
        "pluginId": "profiler",
        "type": "sample",
        "payload": {"frames": [1, 2, 3, 4, 5], "ms": 16.6, "label": "commit"}
    });

    c.bench_function("encode_eval_expression", |b| {
        b.iter(|| encode_eval_expression(black_box(BRIDGE_DOMAIN), black_box(&message)).unwrap())
    });
}

fn bench_decode_binding_payload(c: &mut Criterion) {
    let raw = serde_json::to_string(&json!({
        "domain": BRIDGE_DOMAIN,
        "message": {"pluginId": "profiler", "type": "sample", "payload": {"ms": 16.6}}
    }))
    .unwrap();

    c.bench_function("decode_binding_payload", |b| {
        b.iter(|| decode_binding_payload(black_box(&raw)).unwrap())
    });
}

fn bench_wrap_frame(c: &mut Criterion) {
    let message = json!({"pluginId": "net", "type": "request", "payload": {"url": "http://localhost"}});

    c.bench_function("wrap_frame", |b| b.iter(|| wrap_frame(black_box(message.clone()))));
}

criterion_group!(
    benches,
    bench_encode_eval_expression,
    bench_decode_binding_payload,
    bench_wrap_frame
);
criterion_main!(benches);
