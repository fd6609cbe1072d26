//! Benchmarks for model response parsing.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use recapflow::core::normalize_summary;
use recapflow::invoker::parse_model_output;
use recapflow::testing::{legacy_model_output, valid_model_output};

fn parse_benchmark(c: &mut Criterion) {
    let current = valid_model_output();
    let legacy = legacy_model_output();

    c.bench_function("parse_v2_output", |b| {
        b.iter(|| parse_model_output(black_box(&current), "bench", 1))
    });

    c.bench_function("parse_fenced_legacy_output", |b| {
        b.iter(|| parse_model_output(black_box(&legacy), "bench", 1))
    });

    let summary: serde_json::Value = serde_json::from_str(&current)
        .map(|v: serde_json::Value| v["summary"].clone())
        .unwrap_or_default();
    c.bench_function("normalize_summary", |b| {
        b.iter(|| normalize_summary(black_box(summary.clone())))
    });
}

criterion_group!(benches, parse_benchmark);
criterion_main!(benches);
