//! Parser and metrics throughput
//!
//! The sweep itself is dominated by the benchmark processes it spawns; these
//! measure the per-run overhead added on top of them.
//!
//! Run with: cargo bench --bench pipeline

use std::fmt::Write as _;

use amdahl_sweep::metrics::{amdahl_curve, empirical_serial_fraction, log_spaced_counts, speedup};
use amdahl_sweep::parser::OutputParser;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn parallel_output(workers: u32) -> String {
    let mut out = String::new();
    // Ranks finish in reverse order, as they tend to under load
    for rank in (0..workers).rev() {
        let _ = writeln!(out, "MPI run time for rank {rank}: 0.{rank:09} seconds");
    }
    let _ = writeln!(out, "Summation from 1 to 10000000 is: 50000005000000");
    out
}

/// Benchmark line parsing for growing rank counts
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_output");
    let parser = OutputParser::new();

    for workers in [2u32, 16, 128, 1024] {
        let text = parallel_output(workers);
        group.bench_with_input(BenchmarkId::new("ranks", workers), &text, |b, text| {
            b.iter(|| parser.parse_text(black_box(text), workers));
        });
    }

    group.bench_function("serial", |b| {
        let text = "Total Sum from 1 to 10000000: 50000005000000\n\
                    Serial Run Time (seconds): 0.031250000\n";
        b.iter(|| parser.parse_text(black_box(text), 1));
    });

    group.finish();
}

/// Benchmark metric derivation and curve generation
fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");

    group.bench_function("derive_record", |b| {
        b.iter(|| {
            let s = speedup(black_box(10.0), black_box(1.7));
            let fs = empirical_serial_fraction(black_box(10.0), black_box(1.7), black_box(8));
            (s, fs)
        });
    });

    let counts = log_spaced_counts(10_000, 200);
    group.bench_with_input(
        BenchmarkId::new("amdahl_curve", counts.len()),
        &counts,
        |b, counts| {
            b.iter(|| amdahl_curve(black_box(0.05), counts));
        },
    );

    group.finish();
}

criterion_group!(benches, bench_parse, bench_metrics);
criterion_main!(benches);
