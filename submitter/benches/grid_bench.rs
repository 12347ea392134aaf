//! Benchmarks for grid generation and manifest reconciliation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lhc_submitter::core::JobId;
use lhc_submitter::grid::{GridRow, ParameterSpace};
use lhc_submitter::manifest::{new_rows, JobRecord, Manifest};
use std::path::PathBuf;

fn space(per_parameter: i64) -> ParameterSpace {
    ParameterSpace::new()
        .with_parameter("SEED", 1..=per_parameter)
        .with_parameter("QX", (0..per_parameter).map(|i| 62.28 + 0.001 * i as f64))
        .with_parameter("BEAM", ["b1", "b2"])
}

fn grid_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid");
    for n in [10_i64, 50, 100] {
        let space = space(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &space, |b, space| {
            b.iter(|| black_box(space.grid()));
        });
    }
    group.finish();
}

fn new_rows_benchmark(c: &mut Criterion) {
    let space = space(30);
    let names = space.names();
    let rows: Vec<GridRow> = space.grid().unwrap_or_default();

    let workdir = PathBuf::from("study");
    let mut prior = Manifest::new(names.clone());
    for (i, row) in rows.iter().step_by(2).enumerate() {
        let record = JobRecord::new(JobId::Index(i as u64), row.to_values(&names), &workdir);
        let _ = prior.push(record);
    }

    c.bench_function("new_rows_half_known", |b| {
        b.iter(|| black_box(new_rows(&prior, &names, rows.clone())));
    });
}

criterion_group!(benches, grid_benchmark, new_rows_benchmark);
criterion_main!(benches);
