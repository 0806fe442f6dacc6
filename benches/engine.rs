//! Criterion benchmarks for the streambind engine.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use streambind::batch::run_batch;
use streambind::complexity::lz76_phrases;
use streambind::config::RunConfig;
use streambind::engine::Simulation;
use streambind::perturbation::PerturbationEvent;
use streambind::stabilizer::StabilizerConfig;
use streambind::stream::StreamParams;

fn make_config(streams: usize, seed: u64) -> RunConfig {
    RunConfig::new(vec![StreamParams::default(); streams], 200)
        .with_seed(seed)
        .with_coefficient(0.5)
        .with_stabilizer(StabilizerConfig::enabled())
        .with_perturbation(PerturbationEvent::offset_stream(100, 0, vec![5.0]))
}

/// Benchmark step() with varying stream counts.
fn bench_step_streams(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_streams");

    for streams in [1usize, 4, 16, 64].iter() {
        group.throughput(Throughput::Elements(*streams as u64));
        group.bench_with_input(BenchmarkId::new("step", streams), streams, |b, &streams| {
            b.iter_batched(
                || Simulation::new(make_config(streams, 42)).unwrap(),
                |mut sim| {
                    for _ in 0..100 {
                        sim.step();
                    }
                    black_box(sim.tick())
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Full run including classification.
fn bench_full_run(c: &mut Criterion) {
    c.bench_function("run_and_classify", |b| {
        b.iter(|| {
            let result = Simulation::new(make_config(4, 7)).unwrap().run();
            black_box(result.complexity_proxy())
        });
    });
}

/// Batch of independent runs (parallel with `--features parallel`).
fn bench_batch(c: &mut Criterion) {
    let configs: Vec<RunConfig> = (0..16).map(|s| make_config(4, s)).collect();
    c.bench_function("batch_16", |b| b.iter(|| black_box(run_batch(&configs).len())));
}

fn bench_lz76(c: &mut Criterion) {
    let mut group = c.benchmark_group("lz76");
    for n in [64usize, 256, 1024].iter() {
        let bits: Vec<u8> = (0..*n).map(|i| (i.wrapping_mul(2654435761) >> 7) as u8 & 1).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &bits, |b, bits| {
            b.iter(|| black_box(lz76_phrases(bits)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_step_streams, bench_full_run, bench_batch, bench_lz76);
criterion_main!(benches);
