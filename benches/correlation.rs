use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pulsesync::config::PipelineConfig;
use pulsesync::dsp::ConditioningChain;
use pulsesync::synth::{PulseWaveGenerator, SyntheticSession};
use pulsesync::{LagEstimator, PttPipeline};

const FS: f64 = 100.0;

fn pulse(seconds: f64, delay_s: f64) -> Vec<f64> {
    let mut gen = PulseWaveGenerator::new(72.0)
        .with_harmonics(0.35, 0.1)
        .with_noise(0.05, 7);
    (0..(seconds * FS) as usize)
        .map(|i| gen.sample(i as f64 / FS - delay_s))
        .collect()
}

// Full-window lag estimate at the usual 10-30 s analysis lengths
fn bench_lag_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("lag_estimate");
    let config = PipelineConfig::default();

    for seconds in [10.0, 20.0, 30.0] {
        let a = pulse(seconds, 0.0);
        let b = pulse(seconds, 0.1);
        group.throughput(Throughput::Elements(a.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}s", seconds)),
            &(a, b),
            |bench, (a, b)| {
                let mut estimator = LagEstimator::new(&config.lag, FS);
                bench.iter(|| black_box(estimator.estimate(black_box(a), black_box(b))));
            },
        );
    }

    group.finish();
}

fn bench_conditioning(c: &mut Criterion) {
    let config = PipelineConfig::default();
    let chain = ConditioningChain::new(&config.dsp, FS);
    let raw = pulse(30.0, 0.0);

    c.bench_function("condition_30s", |bench| {
        bench.iter(|| black_box(chain.process(black_box(&raw))));
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let input = SyntheticSession {
        noise_std: 0.1,
        ..Default::default()
    }
    .generate();
    let mut pipeline = PttPipeline::default();

    c.bench_function("pipeline_30s_session", |bench| {
        bench.iter(|| black_box(pipeline.process(black_box(&input))));
    });
}

criterion_group!(benches, bench_lag_estimate, bench_conditioning, bench_pipeline);
criterion_main!(benches);
