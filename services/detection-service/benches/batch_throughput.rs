use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

use hybrid_ids::flow::{FlowFeature, FlowRecord};
use hybrid_ids::risk::explain;
use hybrid_ids::DetectionPipeline;

fn synthetic(n: u64) -> (Vec<FlowRecord>, Vec<f64>) {
    let flows = (0..n)
        .map(|i| {
            FlowRecord::new(i)
                .with(FlowFeature::FlowPacketsPerSec, (i * 37 % 2400) as f64)
                .with(FlowFeature::SynFlagCount, (i * 13 % 90) as f64)
                .with(FlowFeature::PacketLengthMean, (i * 101 % 1800) as f64)
        })
        .collect();
    let scores = (0..n).map(|i| (i % 1000) as f64 / 1000.0).collect();
    (flows, scores)
}

fn batch_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_throughput");
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(40);
    let pipe = DetectionPipeline::default();
    let names: Vec<String> = FlowFeature::ALL.iter().map(|f| f.column().to_string()).collect();
    let ranking = Arc::new(explain(&names, &[0.1; 9], 3).unwrap());
    for n in [1_000u64, 50_000] {
        let (flows, scores) = synthetic(n);
        group.bench_with_input(BenchmarkId::new("sequential", n), &n, |b, _| {
            b.iter(|| black_box(pipe.evaluate_batch(&flows, &scores, Arc::clone(&ranking)).unwrap().summary))
        });
        group.bench_with_input(BenchmarkId::new("parallel", n), &n, |b, _| {
            b.iter(|| black_box(pipe.evaluate_batch_parallel(&flows, &scores, Arc::clone(&ranking)).unwrap().summary))
        });
    }
    group.finish();
}

criterion_group!(benches, batch_throughput);
criterion_main!(benches);
