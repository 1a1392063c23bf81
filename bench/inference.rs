#![recursion_limit = "256"]

use burn::prelude::*;
use burn_seaformer::{
    InferenceBackend,
    model::{
        sct::{SctSea, SctSeaConfig},
        seaformer::{ForwardMode, SeaFormer, SeaFormerConfig},
    },
};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

criterion_group! {
    name = seaformer_benchmarks;
    config = Criterion::default().sample_size(10);
    targets = inference_benchmark,
}
criterion_main!(seaformer_benchmarks);

fn inference_benchmark(c: &mut Criterion) {
    let device = <InferenceBackend as Backend>::Device::default();
    let bench_device = device.clone();

    let seaformer = SeaFormer::<InferenceBackend>::new(&device, SeaFormerConfig::base())
        .expect("base SeaFormer configuration is valid");
    let sct_sea = SctSea::<InferenceBackend>::new(&device, SctSeaConfig::default())
        .expect("default SctSea configuration is valid");
    let input = Tensor::<InferenceBackend, 4>::zeros([1, 3, 512, 512], &device);

    let mut group = c.benchmark_group("burn_seaformer_inference");
    group.throughput(Throughput::Elements(1));
    group.bench_function("seaformer_backbone", |b| {
        b.iter(|| {
            let output = seaformer.forward(input.clone(), ForwardMode::Inference);
            InferenceBackend::sync(&bench_device);
            black_box(output);
        });
    });
    group.bench_function("seaformer_segment", |b| {
        b.iter(|| {
            let output = seaformer.segment(input.clone(), ForwardMode::Inference);
            InferenceBackend::sync(&bench_device);
            black_box(output);
        });
    });
    group.bench_function("sct_sea", |b| {
        b.iter(|| {
            let output = sct_sea.forward(input.clone(), ForwardMode::Inference);
            InferenceBackend::sync(&bench_device);
            black_box(output);
        });
    });
    group.finish();
}
