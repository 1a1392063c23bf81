#![recursion_limit = "256"]

use burn::prelude::*;
use burn_seaformer::{
    InferenceBackend,
    model::seaformer::{InterpolationMethod, resize_bilinear, resize_linear},
};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

criterion_group! {
    name = interpolation_benchmarks;
    config = Criterion::default().sample_size(100);
    targets = bilinear_benchmark, axial_embedding_benchmark,
}
criterion_main!(interpolation_benchmarks);

fn bilinear_benchmark(c: &mut Criterion) {
    let device = <InferenceBackend as Backend>::Device::default();
    let bench_device = device.clone();

    struct ResizeCase {
        name: &'static str,
        channels: usize,
        batch: usize,
        in_size: [usize; 2],
        out_size: [usize; 2],
    }

    // Resizes performed by the light head and the SCT head on a 512 px input.
    let cases = [
        ResizeCase {
            name: "c160_b1_32x32_to_64x64",
            channels: 160,
            batch: 1,
            in_size: [32, 32],
            out_size: [64, 64],
        },
        ResizeCase {
            name: "c192_b1_8x8_to_64x64",
            channels: 192,
            batch: 1,
            in_size: [8, 8],
            out_size: [64, 64],
        },
        ResizeCase {
            name: "c2_b1_64x64_to_512x512",
            channels: 2,
            batch: 1,
            in_size: [64, 64],
            out_size: [512, 512],
        },
        ResizeCase {
            name: "c256_b1_16x16_to_512x512",
            channels: 256,
            batch: 1,
            in_size: [16, 16],
            out_size: [512, 512],
        },
    ];

    let mut group = c.benchmark_group("burn_seaformer_interpolation");
    for case in cases {
        let input: Tensor<InferenceBackend, 4> = Tensor::zeros(
            [case.batch, case.channels, case.in_size[0], case.in_size[1]],
            &device,
        );
        let throughput =
            (case.batch * case.channels * case.out_size[0] * case.out_size[1]) as u64;
        group.throughput(Throughput::Elements(throughput));

        for (label, method) in [
            ("custom", InterpolationMethod::Custom),
            ("burn", InterpolationMethod::Burn),
        ] {
            group.bench_function(format!("{}::{label}", case.name), |b| {
                b.iter(|| {
                    let output = resize_bilinear(input.clone(), case.out_size, method);
                    InferenceBackend::sync(&bench_device);
                    black_box(output);
                });
            });
        }
    }
    group.finish();
}

fn axial_embedding_benchmark(c: &mut Criterion) {
    let device = <InferenceBackend as Backend>::Device::default();
    let bench_device = device.clone();
    let table = Tensor::<InferenceBackend, 3>::zeros([1, 128, 16], &device);

    let mut group = c.benchmark_group("burn_seaformer_axial_embedding");
    for length in [8, 32, 64] {
        group.bench_function(format!("c128_16_to_{length}"), |b| {
            b.iter(|| {
                let output = resize_linear(table.clone(), length);
                InferenceBackend::sync(&bench_device);
                black_box(output);
            });
        });
    }
    group.finish();
}
