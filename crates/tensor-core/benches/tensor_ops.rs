// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for tensor copies.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tensor_core::{DType, Shape, TypedTensor};

fn bench_copy_into(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy_into");
    for &n in &[64usize, 4096, 262_144] {
        let values: Vec<f32> = (0..n).map(|i| i as f32).collect();
        let src = TypedTensor::from_vec_f32(Shape::matrix(1, n), values).unwrap();
        let mut dst = TypedTensor::zeros(DType::F32, Shape::matrix(1, n)).unwrap();
        group.throughput(Throughput::Bytes((n * 4) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| src.copy_into(black_box(&mut dst)).unwrap())
        });
    }
    group.finish();
}

fn bench_zeros(c: &mut Criterion) {
    c.bench_function("zeros_1x3x224x224", |b| {
        b.iter(|| TypedTensor::zeros(DType::F32, black_box(Shape::nchw(1, 3, 224, 224))).unwrap())
    });
}

criterion_group!(benches, bench_copy_into, bench_zeros);
criterion_main!(benches);
