// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the steady-state run path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use runner::{Config, ModelGraph, Runner, Shape, TypedTensor, Updates};

/// `y = relu(x @ w + b)` with `x: [1, k]`, `w: [k, n]`.
fn dense_runner(k: usize, n: usize) -> Runner {
    let mut graph = ModelGraph::empty().unwrap();
    let w: Vec<f32> = (0..k * n).map(|i| ((i % 7) as f32 - 3.0) * 0.01).collect();
    graph
        .add_parameter("w", &TypedTensor::from_vec_f32(Shape::matrix(k, n), w).unwrap())
        .unwrap();
    graph
        .add_parameter("b", &TypedTensor::from_vec_f32(Shape::vector(n), vec![0.1; n]).unwrap())
        .unwrap();
    graph
        .add_node("Gemm")
        .unwrap()
        .input("x")
        .unwrap()
        .input("w")
        .unwrap()
        .input("b")
        .unwrap()
        .output("h")
        .unwrap();
    graph
        .add_node("Relu")
        .unwrap()
        .input("h")
        .unwrap()
        .output("y")
        .unwrap();
    let config = Config::default().with_input("x", &[1, k]).with_output("y");
    Runner::build_with_graph(graph, config).unwrap()
}

fn bench_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run");
    for &(k, n) in &[(64, 64), (256, 256), (1024, 512)] {
        let mut runner = dense_runner(k, n);
        let empty = Updates::new();
        group.bench_with_input(BenchmarkId::new("in_place", format!("{k}x{n}")), &(k, n), |b, _| {
            b.iter(|| runner.run(black_box(&empty)).unwrap());
        });
    }
    group.finish();
}

fn bench_run_with_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_with_tensor");
    for &k in &[64usize, 1024, 16384] {
        let mut runner = dense_runner(k, 8);
        let x = TypedTensor::from_vec_f32(Shape::matrix(1, k), vec![0.5; k]).unwrap();
        group.throughput(Throughput::Bytes((k * 4) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(k), &k, |b, _| {
            b.iter(|| runner.run_with_tensor("x", black_box(&x)).unwrap());
        });
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    c.bench_function("build_256x256", |b| {
        b.iter(|| {
            let mut runner = dense_runner(256, 256);
            black_box(runner.stop());
        });
    });
}

criterion_group!(benches, bench_run, bench_run_with_copy, bench_build);
criterion_main!(benches);
