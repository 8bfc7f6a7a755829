// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: build a two-layer perceptron node by node and run it.
//!
//! Shows both ways of feeding inputs: copying a tensor in with
//! `run_with_tensor`, and writing the attached input in place before
//! `run(&Updates::new())`.
//!
//! ```bash
//! RUST_LOG=debug cargo run -p runner --example mlp
//! ```

use anyhow::Context;
use runner::{Config, ModelGraph, Runner, Shape, TypedTensor, Updates};
use tracing_subscriber::EnvFilter;

fn build_graph() -> anyhow::Result<ModelGraph> {
    let mut graph = ModelGraph::empty()?;

    #[rustfmt::skip]
    let w1 = [
        0.0, 0.0, 0.0, 0.0,
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
    ];
    #[rustfmt::skip]
    let w2 = [
        -1.0, -1.0, 2.0, 10.0, 2.0,
        -1.0, -1.0, 6.0, 40.0, 82.0,
        0.0, 0.0, 1.0, 6.0, 11.0,
        0.0, 0.0, 0.0, 0.0, 0.0,
    ];
    graph.add_parameter("w1", &TypedTensor::from_f32(Shape::matrix(3, 4), &w1)?)?;
    graph.add_parameter("b1", &TypedTensor::from_f32(Shape::vector(4), &[0.0, 0.0, 1.0, 0.0])?)?;
    graph.add_parameter("w2", &TypedTensor::from_f32(Shape::matrix(4, 5), &w2)?)?;
    graph.add_parameter("b2", &TypedTensor::zeros(runner::DType::F32, Shape::vector(5))?)?;

    graph
        .add_node("Gemm")?
        .input("input")?
        .input("w1")?
        .input("b1")?
        .output("fc1_gemm")?;
    graph.add_node("Relu")?.input("fc1_gemm")?.output("fc1")?;
    graph
        .add_node("Gemm")?
        .input("fc1")?
        .input("w2")?
        .input("b2")?
        .output("fc2_gemm")?;
    graph.add_node("Relu")?.input("fc2_gemm")?.output("fc2")?;
    Ok(graph)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::default()
        .with_input("input", &[1, 3])
        .with_profile_output("fc1")
        .with_output("fc2");
    let mut runner =
        Runner::build_with_graph(build_graph()?, config).context("building the runner")?;

    let input = TypedTensor::from_f32(Shape::matrix(1, 3), &[0.0, 1.0, 2.0])?;
    runner.run_with_tensor("input", &input)?;
    for (name, tensor) in runner.outputs() {
        println!("{name} {}: {:?}", tensor.shape(), tensor.as_f32_slice()?);
    }

    {
        let mut attached = runner.get_input_mut("input")?;
        attached.write_f32(1, 0.5)?;
        attached.write_f32(2, 1.0)?;
    }
    runner.run(&Updates::new())?;
    println!("fc2 after in-place update: {:?}", runner.get_output("fc2")?.as_f32_slice()?);

    let released = runner.stop();
    println!("released: {}", released.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" -> "));
    Ok(())
}
