// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runner
//!
//! Loads an ONNX graph, declares its inputs and outputs, compiles it on a
//! backend and runs it repeatedly over buffers bound once at build time.
//!
//! The runner takes:
//! - A [`Config`] naming the model, the backend and every input/output.
//! - Optionally a [`ModelGraph`] built node by node instead of a model file.
//!
//! And drives five native handles (graph, profile table builder, profile
//! table, model builder, compiled model) through a fixed sequence. Inputs
//! and from-profile outputs live in runner-owned buffers attached before
//! compilation; ordinary outputs are read-only views over backend memory.
//!
//! # Type-State Pipeline
//! ```text
//! Build<Empty> → Build<GraphLoaded> → Build<ProfileDeclared>
//!   → Build<ProfileBuilt> → Build<BuffersAttached> → Build<Compiled> → Runner
//! ```
//! [`Runner::build`] runs the whole sequence; [`Build`] exposes each step.
//!
//! # Threads
//! Everything is synchronous. A [`Runner`] may move between threads but is
//! not `Sync`. The backend's last error message is process-wide, so error
//! text from runners failing concurrently on different threads may be
//! attributed to the wrong call.

mod chain;
mod config;
mod error;
mod handle;
mod runner;

pub use chain::{HandleChain, Stage};
pub use config::{BackendKind, Config, InputSpec, ModelSource, OutputSpec};
pub use error::{BackendStatus, RunnerError};
pub use handle::{
    CompiledModel, ModelBuilder, ModelGraph, NodeBuilder, ProfileTable, ProfileTableBuilder,
    VariableInfo,
};
pub use runner::{
    AttachedInput, Build, BuildState, BuffersAttached, Compiled, Empty, GraphLoaded,
    ProfileBuilt, ProfileDeclared, Runner, Updates,
};

pub use cpu_backend::ErrorCode;
pub use tensor_core::{DType, Ownership, Shape, TensorError, TypedTensor};
