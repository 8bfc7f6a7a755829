// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! Intermediate representation of inference graphs.
//!
//! This crate provides:
//! - [`ModelLoader`]: decodes ONNX-format models from a file path
//!   (memory-mapped) or from bytes.
//! - [`Graph`]: nodes and parameters, built incrementally or decoded, with a
//!   type-state transition from [`Loaded`] to [`Validated`].
//! - [`tensor_from_bytes`]: decodes standalone tensor messages used as test
//!   fixtures.
//!
//! # Example
//! ```
//! use model_ir::{Graph, Parameter};
//! use tensor_core::Shape;
//!
//! let mut g = Graph::new("relu");
//! g.add_node("Relu");
//! g.add_input_to_current("x").unwrap();
//! g.add_output_to_current("y").unwrap();
//! let g = g.validate().unwrap();
//! assert_eq!(g.free_variables(), vec!["x".to_string()]);
//! # let _ = Parameter::new(Shape::vector(1), vec![0.0]);
//! ```

pub mod error;
pub mod graph;
pub mod loader;
pub mod node;
pub mod proto;

pub use error::ModelError;
pub use graph::{Graph, GraphState, Loaded, Validated};
pub use loader::{tensor_from_bytes, tensor_from_proto, tensor_to_bytes, ModelLoader, MAX_OPSET_VERSION};
pub use node::{Attribute, Node, OpType, Parameter};
