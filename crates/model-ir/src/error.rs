// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model loading and IR construction.

/// Errors that can occur when working with model representations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The model file could not be read.
    #[error("failed to read model: {0}")]
    Io(#[from] std::io::Error),

    /// The path is empty or does not name a readable file.
    #[error("invalid filename '{path}': {detail}")]
    InvalidFilename { path: String, detail: String },

    /// No bytes were supplied where a serialised model was expected.
    #[error("model bytes are empty")]
    EmptyModel,

    /// The bytes are not a valid interchange-format model.
    #[error("failed to parse model: {0}")]
    Parse(#[from] prost::DecodeError),

    /// The model was exported with an operator set newer than supported.
    #[error("unsupported opset version {version} (max {max})")]
    UnsupportedOpset { version: i64, max: i64 },

    /// A node uses an operator no backend kernel exists for.
    #[error("unsupported operator '{op}'")]
    UnsupportedOperator { op: String },

    /// An attribute is missing, malformed or of the wrong type.
    #[error("invalid attribute '{name}' on node '{node}': {detail}")]
    InvalidAttribute {
        node: String,
        name: String,
        detail: String,
    },

    /// An initializer or standalone tensor could not be decoded.
    #[error("invalid tensor '{name}': {detail}")]
    InvalidTensor { name: String, detail: String },

    /// A tensor uses an element type without storage support.
    #[error("unsupported tensor data type {data_type} for '{name}'")]
    UnsupportedDtype { name: String, data_type: i32 },

    /// Tensor data did not fit its declared shape.
    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),

    /// The model graph contains a cycle or is otherwise malformed.
    #[error("invalid model graph: {0}")]
    InvalidGraph(String),

    /// A parameter or value with this name already exists.
    #[error("name already exists: {0}")]
    DuplicateName(String),

    /// A node-scoped call was made before any node was added.
    #[error("no current node: add a node first")]
    NoCurrentNode,
}
