// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for building and running a compiled model.

use cpu_backend::ErrorCode;
use tensor_core::{DType, TensorError};

/// A failed backend call: its status code and the last error message
/// snapshotted right after the call returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct BackendStatus {
    pub code: ErrorCode,
    pub message: String,
}

impl BackendStatus {
    /// Creates a status for a failure detected on this side of the boundary,
    /// before any backend call was made.
    pub(crate) fn local(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors that can occur while building or driving a [`Runner`](crate::Runner).
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The model could not be loaded: bad path, unreadable or malformed
    /// bytes, unsupported operator set.
    #[error("graph load failed: {0}")]
    GraphLoad(#[source] BackendStatus),

    /// A call of the programmatic graph builder was rejected.
    #[error("graph construction failed: {0}")]
    GraphBuild(#[source] BackendStatus),

    /// Duplicate or structurally invalid input/output declaration.
    #[error("invalid declaration of '{name}': {detail}")]
    VariableDeclaration { name: String, detail: String },

    /// Inputs can only be declared with 2 or 4 dimensions.
    #[error("input '{name}' has rank {rank}; only rank 2 and rank 4 are supported")]
    UnsupportedRank { name: String, rank: usize },

    /// Declared shapes are incompatible with what the graph requires.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(#[source] BackendStatus),

    /// A declared name is absent from the graph.
    #[error("variable not found: {0}")]
    VariableNotFound(#[source] BackendStatus),

    /// Shape inference failed for a reason other than a dimension mismatch
    /// or an unknown name.
    #[error("shape inference failed: {0}")]
    ShapeInference(#[source] BackendStatus),

    /// A buffer could not be attached to the named variable.
    #[error("cannot attach buffer to '{name}': {status}")]
    BufferAttach {
        name: String,
        #[source]
        status: BackendStatus,
    },

    /// The backend rejected the final compilation step.
    #[error("backend compilation failed: {0}")]
    BackendCompilation(#[source] BackendStatus),

    /// The backend reported a failure while executing the compiled graph.
    #[error("execution failed: {0}")]
    Execution(#[source] BackendStatus),

    /// `name` is not one of the runner's inputs.
    #[error("'{0}' is not attached")]
    NotAttached(String),

    /// `name` was never declared as an output.
    #[error("'{0}' is not registered as an output")]
    VariableNotRegistered(String),

    /// The update tensor has a different element type than the attached one.
    #[error("dtype mismatch for '{name}': attached {expected}, got {actual}")]
    DtypeMismatch {
        name: String,
        expected: DType,
        actual: DType,
    },

    /// The update tensor has a different element count than the attached one.
    #[error("shape mismatch for '{name}': attached {expected} elements, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// The data type has no storage support yet.
    #[error("unsupported dtype {dtype} in {context}")]
    UnsupportedDtype { context: String, dtype: DType },

    /// Any other tensor failure.
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),

    /// A native handle needed by this step has already been released.
    #[error("{0} handle has been released")]
    Released(crate::Stage),

    /// The runner has been stopped.
    #[error("runner has been stopped")]
    Stopped,

    /// The configuration file is unreadable or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RunnerError {
    /// Maps a failed copy of `name` onto the taxonomy.
    pub(crate) fn from_copy(name: &str, err: TensorError) -> Self {
        match err {
            TensorError::DTypeMismatch { expected, actual } => Self::DtypeMismatch {
                name: name.to_string(),
                expected,
                actual,
            },
            TensorError::ElementCountMismatch { expected, actual } => Self::ShapeMismatch {
                name: name.to_string(),
                expected,
                actual,
            },
            TensorError::UnsupportedDType { op, dtype } => Self::UnsupportedDtype {
                context: format!("{op} of '{name}'"),
                dtype,
            },
            other => Self::Tensor(other),
        }
    }

    /// Returns the backend status behind this error, if a backend call
    /// produced it.
    pub fn backend_status(&self) -> Option<&BackendStatus> {
        match self {
            Self::GraphLoad(s)
            | Self::GraphBuild(s)
            | Self::DimensionMismatch(s)
            | Self::VariableNotFound(s)
            | Self::ShapeInference(s)
            | Self::BackendCompilation(s)
            | Self::Execution(s) => Some(s),
            Self::BufferAttach { status, .. } => Some(status),
            _ => None,
        }
    }
}

/// Bare statuses come from the programmatic graph builder, so `?` on a
/// [`NodeBuilder`](crate::NodeBuilder) chain yields [`RunnerError::GraphBuild`].
impl From<BackendStatus> for RunnerError {
    fn from(status: BackendStatus) -> Self {
        Self::GraphBuild(status)
    }
}
