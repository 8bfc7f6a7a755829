// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor construction and data movement.

use crate::DType;

/// Errors that can occur when building or moving data between tensors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TensorError {
    /// The provided buffer length does not match the element count implied by the shape.
    #[error("buffer size mismatch: expected {expected} elements, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Source and destination of a copy hold a different number of elements.
    #[error("element count mismatch: destination holds {expected}, source holds {actual}")]
    ElementCountMismatch { expected: usize, actual: usize },

    /// Source and destination of a copy have different element types.
    #[error("dtype mismatch: expected {expected}, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },

    /// The requested data type is not supported for this operation.
    #[error("unsupported dtype {dtype} for operation {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// An element index past the end of the buffer.
    #[error("index {index} is out of range for {len} elements")]
    IndexOutOfRange { index: usize, len: usize },

    /// A write was attempted through a view over memory this tensor does not own.
    #[error("tensor is a read-only view over foreign memory")]
    ReadOnlyView,

    /// A foreign buffer address was null.
    #[error("foreign buffer pointer is null")]
    NullPointer,
}
