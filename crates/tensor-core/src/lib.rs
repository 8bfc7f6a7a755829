// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Typed tensors exchanged between callers and a graph runner.
//!
//! This crate provides:
//! - [`TypedTensor`]: a typed, shaped, flat element array whose storage is
//!   either owned ([`HostBuffer`]) or a read-only view over foreign memory
//!   ([`ForeignView`]).
//! - [`Shape`]: dimension descriptors.
//! - [`DType`]: element type tags; only `f32` carries data today.
//!
//! # Design Goals
//! - Storage addresses never move, so they can be attached to a backend once
//!   and written to in place afterwards.
//! - Ownership is explicit in the type ([`Ownership`]), never hidden behind
//!   a pointer.
//! - Clean error types via `thiserror`.

mod buffer;
mod dtype;
mod error;
mod shape;
mod tensor;

pub use buffer::{ForeignView, HostBuffer};
pub use dtype::DType;
pub use error::TensorError;
pub use shape::Shape;
pub use tensor::{Ownership, Storage, TensorData, TypedTensor};
