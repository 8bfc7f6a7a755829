// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # cpu-backend
//!
//! A single-device CPU inference backend behind a handle-based C ABI.
//!
//! The lifecycle mirrors the way a host binding drives it:
//!
//! ```text
//! ModelData ──► ProfileTableBuilder ──► ProfileTable ──► ModelBuilder ──► Model
//!  (graph)       (declare inputs /       (shape           (attach          (run,
//!                 request outputs)        inference)       buffers)         query)
//! ```
//!
//! Each stage is a separately allocated handle created by a `cpurt_make_*`
//! or `cpurt_build_*` function and released by the matching
//! `cpurt_delete_*`. Every call returns an [`ErrorCode`]; the message for
//! the most recent failure in the process is read with
//! [`cpurt_get_last_error_message`](api::cpurt_get_last_error_message).
//!
//! The Rust types behind the handles are public as well, for tests and for
//! embedding without the C layer.

pub mod api;
pub mod config;
mod error;
mod infer;
mod kernels;
mod model;
mod model_data;
mod profile;

pub use api::{Dtype, DTYPE_FLOAT};
pub use config::{CpuBackendConfig, BACKEND_NAME};
pub use error::{last_error_message, BackendError, ErrorCode};
pub use model::{Model, ModelBuilder};
pub use model_data::ModelData;
pub use profile::{ProfileTable, ProfileTableBuilder, VariableProfile};
