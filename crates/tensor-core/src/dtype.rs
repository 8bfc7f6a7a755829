// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element data type tags.

use std::fmt;

/// Enumerates the numeric element types a [`crate::TypedTensor`] may be tagged with.
///
/// Only [`DType::F32`] carries data today. The remaining tags exist so that
/// configurations and backend profiles can name them; every data-moving
/// operation on them fails with [`crate::TensorError::UnsupportedDType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 16-bit brain floating point.
    BF16,
    /// 8-bit signed integer.
    I8,
}

impl DType {
    /// Returns `true` if tensors of this type can hold data.
    pub fn has_storage(self) -> bool {
        matches!(self, DType::F32)
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::I8 => "i8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
