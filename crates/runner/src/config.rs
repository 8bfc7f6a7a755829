// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runner configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! backend = "cpu"
//! backend_config = '{"fuse_activations": false}'
//!
//! [model]
//! path = "./models/mlp.onnx"
//!
//! [[inputs]]
//! name = "input"
//! dtype = "f32"
//! dims = [1, 3]
//!
//! [[outputs]]
//! name = "fc1"
//! from_profile = true
//!
//! [[outputs]]
//! name = "fc2"
//! ```

use crate::RunnerError;
use std::path::{Path, PathBuf};
use tensor_core::DType;

/// Where the serialized graph comes from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// An ONNX file on disk.
    Path(PathBuf),
    /// ONNX bytes already in memory. Not representable in TOML.
    #[serde(skip)]
    Bytes(Vec<u8>),
}

/// The numerical backend that compiles and executes the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The single-device CPU backend.
    #[default]
    Cpu,
}

impl BackendKind {
    /// Name passed to the backend when compiling.
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Cpu => cpu_backend::BACKEND_NAME,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared input: its name, element type and dimensions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
    pub dims: Vec<usize>,
}

/// A requested output.
///
/// With `from_profile` set, the runner allocates the buffer from the
/// inferred profile and attaches it before compilation. Otherwise the
/// backend owns the buffer and the runner only views it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
    #[serde(default)]
    pub from_profile: bool,
}

fn default_dtype() -> DType {
    DType::F32
}

/// Everything needed to build a [`Runner`](crate::Runner).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// The graph to load. Left empty when a pre-built graph is handed to
    /// [`Runner::build_with_graph`](crate::Runner::build_with_graph).
    #[serde(default)]
    pub model: Option<ModelSource>,
    #[serde(default)]
    pub backend: BackendKind,
    /// Passed verbatim to the backend; empty means defaults.
    #[serde(default)]
    pub backend_config: String,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

impl Config {
    /// Starts a configuration that loads the graph from `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            model: Some(ModelSource::Path(path.into())),
            ..Default::default()
        }
    }

    /// Starts a configuration that decodes the graph from `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            model: Some(ModelSource::Bytes(bytes.into())),
            ..Default::default()
        }
    }

    /// Declares an `f32` input.
    pub fn with_input(mut self, name: impl Into<String>, dims: &[usize]) -> Self {
        self.inputs.push(InputSpec {
            name: name.into(),
            dtype: DType::F32,
            dims: dims.to_vec(),
        });
        self
    }

    /// Requests an `f32` output whose buffer the backend allocates.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(OutputSpec {
            name: name.into(),
            dtype: DType::F32,
            from_profile: false,
        });
        self
    }

    /// Requests an `f32` output whose buffer the runner allocates from the
    /// inferred profile.
    pub fn with_profile_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(OutputSpec {
            name: name.into(),
            dtype: DType::F32,
            from_profile: true,
        });
        self
    }

    pub fn with_backend_config(mut self, backend_config: impl Into<String>) -> Self {
        self.backend_config = backend_config.into();
        self
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RunnerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RunnerError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RunnerError> {
        toml::from_str(toml_str).map_err(|e| RunnerError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    ///
    /// Fails for in-memory model bytes.
    pub fn to_toml(&self) -> Result<String, RunnerError> {
        toml::to_string_pretty(self)
            .map_err(|e| RunnerError::Config(format!("TOML serialise error: {e}")))
    }
}
