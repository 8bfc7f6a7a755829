// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model data: the graph as loaded or built, before profiling.

use crate::{BackendError, ProfileTable};
use model_ir::{Attribute, Graph, Loaded, ModelLoader, Parameter, Validated};
use std::path::Path;
use tensor_core::Shape;

/// A mutable graph owned by a model data handle.
#[derive(Debug, Clone)]
pub struct ModelData {
    graph: Graph<Loaded>,
}

impl ModelData {
    /// Creates model data with no nodes, for programmatic construction.
    pub fn empty() -> Self {
        Self {
            graph: Graph::new(""),
        }
    }

    /// Loads a model file.
    pub fn from_path(path: &Path) -> Result<Self, BackendError> {
        let graph = ModelLoader::from_path(path)?;
        Ok(Self { graph })
    }

    /// Decodes a serialised model.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BackendError> {
        let graph = ModelLoader::from_bytes(bytes)?;
        Ok(Self { graph })
    }

    pub fn graph(&self) -> &Graph<Loaded> {
        &self.graph
    }

    /// Adds a constant float tensor. The elements are copied.
    pub fn add_parameter(
        &mut self,
        name: &str,
        dims: &[usize],
        data: &[f32],
    ) -> Result<(), BackendError> {
        let param = Parameter::new(Shape::new(dims.to_vec()), data.to_vec())
            .map_err(|e| BackendError::DimensionMismatch(format!("parameter '{name}': {e}")))?;
        self.graph.add_parameter(name, param)?;
        Ok(())
    }

    pub fn add_new_node(&mut self, op_type: &str) {
        self.graph.add_node(op_type);
    }

    pub fn add_input_name_to_current_node(&mut self, name: &str) -> Result<(), BackendError> {
        Ok(self.graph.add_input_to_current(name)?)
    }

    pub fn add_output_name_to_current_node(&mut self, name: &str) -> Result<(), BackendError> {
        Ok(self.graph.add_output_to_current(name)?)
    }

    pub fn add_attribute_to_current_node(
        &mut self,
        name: &str,
        value: Attribute,
    ) -> Result<(), BackendError> {
        Ok(self.graph.add_attribute_to_current(name, value)?)
    }

    /// Returns a validated copy of the graph.
    pub fn validated(&self) -> Result<Graph<Validated>, BackendError> {
        Ok(self.graph.clone().validate()?)
    }

    /// Drops nodes and parameters that do not contribute to the outputs
    /// declared in `table`.
    pub fn optimize(&mut self, table: &ProfileTable) -> Result<(), BackendError> {
        let outputs = table.output_names();
        for name in &outputs {
            if !self.graph.has_value(name) {
                return Err(BackendError::VariableNotFound(name.clone()));
            }
        }
        let removed = self.graph.prune_to(&outputs);
        tracing::debug!("optimize removed {removed} unused nodes");
        Ok(())
    }
}
