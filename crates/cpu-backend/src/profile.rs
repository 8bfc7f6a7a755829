// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Variable profiles: declared inputs, requested outputs, inferred shapes.

use crate::infer::infer_shapes;
use crate::{BackendError, ModelData};
use std::collections::BTreeMap;
use tensor_core::DType;

/// Element type and dimensions of one variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableProfile {
    pub dtype: DType,
    pub dims: Vec<usize>,
}

/// Collects input and output declarations before shape inference.
#[derive(Debug, Clone, Default)]
pub struct ProfileTableBuilder {
    inputs: Vec<(String, VariableProfile)>,
    outputs: Vec<(String, DType)>,
}

impl ProfileTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_new_name(&self, name: &str) -> Result<(), BackendError> {
        let taken = self.inputs.iter().any(|(n, _)| n == name)
            || self.outputs.iter().any(|(n, _)| n == name);
        if taken {
            return Err(BackendError::SameNameVariableAlreadyExist(name.to_string()));
        }
        Ok(())
    }

    fn check_dtype(name: &str, dtype: DType) -> Result<(), BackendError> {
        if !dtype.has_storage() {
            return Err(BackendError::InvalidDtype(format!("{dtype} for '{name}'")));
        }
        Ok(())
    }

    /// Declares a graph input with fixed dimensions.
    pub fn add_input_profile(
        &mut self,
        name: &str,
        dtype: DType,
        dims: &[usize],
    ) -> Result<(), BackendError> {
        self.check_new_name(name)?;
        Self::check_dtype(name, dtype)?;
        if dims.iter().any(|&d| d == 0) {
            return Err(BackendError::DimensionMismatch(format!(
                "input '{name}' has a zero dimension: {dims:?}"
            )));
        }
        self.inputs.push((
            name.to_string(),
            VariableProfile {
                dtype,
                dims: dims.to_vec(),
            },
        ));
        Ok(())
    }

    /// Requests an output whose dimensions will be inferred.
    pub fn add_output_profile(&mut self, name: &str, dtype: DType) -> Result<(), BackendError> {
        self.check_new_name(name)?;
        Self::check_dtype(name, dtype)?;
        self.outputs.push((name.to_string(), dtype));
        Ok(())
    }

    /// Runs shape inference on `model` and returns the resulting table.
    pub fn build(&self, model: &ModelData) -> Result<ProfileTable, BackendError> {
        let graph = model.validated()?;
        let declared: Vec<(String, Vec<usize>)> = self
            .inputs
            .iter()
            .map(|(n, p)| (n.clone(), p.dims.clone()))
            .collect();
        let shapes = infer_shapes(&graph, &declared)?;

        let mut profiles: BTreeMap<String, VariableProfile> = self.inputs.iter().cloned().collect();
        for (name, dtype) in &self.outputs {
            let dims = shapes
                .get(name)
                .ok_or_else(|| BackendError::VariableNotFound(format!("output '{name}'")))?;
            profiles.insert(
                name.clone(),
                VariableProfile {
                    dtype: *dtype,
                    dims: dims.clone(),
                },
            );
        }

        tracing::debug!(
            "built profile table: {} inputs, {} outputs",
            self.inputs.len(),
            self.outputs.len()
        );

        Ok(ProfileTable {
            profiles,
            inputs: self.inputs.iter().map(|(n, _)| n.clone()).collect(),
            outputs: self.outputs.iter().map(|(n, _)| n.clone()).collect(),
        })
    }
}

/// Profiles of every declared input and output after shape inference.
#[derive(Debug, Clone)]
pub struct ProfileTable {
    profiles: BTreeMap<String, VariableProfile>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl ProfileTable {
    /// Returns the profile of a declared variable.
    pub fn get(&self, name: &str) -> Result<&VariableProfile, BackendError> {
        self.profiles
            .get(name)
            .ok_or_else(|| BackendError::VariableNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Declared inputs with their dimensions, in declaration order.
    pub fn input_profiles(&self) -> Vec<(String, Vec<usize>)> {
        self.inputs
            .iter()
            .filter_map(|n| self.profiles.get(n).map(|p| (n.clone(), p.dims.clone())))
            .collect()
    }

    pub fn input_names(&self) -> &[String] {
        &self.inputs
    }

    /// Requested outputs, in declaration order.
    pub fn output_names(&self) -> Vec<String> {
        self.outputs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::Attribute;

    fn relu_model() -> ModelData {
        let mut md = ModelData::empty();
        md.add_new_node("Relu");
        md.add_input_name_to_current_node("x").unwrap();
        md.add_output_name_to_current_node("y").unwrap();
        md
    }

    #[test]
    fn test_build_infers_output() {
        let mut b = ProfileTableBuilder::new();
        b.add_input_profile("x", DType::F32, &[1, 8]).unwrap();
        b.add_output_profile("y", DType::F32).unwrap();
        let table = b.build(&relu_model()).unwrap();
        assert_eq!(table.get("y").unwrap().dims, vec![1, 8]);
        assert_eq!(table.get("x").unwrap().dims, vec![1, 8]);
        assert_eq!(table.output_names(), vec!["y".to_string()]);
        assert!(table.get("z").is_err());
    }

    #[test]
    fn test_same_name_rejected() {
        let mut b = ProfileTableBuilder::new();
        b.add_input_profile("x", DType::F32, &[1, 8]).unwrap();
        let err = b.add_output_profile("x", DType::F32).unwrap_err();
        assert!(matches!(err, BackendError::SameNameVariableAlreadyExist(_)));
        let err = b.add_input_profile("x", DType::F32, &[1, 8]).unwrap_err();
        assert!(matches!(err, BackendError::SameNameVariableAlreadyExist(_)));
    }

    #[test]
    fn test_dtype_without_storage_rejected() {
        let mut b = ProfileTableBuilder::new();
        let err = b.add_input_profile("x", DType::F16, &[1, 8]).unwrap_err();
        assert!(matches!(err, BackendError::InvalidDtype(_)));
    }

    #[test]
    fn test_unknown_output() {
        let mut b = ProfileTableBuilder::new();
        b.add_input_profile("x", DType::F32, &[1, 8]).unwrap();
        b.add_output_profile("nope", DType::F32).unwrap();
        let err = b.build(&relu_model()).unwrap_err();
        assert!(matches!(err, BackendError::VariableNotFound(_)));
    }

    #[test]
    fn test_invalid_attribute_type_surfaces() {
        let mut md = ModelData::empty();
        md.add_new_node("Softmax");
        md.add_input_name_to_current_node("x").unwrap();
        md.add_output_name_to_current_node("y").unwrap();
        md.add_attribute_to_current_node("axis", Attribute::Float(1.0))
            .unwrap();
        let mut b = ProfileTableBuilder::new();
        b.add_input_profile("x", DType::F32, &[1, 8]).unwrap();
        let err = b.build(&md).unwrap_err();
        assert!(matches!(err, BackendError::InvalidAttributeType(_)));
    }
}
