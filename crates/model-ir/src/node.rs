// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Nodes, attributes and parameters of the graph IR.
//!
//! A [`Node`] refers to its operands and results by value name only. Values
//! are either parameters (constant tensors stored in the graph), outputs of
//! other nodes, or free variables the caller must supply at run time.

use crate::ModelError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tensor_core::{Shape, TensorError, TypedTensor};

/// The computation a node performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpType {
    /// `Y = alpha * A' * B' + beta * C` with optional transposes.
    Gemm,
    /// Plain 2-D matrix product.
    MatMul,
    /// Element-wise addition with unidirectional broadcasting.
    Add,
    Relu,
    LeakyRelu,
    Sigmoid,
    Tanh,
    /// Softmax over the trailing dimensions starting at `axis`.
    Softmax,
    /// Reshape to 2-D at `axis`.
    Flatten,
    Identity,
    /// An operator without a kernel; rejected at validation.
    Unsupported(String),
}

impl OpType {
    /// Parses an interchange-format operator name. Names are case-sensitive.
    pub fn from_onnx(s: &str) -> Self {
        match s {
            "Gemm" => Self::Gemm,
            "MatMul" => Self::MatMul,
            "Add" => Self::Add,
            "Relu" => Self::Relu,
            "LeakyRelu" => Self::LeakyRelu,
            "Sigmoid" => Self::Sigmoid,
            "Tanh" => Self::Tanh,
            "Softmax" => Self::Softmax,
            "Flatten" => Self::Flatten,
            "Identity" => Self::Identity,
            other => Self::Unsupported(other.to_string()),
        }
    }

    /// Returns the interchange-format operator name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Gemm => "Gemm",
            Self::MatMul => "MatMul",
            Self::Add => "Add",
            Self::Relu => "Relu",
            Self::LeakyRelu => "LeakyRelu",
            Self::Sigmoid => "Sigmoid",
            Self::Tanh => "Tanh",
            Self::Softmax => "Softmax",
            Self::Flatten => "Flatten",
            Self::Identity => "Identity",
            Self::Unsupported(name) => name,
        }
    }

    /// Returns `true` if a kernel exists for this operator.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }

    /// Returns the accepted `(min, max)` number of inputs.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Self::Gemm => (2, 3),
            Self::MatMul | Self::Add => (2, 2),
            _ => (1, 1),
        }
    }
}

impl std::fmt::Display for OpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed node attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Int(i64),
    Float(f32),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    String(String),
}

impl Attribute {
    /// Returns a short label for the attribute's type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Ints(_) => "ints",
            Self::Floats(_) => "floats",
            Self::String(_) => "string",
        }
    }
}

/// One operation in the graph.
#[derive(Debug, Clone)]
pub struct Node {
    /// Node name; generated from the op type and position when empty.
    pub name: String,
    pub op_type: OpType,
    /// Operand value names, in operator order.
    pub inputs: Vec<String>,
    /// Result value names, in operator order.
    pub outputs: Vec<String>,
    pub attributes: BTreeMap<String, Attribute>,
}

impl Node {
    /// Creates a node with no operands, results or attributes.
    pub fn new(name: impl Into<String>, op_type: OpType) -> Self {
        Self {
            name: name.into(),
            op_type,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Returns the attribute named `name`, if present.
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Reads an integer attribute, falling back to `default` when absent.
    pub fn attr_int(&self, name: &str, default: i64) -> Result<i64, ModelError> {
        match self.attr(name) {
            None => Ok(default),
            Some(Attribute::Int(v)) => Ok(*v),
            Some(other) => Err(self.wrong_kind(name, "int", other)),
        }
    }

    /// Reads a float attribute, falling back to `default` when absent.
    pub fn attr_float(&self, name: &str, default: f32) -> Result<f32, ModelError> {
        match self.attr(name) {
            None => Ok(default),
            Some(Attribute::Float(v)) => Ok(*v),
            Some(other) => Err(self.wrong_kind(name, "float", other)),
        }
    }

    fn wrong_kind(&self, name: &str, expected: &str, found: &Attribute) -> ModelError {
        ModelError::InvalidAttribute {
            node: self.name.clone(),
            name: name.to_string(),
            detail: format!("expected {expected}, found {}", found.kind()),
        }
    }

    /// Returns a one-line description of the node.
    pub fn summary(&self) -> String {
        format!(
            "{} [{}] ({}) -> ({})",
            self.name,
            self.op_type,
            self.inputs.join(", "),
            self.outputs.join(", "),
        )
    }
}

/// A constant float tensor stored in the graph (weights, biases).
///
/// Cloning shares the element data.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    shape: Shape,
    data: Arc<[f32]>,
}

impl Parameter {
    /// Creates a parameter, checking the element count against `shape`.
    pub fn new(shape: Shape, data: Vec<f32>) -> Result<Self, TensorError> {
        if data.len() != shape.num_elements() {
            return Err(TensorError::BufferSizeMismatch {
                expected: shape.num_elements(),
                actual: data.len(),
            });
        }
        Ok(Self {
            shape,
            data: data.into(),
        })
    }

    /// Creates a parameter from a copy of a tensor's elements.
    pub fn from_tensor(tensor: &TypedTensor) -> Result<Self, TensorError> {
        Self::new(tensor.shape().clone(), tensor.as_f32_slice()?.to_vec())
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns an owned tensor holding a copy of the elements.
    pub fn to_tensor(&self) -> Result<TypedTensor, TensorError> {
        TypedTensor::from_f32(self.shape.clone(), &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_type_round_trip_names() {
        for name in [
            "Gemm", "MatMul", "Add", "Relu", "LeakyRelu", "Sigmoid", "Tanh", "Softmax",
            "Flatten", "Identity",
        ] {
            let op = OpType::from_onnx(name);
            assert!(op.is_supported(), "{name}");
            assert_eq!(op.as_str(), name);
        }
    }

    #[test]
    fn test_op_type_unsupported() {
        let op = OpType::from_onnx("Conv");
        assert_eq!(op, OpType::Unsupported("Conv".into()));
        assert!(!op.is_supported());
        assert_eq!(OpType::from_onnx("relu"), OpType::Unsupported("relu".into()));
    }

    #[test]
    fn test_attr_defaults_and_kinds() {
        let mut node = Node::new("fc", OpType::Gemm);
        node.attributes.insert("transB".into(), Attribute::Int(1));
        node.attributes.insert("alpha".into(), Attribute::Ints(vec![1]));
        assert_eq!(node.attr_int("transB", 0).unwrap(), 1);
        assert_eq!(node.attr_int("transA", 0).unwrap(), 0);
        assert_eq!(node.attr_float("beta", 1.0).unwrap(), 1.0);
        let err = node.attr_float("alpha", 1.0).unwrap_err();
        assert!(matches!(err, ModelError::InvalidAttribute { ref name, .. } if name == "alpha"));
    }

    #[test]
    fn test_parameter_size_checked() {
        assert!(Parameter::new(Shape::matrix(2, 2), vec![0.0; 3]).is_err());
        let p = Parameter::new(Shape::vector(2), vec![1.0, 2.0]).unwrap();
        let t = p.to_tensor().unwrap();
        assert_eq!(t.as_f32_slice().unwrap(), &[1.0, 2.0]);
        assert_eq!(Parameter::from_tensor(&t).unwrap(), p);
    }
}
