// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shape inference over a validated graph.

use crate::kernels::GemmParams;
use crate::BackendError;
use model_ir::{Graph, Node, OpType, Validated};
use std::collections::HashMap;
use tensor_core::Shape;

/// Inferred dimensions of every value in the graph.
pub(crate) type ShapeMap = HashMap<String, Vec<usize>>;

/// Propagates the declared input dimensions through the graph.
///
/// Every free variable of the graph must be declared, and every declared
/// input must be a free variable.
pub(crate) fn infer_shapes(
    graph: &Graph<Validated>,
    inputs: &[(String, Vec<usize>)],
) -> Result<ShapeMap, BackendError> {
    let free = graph.free_variables();
    for value in &free {
        if !inputs.iter().any(|(name, _)| name == value) {
            return Err(BackendError::VariableNotFound(format!(
                "graph input '{value}' has no declared profile"
            )));
        }
    }
    for (name, _) in inputs {
        if !free.contains(name) {
            return Err(BackendError::VariableNotFound(format!(
                "declared input '{name}' is not an input of the graph"
            )));
        }
    }

    let mut shapes: ShapeMap = graph
        .parameters()
        .iter()
        .map(|(name, p)| (name.clone(), p.shape().dims().to_vec()))
        .collect();
    for (name, dims) in inputs {
        shapes.insert(name.clone(), dims.clone());
    }

    for node in graph.nodes() {
        let out = {
            let operands = operand_dims(node, &shapes)?;
            infer_node(node, &operands)?
        };
        tracing::trace!("inferred {} '{}' -> {:?}", node.op_type, node.outputs[0], out);
        shapes.insert(node.outputs[0].clone(), out);
    }
    Ok(shapes)
}

/// Looks up the dims of every non-empty operand of `node`.
pub(crate) fn operand_dims<'a>(
    node: &Node,
    shapes: &'a ShapeMap,
) -> Result<Vec<&'a [usize]>, BackendError> {
    node.inputs
        .iter()
        .filter(|i| !i.is_empty())
        .map(|i| {
            shapes
                .get(i)
                .map(Vec::as_slice)
                .ok_or_else(|| BackendError::VariableNotFound(i.clone()))
        })
        .collect()
}

fn infer_node(node: &Node, operands: &[&[usize]]) -> Result<Vec<usize>, BackendError> {
    match &node.op_type {
        OpType::Gemm => {
            let p = gemm_params(node, operands)?;
            Ok(vec![p.m, p.n])
        }
        OpType::MatMul => {
            let (m, _, n) = matmul_dims(node, operands[0], operands[1])?;
            Ok(vec![m, n])
        }
        OpType::Add => broadcast_dims(operands[0], operands[1]).ok_or_else(|| {
            BackendError::DimensionMismatch(format!(
                "node '{}': cannot broadcast {:?} with {:?}",
                node.name, operands[0], operands[1]
            ))
        }),
        OpType::Relu
        | OpType::LeakyRelu
        | OpType::Sigmoid
        | OpType::Tanh
        | OpType::Identity => Ok(operands[0].to_vec()),
        OpType::Softmax => {
            softmax_axis(node, operands[0])?;
            Ok(operands[0].to_vec())
        }
        OpType::Flatten => {
            let axis = flatten_axis(node, operands[0])?;
            let outer: usize = operands[0][..axis].iter().product();
            let inner: usize = operands[0][axis..].iter().product();
            Ok(vec![outer, inner])
        }
        OpType::Unsupported(op) => Err(BackendError::UnsupportedOperator(op.clone())),
    }
}

/// Multidirectional broadcast of two shapes, or `None` if incompatible.
pub(crate) fn broadcast_dims(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(out)
}

fn require_rank2(node: &Node, dims: &[usize]) -> Result<(usize, usize), BackendError> {
    match dims {
        [r, c] => Ok((*r, *c)),
        _ => Err(BackendError::DimensionMismatch(format!(
            "node '{}' ({}) needs 2-D operands, got {:?}",
            node.name, node.op_type, dims
        ))),
    }
}

pub(crate) fn matmul_dims(
    node: &Node,
    a: &[usize],
    b: &[usize],
) -> Result<(usize, usize, usize), BackendError> {
    let (m, k) = require_rank2(node, a)?;
    let (kb, n) = require_rank2(node, b)?;
    if k != kb {
        return Err(BackendError::DimensionMismatch(format!(
            "node '{}': inner dimensions differ ({k} vs {kb})",
            node.name
        )));
    }
    Ok((m, k, n))
}

fn flag(node: &Node, name: &str) -> Result<bool, BackendError> {
    match node.attr_int(name, 0)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(BackendError::UnsupportedOperatorAttribute(format!(
            "node '{}': {name} must be 0 or 1, got {other}",
            node.name
        ))),
    }
}

pub(crate) fn gemm_params(node: &Node, operands: &[&[usize]]) -> Result<GemmParams, BackendError> {
    let trans_a = flag(node, "transA")?;
    let trans_b = flag(node, "transB")?;
    let (ar, ac) = require_rank2(node, operands[0])?;
    let (br, bc) = require_rank2(node, operands[1])?;
    let (m, k) = if trans_a { (ac, ar) } else { (ar, ac) };
    let (kb, n) = if trans_b { (bc, br) } else { (br, bc) };
    if k != kb {
        return Err(BackendError::DimensionMismatch(format!(
            "node '{}': inner dimensions differ ({k} vs {kb})",
            node.name
        )));
    }
    if let Some(c) = operands.get(2) {
        if !Shape::from(*c).broadcasts_to(&Shape::matrix(m, n)) {
            return Err(BackendError::DimensionMismatch(format!(
                "node '{}': bias {:?} does not broadcast to [{m}, {n}]",
                node.name, c
            )));
        }
    }
    Ok(GemmParams {
        m,
        k,
        n,
        trans_a,
        trans_b,
        alpha: node.attr_float("alpha", 1.0)?,
        beta: node.attr_float("beta", 1.0)?,
    })
}

fn normalize_axis(node: &Node, axis: i64, limit: usize) -> Result<usize, BackendError> {
    let adjusted = if axis < 0 { axis + limit as i64 } else { axis };
    if adjusted < 0 || adjusted > limit as i64 {
        return Err(BackendError::UnsupportedOperatorAttribute(format!(
            "node '{}': axis {axis} out of range",
            node.name
        )));
    }
    Ok(adjusted as usize)
}

/// Softmax normalises along a single axis, the last one by default.
pub(crate) fn softmax_axis(node: &Node, dims: &[usize]) -> Result<usize, BackendError> {
    let rank = dims.len();
    let axis = normalize_axis(node, node.attr_int("axis", -1)?, rank)?;
    if axis == rank {
        return Err(BackendError::UnsupportedOperatorAttribute(format!(
            "node '{}': axis {axis} out of range for rank {rank}",
            node.name
        )));
    }
    Ok(axis)
}

pub(crate) fn flatten_axis(node: &Node, dims: &[usize]) -> Result<usize, BackendError> {
    normalize_axis(node, node.attr_int("axis", 1)?, dims.len())
}
