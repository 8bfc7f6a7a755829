// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model graph: nodes and parameters connected by value names.
//!
//! # Type-State Pattern
//!
//! The graph transitions through states enforced at compile time:
//!
//! ```text
//! Graph<Loaded>    : decoded or built incrementally, not yet checked.
//!       │  .validate()
//!       ▼
//! Graph<Validated> : operators supported, SSA form, nodes in topological order.
//! ```
//!
//! Shape inference and compilation only ever see a `Graph<Validated>`.

use crate::{Attribute, ModelError, Node, OpType, Parameter};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::marker::PhantomData;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph has been loaded but not validated.
#[derive(Debug, Clone)]
pub struct Loaded;

/// Marker: graph has been validated and is in execution order.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Loaded {}
impl GraphState for Validated {}

// ── Graph ──────────────────────────────────────────────────────────

/// A computation graph over named float values.
#[derive(Debug, Clone)]
pub struct Graph<S: GraphState = Loaded> {
    /// Graph name from the model file, or the one given to [`Graph::new`].
    pub name: String,
    nodes: Vec<Node>,
    parameters: BTreeMap<String, Parameter>,
    _state: PhantomData<S>,
}

// ── Loaded state ───────────────────────────────────────────────────

impl Graph<Loaded> {
    /// Creates an empty graph for incremental construction.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_parts(name.into(), Vec::new(), BTreeMap::new())
    }

    pub(crate) fn from_parts(
        name: String,
        nodes: Vec<Node>,
        parameters: BTreeMap<String, Parameter>,
    ) -> Self {
        Self {
            name,
            nodes,
            parameters,
            _state: PhantomData,
        }
    }

    /// Adds a named constant tensor.
    pub fn add_parameter(&mut self, name: &str, param: Parameter) -> Result<(), ModelError> {
        if self.parameters.contains_key(name) {
            return Err(ModelError::DuplicateName(name.to_string()));
        }
        self.parameters.insert(name.to_string(), param);
        Ok(())
    }

    /// Appends a node and makes it the current node.
    ///
    /// Unknown operator names are accepted here and rejected by
    /// [`validate`](Self::validate).
    pub fn add_node(&mut self, op_type: &str) {
        let op = OpType::from_onnx(op_type);
        let name = format!("{}_{}", op.as_str().to_lowercase(), self.nodes.len());
        self.nodes.push(Node::new(name, op));
    }

    /// Appends an operand to the current node.
    pub fn add_input_to_current(&mut self, value: &str) -> Result<(), ModelError> {
        self.current_mut()?.inputs.push(value.to_string());
        Ok(())
    }

    /// Appends a result to the current node.
    pub fn add_output_to_current(&mut self, value: &str) -> Result<(), ModelError> {
        self.current_mut()?.outputs.push(value.to_string());
        Ok(())
    }

    /// Sets an attribute on the current node. Setting the same attribute
    /// twice is an error.
    pub fn add_attribute_to_current(
        &mut self,
        name: &str,
        value: Attribute,
    ) -> Result<(), ModelError> {
        let node = self.current_mut()?;
        if node.attributes.contains_key(name) {
            return Err(ModelError::InvalidAttribute {
                node: node.name.clone(),
                name: name.to_string(),
                detail: "attribute already set".into(),
            });
        }
        node.attributes.insert(name.to_string(), value);
        Ok(())
    }

    /// Removes every node and parameter that does not contribute to any of
    /// `outputs`. Returns the number of nodes removed.
    pub fn prune_to(&mut self, outputs: &[String]) -> usize {
        let mut needed: HashSet<String> = outputs.iter().cloned().collect();
        let mut keep = vec![false; self.nodes.len()];
        loop {
            let mut changed = false;
            for (idx, node) in self.nodes.iter().enumerate() {
                if !keep[idx] && node.outputs.iter().any(|o| needed.contains(o)) {
                    keep[idx] = true;
                    needed.extend(node.inputs.iter().cloned());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let before = self.nodes.len();
        let mut flags = keep.into_iter();
        self.nodes.retain(|_| flags.next().unwrap_or(false));
        self.parameters.retain(|name, _| needed.contains(name));
        before - self.nodes.len()
    }

    fn current_mut(&mut self) -> Result<&mut Node, ModelError> {
        self.nodes.last_mut().ok_or(ModelError::NoCurrentNode)
    }

    /// Validates the graph and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - The graph has at least one node.
    /// - Every operator is supported and receives an accepted number of inputs.
    /// - Every value is produced by at most one node, and never shadows a
    ///   parameter.
    /// - The dependency graph is acyclic. Nodes are reordered topologically.
    pub fn validate(self) -> Result<Graph<Validated>, ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidGraph("graph contains no nodes".into()));
        }

        for node in &self.nodes {
            if !node.op_type.is_supported() {
                return Err(ModelError::UnsupportedOperator {
                    op: node.op_type.as_str().to_string(),
                });
            }
            let (min, max) = node.op_type.arity();
            let n = node.inputs.iter().filter(|i| !i.is_empty()).count();
            if n < min || n > max {
                return Err(ModelError::InvalidGraph(format!(
                    "node '{}' ({}) takes {min}..={max} inputs, got {n}",
                    node.name, node.op_type
                )));
            }
            if node.outputs.len() != 1 || node.outputs[0].is_empty() {
                return Err(ModelError::InvalidGraph(format!(
                    "node '{}' must have exactly one named output",
                    node.name
                )));
            }
        }

        let order = self.topological_order()?;
        let mut slots: Vec<Option<Node>> = self.nodes.into_iter().map(Some).collect();
        let nodes: Vec<Node> = order.into_iter().filter_map(|i| slots[i].take()).collect();

        tracing::debug!("validated graph '{}' with {} nodes", self.name, nodes.len());

        Ok(Graph {
            name: self.name,
            nodes,
            parameters: self.parameters,
            _state: PhantomData,
        })
    }

    /// Kahn's algorithm over producer → consumer edges.
    fn topological_order(&self) -> Result<Vec<usize>, ModelError> {
        let mut producer: HashMap<&str, usize> = HashMap::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            for out in &node.outputs {
                if self.parameters.contains_key(out) {
                    return Err(ModelError::InvalidGraph(format!(
                        "node '{}' output '{out}' shadows a parameter",
                        node.name
                    )));
                }
                if producer.insert(out.as_str(), idx).is_some() {
                    return Err(ModelError::InvalidGraph(format!(
                        "value '{out}' is produced by more than one node"
                    )));
                }
            }
        }

        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, node) in self.nodes.iter().enumerate() {
            for input in &node.inputs {
                if let Some(&p) = producer.get(input.as_str()) {
                    indegree[idx] += 1;
                    dependents[p].push(idx);
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            for &d in &dependents[idx] {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    queue.push_back(d);
                }
            }
        }

        if order.len() != n {
            return Err(ModelError::InvalidGraph("graph contains a cycle".into()));
        }
        Ok(order)
    }
}

// ── Validated state ────────────────────────────────────────────────

impl Graph<Validated> {
    /// Returns the node producing `value`, if any.
    pub fn producer(&self, value: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.outputs.iter().any(|o| o == value))
    }

    /// Returns the nodes consuming `value`.
    pub fn consumers<'a>(&'a self, value: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.inputs.iter().any(|i| i == value))
    }

    /// Returns a summary string describing the graph.
    pub fn summary(&self) -> String {
        let weights: usize = self.parameters.values().map(|p| p.data().len()).sum();
        format!(
            "Graph '{}': {} nodes, {} parameters ({} weights), inputs [{}]",
            self.name,
            self.nodes.len(),
            self.parameters.len(),
            weights,
            self.free_variables().join(", "),
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> Graph<S> {
    /// Returns the nodes. Execution order once validated.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the total number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// Returns `true` if `value` is produced by a node.
    pub fn is_produced(&self, value: &str) -> bool {
        self.nodes.iter().any(|n| n.outputs.iter().any(|o| o == value))
    }

    /// Returns `true` if `value` is a parameter or produced by a node.
    pub fn has_value(&self, value: &str) -> bool {
        self.parameters.contains_key(value) || self.is_produced(value)
    }

    /// Values consumed by some node but neither produced by a node nor
    /// stored as parameters: the graph's run-time inputs, in order of
    /// first use.
    pub fn free_variables(&self) -> Vec<String> {
        let produced: HashSet<&str> = self
            .nodes
            .iter()
            .flat_map(|n| n.outputs.iter().map(String::as_str))
            .collect();
        let mut seen = HashSet::new();
        let mut free = Vec::new();
        for node in &self.nodes {
            for input in &node.inputs {
                let v = input.as_str();
                if v.is_empty() || produced.contains(v) || self.parameters.contains_key(v) {
                    continue;
                }
                if seen.insert(v) {
                    free.push(input.clone());
                }
            }
        }
        free
    }

    /// Values produced by a node and consumed by none.
    pub fn sink_values(&self) -> Vec<String> {
        let consumed: HashSet<&str> = self
            .nodes
            .iter()
            .flat_map(|n| n.inputs.iter().map(String::as_str))
            .collect();
        self.nodes
            .iter()
            .flat_map(|n| n.outputs.iter())
            .filter(|o| !consumed.contains(o.as_str()))
            .cloned()
            .collect()
    }
}

impl<S: GraphState> fmt::Display for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph '{}' ({} nodes):", self.name, self.nodes.len())?;
        for node in &self.nodes {
            writeln!(f, "  {}", node.summary())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::Shape;

    /// Helper: `y = Relu(x · w)` built one call at a time.
    fn relu_matmul() -> Graph<Loaded> {
        let mut g = Graph::new("tiny");
        g.add_parameter(
            "w",
            Parameter::new(Shape::matrix(2, 2), vec![1.0, 0.0, 0.0, 1.0]).unwrap(),
        )
        .unwrap();
        g.add_node("MatMul");
        g.add_input_to_current("x").unwrap();
        g.add_input_to_current("w").unwrap();
        g.add_output_to_current("xw").unwrap();
        g.add_node("Relu");
        g.add_input_to_current("xw").unwrap();
        g.add_output_to_current("y").unwrap();
        g
    }

    #[test]
    fn test_validate_ok() {
        let g = relu_matmul().validate().unwrap();
        assert_eq!(g.num_nodes(), 2);
        assert_eq!(g.free_variables(), vec!["x".to_string()]);
        assert_eq!(g.sink_values(), vec!["y".to_string()]);
        assert_eq!(g.producer("xw").unwrap().op_type, OpType::MatMul);
        assert_eq!(g.consumers("xw").count(), 1);
    }

    #[test]
    fn test_validate_empty() {
        assert!(matches!(
            Graph::new("empty").validate(),
            Err(ModelError::InvalidGraph(_))
        ));
    }

    #[test]
    fn test_calls_without_current_node() {
        let mut g = Graph::new("g");
        assert!(matches!(
            g.add_input_to_current("x"),
            Err(ModelError::NoCurrentNode)
        ));
        assert!(matches!(
            g.add_attribute_to_current("axis", Attribute::Int(1)),
            Err(ModelError::NoCurrentNode)
        ));
    }

    #[test]
    fn test_duplicate_parameter_and_attribute() {
        let mut g = relu_matmul();
        let p = Parameter::new(Shape::vector(1), vec![0.0]).unwrap();
        assert!(matches!(
            g.add_parameter("w", p),
            Err(ModelError::DuplicateName(ref n)) if n == "w"
        ));
        g.add_attribute_to_current("alpha", Attribute::Float(0.1)).unwrap();
        assert!(matches!(
            g.add_attribute_to_current("alpha", Attribute::Float(0.2)),
            Err(ModelError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_unsupported_operator() {
        let mut g = Graph::new("conv");
        g.add_node("Conv");
        g.add_input_to_current("x").unwrap();
        g.add_output_to_current("y").unwrap();
        assert!(matches!(
            g.validate(),
            Err(ModelError::UnsupportedOperator { ref op }) if op == "Conv"
        ));
    }

    #[test]
    fn test_reorders_topologically() {
        let mut g = Graph::new("reversed");
        g.add_node("Relu");
        g.add_input_to_current("a").unwrap();
        g.add_output_to_current("b").unwrap();
        g.add_node("Identity");
        g.add_input_to_current("x").unwrap();
        g.add_output_to_current("a").unwrap();
        let g = g.validate().unwrap();
        assert_eq!(g.nodes()[0].op_type, OpType::Identity);
        assert_eq!(g.nodes()[1].op_type, OpType::Relu);
        assert_eq!(g.free_variables(), vec!["x".to_string()]);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut g = Graph::new("cycle");
        g.add_node("Relu");
        g.add_input_to_current("b").unwrap();
        g.add_output_to_current("a").unwrap();
        g.add_node("Relu");
        g.add_input_to_current("a").unwrap();
        g.add_output_to_current("b").unwrap();
        assert!(matches!(g.validate(), Err(ModelError::InvalidGraph(_))));
    }

    #[test]
    fn test_duplicate_producer_rejected() {
        let mut g = relu_matmul();
        g.add_node("Identity");
        g.add_input_to_current("x").unwrap();
        g.add_output_to_current("y").unwrap();
        assert!(matches!(g.validate(), Err(ModelError::InvalidGraph(_))));
    }

    #[test]
    fn test_output_shadowing_parameter_rejected() {
        let mut g = relu_matmul();
        g.add_node("Identity");
        g.add_input_to_current("y").unwrap();
        g.add_output_to_current("w").unwrap();
        assert!(matches!(g.validate(), Err(ModelError::InvalidGraph(_))));
    }

    #[test]
    fn test_arity_checked() {
        let mut g = Graph::new("add");
        g.add_node("Add");
        g.add_input_to_current("x").unwrap();
        g.add_output_to_current("y").unwrap();
        assert!(matches!(g.validate(), Err(ModelError::InvalidGraph(_))));
    }

    #[test]
    fn test_prune_to_drops_dead_branch() {
        let mut g = relu_matmul();
        g.add_parameter("unused", Parameter::new(Shape::vector(1), vec![0.0]).unwrap())
            .unwrap();
        g.add_node("Sigmoid");
        g.add_input_to_current("unused").unwrap();
        g.add_output_to_current("dead").unwrap();

        assert_eq!(g.prune_to(&["y".to_string()]), 1);
        assert_eq!(g.num_nodes(), 2);
        assert!(g.parameter("unused").is_none());
        assert!(g.parameter("w").is_some());
    }

    #[test]
    fn test_summary() {
        let g = relu_matmul().validate().unwrap();
        let s = g.summary();
        assert!(s.contains("tiny"));
        assert!(s.contains("2 nodes"));
        assert!(format!("{g}").contains("matmul_0 [MatMul] (x, w) -> (xw)"));
    }
}
