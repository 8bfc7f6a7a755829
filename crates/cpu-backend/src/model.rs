// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model builder and compiled model.
//!
//! Compilation turns a validated graph plus a profile table into a flat list
//! of kernel steps over value slots. A slot is backed by one of:
//!
//! - an external buffer attached by the caller,
//! - a parameter of the graph (read-only),
//! - a buffer allocated here, for everything else.
//!
//! Slot addresses are fixed for the lifetime of the model, so callers may
//! keep the buffer handles they query.

use crate::config::{CpuBackendConfig, BACKEND_NAME};
use crate::infer::{
    broadcast_dims, flatten_axis, gemm_params, infer_shapes, matmul_dims, operand_dims,
    softmax_axis, ShapeMap,
};
use crate::kernels::{Broadcast, Kernel};
use crate::{BackendError, ModelData, ProfileTable, VariableProfile};
use model_ir::{Graph, Node, OpType, Parameter, Validated};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::c_void;
use tensor_core::{DType, HostBuffer};

/// Binds external buffers to profiled variables ahead of compilation.
#[derive(Debug)]
pub struct ModelBuilder {
    inputs: Vec<(String, Vec<usize>)>,
    outputs: Vec<String>,
    declared: HashSet<String>,
    attachments: BTreeMap<String, *mut f32>,
}

impl ModelBuilder {
    /// Creates a builder over the variables declared in `table`.
    pub fn new(table: &ProfileTable) -> Self {
        let inputs = table.input_profiles();
        let outputs = table.output_names();
        let declared = inputs
            .iter()
            .map(|(n, _)| n.clone())
            .chain(outputs.iter().cloned())
            .collect();
        Self {
            inputs,
            outputs,
            declared,
            attachments: BTreeMap::new(),
        }
    }

    /// Attaches `buffer` as the storage of variable `name`.
    ///
    /// Attaching again to the same name replaces the earlier buffer.
    pub fn attach_external_buffer(
        &mut self,
        name: &str,
        buffer: *mut c_void,
    ) -> Result<(), BackendError> {
        if buffer.is_null() {
            return Err(BackendError::InvalidArgument(format!(
                "null buffer for '{name}'"
            )));
        }
        if !self.declared.contains(name) {
            return Err(BackendError::VariableNotFound(format!(
                "'{name}' is not in the profile table"
            )));
        }
        self.attachments.insert(name.to_string(), buffer.cast());
        tracing::debug!("attached external buffer to '{name}'");
        Ok(())
    }

    /// Compiles `model_data` for the named backend.
    ///
    /// # Safety
    /// Every attached buffer must hold at least as many `f32` elements as
    /// its variable's inferred dimensions imply, must not overlap another
    /// attached buffer, and must stay valid until the returned model is
    /// dropped.
    pub unsafe fn build_model(
        &self,
        model_data: &ModelData,
        backend_name: &str,
        backend_config: &str,
    ) -> Result<Model, BackendError> {
        if backend_name != BACKEND_NAME {
            return Err(BackendError::InvalidBackendName(backend_name.to_string()));
        }
        let config = CpuBackendConfig::parse(backend_config)?;
        let graph = model_data.validated()?;
        let shapes = infer_shapes(&graph, &self.inputs)?;

        for name in &self.outputs {
            if !shapes.contains_key(name) {
                return Err(BackendError::VariableNotFound(format!("output '{name}'")));
            }
        }
        for name in self.attachments.keys() {
            if graph.parameter(name).is_some() {
                return Err(BackendError::Backend(format!(
                    "cannot attach a buffer to parameter '{name}'"
                )));
            }
        }

        Compiler {
            graph: &graph,
            shapes: &shapes,
            attachments: &self.attachments,
            declared: &self.declared,
            config: &config,
        }
        .compile()
    }
}

// ── Compilation ────────────────────────────────────────────────────

struct Compiler<'a> {
    graph: &'a Graph<Validated>,
    shapes: &'a ShapeMap,
    attachments: &'a BTreeMap<String, *mut f32>,
    declared: &'a HashSet<String>,
    config: &'a CpuBackendConfig,
}

impl Compiler<'_> {
    fn compile(self) -> Result<Model, BackendError> {
        let nodes = self.graph.nodes();
        let fusions = if self.config.fuse_activations {
            self.plan_fusions()
        } else {
            HashMap::new()
        };
        let fused_away: HashSet<usize> = fusions.values().copied().collect();

        let mut model = Model {
            slots: Vec::new(),
            index: HashMap::new(),
            steps: Vec::with_capacity(nodes.len()),
        };

        for (idx, node) in nodes.iter().enumerate() {
            if fused_away.contains(&idx) {
                continue;
            }
            let (relu, output) = match fusions.get(&idx) {
                Some(&relu_idx) => (true, &nodes[relu_idx].outputs[0]),
                None => (false, &node.outputs[0]),
            };

            let kernel = self.kernel_for(node, output, relu)?;
            let mut inputs = Vec::with_capacity(node.inputs.len());
            for name in node.inputs.iter().filter(|i| !i.is_empty()) {
                inputs.push(self.slot_for(&mut model, name)?);
            }
            let output = self.slot_for(&mut model, output)?;
            model.steps.push(Step {
                node: node.name.clone(),
                kernel,
                inputs,
                output,
            });
        }

        // Declared variables that no step touches (an output that is a
        // parameter, for instance) still need a slot.
        let mut declared: Vec<&String> = self.declared.iter().collect();
        declared.sort();
        for name in declared {
            self.slot_for(&mut model, name)?;
        }

        tracing::info!(
            "compiled graph '{}': {} steps ({} fused), {} values, {} external buffers",
            self.graph.name,
            model.steps.len(),
            fused_away.len(),
            model.slots.len(),
            self.attachments.len(),
        );
        Ok(model)
    }

    /// Maps producer node index → index of the `Relu` folded into it.
    fn plan_fusions(&self) -> HashMap<usize, usize> {
        let nodes = self.graph.nodes();
        let mut plan = HashMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            if !matches!(node.op_type, OpType::Gemm | OpType::MatMul | OpType::Add) {
                continue;
            }
            let value = &node.outputs[0];
            if self.declared.contains(value) || self.attachments.contains_key(value) {
                continue;
            }
            let consumers: Vec<usize> = nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.inputs.iter().any(|i| i == value))
                .map(|(i, _)| i)
                .collect();
            if let [only] = consumers[..] {
                if nodes[only].op_type == OpType::Relu {
                    tracing::debug!("fusing '{}' into '{}'", nodes[only].name, node.name);
                    plan.insert(idx, only);
                }
            }
        }
        plan
    }

    fn kernel_for(&self, node: &Node, output: &str, relu: bool) -> Result<Kernel, BackendError> {
        let operands = operand_dims(node, self.shapes)?;
        let out_dims = self
            .shapes
            .get(output)
            .ok_or_else(|| BackendError::VariableNotFound(output.to_string()))?;

        let kernel = match &node.op_type {
            OpType::Gemm => {
                let params = gemm_params(node, &operands)?;
                let bias = operands.get(2).map(|c| Broadcast::new(c, out_dims));
                Kernel::Gemm { params, bias, relu }
            }
            OpType::MatMul => {
                let (m, k, n) = matmul_dims(node, operands[0], operands[1])?;
                Kernel::MatMul { m, k, n, relu }
            }
            OpType::Add => {
                let out = broadcast_dims(operands[0], operands[1]).ok_or_else(|| {
                    BackendError::DimensionMismatch(format!("node '{}'", node.name))
                })?;
                Kernel::Add {
                    lhs: Broadcast::new(operands[0], &out),
                    rhs: Broadcast::new(operands[1], &out),
                    relu,
                }
            }
            OpType::Relu => Kernel::Relu,
            OpType::LeakyRelu => Kernel::LeakyRelu {
                alpha: node.attr_float("alpha", 0.01)?,
            },
            OpType::Sigmoid => Kernel::Sigmoid,
            OpType::Tanh => Kernel::Tanh,
            OpType::Softmax => {
                let dims = operands[0];
                let axis = softmax_axis(node, dims)?;
                Kernel::Softmax {
                    outer: dims[..axis].iter().product(),
                    axis_len: dims[axis],
                    inner: dims[axis + 1..].iter().product(),
                }
            }
            OpType::Flatten => {
                flatten_axis(node, operands[0])?;
                Kernel::Copy
            }
            OpType::Identity => Kernel::Copy,
            OpType::Unsupported(op) => {
                return Err(BackendError::UnsupportedOperator(op.clone()));
            }
        };
        Ok(kernel)
    }

    /// Returns the slot of `name`, creating it on first use.
    fn slot_for(&self, model: &mut Model, name: &str) -> Result<usize, BackendError> {
        if let Some(&idx) = model.index.get(name) {
            return Ok(idx);
        }
        let dims = self
            .shapes
            .get(name)
            .ok_or_else(|| BackendError::VariableNotFound(name.to_string()))?
            .clone();
        let len: usize = dims.iter().product();

        let slot = if let Some(param) = self.graph.parameter(name) {
            ValueSlot {
                ptr: param.data().as_ptr().cast_mut(),
                len,
                dims,
                storage: SlotStorage::Constant(param.clone()),
            }
        } else if let Some(&ptr) = self.attachments.get(name) {
            ValueSlot {
                ptr,
                len,
                dims,
                storage: SlotStorage::External,
            }
        } else {
            let mut buf = HostBuffer::<f32>::zeroed(len);
            ValueSlot {
                ptr: buf.as_mut_ptr(),
                len,
                dims,
                storage: SlotStorage::Internal(buf),
            }
        };

        let idx = model.slots.len();
        model.slots.push(slot);
        model.index.insert(name.to_string(), idx);
        Ok(idx)
    }
}

// ── Compiled model ─────────────────────────────────────────────────

#[derive(Debug)]
enum SlotStorage {
    /// Caller-owned memory.
    External,
    /// Graph parameter; never written.
    Constant(Parameter),
    /// Owned by the model.
    Internal(HostBuffer<f32>),
}

#[derive(Debug)]
struct ValueSlot {
    ptr: *mut f32,
    len: usize,
    dims: Vec<usize>,
    storage: SlotStorage,
}

impl ValueSlot {
    /// # Safety
    /// No mutable slice over the same slot may be live.
    unsafe fn as_slice<'a>(&self) -> &'a [f32] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }

    /// # Safety
    /// No other slice over the same slot may be live.
    unsafe fn as_mut_slice<'a>(&self) -> &'a mut [f32] {
        std::slice::from_raw_parts_mut(self.ptr, self.len)
    }
}

#[derive(Debug)]
struct Step {
    node: String,
    kernel: Kernel,
    inputs: Vec<usize>,
    output: usize,
}

/// An executable model.
#[derive(Debug)]
pub struct Model {
    slots: Vec<ValueSlot>,
    index: HashMap<String, usize>,
    steps: Vec<Step>,
}

// The raw pointers refer to buffers owned by the model itself or attached
// by the caller under `build_model`'s contract.
unsafe impl Send for Model {}

impl Model {
    fn slot(&self, name: &str) -> Result<&ValueSlot, BackendError> {
        self.index
            .get(name)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| BackendError::VariableNotFound(name.to_string()))
    }

    /// Returns the dtype and dimensions of a variable.
    pub fn variable_profile(&self, name: &str) -> Result<VariableProfile, BackendError> {
        let slot = self.slot(name)?;
        Ok(VariableProfile {
            dtype: DType::F32,
            dims: slot.dims.clone(),
        })
    }

    /// Returns the address of a variable's buffer.
    pub fn buffer_handle(&self, name: &str) -> Result<*mut c_void, BackendError> {
        Ok(self.slot(name)?.ptr.cast())
    }

    /// Returns `true` if the model owns the buffer of `name`.
    pub fn owns_buffer(&self, name: &str) -> bool {
        matches!(
            self.slot(name).map(|s| &s.storage),
            Ok(SlotStorage::Internal(_))
        )
    }

    /// Number of kernel steps after fusion.
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// Executes every step in order.
    pub fn run(&mut self) -> Result<(), BackendError> {
        for step in &self.steps {
            tracing::trace!("run {} ({})", step.node, step.kernel.name());
            // SAFETY: validation guarantees a step never reads its own output,
            // and distinct slots never overlap.
            let inputs: Vec<&[f32]> = step
                .inputs
                .iter()
                .map(|&i| unsafe { self.slots[i].as_slice() })
                .collect();
            let out = unsafe { self.slots[step.output].as_mut_slice() };
            step.kernel.execute(&inputs, out);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProfileTableBuilder;
    use model_ir::Attribute;

    /// `y = Relu(x @ w + b)` with w = I(2), b = [0, -5].
    fn linear_relu() -> ModelData {
        let mut md = ModelData::empty();
        md.add_parameter("w", &[2, 2], &[1.0, 0.0, 0.0, 1.0]).unwrap();
        md.add_parameter("b", &[2], &[0.0, -5.0]).unwrap();
        md.add_new_node("Gemm");
        for v in ["x", "w", "b"] {
            md.add_input_name_to_current_node(v).unwrap();
        }
        md.add_output_name_to_current_node("h").unwrap();
        md.add_attribute_to_current_node("transB", Attribute::Int(0))
            .unwrap();
        md.add_new_node("Relu");
        md.add_input_name_to_current_node("h").unwrap();
        md.add_output_name_to_current_node("y").unwrap();
        md
    }

    fn table(md: &ModelData) -> ProfileTable {
        let mut b = ProfileTableBuilder::new();
        b.add_input_profile("x", DType::F32, &[1, 2]).unwrap();
        b.add_output_profile("y", DType::F32).unwrap();
        b.build(md).unwrap()
    }

    #[test]
    fn test_compile_and_run_fused() {
        let md = linear_relu();
        let mut x = vec![3.0f32, 7.0];
        let xp = x.as_mut_ptr();
        let mut mb = ModelBuilder::new(&table(&md));
        mb.attach_external_buffer("x", xp.cast()).unwrap();
        let mut model = unsafe { mb.build_model(&md, "cpu", "") }.unwrap();

        assert_eq!(model.num_steps(), 1);
        assert!(model.variable_profile("h").is_err());
        assert!(model.owns_buffer("y"));
        assert!(!model.owns_buffer("x"));

        model.run().unwrap();
        let y = model.buffer_handle("y").unwrap().cast::<f32>();
        let y = unsafe { std::slice::from_raw_parts(y, 2) };
        assert_eq!(y, &[3.0, 2.0]);

        unsafe { *xp.add(1) = 1.0 };
        model.run().unwrap();
        let y = model.buffer_handle("y").unwrap().cast::<f32>();
        let y = unsafe { std::slice::from_raw_parts(y, 2) };
        assert_eq!(y, &[3.0, 0.0]);
    }

    #[test]
    fn test_unfused_keeps_intermediate() {
        let md = linear_relu();
        let mb = ModelBuilder::new(&table(&md));
        let model =
            unsafe { mb.build_model(&md, "cpu", r#"{"fuse_activations": false}"#) }.unwrap();
        assert_eq!(model.num_steps(), 2);
        assert_eq!(model.variable_profile("h").unwrap().dims, vec![1, 2]);
    }

    #[test]
    fn test_invalid_backend_name_and_config() {
        let md = linear_relu();
        let mb = ModelBuilder::new(&table(&md));
        let err = unsafe { mb.build_model(&md, "gpu", "") }.unwrap_err();
        assert!(matches!(err, BackendError::InvalidBackendName(_)));
        let err = unsafe { mb.build_model(&md, "cpu", "{oops") }.unwrap_err();
        assert!(matches!(err, BackendError::JsonParse(_)));
    }

    #[test]
    fn test_attach_unknown_or_null() {
        let md = linear_relu();
        let mut mb = ModelBuilder::new(&table(&md));
        let mut buf = [0.0f32; 2];
        let err = mb
            .attach_external_buffer("h", buf.as_mut_ptr().cast())
            .unwrap_err();
        assert!(matches!(err, BackendError::VariableNotFound(_)));
        let err = mb
            .attach_external_buffer("x", std::ptr::null_mut())
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidArgument(_)));
    }

    #[test]
    fn test_attached_output_is_written_in_place() {
        let md = linear_relu();
        let mut y = [f32::NAN; 2];
        let mut mb = ModelBuilder::new(&table(&md));
        mb.attach_external_buffer("y", y.as_mut_ptr().cast()).unwrap();
        let mut model = unsafe { mb.build_model(&md, "cpu", "") }.unwrap();
        assert_eq!(
            model.buffer_handle("y").unwrap(),
            y.as_mut_ptr().cast::<c_void>()
        );
        model.run().unwrap();
        drop(model);
        assert_eq!(y, [0.0, 0.0]);
    }
}
