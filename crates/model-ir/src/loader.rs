// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reading and writing graphs in the ONNX interchange format.
//!
//! Model files are memory-mapped and decoded with `prost`. Initializers
//! become [`Parameter`]s, nodes keep their operand names verbatim. The
//! reverse direction ([`Graph::to_model_proto`]) exists so graphs built in
//! code can be saved and fed back through the same loading path.

use crate::proto::{
    attribute_type, AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    TensorProto, ValueInfoProto, DATA_TYPE_FLOAT,
};
use crate::{Attribute, Graph, GraphState, Loaded, ModelError, Node, OpType, Parameter};
use prost::Message;
use std::collections::BTreeMap;
use std::path::Path;
use tensor_core::{Shape, TypedTensor};

/// Highest default-domain operator set version the kernels implement.
pub const MAX_OPSET_VERSION: i64 = 13;

/// IR version written by [`Graph::to_model_proto`].
const IR_VERSION: i64 = 7;

/// Loads interchange-format models into a [`Graph<Loaded>`].
///
/// # Example
/// ```no_run
/// use model_ir::ModelLoader;
/// use std::path::Path;
///
/// let graph = ModelLoader::from_path(Path::new("mlp.onnx")).unwrap();
/// let graph = graph.validate().unwrap();
/// println!("{}", graph.summary());
/// ```
pub struct ModelLoader;

impl ModelLoader {
    /// Loads a model file.
    ///
    /// An empty path, a missing or unreadable file, or an empty file is an
    /// [`ModelError::InvalidFilename`].
    pub fn from_path(path: &Path) -> Result<Graph<Loaded>, ModelError> {
        let display = path.display().to_string();
        if display.is_empty() {
            return Err(ModelError::InvalidFilename {
                path: display,
                detail: "path is empty".into(),
            });
        }

        let file = std::fs::File::open(path).map_err(|e| ModelError::InvalidFilename {
            path: display.clone(),
            detail: e.to_string(),
        })?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Err(ModelError::InvalidFilename {
                path: display,
                detail: "file is empty".into(),
            });
        }

        // SAFETY: the map is read-only and dropped before this function
        // returns; decoding copies everything it keeps out of it. A
        // concurrent external truncation of the file is not guarded against.
        let mmap = unsafe { memmap2::Mmap::map(&file) }?;
        tracing::debug!("mapped model file '{}' ({} bytes)", path.display(), len);
        Self::from_bytes(&mmap)
    }

    /// Decodes a serialised model.
    pub fn from_bytes(bytes: &[u8]) -> Result<Graph<Loaded>, ModelError> {
        if bytes.is_empty() {
            return Err(ModelError::EmptyModel);
        }
        let model = ModelProto::decode(bytes)?;
        Self::from_model_proto(model)
    }

    /// Converts a decoded model message.
    pub fn from_model_proto(model: ModelProto) -> Result<Graph<Loaded>, ModelError> {
        for opset in &model.opset_import {
            let default_domain = opset.domain.is_empty() || opset.domain == "ai.onnx";
            if default_domain && opset.version > MAX_OPSET_VERSION {
                return Err(ModelError::UnsupportedOpset {
                    version: opset.version,
                    max: MAX_OPSET_VERSION,
                });
            }
        }

        let graph = model
            .graph
            .ok_or_else(|| ModelError::InvalidGraph("model has no graph".into()))?;

        let mut parameters = BTreeMap::new();
        for init in &graph.initializer {
            let param = parameter_from_proto(init)?;
            if parameters.insert(init.name.clone(), param).is_some() {
                return Err(ModelError::DuplicateName(init.name.clone()));
            }
        }

        let mut nodes = Vec::with_capacity(graph.node.len());
        for (idx, proto) in graph.node.into_iter().enumerate() {
            nodes.push(node_from_proto(idx, proto)?);
        }

        tracing::info!(
            "decoded graph '{}': {} nodes, {} initializers (producer '{}', ir {})",
            graph.name,
            nodes.len(),
            parameters.len(),
            model.producer_name,
            model.ir_version,
        );

        Ok(Graph::from_parts(graph.name, nodes, parameters))
    }
}

fn node_from_proto(idx: usize, proto: NodeProto) -> Result<Node, ModelError> {
    let op_type = if proto.domain.is_empty() || proto.domain == "ai.onnx" {
        OpType::from_onnx(&proto.op_type)
    } else {
        OpType::Unsupported(format!("{}.{}", proto.domain, proto.op_type))
    };
    let name = if proto.name.is_empty() {
        format!("{}_{idx}", op_type.as_str().to_lowercase())
    } else {
        proto.name
    };

    let mut attributes = BTreeMap::new();
    for attr in &proto.attribute {
        let value = attribute_from_proto(&name, attr)?;
        attributes.insert(attr.name.clone(), value);
    }

    Ok(Node {
        name,
        op_type,
        inputs: proto.input,
        outputs: proto.output,
        attributes,
    })
}

fn attribute_from_proto(node: &str, attr: &AttributeProto) -> Result<Attribute, ModelError> {
    let value = match attr.r#type {
        attribute_type::INT => Attribute::Int(attr.i),
        attribute_type::FLOAT => Attribute::Float(attr.f),
        attribute_type::INTS => Attribute::Ints(attr.ints.clone()),
        attribute_type::FLOATS => Attribute::Floats(attr.floats.clone()),
        attribute_type::STRING => Attribute::String(String::from_utf8_lossy(&attr.s).into_owned()),
        other => {
            return Err(ModelError::InvalidAttribute {
                node: node.to_string(),
                name: attr.name.clone(),
                detail: format!("unsupported attribute type {other}"),
            })
        }
    };
    Ok(value)
}

fn attribute_to_proto(name: &str, value: &Attribute) -> AttributeProto {
    let mut proto = AttributeProto {
        name: name.to_string(),
        ..Default::default()
    };
    match value {
        Attribute::Int(v) => {
            proto.r#type = attribute_type::INT;
            proto.i = *v;
        }
        Attribute::Float(v) => {
            proto.r#type = attribute_type::FLOAT;
            proto.f = *v;
        }
        Attribute::Ints(v) => {
            proto.r#type = attribute_type::INTS;
            proto.ints = v.clone();
        }
        Attribute::Floats(v) => {
            proto.r#type = attribute_type::FLOATS;
            proto.floats = v.clone();
        }
        Attribute::String(v) => {
            proto.r#type = attribute_type::STRING;
            proto.s = v.as_bytes().to_vec();
        }
    }
    proto
}

/// Decodes the shape and float elements of a tensor message.
fn decode_float_tensor(proto: &TensorProto) -> Result<(Shape, Vec<f32>), ModelError> {
    if proto.data_type != DATA_TYPE_FLOAT {
        return Err(ModelError::UnsupportedDtype {
            name: proto.name.clone(),
            data_type: proto.data_type,
        });
    }

    let mut dims = Vec::with_capacity(proto.dims.len());
    for &d in &proto.dims {
        let d = usize::try_from(d).map_err(|_| ModelError::InvalidTensor {
            name: proto.name.clone(),
            detail: format!("negative dimension {d}"),
        })?;
        dims.push(d);
    }
    let shape = Shape::new(dims);

    let data = if !proto.raw_data.is_empty() {
        if proto.raw_data.len() % 4 != 0 {
            return Err(ModelError::InvalidTensor {
                name: proto.name.clone(),
                detail: format!("raw data length {} is not a multiple of 4", proto.raw_data.len()),
            });
        }
        proto
            .raw_data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    } else {
        proto.float_data.clone()
    };

    if data.len() != shape.num_elements() {
        return Err(ModelError::InvalidTensor {
            name: proto.name.clone(),
            detail: format!(
                "shape {shape} needs {} elements, found {}",
                shape.num_elements(),
                data.len()
            ),
        });
    }
    Ok((shape, data))
}

fn parameter_from_proto(proto: &TensorProto) -> Result<Parameter, ModelError> {
    let (shape, data) = decode_float_tensor(proto)?;
    Ok(Parameter::new(shape, data)?)
}

fn parameter_to_proto(name: &str, param: &Parameter) -> TensorProto {
    let mut raw = Vec::with_capacity(param.data().len() * 4);
    for v in param.data() {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    TensorProto {
        dims: param.shape().dims().iter().map(|&d| d as i64).collect(),
        data_type: DATA_TYPE_FLOAT,
        name: name.to_string(),
        raw_data: raw,
        ..Default::default()
    }
}

/// Converts a tensor message into an owned [`TypedTensor`].
pub fn tensor_from_proto(proto: &TensorProto) -> Result<TypedTensor, ModelError> {
    let (shape, data) = decode_float_tensor(proto)?;
    Ok(TypedTensor::from_vec_f32(shape, data)?)
}

/// Decodes a standalone serialised tensor message (a `.pb` fixture file).
pub fn tensor_from_bytes(bytes: &[u8]) -> Result<TypedTensor, ModelError> {
    let proto = TensorProto::decode(bytes)?;
    tensor_from_proto(&proto)
}

/// Encodes a tensor as a standalone tensor message.
pub fn tensor_to_bytes(name: &str, tensor: &TypedTensor) -> Result<Vec<u8>, ModelError> {
    let param = Parameter::from_tensor(tensor)?;
    Ok(parameter_to_proto(name, &param).encode_to_vec())
}

impl<S: GraphState> Graph<S> {
    /// Converts the graph into a model message.
    ///
    /// Free variables become graph inputs and sink values graph outputs.
    pub fn to_model_proto(&self) -> ModelProto {
        let node = self
            .nodes()
            .iter()
            .map(|n| NodeProto {
                input: n.inputs.clone(),
                output: n.outputs.clone(),
                name: n.name.clone(),
                op_type: n.op_type.as_str().to_string(),
                attribute: n
                    .attributes
                    .iter()
                    .map(|(k, v)| attribute_to_proto(k, v))
                    .collect(),
                domain: String::new(),
            })
            .collect();
        let value_info = |name: String| ValueInfoProto {
            name,
            doc_string: String::new(),
        };

        ModelProto {
            ir_version: IR_VERSION,
            producer_name: "model-ir".into(),
            graph: Some(GraphProto {
                node,
                name: self.name.clone(),
                initializer: self
                    .parameters()
                    .iter()
                    .map(|(k, p)| parameter_to_proto(k, p))
                    .collect(),
                input: self.free_variables().into_iter().map(value_info).collect(),
                output: self.sink_values().into_iter().map(value_info).collect(),
            }),
            opset_import: vec![OperatorSetIdProto {
                domain: String::new(),
                version: MAX_OPSET_VERSION,
            }],
        }
    }

    /// Serialises the graph in the interchange format.
    pub fn to_onnx_bytes(&self) -> Vec<u8> {
        self.to_model_proto().encode_to_vec()
    }
}
