// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The build pipeline and the steady-state runner.
//!
//! ```text
//! Build<Empty>
//!     │  .load_graph() / .with_graph()
//!     ▼
//! Build<GraphLoaded>
//!     │  .declare_profiles()
//!     ▼
//! Build<ProfileDeclared>
//!     │  .build_profile_table()
//!     ▼
//! Build<ProfileBuilt>
//!     │  .attach_buffers()
//!     ▼
//! Build<BuffersAttached>
//!     │  .compile()
//!     ▼
//! Build<Compiled> ──.finish()──► Runner
//! ```
//!
//! Each transition consumes the previous stage. When a transition fails,
//! every handle created so far is released in reverse creation order
//! before the error is returned, so no partially built runner escapes.

use crate::chain::{HandleChain, Stage};
use crate::config::{Config, ModelSource};
use crate::{
    BackendStatus, CompiledModel, ModelBuilder, ModelGraph, ProfileTableBuilder, RunnerError,
    VariableInfo,
};
use cpu_backend::ErrorCode;
use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;
use std::ops::Deref;
use tensor_core::{Shape, TypedTensor};

/// Input updates for [`Runner::run`], keyed by input name.
pub type Updates = BTreeMap<String, TypedTensor>;

// ── Type-state markers ─────────────────────────────────────────

#[derive(Debug)]
pub struct Empty;

#[derive(Debug)]
pub struct GraphLoaded;

#[derive(Debug)]
pub struct ProfileDeclared;

#[derive(Debug)]
pub struct ProfileBuilt;

#[derive(Debug)]
pub struct BuffersAttached;

#[derive(Debug)]
pub struct Compiled;

mod sealed {
    pub trait Sealed {}
}

/// Sealed trait for build stages.
pub trait BuildState: sealed::Sealed + std::fmt::Debug {
    const NAME: &'static str;
}

macro_rules! build_state {
    ($($ty:ident => $name:literal),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl BuildState for $ty {
                const NAME: &'static str = $name;
            }
        )*
    };
}

build_state!(
    Empty => "empty",
    GraphLoaded => "graph loaded",
    ProfileDeclared => "profile declared",
    ProfileBuilt => "profile built",
    BuffersAttached => "buffers attached",
    Compiled => "compiled",
);

// ── Build ──────────────────────────────────────────────────────

/// Field order matters on unwinding: the chain, and with it the compiled
/// model, must go before the buffers attached to it.
struct Parts {
    config: Config,
    chain: HandleChain,
    inputs: BTreeMap<String, TypedTensor>,
    outputs: BTreeMap<String, TypedTensor>,
}

/// A runner under construction, at stage `S`.
pub struct Build<S: BuildState = Empty> {
    parts: Parts,
    _state: PhantomData<S>,
}

fn held<T>(handle: Option<T>, stage: Stage) -> Result<T, RunnerError> {
    handle.ok_or(RunnerError::Released(stage))
}

impl<S: BuildState> Build<S> {
    fn advance<N: BuildState>(
        mut self,
        step: impl FnOnce(&mut Parts) -> Result<(), RunnerError>,
    ) -> Result<Build<N>, RunnerError> {
        match step(&mut self.parts) {
            Ok(()) => {
                tracing::info!("build: {} -> {}", S::NAME, N::NAME);
                Ok(Build {
                    parts: self.parts,
                    _state: PhantomData,
                })
            }
            Err(err) => {
                let released = self.parts.chain.release();
                tracing::warn!(
                    "build failed while leaving '{}': {err}; released {:?}",
                    S::NAME,
                    released
                );
                Err(err)
            }
        }
    }

    /// Returns the configuration being built.
    pub fn config(&self) -> &Config {
        &self.parts.config
    }

    /// Stages whose handles are held, in creation order.
    pub fn stages(&self) -> &[Stage] {
        self.parts.chain.stages()
    }

    /// Abandons the build, releasing every handle in reverse creation
    /// order. Returns the stages in release order.
    pub fn cancel(mut self) -> Vec<Stage> {
        let released = self.parts.chain.release();
        tracing::info!("build cancelled at '{}'", S::NAME);
        released
    }
}

impl<S: BuildState> std::fmt::Debug for Build<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Build")
            .field("state", &S::NAME)
            .field("stages", &self.parts.chain.stages())
            .field("inputs", &self.parts.inputs.len())
            .field("outputs", &self.parts.outputs.len())
            .finish()
    }
}

// ── Empty → GraphLoaded ────────────────────────────────────────

impl Build<Empty> {
    pub fn new(config: Config) -> Self {
        Self {
            parts: Parts {
                config,
                chain: HandleChain::new(),
                inputs: BTreeMap::new(),
                outputs: BTreeMap::new(),
            },
            _state: PhantomData,
        }
    }

    /// Loads the graph named by the configuration's model source.
    pub fn load_graph(self) -> Result<Build<GraphLoaded>, RunnerError> {
        self.advance(|parts| {
            let graph = match &parts.config.model {
                Some(ModelSource::Path(path)) => ModelGraph::from_path(path),
                Some(ModelSource::Bytes(bytes)) => ModelGraph::from_bytes(bytes),
                None => Err(BackendStatus::local(
                    ErrorCode::InvalidFilename,
                    "no model source configured",
                )),
            }
            .map_err(RunnerError::GraphLoad)?;
            parts.chain.set_graph(graph);
            Ok(())
        })
    }

    /// Takes ownership of an already loaded or programmatically built graph.
    /// The configuration's model source is ignored.
    pub fn with_graph(mut self, graph: ModelGraph) -> Build<GraphLoaded> {
        self.parts.chain.set_graph(graph);
        tracing::info!("build: {} -> {} (pre-built graph)", Empty::NAME, GraphLoaded::NAME);
        Build {
            parts: self.parts,
            _state: PhantomData,
        }
    }
}

// ── GraphLoaded → ProfileDeclared ──────────────────────────────

/// Rejects invalid declarations before any of them reaches the backend.
///
/// Input and output names share one namespace; a collision is an error
/// rather than a silent overwrite.
fn check_declarations(config: &Config) -> Result<(), RunnerError> {
    let mut seen = HashSet::new();
    let names = config
        .inputs
        .iter()
        .map(|i| (i.name.as_str(), i.dtype))
        .chain(config.outputs.iter().map(|o| (o.name.as_str(), o.dtype)));
    for (name, dtype) in names {
        if name.is_empty() {
            return Err(RunnerError::VariableDeclaration {
                name: String::new(),
                detail: "name is empty".into(),
            });
        }
        if !seen.insert(name) {
            return Err(RunnerError::VariableDeclaration {
                name: name.to_string(),
                detail: "declared more than once".into(),
            });
        }
        if !dtype.has_storage() {
            return Err(RunnerError::UnsupportedDtype {
                context: format!("declaration of '{name}'"),
                dtype,
            });
        }
    }
    for input in &config.inputs {
        let rank = input.dims.len();
        if rank != 2 && rank != 4 {
            return Err(RunnerError::UnsupportedRank {
                name: input.name.clone(),
                rank,
            });
        }
        let shape = Shape::from(input.dims.as_slice());
        if shape.has_zero_dim() {
            return Err(RunnerError::VariableDeclaration {
                name: input.name.clone(),
                detail: format!("dims {shape} contain a zero"),
            });
        }
    }
    Ok(())
}

fn declaration_error(name: &str, status: BackendStatus) -> RunnerError {
    RunnerError::VariableDeclaration {
        name: name.to_string(),
        detail: status.to_string(),
    }
}

impl Build<GraphLoaded> {
    /// Declares every input with its dims and every output by name.
    pub fn declare_profiles(self) -> Result<Build<ProfileDeclared>, RunnerError> {
        self.advance(|parts| {
            check_declarations(&parts.config)?;
            let builder = ProfileTableBuilder::new().map_err(RunnerError::ShapeInference)?;
            let builder = parts.chain.set_table_builder(builder);
            for input in &parts.config.inputs {
                let declared = match input.dims[..] {
                    [n, c] => builder.add_input_profile_2(&input.name, input.dtype, [n, c]),
                    [n, c, h, w] => {
                        builder.add_input_profile_4(&input.name, input.dtype, [n, c, h, w])
                    }
                    _ => {
                        return Err(RunnerError::UnsupportedRank {
                            name: input.name.clone(),
                            rank: input.dims.len(),
                        })
                    }
                };
                declared.map_err(|s| declaration_error(&input.name, s))?;
                tracing::debug!("declared input '{}' {:?}", input.name, input.dims);
            }
            for output in &parts.config.outputs {
                builder
                    .add_output_profile(&output.name, output.dtype)
                    .map_err(|s| declaration_error(&output.name, s))?;
                tracing::debug!("declared output '{}'", output.name);
            }
            Ok(())
        })
    }
}

// ── ProfileDeclared → ProfileBuilt ─────────────────────────────

fn inference_error(status: BackendStatus) -> RunnerError {
    match status.code {
        ErrorCode::DimensionMismatch => RunnerError::DimensionMismatch(status),
        ErrorCode::VariableNotFound => RunnerError::VariableNotFound(status),
        _ => RunnerError::ShapeInference(status),
    }
}

impl Build<ProfileDeclared> {
    /// Runs the backend's shape inference over the whole graph.
    pub fn build_profile_table(self) -> Result<Build<ProfileBuilt>, RunnerError> {
        self.advance(|parts| {
            let builder = held(parts.chain.table_builder(), Stage::ProfileTableBuilder)?;
            let graph = held(parts.chain.graph(), Stage::ModelGraph)?;
            let table = builder.build(graph).map_err(inference_error)?;
            parts.chain.set_table(table);
            Ok(())
        })
    }
}

// ── ProfileBuilt → BuffersAttached ─────────────────────────────

impl Build<ProfileBuilt> {
    /// Returns the declared or inferred profile of `name`.
    pub fn profile(&self, name: &str) -> Result<VariableInfo, RunnerError> {
        held(self.parts.chain.table(), Stage::ProfileTable)?
            .profile(name)
            .map_err(inference_error)
    }

    /// Prunes graph nodes that no declared output depends on.
    pub fn optimize_graph(self) -> Result<Self, RunnerError> {
        self.advance(|parts| {
            let (graph, table) = parts.chain.graph_mut_and_table();
            let graph = held(graph, Stage::ModelGraph)?;
            let table = held(table, Stage::ProfileTable)?;
            graph.optimize(table).map_err(inference_error)
        })
    }

    /// Allocates a zeroed buffer for every input (declared dims) and every
    /// from-profile output (inferred dims) and attaches it to the model
    /// builder.
    pub fn attach_buffers(self) -> Result<Build<BuffersAttached>, RunnerError> {
        self.advance(|parts| {
            let table = held(parts.chain.table(), Stage::ProfileTable)?;
            let model_builder = ModelBuilder::new(table).map_err(RunnerError::BackendCompilation)?;
            let mut attached = Vec::new();
            for input in &parts.config.inputs {
                let tensor = TypedTensor::zeros(input.dtype, Shape::new(input.dims.clone()))
                    .map_err(|e| RunnerError::from_copy(&input.name, e))?;
                attached.push((true, input.name.clone(), tensor));
            }
            for output in parts.config.outputs.iter().filter(|o| o.from_profile) {
                let info = table.profile(&output.name).map_err(|status| {
                    RunnerError::BufferAttach {
                        name: output.name.clone(),
                        status,
                    }
                })?;
                let tensor = TypedTensor::zeros(info.dtype, Shape::new(info.dims))
                    .map_err(|e| RunnerError::from_copy(&output.name, e))?;
                attached.push((false, output.name.clone(), tensor));
            }

            let model_builder = parts.chain.set_model_builder(model_builder);
            for (is_input, name, mut tensor) in attached {
                let buffer = tensor.as_mut_ptr()?;
                // SAFETY: the buffer is heap storage that never moves and is
                // owned by these parts, which release the chain (and with it
                // every model built from this builder) before dropping it.
                unsafe { model_builder.attach_external_buffer(&name, buffer) }
                    .map_err(|status| RunnerError::BufferAttach {
                        name: name.clone(),
                        status,
                    })?;
                tracing::debug!("attached {} buffer for '{name}'", tensor.shape());
                if is_input {
                    parts.inputs.insert(name, tensor);
                } else {
                    parts.outputs.insert(name, tensor);
                }
            }
            Ok(())
        })
    }
}

// ── BuffersAttached → Compiled ─────────────────────────────────

impl Build<BuffersAttached> {
    /// Compiles the graph and views every ordinary output's backend buffer.
    pub fn compile(self) -> Result<Build<Compiled>, RunnerError> {
        self.advance(|parts| {
            let model = {
                let builder = held(parts.chain.model_builder(), Stage::ModelBuilder)?;
                let graph = held(parts.chain.graph(), Stage::ModelGraph)?;
                builder
                    .build(
                        graph,
                        parts.config.backend.as_str(),
                        &parts.config.backend_config,
                    )
                    .map_err(RunnerError::BackendCompilation)?
            };
            let model: &CompiledModel = parts.chain.set_model(model);
            for output in parts.config.outputs.iter().filter(|o| !o.from_profile) {
                let info = model
                    .variable(&output.name)
                    .map_err(RunnerError::VariableNotFound)?;
                let buffer = model
                    .buffer_handle(&output.name)
                    .map_err(RunnerError::VariableNotFound)?;
                // SAFETY: the backend keeps `product(dims)` elements at
                // `buffer` alive until the compiled model is deleted, which
                // happens only after this view is dropped or never read again.
                let tensor =
                    unsafe { TypedTensor::from_foreign(info.dtype, Shape::new(info.dims), buffer) }
                        .map_err(|e| RunnerError::from_copy(&output.name, e))?;
                tracing::debug!("viewing backend buffer for '{}' {}", output.name, tensor.shape());
                parts.outputs.insert(output.name.clone(), tensor);
            }
            Ok(())
        })
    }
}

impl Build<Compiled> {
    /// Hands the compiled pipeline over to a [`Runner`].
    pub fn finish(self) -> Runner {
        let Parts {
            chain,
            inputs,
            outputs,
            ..
        } = self.parts;
        tracing::info!(
            "runner ready: {} inputs, {} outputs",
            inputs.len(),
            outputs.len()
        );
        Runner {
            chain,
            inputs,
            outputs,
            stopped: false,
        }
    }
}

// ── Runner ─────────────────────────────────────────────────────

/// A compiled model together with the buffers bound to it.
///
/// A runner is `Send` but not `Sync`: independent runners may live on
/// separate threads, while one runner must not be shared without external
/// serialisation. Output tensors borrow from the runner, so none of them
/// can outlive [`stop`](Runner::stop).
#[derive(Debug)]
pub struct Runner {
    chain: HandleChain,
    inputs: BTreeMap<String, TypedTensor>,
    outputs: BTreeMap<String, TypedTensor>,
    stopped: bool,
}

impl Runner {
    /// Runs the whole build pipeline for `config`.
    pub fn build(config: Config) -> Result<Self, RunnerError> {
        Ok(Build::new(config)
            .load_graph()?
            .declare_profiles()?
            .build_profile_table()?
            .attach_buffers()?
            .compile()?
            .finish())
    }

    /// Runs the build pipeline over a graph built or loaded by the caller.
    /// The runner takes ownership of the graph.
    pub fn build_with_graph(graph: ModelGraph, config: Config) -> Result<Self, RunnerError> {
        Ok(Build::new(config)
            .with_graph(graph)
            .declare_profiles()?
            .build_profile_table()?
            .attach_buffers()?
            .compile()?
            .finish())
    }

    /// Returns the attached input tensor `name`.
    pub fn get_input(&self, name: &str) -> Result<&TypedTensor, RunnerError> {
        self.inputs
            .get(name)
            .ok_or_else(|| RunnerError::NotAttached(name.to_string()))
    }

    /// Returns write access to the attached input tensor `name`, for
    /// filling it in place before `run(&Updates::new())`.
    pub fn get_input_mut(&mut self, name: &str) -> Result<AttachedInput<'_>, RunnerError> {
        let tensor = self
            .inputs
            .get_mut(name)
            .ok_or_else(|| RunnerError::NotAttached(name.to_string()))?;
        Ok(AttachedInput {
            name: name.to_string(),
            tensor,
        })
    }

    /// Copies every update into its attached input, then executes once.
    ///
    /// All updates are checked before any is copied, so a rejected call
    /// leaves every input untouched. Only dtype and element count must
    /// match; dims may differ.
    pub fn run(&mut self, updates: &Updates) -> Result<(), RunnerError> {
        self.apply(updates.iter().map(|(name, tensor)| (name.as_str(), tensor)))
    }

    /// Shorthand for a run with a single update.
    pub fn run_with_tensor(&mut self, name: &str, tensor: &TypedTensor) -> Result<(), RunnerError> {
        self.apply(std::iter::once((name, tensor)))
    }

    fn apply<'a, I>(&mut self, updates: I) -> Result<(), RunnerError>
    where
        I: Iterator<Item = (&'a str, &'a TypedTensor)> + Clone,
    {
        if self.stopped {
            return Err(RunnerError::Stopped);
        }
        for (name, src) in updates.clone() {
            let dst = self
                .inputs
                .get(name)
                .ok_or_else(|| RunnerError::NotAttached(name.to_string()))?;
            src.check_copy_into(dst)
                .map_err(|e| RunnerError::from_copy(name, e))?;
        }
        let mut copied = 0usize;
        for (name, src) in updates {
            if let Some(dst) = self.inputs.get_mut(name) {
                src.copy_into(dst)
                    .map_err(|e| RunnerError::from_copy(name, e))?;
                copied += 1;
            }
        }
        let model = held(self.chain.model_mut(), Stage::CompiledModel)?;
        model.run().map_err(RunnerError::Execution)?;
        tracing::debug!("run complete ({copied} inputs updated)");
        Ok(())
    }

    /// Returns the output tensor `name`.
    pub fn get_output(&self, name: &str) -> Result<&TypedTensor, RunnerError> {
        self.outputs
            .get(name)
            .ok_or_else(|| RunnerError::VariableNotRegistered(name.to_string()))
    }

    /// Every output tensor, keyed by name.
    pub fn outputs(&self) -> &BTreeMap<String, TypedTensor> {
        &self.outputs
    }

    /// Names of the attached inputs.
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Stages whose handles are still held, in creation order.
    pub fn stages(&self) -> &[Stage] {
        self.chain.stages()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Releases every native handle in reverse creation order and drops all
    /// buffers. Returns the released stages; a second call returns none.
    pub fn stop(&mut self) -> Vec<Stage> {
        if self.stopped {
            return Vec::new();
        }
        self.stopped = true;
        let inputs = std::mem::take(&mut self.inputs);
        let outputs = std::mem::take(&mut self.outputs);
        let released = self.chain.release();
        drop(outputs);
        drop(inputs);
        tracing::info!("runner stopped, released {:?}", released);
        released
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Attached input ─────────────────────────────────────────────

/// Write access to one attached input.
///
/// The tensor's storage stays bound to the compiled model, so it can be
/// written but never replaced.
#[derive(Debug)]
pub struct AttachedInput<'r> {
    name: String,
    tensor: &'r mut TypedTensor,
}

impl AttachedInput<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes one element; `index` is bounds-checked.
    pub fn write_f32(&mut self, index: usize, value: f32) -> Result<(), RunnerError> {
        Ok(self.tensor.write_f32(index, value)?)
    }

    pub fn as_f32_slice_mut(&mut self) -> Result<&mut [f32], RunnerError> {
        Ok(self.tensor.as_f32_slice_mut()?)
    }

    /// Copies `src` in, with the same checks as [`Runner::run`].
    pub fn copy_from(&mut self, src: &TypedTensor) -> Result<(), RunnerError> {
        src.copy_into(self.tensor)
            .map_err(|e| RunnerError::from_copy(&self.name, e))
    }
}

impl Deref for AttachedInput<'_> {
    type Target = TypedTensor;

    fn deref(&self) -> &TypedTensor {
        self.tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputSpec;
    use tensor_core::DType;

    fn relu_config() -> Config {
        Config::default().with_input("x", &[1, 4]).with_output("y")
    }

    fn relu_graph() -> ModelGraph {
        let mut graph = ModelGraph::empty().unwrap();
        graph
            .add_node("Relu")
            .unwrap()
            .input("x")
            .unwrap()
            .output("y")
            .unwrap();
        graph
    }

    #[test]
    fn test_check_declarations_rejects_collisions() {
        let config = Config::default().with_input("x", &[1, 2]).with_output("x");
        let err = check_declarations(&config).unwrap_err();
        assert!(matches!(err, RunnerError::VariableDeclaration { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_check_declarations_rank_and_dtype() {
        let config = Config::default().with_input("x", &[3]);
        assert!(matches!(
            check_declarations(&config),
            Err(RunnerError::UnsupportedRank { rank: 1, .. })
        ));

        let mut config = Config::default();
        config.inputs.push(InputSpec {
            name: "x".into(),
            dtype: DType::I8,
            dims: vec![1, 2],
        });
        assert!(matches!(
            check_declarations(&config),
            Err(RunnerError::UnsupportedDtype { dtype: DType::I8, .. })
        ));

        let config = Config::default().with_input("x", &[1, 0]);
        assert!(matches!(
            check_declarations(&config),
            Err(RunnerError::VariableDeclaration { ref detail, .. })
                if detail == "dims [1, 0] contain a zero"
        ));
    }

    #[test]
    fn test_stage_by_stage() {
        let build = Build::new(relu_config()).with_graph(relu_graph());
        assert_eq!(build.stages(), &[Stage::ModelGraph]);
        let build = build.declare_profiles().unwrap();
        let build = build.build_profile_table().unwrap();
        assert_eq!(build.profile("y").unwrap().dims, vec![1, 4]);
        let build = build.attach_buffers().unwrap();
        let build = build.compile().unwrap();
        assert_eq!(
            build.stages(),
            &[
                Stage::ModelGraph,
                Stage::ProfileTableBuilder,
                Stage::ProfileTable,
                Stage::ModelBuilder,
                Stage::CompiledModel,
            ]
        );
        let mut runner = build.finish();
        let x = TypedTensor::from_f32(Shape::matrix(1, 4), &[-1.0, 2.0, -3.0, 4.0]).unwrap();
        runner.run_with_tensor("x", &x).unwrap();
        assert_eq!(
            runner.get_output("y").unwrap().as_f32_slice().unwrap(),
            &[0.0, 2.0, 0.0, 4.0]
        );
    }

    #[test]
    fn test_cancel_releases_in_reverse() {
        let build = Build::new(relu_config())
            .with_graph(relu_graph())
            .declare_profiles()
            .unwrap()
            .build_profile_table()
            .unwrap();
        assert_eq!(
            build.cancel(),
            vec![Stage::ProfileTable, Stage::ProfileTableBuilder, Stage::ModelGraph]
        );
    }

    #[test]
    fn test_missing_model_source() {
        let err = Build::new(relu_config()).load_graph().unwrap_err();
        match err {
            RunnerError::GraphLoad(status) => assert_eq!(status.code, ErrorCode::InvalidFilename),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_optimize_graph_keeps_requested_outputs() {
        let mut graph = relu_graph();
        graph
            .add_node("Sigmoid")
            .unwrap()
            .input("x")
            .unwrap()
            .output("unused")
            .unwrap();
        let mut runner = Build::new(relu_config())
            .with_graph(graph)
            .declare_profiles()
            .unwrap()
            .build_profile_table()
            .unwrap()
            .optimize_graph()
            .unwrap()
            .attach_buffers()
            .unwrap()
            .compile()
            .unwrap()
            .finish();
        runner.run(&Updates::new()).unwrap();
        assert_eq!(runner.get_output("y").unwrap().len(), 4);
    }

    #[test]
    fn test_runner_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Runner>();
    }
}
