// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Safe owners of the backend's native handles.
//!
//! Each wrapper owns exactly one handle and deletes it on drop. Every
//! backend call is checked as soon as it returns; on failure the
//! process-wide error message is copied out before anything else can run.

use crate::BackendStatus;
use cpu_backend::api::{self as native, Dtype, DTYPE_FLOAT};
use cpu_backend::ErrorCode;
use std::ffi::{c_int, c_void, CString};
use std::path::Path;
use std::ptr::{self, NonNull};
use tensor_core::{DType, TypedTensor};

// ── Call plumbing ──────────────────────────────────────────────

/// Reads a NUL-terminated message through `read`, which fills the buffer
/// and returns the full message length. A truncated first read is retried
/// once with a buffer of the reported size.
fn read_message(mut read: impl FnMut(&mut [u8]) -> usize) -> String {
    let mut buf = vec![0u8; 256];
    let mut len = read(&mut buf);
    if len >= buf.len() {
        buf = vec![0u8; len + 1];
        // The message may have changed in between; keep what was copied.
        len = read(&mut buf).min(buf.len() - 1);
    }
    buf.truncate(len);
    String::from_utf8_lossy(&buf).into_owned()
}

fn last_error_message() -> String {
    read_message(|buf| {
        // SAFETY: `buf` is valid for `buf.len()` bytes.
        unsafe { native::cpurt_get_last_error_message(buf.as_mut_ptr().cast(), buf.len()) }
    })
}

fn check(code: ErrorCode) -> Result<(), BackendStatus> {
    if code.is_success() {
        Ok(())
    } else {
        Err(BackendStatus {
            code,
            message: last_error_message(),
        })
    }
}

fn c_name(name: &str) -> Result<CString, BackendStatus> {
    CString::new(name).map_err(|_| {
        BackendStatus::local(
            ErrorCode::StdError,
            format!("name {name:?} contains a NUL byte"),
        )
    })
}

fn c_dim(name: &str, dim: usize) -> Result<c_int, BackendStatus> {
    c_int::try_from(dim).map_err(|_| {
        BackendStatus::local(
            ErrorCode::DimensionMismatch,
            format!("dimension {dim} of '{name}' does not fit a C int"),
        )
    })
}

fn dtype_code(dtype: DType) -> Result<Dtype, BackendStatus> {
    match dtype {
        DType::F32 => Ok(DTYPE_FLOAT),
        other => Err(BackendStatus::local(
            ErrorCode::InvalidDtype,
            format!("{other} has no backend code"),
        )),
    }
}

fn dtype_from_code(code: Dtype) -> Result<DType, BackendStatus> {
    match code {
        DTYPE_FLOAT => Ok(DType::F32),
        other => Err(BackendStatus::local(
            ErrorCode::InvalidDtype,
            format!("unknown backend dtype code {other}"),
        )),
    }
}

/// Runs a `make`/`build` call and takes ownership of the handle it writes.
fn make<T>(call: impl FnOnce(*mut *mut T) -> ErrorCode) -> Result<NonNull<T>, BackendStatus> {
    let mut raw: *mut T = ptr::null_mut();
    check(call(&mut raw))?;
    NonNull::new(raw).ok_or_else(|| {
        BackendStatus::local(ErrorCode::UnknownError, "backend returned a null handle")
    })
}

/// Inferred element type and dimensions of a named variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub dtype: DType,
    pub dims: Vec<usize>,
}

/// Reads dtype and dims through a table-like handle's three getters.
fn variable_info<H: Copy>(
    handle: H,
    name: &str,
    get_dtype: unsafe extern "C" fn(H, *const std::ffi::c_char, *mut Dtype) -> ErrorCode,
    get_rank: unsafe extern "C" fn(H, *const std::ffi::c_char, *mut c_int) -> ErrorCode,
    get_dim: unsafe extern "C" fn(H, *const std::ffi::c_char, c_int, *mut c_int) -> ErrorCode,
) -> Result<VariableInfo, BackendStatus> {
    let cname = c_name(name)?;
    let mut code: Dtype = -1;
    let mut rank: c_int = 0;
    // SAFETY: `handle` is live for the caller's borrow; out pointers are locals.
    unsafe {
        check(get_dtype(handle, cname.as_ptr(), &mut code))?;
        check(get_rank(handle, cname.as_ptr(), &mut rank))?;
    }
    let negative = |what: &str, value: c_int| {
        BackendStatus::local(
            ErrorCode::DimensionMismatch,
            format!("backend reported {what} {value} for '{name}'"),
        )
    };
    let mut dims = Vec::with_capacity(usize::try_from(rank).map_err(|_| negative("rank", rank))?);
    for i in 0..rank {
        let mut d: c_int = 0;
        // SAFETY: as above.
        unsafe { check(get_dim(handle, cname.as_ptr(), i, &mut d))? };
        dims.push(usize::try_from(d).map_err(|_| negative("dimension", d))?);
    }
    Ok(VariableInfo {
        dtype: dtype_from_code(code)?,
        dims,
    })
}

// ── Model graph ────────────────────────────────────────────────

/// A parsed or programmatically built graph, owned by the backend.
pub struct ModelGraph {
    raw: NonNull<cpu_backend::ModelData>,
}

// SAFETY: the handle is exclusively owned and the backend keeps no
// thread-affine state in it.
unsafe impl Send for ModelGraph {}

impl ModelGraph {
    /// Loads an ONNX file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BackendStatus> {
        let path = path.as_ref();
        let cpath = path
            .to_str()
            .ok_or_else(|| {
                BackendStatus::local(
                    ErrorCode::InvalidFilename,
                    format!("path {} is not valid UTF-8", path.display()),
                )
            })
            .and_then(c_name)?;
        // SAFETY: `cpath` outlives the call.
        let raw = make(|out| unsafe { native::cpurt_make_model_data_from_onnx(cpath.as_ptr(), out) })?;
        tracing::debug!("loaded graph from {}", path.display());
        Ok(Self { raw })
    }

    /// Decodes ONNX bytes held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BackendStatus> {
        // SAFETY: `bytes` is valid for `bytes.len()` reads during the call.
        let raw = make(|out| unsafe {
            native::cpurt_make_model_data_from_onnx_data_on_memory(bytes.as_ptr(), bytes.len(), out)
        })?;
        tracing::debug!("decoded graph from {} bytes", bytes.len());
        Ok(Self { raw })
    }

    /// Creates a graph with no nodes, for programmatic construction.
    pub fn empty() -> Result<Self, BackendStatus> {
        // SAFETY: `out` is a local.
        let raw = make(|out| unsafe { native::cpurt_make_model_data(out) })?;
        Ok(Self { raw })
    }

    /// Adds a constant parameter; the backend copies `tensor`'s data.
    pub fn add_parameter(&mut self, name: &str, tensor: &TypedTensor) -> Result<(), BackendStatus> {
        let cname = c_name(name)?;
        let dims = tensor
            .dims()
            .iter()
            .map(|&d| c_dim(name, d))
            .collect::<Result<Vec<_>, _>>()?;
        let rank = c_dim(name, dims.len())?;
        let code = dtype_code(tensor.dtype())?;
        // SAFETY: `dims` holds `rank` entries and `tensor` holds
        // `product(dims)` elements, both alive for the call.
        check(unsafe {
            native::cpurt_model_data_add_parameter(
                self.raw.as_ptr(),
                cname.as_ptr(),
                code,
                rank,
                dims.as_ptr(),
                tensor.as_ptr(),
            )
        })
    }

    /// Appends a node and returns a builder for its inputs, outputs and
    /// attributes.
    pub fn add_node(&mut self, op_type: &str) -> Result<NodeBuilder<'_>, BackendStatus> {
        let cop = c_name(op_type)?;
        // SAFETY: live handle, NUL-terminated op name.
        check(unsafe { native::cpurt_model_data_add_new_node(self.raw.as_ptr(), cop.as_ptr()) })?;
        Ok(NodeBuilder { graph: self })
    }

    /// Drops every node that does not contribute to the outputs declared in
    /// `table`.
    pub fn optimize(&mut self, table: &ProfileTable) -> Result<(), BackendStatus> {
        // SAFETY: both handles are live.
        check(unsafe { native::cpurt_model_data_optimize(self.raw.as_ptr(), table.raw.as_ptr()) })
    }

    pub(crate) fn as_raw(&self) -> native::ModelDataHandle {
        self.raw.as_ptr()
    }
}

impl Drop for ModelGraph {
    fn drop(&mut self) {
        // SAFETY: the handle was created by the backend and is deleted once.
        unsafe { native::cpurt_delete_model_data(self.raw.as_ptr()) };
    }
}

/// Adds names and attributes to the node most recently added to a
/// [`ModelGraph`].
pub struct NodeBuilder<'g> {
    graph: &'g mut ModelGraph,
}

impl NodeBuilder<'_> {
    fn raw(&self) -> native::ModelDataHandle {
        self.graph.as_raw()
    }

    pub fn input(self, name: &str) -> Result<Self, BackendStatus> {
        let cname = c_name(name)?;
        // SAFETY: live handle, NUL-terminated name.
        check(unsafe {
            native::cpurt_model_data_add_input_name_to_current_node(self.raw(), cname.as_ptr())
        })?;
        Ok(self)
    }

    pub fn output(self, name: &str) -> Result<Self, BackendStatus> {
        let cname = c_name(name)?;
        // SAFETY: live handle, NUL-terminated name.
        check(unsafe {
            native::cpurt_model_data_add_output_name_to_current_node(self.raw(), cname.as_ptr())
        })?;
        Ok(self)
    }

    pub fn attr_int(self, name: &str, value: i64) -> Result<Self, BackendStatus> {
        let cname = c_name(name)?;
        // SAFETY: live handle, NUL-terminated name.
        check(unsafe {
            native::cpurt_model_data_add_attribute_int_to_current_node(
                self.raw(),
                cname.as_ptr(),
                value,
            )
        })?;
        Ok(self)
    }

    pub fn attr_float(self, name: &str, value: f32) -> Result<Self, BackendStatus> {
        let cname = c_name(name)?;
        // SAFETY: live handle, NUL-terminated name.
        check(unsafe {
            native::cpurt_model_data_add_attribute_float_to_current_node(
                self.raw(),
                cname.as_ptr(),
                value,
            )
        })?;
        Ok(self)
    }

    pub fn attr_ints(self, name: &str, values: &[i64]) -> Result<Self, BackendStatus> {
        let cname = c_name(name)?;
        let len = c_dim(name, values.len())?;
        // SAFETY: `values` holds `len` entries for the duration of the call.
        check(unsafe {
            native::cpurt_model_data_add_attribute_ints_to_current_node(
                self.raw(),
                cname.as_ptr(),
                len,
                values.as_ptr(),
            )
        })?;
        Ok(self)
    }

    pub fn attr_floats(self, name: &str, values: &[f32]) -> Result<Self, BackendStatus> {
        let cname = c_name(name)?;
        let len = c_dim(name, values.len())?;
        // SAFETY: `values` holds `len` entries for the duration of the call.
        check(unsafe {
            native::cpurt_model_data_add_attribute_floats_to_current_node(
                self.raw(),
                cname.as_ptr(),
                len,
                values.as_ptr(),
            )
        })?;
        Ok(self)
    }
}

// ── Profile table builder ──────────────────────────────────────

/// Collects input and output declarations before shape inference.
pub struct ProfileTableBuilder {
    raw: NonNull<cpu_backend::ProfileTableBuilder>,
}

// SAFETY: see `ModelGraph`.
unsafe impl Send for ProfileTableBuilder {}

impl ProfileTableBuilder {
    pub fn new() -> Result<Self, BackendStatus> {
        // SAFETY: `out` is a local.
        let raw = make(|out| unsafe { native::cpurt_make_variable_profile_table_builder(out) })?;
        Ok(Self { raw })
    }

    /// Declares a rank-2 input.
    pub fn add_input_profile_2(
        &mut self,
        name: &str,
        dtype: DType,
        dims: [usize; 2],
    ) -> Result<(), BackendStatus> {
        let cname = c_name(name)?;
        let code = dtype_code(dtype)?;
        let [n, c] = dims;
        let (n, c) = (c_dim(name, n)?, c_dim(name, c)?);
        // SAFETY: live handle, NUL-terminated name.
        check(unsafe {
            native::cpurt_variable_profile_table_builder_add_input_profile_dims_2(
                self.raw.as_ptr(),
                cname.as_ptr(),
                code,
                n,
                c,
            )
        })
    }

    /// Declares a rank-4 (NCHW) input.
    pub fn add_input_profile_4(
        &mut self,
        name: &str,
        dtype: DType,
        dims: [usize; 4],
    ) -> Result<(), BackendStatus> {
        let cname = c_name(name)?;
        let code = dtype_code(dtype)?;
        let [n, c, h, w] = dims;
        let (n, c, h, w) = (
            c_dim(name, n)?,
            c_dim(name, c)?,
            c_dim(name, h)?,
            c_dim(name, w)?,
        );
        // SAFETY: live handle, NUL-terminated name.
        check(unsafe {
            native::cpurt_variable_profile_table_builder_add_input_profile_dims_4(
                self.raw.as_ptr(),
                cname.as_ptr(),
                code,
                n,
                c,
                h,
                w,
            )
        })
    }

    /// Requests an output; its dims come from shape inference.
    pub fn add_output_profile(&mut self, name: &str, dtype: DType) -> Result<(), BackendStatus> {
        let cname = c_name(name)?;
        let code = dtype_code(dtype)?;
        // SAFETY: live handle, NUL-terminated name.
        check(unsafe {
            native::cpurt_variable_profile_table_builder_add_output_profile(
                self.raw.as_ptr(),
                cname.as_ptr(),
                code,
            )
        })
    }

    /// Runs shape inference over `graph`.
    pub fn build(&self, graph: &ModelGraph) -> Result<ProfileTable, BackendStatus> {
        // SAFETY: both handles are live; `out` is a local.
        let raw = make(|out| unsafe {
            native::cpurt_build_variable_profile_table(self.raw.as_ptr(), graph.as_raw(), out)
        })?;
        Ok(ProfileTable { raw })
    }
}

impl Drop for ProfileTableBuilder {
    fn drop(&mut self) {
        // SAFETY: created by the backend, deleted once.
        unsafe { native::cpurt_delete_variable_profile_table_builder(self.raw.as_ptr()) };
    }
}

// ── Profile table ──────────────────────────────────────────────

/// Declared and inferred profiles, the result of shape inference.
pub struct ProfileTable {
    raw: NonNull<cpu_backend::ProfileTable>,
}

// SAFETY: see `ModelGraph`.
unsafe impl Send for ProfileTable {}

impl ProfileTable {
    /// Returns the profile of `name`.
    pub fn profile(&self, name: &str) -> Result<VariableInfo, BackendStatus> {
        variable_info(
            self.raw.as_ptr(),
            name,
            native::cpurt_variable_profile_table_get_dtype,
            native::cpurt_variable_profile_table_get_dims_size,
            native::cpurt_variable_profile_table_get_dims_at,
        )
    }
}

impl Drop for ProfileTable {
    fn drop(&mut self) {
        // SAFETY: created by the backend, deleted once.
        unsafe { native::cpurt_delete_variable_profile_table(self.raw.as_ptr()) };
    }
}

// ── Model builder ──────────────────────────────────────────────

/// Binds caller-owned buffers to variables before compilation.
pub struct ModelBuilder {
    raw: NonNull<cpu_backend::ModelBuilder>,
}

// SAFETY: see `ModelGraph`.
unsafe impl Send for ModelBuilder {}

impl ModelBuilder {
    pub fn new(table: &ProfileTable) -> Result<Self, BackendStatus> {
        // SAFETY: live table handle; `out` is a local.
        let raw = make(|out| unsafe { native::cpurt_make_model_builder(table.raw.as_ptr(), out) })?;
        Ok(Self { raw })
    }

    /// Attaches `buffer` as the storage of `name`.
    ///
    /// # Safety
    /// `buffer` must hold as many elements as the profile of `name` and
    /// stay valid, without moving, for the lifetime of every model built
    /// from this builder.
    pub unsafe fn attach_external_buffer(
        &mut self,
        name: &str,
        buffer: *mut c_void,
    ) -> Result<(), BackendStatus> {
        let cname = c_name(name)?;
        check(native::cpurt_model_builder_attach_external_buffer(
            self.raw.as_ptr(),
            cname.as_ptr(),
            buffer,
        ))
    }

    /// Compiles `graph` for `backend_name` with its opaque configuration.
    pub fn build(
        &self,
        graph: &ModelGraph,
        backend_name: &str,
        backend_config: &str,
    ) -> Result<CompiledModel, BackendStatus> {
        let cname = c_name(backend_name)?;
        let cconfig = c_name(backend_config)?;
        // SAFETY: both handles are live; attached buffers are the caller's
        // responsibility per `attach_external_buffer`.
        let raw = make(|out| unsafe {
            native::cpurt_build_model(
                self.raw.as_ptr(),
                graph.as_raw(),
                cname.as_ptr(),
                cconfig.as_ptr(),
                out,
            )
        })?;
        Ok(CompiledModel { raw })
    }
}

impl Drop for ModelBuilder {
    fn drop(&mut self) {
        // SAFETY: created by the backend, deleted once.
        unsafe { native::cpurt_delete_model_builder(self.raw.as_ptr()) };
    }
}

// ── Compiled model ─────────────────────────────────────────────

/// The executable artifact.
pub struct CompiledModel {
    raw: NonNull<cpu_backend::Model>,
}

// SAFETY: see `ModelGraph`.
unsafe impl Send for CompiledModel {}

impl CompiledModel {
    /// Returns the inferred profile of `name`.
    pub fn variable(&self, name: &str) -> Result<VariableInfo, BackendStatus> {
        variable_info(
            self.raw.as_ptr(),
            name,
            native::cpurt_model_get_variable_dtype,
            native::cpurt_model_get_variable_dims_size,
            native::cpurt_model_get_variable_dims_at,
        )
    }

    /// Returns the address of the buffer backing `name`.
    pub fn buffer_handle(&self, name: &str) -> Result<*mut c_void, BackendStatus> {
        let cname = c_name(name)?;
        let mut buffer: *mut c_void = ptr::null_mut();
        // SAFETY: live handle; `buffer` is a local.
        check(unsafe {
            native::cpurt_model_get_variable_buffer_handle(
                self.raw.as_ptr(),
                cname.as_ptr(),
                &mut buffer,
            )
        })?;
        Ok(buffer)
    }

    /// Executes the graph once, synchronously.
    pub fn run(&mut self) -> Result<(), BackendStatus> {
        // SAFETY: live handle, exclusively borrowed.
        check(unsafe { native::cpurt_model_run(self.raw.as_ptr()) })
    }
}

impl Drop for CompiledModel {
    fn drop(&mut self) {
        // SAFETY: created by the backend, deleted once.
        unsafe { native::cpurt_delete_model(self.raw.as_ptr()) };
    }
}

macro_rules! opaque_debug {
    ($($ty:ident),*) => {
        $(impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty)).field("raw", &self.raw).finish()
            }
        })*
    };
}

opaque_debug!(ModelGraph, ProfileTableBuilder, ProfileTable, ModelBuilder, CompiledModel);

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::Shape;

    fn identity_graph() -> ModelGraph {
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

    /// Mimics the backend's copy-out contract for a sequence of messages.
    fn scripted_reader(messages: &[&str]) -> impl FnMut(&mut [u8]) -> usize {
        let mut messages: Vec<String> = messages.iter().map(|m| m.to_string()).collect();
        messages.reverse();
        move |buf: &mut [u8]| {
            let message = messages.pop().unwrap();
            let n = message.len().min(buf.len() - 1);
            buf[..n].copy_from_slice(&message.as_bytes()[..n]);
            buf[n] = 0;
            message.len()
        }
    }

    #[test]
    fn test_message_read_follows_second_length() {
        let long = "x".repeat(300);
        assert_eq!(read_message(scripted_reader(&[&long, "short"])), "short");

        let longer = "y".repeat(400);
        let read = read_message(scripted_reader(&[&long, &longer]));
        assert_eq!(read, "y".repeat(300));
        assert!(!read.contains('\0'));

        assert_eq!(read_message(scripted_reader(&["fits"])), "fits");
    }

    unsafe extern "C" fn fake_dtype(
        _: usize,
        _: *const std::ffi::c_char,
        out: *mut Dtype,
    ) -> ErrorCode {
        *out = DTYPE_FLOAT;
        ErrorCode::Success
    }

    unsafe extern "C" fn fake_rank(
        _: usize,
        _: *const std::ffi::c_char,
        out: *mut c_int,
    ) -> ErrorCode {
        *out = 2;
        ErrorCode::Success
    }

    unsafe extern "C" fn fake_dim(
        _: usize,
        _: *const std::ffi::c_char,
        index: c_int,
        out: *mut c_int,
    ) -> ErrorCode {
        *out = if index == 0 { 1 } else { -3 };
        ErrorCode::Success
    }

    #[test]
    fn test_negative_dim_is_reported() {
        let err = variable_info(0usize, "y", fake_dtype, fake_rank, fake_dim).unwrap_err();
        assert_eq!(err.code, ErrorCode::DimensionMismatch);
        assert!(err.message.contains("-3"), "{}", err.message);
    }

    #[test]
    fn test_failed_call_snapshots_message() {
        let err = ModelGraph::from_path("/definitely/not/here.onnx").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFilename);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_interior_nul_rejected_locally() {
        let mut graph = ModelGraph::empty().unwrap();
        let err = graph.add_node("Re\0lu").err().unwrap();
        assert_eq!(err.code, ErrorCode::StdError);
    }

    #[test]
    fn test_profile_roundtrip() {
        let graph = identity_graph();
        let mut builder = ProfileTableBuilder::new().unwrap();
        builder.add_input_profile_4("x", DType::F32, [1, 2, 3, 4]).unwrap();
        builder.add_output_profile("y", DType::F32).unwrap();
        let table = builder.build(&graph).unwrap();
        let y = table.profile("y").unwrap();
        assert_eq!(y.dtype, DType::F32);
        assert_eq!(y.dims, vec![1, 2, 3, 4]);
        assert_eq!(table.profile("z").unwrap_err().code, ErrorCode::VariableNotFound);
    }

    #[test]
    fn test_unsupported_dtype_never_reaches_backend() {
        let mut builder = ProfileTableBuilder::new().unwrap();
        let err = builder.add_output_profile("y", DType::F16).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDtype);
    }

    #[test]
    fn test_compile_and_run() {
        let mut graph = ModelGraph::empty().unwrap();
        let bias = TypedTensor::from_f32(Shape::matrix(1, 2), &[1.0, -5.0]).unwrap();
        graph.add_parameter("b", &bias).unwrap();
        graph
            .add_node("Add")
            .unwrap()
            .input("x")
            .unwrap()
            .input("b")
            .unwrap()
            .output("y")
            .unwrap();

        let mut builder = ProfileTableBuilder::new().unwrap();
        builder.add_input_profile_2("x", DType::F32, [1, 2]).unwrap();
        builder.add_output_profile("y", DType::F32).unwrap();
        let table = builder.build(&graph).unwrap();

        let mut x = TypedTensor::from_f32(Shape::matrix(1, 2), &[2.0, 3.0]).unwrap();
        let mut model_builder = ModelBuilder::new(&table).unwrap();
        unsafe {
            model_builder
                .attach_external_buffer("x", x.as_mut_ptr().unwrap())
                .unwrap();
        }
        let mut model = model_builder.build(&graph, "cpu", "").unwrap();
        model.run().unwrap();

        let info = model.variable("y").unwrap();
        assert_eq!(info.dims, vec![1, 2]);
        let y = unsafe {
            TypedTensor::from_foreign(info.dtype, Shape::new(info.dims), model.buffer_handle("y").unwrap())
        }
        .unwrap();
        assert_eq!(y.as_f32_slice().unwrap(), &[3.0, -2.0]);
    }
}
