// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Exported C ABI.
//!
//! Every `make`/`build` function writes a new handle through its `out`
//! pointer; the matching `delete` function releases it and accepts null.
//! Every other function returns an [`ErrorCode`]. On failure the message is
//! available through [`cpurt_get_last_error_message`]; it is shared by the
//! whole process, so concurrent callers may see each other's messages.

use crate::error::guarded;
use crate::{
    last_error_message, BackendError, ErrorCode, Model, ModelBuilder, ModelData, ProfileTable,
    ProfileTableBuilder,
};
use model_ir::Attribute;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::Path;
use tensor_core::DType;

/// Element type code used across the C ABI.
pub type Dtype = c_int;

/// 32-bit float, the only element type with storage.
pub const DTYPE_FLOAT: Dtype = 0;

pub type ModelDataHandle = *mut ModelData;
pub type ProfileTableBuilderHandle = *mut ProfileTableBuilder;
pub type ProfileTableHandle = *mut ProfileTable;
pub type ModelBuilderHandle = *mut ModelBuilder;
pub type ModelHandle = *mut Model;

// ── Argument helpers ───────────────────────────────────────────────

unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, BackendError> {
    if ptr.is_null() {
        return Err(BackendError::InvalidArgument(format!("{what} is null")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| BackendError::InvalidArgument(format!("{what} is not valid UTF-8")))
}

unsafe fn handle<'a, T>(ptr: *mut T, what: &str) -> Result<&'a mut T, BackendError> {
    ptr.as_mut()
        .ok_or_else(|| BackendError::InvalidArgument(format!("{what} handle is null")))
}

unsafe fn write_out<T>(out: *mut T, value: T) -> Result<(), BackendError> {
    if out.is_null() {
        return Err(BackendError::InvalidArgument("output pointer is null".into()));
    }
    out.write(value);
    Ok(())
}

unsafe fn c_slice<'a, T>(ptr: *const T, len: c_int, what: &str) -> Result<&'a [T], BackendError> {
    let len = usize::try_from(len)
        .map_err(|_| BackendError::InvalidArgument(format!("{what} has negative length")))?;
    raw_slice(ptr, len, what)
}

unsafe fn raw_slice<'a, T>(ptr: *const T, len: usize, what: &str) -> Result<&'a [T], BackendError> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(BackendError::InvalidArgument(format!("{what} is null")));
    }
    Ok(std::slice::from_raw_parts(ptr, len))
}

fn dtype_from_code(code: Dtype) -> Result<DType, BackendError> {
    match code {
        DTYPE_FLOAT => Ok(DType::F32),
        other => Err(BackendError::InvalidDtype(format!("dtype code {other}"))),
    }
}

fn dtype_to_code(dtype: DType) -> Result<Dtype, BackendError> {
    match dtype {
        DType::F32 => Ok(DTYPE_FLOAT),
        other => Err(BackendError::InvalidDtype(other.to_string())),
    }
}

fn dims_from_c(name: &str, dims: &[c_int]) -> Result<Vec<usize>, BackendError> {
    dims.iter()
        .map(|&d| {
            usize::try_from(d).ok().filter(|&d| d > 0).ok_or_else(|| {
                BackendError::DimensionMismatch(format!("'{name}' has non-positive dim {d}"))
            })
        })
        .collect()
}

fn dim_to_c(dims: &[usize], index: c_int) -> Result<c_int, BackendError> {
    let d = usize::try_from(index)
        .ok()
        .and_then(|i| dims.get(i))
        .ok_or_else(|| {
            BackendError::IndexOutOfRange(format!("index {index} for rank {}", dims.len()))
        })?;
    c_int::try_from(*d).map_err(|_| BackendError::Backend(format!("dim {d} overflows c_int")))
}

fn rank_to_c(dims: &[usize]) -> c_int {
    dims.len() as c_int
}

// ── Error message ──────────────────────────────────────────────────

/// Copies the last error message into `buf` as a NUL-terminated string,
/// truncated to `capacity - 1` bytes, and returns the full message length.
///
/// A return value `>= capacity` means the message was truncated.
///
/// # Safety
/// `buf` must be null or valid for writes of `capacity` bytes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_get_last_error_message(buf: *mut c_char, capacity: usize) -> usize {
    let message = last_error_message();
    let bytes = message.as_bytes();
    if !buf.is_null() && capacity > 0 {
        let n = bytes.len().min(capacity - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), n);
        *buf.add(n) = 0;
    }
    bytes.len()
}

// ── Model data ─────────────────────────────────────────────────────

/// Creates model data with no nodes.
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_make_model_data(out: *mut ModelDataHandle) -> ErrorCode {
    guarded("cpurt_make_model_data", || {
        write_out(out, Box::into_raw(Box::new(ModelData::empty())))
    })
}

/// Loads model data from an ONNX file.
///
/// # Safety
/// `path` must be null or a NUL-terminated string; `out` must be valid for
/// writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_make_model_data_from_onnx(
    path: *const c_char,
    out: *mut ModelDataHandle,
) -> ErrorCode {
    guarded("cpurt_make_model_data_from_onnx", || {
        let path = c_str(path, "path").map_err(|e| BackendError::InvalidFilename(e.to_string()))?;
        let md = ModelData::from_path(Path::new(path))?;
        write_out(out, Box::into_raw(Box::new(md)))
    })
}

/// Decodes model data from `len` bytes of ONNX at `data`.
///
/// # Safety
/// `data` must be valid for reads of `len` bytes; `out` must be valid for
/// writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_make_model_data_from_onnx_data_on_memory(
    data: *const u8,
    len: usize,
    out: *mut ModelDataHandle,
) -> ErrorCode {
    guarded("cpurt_make_model_data_from_onnx_data_on_memory", || {
        let md = ModelData::from_bytes(raw_slice(data, len, "data")?)?;
        write_out(out, Box::into_raw(Box::new(md)))
    })
}

/// Adds a parameter, copying `product(dims)` floats from `buffer`.
///
/// # Safety
/// `md` must be a live handle, `name` a NUL-terminated string, `dims` valid
/// for `dims_size` reads and `buffer` valid for `product(dims)` floats.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_data_add_parameter(
    md: ModelDataHandle,
    name: *const c_char,
    dtype: Dtype,
    dims_size: c_int,
    dims: *const c_int,
    buffer: *const c_void,
) -> ErrorCode {
    guarded("cpurt_model_data_add_parameter", || {
        let md = handle(md, "model data")?;
        let name = c_str(name, "name")?;
        dtype_from_code(dtype)?;
        let dims = dims_from_c(name, c_slice(dims, dims_size, "dims")?)?;
        let len: usize = dims.iter().product();
        let data = raw_slice(buffer.cast::<f32>(), len, "buffer")?;
        md.add_parameter(name, &dims, data)
    })
}

/// Appends a node and makes it current.
///
/// # Safety
/// `md` must be a live handle and `op_type` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_data_add_new_node(
    md: ModelDataHandle,
    op_type: *const c_char,
) -> ErrorCode {
    guarded("cpurt_model_data_add_new_node", || {
        let md = handle(md, "model data")?;
        md.add_new_node(c_str(op_type, "op_type")?);
        Ok(())
    })
}

/// # Safety
/// `md` must be a live handle and `name` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_data_add_input_name_to_current_node(
    md: ModelDataHandle,
    name: *const c_char,
) -> ErrorCode {
    guarded("cpurt_model_data_add_input_name_to_current_node", || {
        handle(md, "model data")?.add_input_name_to_current_node(c_str(name, "name")?)
    })
}

/// # Safety
/// `md` must be a live handle and `name` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_data_add_output_name_to_current_node(
    md: ModelDataHandle,
    name: *const c_char,
) -> ErrorCode {
    guarded("cpurt_model_data_add_output_name_to_current_node", || {
        handle(md, "model data")?.add_output_name_to_current_node(c_str(name, "name")?)
    })
}

unsafe fn add_attribute(md: ModelDataHandle, name: *const c_char, value: Attribute) -> Result<(), BackendError> {
    handle(md, "model data")?.add_attribute_to_current_node(c_str(name, "attribute name")?, value)
}

/// # Safety
/// `md` must be a live handle and `name` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_data_add_attribute_int_to_current_node(
    md: ModelDataHandle,
    name: *const c_char,
    value: i64,
) -> ErrorCode {
    guarded("cpurt_model_data_add_attribute_int_to_current_node", || {
        add_attribute(md, name, Attribute::Int(value))
    })
}

/// # Safety
/// `md` must be a live handle and `name` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_data_add_attribute_float_to_current_node(
    md: ModelDataHandle,
    name: *const c_char,
    value: f32,
) -> ErrorCode {
    guarded("cpurt_model_data_add_attribute_float_to_current_node", || {
        add_attribute(md, name, Attribute::Float(value))
    })
}

/// # Safety
/// `md` must be a live handle, `name` a NUL-terminated string and `values`
/// valid for `size` reads.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_data_add_attribute_ints_to_current_node(
    md: ModelDataHandle,
    name: *const c_char,
    size: c_int,
    values: *const i64,
) -> ErrorCode {
    guarded("cpurt_model_data_add_attribute_ints_to_current_node", || {
        let values = c_slice(values, size, "values")?.to_vec();
        add_attribute(md, name, Attribute::Ints(values))
    })
}

/// # Safety
/// `md` must be a live handle, `name` a NUL-terminated string and `values`
/// valid for `size` reads.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_data_add_attribute_floats_to_current_node(
    md: ModelDataHandle,
    name: *const c_char,
    size: c_int,
    values: *const f32,
) -> ErrorCode {
    guarded("cpurt_model_data_add_attribute_floats_to_current_node", || {
        let values = c_slice(values, size, "values")?.to_vec();
        add_attribute(md, name, Attribute::Floats(values))
    })
}

/// Removes nodes that do not contribute to the outputs declared in `table`.
///
/// # Safety
/// Both handles must be live.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_data_optimize(
    md: ModelDataHandle,
    table: ProfileTableHandle,
) -> ErrorCode {
    guarded("cpurt_model_data_optimize", || {
        let table = handle(table, "profile table")?;
        handle(md, "model data")?.optimize(table)
    })
}

/// # Safety
/// `md` must be null or a handle not yet deleted.
#[no_mangle]
pub unsafe extern "C" fn cpurt_delete_model_data(md: ModelDataHandle) {
    if !md.is_null() {
        drop(Box::from_raw(md));
    }
}

// ── Profile table builder ──────────────────────────────────────────

/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_make_variable_profile_table_builder(
    out: *mut ProfileTableBuilderHandle,
) -> ErrorCode {
    guarded("cpurt_make_variable_profile_table_builder", || {
        write_out(out, Box::into_raw(Box::new(ProfileTableBuilder::new())))
    })
}

unsafe fn add_input_profile(
    builder: ProfileTableBuilderHandle,
    name: *const c_char,
    dtype: Dtype,
    dims: &[c_int],
) -> Result<(), BackendError> {
    let builder = handle(builder, "profile table builder")?;
    let name = c_str(name, "name")?;
    let dims = dims_from_c(name, dims)?;
    builder.add_input_profile(name, dtype_from_code(dtype)?, &dims)
}

/// Declares a 2-D input `[n, c]`.
///
/// # Safety
/// `builder` must be a live handle and `name` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cpurt_variable_profile_table_builder_add_input_profile_dims_2(
    builder: ProfileTableBuilderHandle,
    name: *const c_char,
    dtype: Dtype,
    num: c_int,
    size: c_int,
) -> ErrorCode {
    guarded("cpurt_variable_profile_table_builder_add_input_profile_dims_2", || {
        add_input_profile(builder, name, dtype, &[num, size])
    })
}

/// Declares a 4-D input `[n, c, h, w]`.
///
/// # Safety
/// `builder` must be a live handle and `name` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cpurt_variable_profile_table_builder_add_input_profile_dims_4(
    builder: ProfileTableBuilderHandle,
    name: *const c_char,
    dtype: Dtype,
    num: c_int,
    channel: c_int,
    height: c_int,
    width: c_int,
) -> ErrorCode {
    guarded("cpurt_variable_profile_table_builder_add_input_profile_dims_4", || {
        add_input_profile(builder, name, dtype, &[num, channel, height, width])
    })
}

/// Requests an output by name.
///
/// # Safety
/// `builder` must be a live handle and `name` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn cpurt_variable_profile_table_builder_add_output_profile(
    builder: ProfileTableBuilderHandle,
    name: *const c_char,
    dtype: Dtype,
) -> ErrorCode {
    guarded("cpurt_variable_profile_table_builder_add_output_profile", || {
        let builder = handle(builder, "profile table builder")?;
        builder.add_output_profile(c_str(name, "name")?, dtype_from_code(dtype)?)
    })
}

/// Runs shape inference and creates a profile table.
///
/// # Safety
/// Both handles must be live; `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_build_variable_profile_table(
    builder: ProfileTableBuilderHandle,
    md: ModelDataHandle,
    out: *mut ProfileTableHandle,
) -> ErrorCode {
    guarded("cpurt_build_variable_profile_table", || {
        let builder = handle(builder, "profile table builder")?;
        let md = handle(md, "model data")?;
        let table = builder.build(md)?;
        write_out(out, Box::into_raw(Box::new(table)))
    })
}

/// # Safety
/// `builder` must be null or a handle not yet deleted.
#[no_mangle]
pub unsafe extern "C" fn cpurt_delete_variable_profile_table_builder(
    builder: ProfileTableBuilderHandle,
) {
    if !builder.is_null() {
        drop(Box::from_raw(builder));
    }
}

// ── Profile table ──────────────────────────────────────────────────

/// # Safety
/// `table` must be a live handle, `name` a NUL-terminated string and `out`
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_variable_profile_table_get_dtype(
    table: ProfileTableHandle,
    name: *const c_char,
    out: *mut Dtype,
) -> ErrorCode {
    guarded("cpurt_variable_profile_table_get_dtype", || {
        let profile = handle(table, "profile table")?.get(c_str(name, "name")?)?;
        write_out(out, dtype_to_code(profile.dtype)?)
    })
}

/// # Safety
/// `table` must be a live handle, `name` a NUL-terminated string and `out`
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_variable_profile_table_get_dims_size(
    table: ProfileTableHandle,
    name: *const c_char,
    out: *mut c_int,
) -> ErrorCode {
    guarded("cpurt_variable_profile_table_get_dims_size", || {
        let profile = handle(table, "profile table")?.get(c_str(name, "name")?)?;
        write_out(out, rank_to_c(&profile.dims))
    })
}

/// # Safety
/// `table` must be a live handle, `name` a NUL-terminated string and `out`
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_variable_profile_table_get_dims_at(
    table: ProfileTableHandle,
    name: *const c_char,
    index: c_int,
    out: *mut c_int,
) -> ErrorCode {
    guarded("cpurt_variable_profile_table_get_dims_at", || {
        let profile = handle(table, "profile table")?.get(c_str(name, "name")?)?;
        write_out(out, dim_to_c(&profile.dims, index)?)
    })
}

/// # Safety
/// `table` must be null or a handle not yet deleted.
#[no_mangle]
pub unsafe extern "C" fn cpurt_delete_variable_profile_table(table: ProfileTableHandle) {
    if !table.is_null() {
        drop(Box::from_raw(table));
    }
}

// ── Model builder ──────────────────────────────────────────────────

/// # Safety
/// `table` must be a live handle; `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_make_model_builder(
    table: ProfileTableHandle,
    out: *mut ModelBuilderHandle,
) -> ErrorCode {
    guarded("cpurt_make_model_builder", || {
        let table = handle(table, "profile table")?;
        write_out(out, Box::into_raw(Box::new(ModelBuilder::new(table))))
    })
}

/// Attaches caller-owned storage to a profiled variable.
///
/// # Safety
/// `builder` must be a live handle and `name` a NUL-terminated string. The
/// buffer must satisfy the contract of [`ModelBuilder::build_model`].
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_builder_attach_external_buffer(
    builder: ModelBuilderHandle,
    name: *const c_char,
    buffer: *mut c_void,
) -> ErrorCode {
    guarded("cpurt_model_builder_attach_external_buffer", || {
        handle(builder, "model builder")?.attach_external_buffer(c_str(name, "name")?, buffer)
    })
}

/// Compiles a model.
///
/// # Safety
/// Both handles must be live, the strings NUL-terminated and `out` valid
/// for writes. Attached buffers must outlive the model.
#[no_mangle]
pub unsafe extern "C" fn cpurt_build_model(
    builder: ModelBuilderHandle,
    md: ModelDataHandle,
    backend_name: *const c_char,
    backend_config: *const c_char,
    out: *mut ModelHandle,
) -> ErrorCode {
    guarded("cpurt_build_model", || {
        let builder = handle(builder, "model builder")?;
        let md = handle(md, "model data")?;
        let name = c_str(backend_name, "backend name")?;
        let config = c_str(backend_config, "backend config")?;
        let model = builder.build_model(md, name, config)?;
        write_out(out, Box::into_raw(Box::new(model)))
    })
}

/// # Safety
/// `builder` must be null or a handle not yet deleted.
#[no_mangle]
pub unsafe extern "C" fn cpurt_delete_model_builder(builder: ModelBuilderHandle) {
    if !builder.is_null() {
        drop(Box::from_raw(builder));
    }
}

// ── Model ──────────────────────────────────────────────────────────

/// # Safety
/// `model` must be a live handle, `name` a NUL-terminated string and `out`
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_get_variable_dtype(
    model: ModelHandle,
    name: *const c_char,
    out: *mut Dtype,
) -> ErrorCode {
    guarded("cpurt_model_get_variable_dtype", || {
        let profile = handle(model, "model")?.variable_profile(c_str(name, "name")?)?;
        write_out(out, dtype_to_code(profile.dtype)?)
    })
}

/// # Safety
/// `model` must be a live handle, `name` a NUL-terminated string and `out`
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_get_variable_dims_size(
    model: ModelHandle,
    name: *const c_char,
    out: *mut c_int,
) -> ErrorCode {
    guarded("cpurt_model_get_variable_dims_size", || {
        let profile = handle(model, "model")?.variable_profile(c_str(name, "name")?)?;
        write_out(out, rank_to_c(&profile.dims))
    })
}

/// # Safety
/// `model` must be a live handle, `name` a NUL-terminated string and `out`
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_get_variable_dims_at(
    model: ModelHandle,
    name: *const c_char,
    index: c_int,
    out: *mut c_int,
) -> ErrorCode {
    guarded("cpurt_model_get_variable_dims_at", || {
        let profile = handle(model, "model")?.variable_profile(c_str(name, "name")?)?;
        write_out(out, dim_to_c(&profile.dims, index)?)
    })
}

/// Returns the address of a variable's buffer. The address stays valid
/// until the model is deleted.
///
/// # Safety
/// `model` must be a live handle, `name` a NUL-terminated string and `out`
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_get_variable_buffer_handle(
    model: ModelHandle,
    name: *const c_char,
    out: *mut *mut c_void,
) -> ErrorCode {
    guarded("cpurt_model_get_variable_buffer_handle", || {
        let ptr = handle(model, "model")?.buffer_handle(c_str(name, "name")?)?;
        write_out(out, ptr)
    })
}

/// Executes the model once, synchronously.
///
/// # Safety
/// `model` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn cpurt_model_run(model: ModelHandle) -> ErrorCode {
    guarded("cpurt_model_run", || handle(model, "model")?.run())
}

/// # Safety
/// `model` must be null or a handle not yet deleted.
#[no_mangle]
pub unsafe extern "C" fn cpurt_delete_model(model: ModelHandle) {
    if !model.is_null() {
        drop(Box::from_raw(model));
    }
}
