// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Drives the backend through its C ABI only.
//!
//! The last error message is process-wide, so only one test in this file
//! provokes failures.

use cpu_backend::api::*;
use cpu_backend::ErrorCode;
use std::ffi::{c_int, c_void, CString};
use std::ptr;

fn cstr(s: &str) -> CString {
    CString::new(s).unwrap()
}

fn last_error() -> String {
    let mut buf = vec![0u8; 8];
    let len = unsafe { cpurt_get_last_error_message(buf.as_mut_ptr().cast(), buf.len()) };
    if len >= buf.len() {
        buf = vec![0u8; len + 1];
        unsafe { cpurt_get_last_error_message(buf.as_mut_ptr().cast(), buf.len()) };
    }
    buf.truncate(len);
    String::from_utf8(buf).unwrap()
}

/// `y = Softmax(x @ w)` with `w = [[1, 0], [0, 1], [1, 1]]`, built node by node.
unsafe fn build_model_data() -> ModelDataHandle {
    let mut md = ptr::null_mut();
    assert_eq!(cpurt_make_model_data(&mut md), ErrorCode::Success);

    let w = [1.0f32, 0.0, 0.0, 1.0, 1.0, 1.0];
    let dims: [c_int; 2] = [3, 2];
    assert_eq!(
        cpurt_model_data_add_parameter(
            md,
            cstr("w").as_ptr(),
            DTYPE_FLOAT,
            2,
            dims.as_ptr(),
            w.as_ptr().cast()
        ),
        ErrorCode::Success
    );
    assert_eq!(
        cpurt_model_data_add_new_node(md, cstr("MatMul").as_ptr()),
        ErrorCode::Success
    );
    for name in ["x", "w"] {
        assert_eq!(
            cpurt_model_data_add_input_name_to_current_node(md, cstr(name).as_ptr()),
            ErrorCode::Success
        );
    }
    assert_eq!(
        cpurt_model_data_add_output_name_to_current_node(md, cstr("xw").as_ptr()),
        ErrorCode::Success
    );
    assert_eq!(
        cpurt_model_data_add_new_node(md, cstr("Softmax").as_ptr()),
        ErrorCode::Success
    );
    assert_eq!(
        cpurt_model_data_add_input_name_to_current_node(md, cstr("xw").as_ptr()),
        ErrorCode::Success
    );
    assert_eq!(
        cpurt_model_data_add_output_name_to_current_node(md, cstr("y").as_ptr()),
        ErrorCode::Success
    );
    assert_eq!(
        cpurt_model_data_add_attribute_int_to_current_node(md, cstr("axis").as_ptr(), 1),
        ErrorCode::Success
    );
    md
}

#[test]
fn test_full_lifecycle_through_c_abi() {
    unsafe {
        let md = build_model_data();

        let mut builder = ptr::null_mut();
        assert_eq!(
            cpurt_make_variable_profile_table_builder(&mut builder),
            ErrorCode::Success
        );
        assert_eq!(
            cpurt_variable_profile_table_builder_add_input_profile_dims_2(
                builder,
                cstr("x").as_ptr(),
                DTYPE_FLOAT,
                1,
                3
            ),
            ErrorCode::Success
        );
        assert_eq!(
            cpurt_variable_profile_table_builder_add_output_profile(
                builder,
                cstr("y").as_ptr(),
                DTYPE_FLOAT
            ),
            ErrorCode::Success
        );

        let mut table = ptr::null_mut();
        assert_eq!(
            cpurt_build_variable_profile_table(builder, md, &mut table),
            ErrorCode::Success
        );
        let mut rank: c_int = 0;
        assert_eq!(
            cpurt_variable_profile_table_get_dims_size(table, cstr("y").as_ptr(), &mut rank),
            ErrorCode::Success
        );
        assert_eq!(rank, 2);
        let mut dim: c_int = 0;
        assert_eq!(
            cpurt_variable_profile_table_get_dims_at(table, cstr("y").as_ptr(), 1, &mut dim),
            ErrorCode::Success
        );
        assert_eq!(dim, 2);

        let mut mb = ptr::null_mut();
        assert_eq!(cpurt_make_model_builder(table, &mut mb), ErrorCode::Success);
        let mut x = [0.0f32, 0.0, 0.0];
        assert_eq!(
            cpurt_model_builder_attach_external_buffer(
                mb,
                cstr("x").as_ptr(),
                x.as_mut_ptr().cast()
            ),
            ErrorCode::Success
        );

        let mut model = ptr::null_mut();
        assert_eq!(
            cpurt_build_model(mb, md, cstr("cpu").as_ptr(), cstr("").as_ptr(), &mut model),
            ErrorCode::Success
        );
        assert_eq!(cpurt_model_run(model), ErrorCode::Success);

        let mut out: *mut c_void = ptr::null_mut();
        assert_eq!(
            cpurt_model_get_variable_buffer_handle(model, cstr("y").as_ptr(), &mut out),
            ErrorCode::Success
        );
        let y = std::slice::from_raw_parts(out.cast::<f32>(), 2);
        assert_eq!(y, &[0.5, 0.5]);

        let mut dtype = -1;
        assert_eq!(
            cpurt_model_get_variable_dtype(model, cstr("y").as_ptr(), &mut dtype),
            ErrorCode::Success
        );
        assert_eq!(dtype, DTYPE_FLOAT);

        cpurt_delete_model(model);
        cpurt_delete_model_builder(mb);
        cpurt_delete_variable_profile_table(table);
        cpurt_delete_variable_profile_table_builder(builder);
        cpurt_delete_model_data(md);
    }
}

#[test]
fn test_status_codes_and_messages() {
    unsafe {
        let mut md = ptr::null_mut();
        assert_eq!(
            cpurt_make_model_data_from_onnx(cstr("/no/such/model.onnx").as_ptr(), &mut md),
            ErrorCode::InvalidFilename
        );
        assert!(md.is_null());

        assert_eq!(
            cpurt_make_model_data_from_onnx_data_on_memory(ptr::null(), 0, &mut md),
            ErrorCode::OnnxParseError
        );

        let md = build_model_data();
        let mut builder = ptr::null_mut();
        cpurt_make_variable_profile_table_builder(&mut builder);
        assert_eq!(
            cpurt_variable_profile_table_builder_add_input_profile_dims_2(
                builder,
                cstr("x").as_ptr(),
                7,
                1,
                3
            ),
            ErrorCode::InvalidDtype
        );
        assert_eq!(
            cpurt_variable_profile_table_builder_add_input_profile_dims_2(
                builder,
                cstr("x").as_ptr(),
                DTYPE_FLOAT,
                1,
                4
            ),
            ErrorCode::Success
        );
        let mut table = ptr::null_mut();
        assert_eq!(
            cpurt_build_variable_profile_table(builder, md, &mut table),
            ErrorCode::DimensionMismatch
        );
        assert!(last_error().contains("inner dimensions differ"));

        assert_eq!(
            cpurt_model_data_add_input_name_to_current_node(ptr::null_mut(), cstr("x").as_ptr()),
            ErrorCode::StdError
        );

        cpurt_delete_variable_profile_table_builder(builder);
        cpurt_delete_model_data(md);
        cpurt_delete_model_data(ptr::null_mut());
    }
}

#[test]
fn test_optimize_prunes_unrequested_branch() {
    unsafe {
        let md = build_model_data();
        // A second branch nobody asks for.
        cpurt_model_data_add_new_node(md, cstr("Tanh").as_ptr());
        cpurt_model_data_add_input_name_to_current_node(md, cstr("xw").as_ptr());
        cpurt_model_data_add_output_name_to_current_node(md, cstr("t").as_ptr());

        let mut builder = ptr::null_mut();
        cpurt_make_variable_profile_table_builder(&mut builder);
        cpurt_variable_profile_table_builder_add_input_profile_dims_2(
            builder,
            cstr("x").as_ptr(),
            DTYPE_FLOAT,
            1,
            3,
        );
        cpurt_variable_profile_table_builder_add_output_profile(
            builder,
            cstr("y").as_ptr(),
            DTYPE_FLOAT,
        );
        let mut table = ptr::null_mut();
        assert_eq!(
            cpurt_build_variable_profile_table(builder, md, &mut table),
            ErrorCode::Success
        );
        assert_eq!(cpurt_model_data_optimize(md, table), ErrorCode::Success);
        assert_eq!((*md).graph().num_nodes(), 2);

        cpurt_delete_variable_profile_table(table);
        cpurt_delete_variable_profile_table_builder(builder);
        cpurt_delete_model_data(md);
    }
}
