// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The typed tensor exchanged between callers and a runner.

use crate::{DType, ForeignView, HostBuffer, Shape, TensorError};
use std::ffi::c_void;
use std::fmt;

/// Who owns the memory behind a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Allocated by, and freed with, the tensor itself.
    Owned,
    /// A view over memory owned elsewhere (e.g. by a compiled model).
    Aliased,
}

/// Element storage of one data type: either owned or a foreign view.
#[derive(Debug)]
pub enum Storage<T> {
    /// Pointer-stable buffer owned by the tensor.
    Owned(HostBuffer<T>),
    /// Read-only view over foreign memory.
    Aliased(ForeignView<T>),
}

impl<T> Storage<T> {
    fn ownership(&self) -> Ownership {
        match self {
            Storage::Owned(_) => Ownership::Owned,
            Storage::Aliased(_) => Ownership::Aliased,
        }
    }

    fn as_slice(&self) -> &[T] {
        match self {
            Storage::Owned(buf) => buf.as_slice(),
            Storage::Aliased(view) => view.as_slice(),
        }
    }

    fn as_mut_slice(&mut self) -> Result<&mut [T], TensorError> {
        match self {
            Storage::Owned(buf) => Ok(buf.as_mut_slice()),
            Storage::Aliased(_) => Err(TensorError::ReadOnlyView),
        }
    }

    fn as_ptr(&self) -> *const T {
        match self {
            Storage::Owned(buf) => buf.as_ptr(),
            Storage::Aliased(view) => view.as_ptr(),
        }
    }
}

/// Tagged element data. One variant per data type with storage support.
#[derive(Debug)]
#[non_exhaustive]
pub enum TensorData {
    /// 32-bit floats.
    F32(Storage<f32>),
}

impl TensorData {
    fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
        }
    }

    fn ownership(&self) -> Ownership {
        match self {
            TensorData::F32(s) => s.ownership(),
        }
    }
}

/// A typed, shaped, flat numeric array with pointer-stable storage.
///
/// The element count of the storage always equals `shape.num_elements()`.
/// Owned tensors may be written; aliased tensors are read-only views over
/// memory whose lifetime is managed by whoever created the view.
///
/// Cloning always produces an owned deep copy, so a clone never outlives
/// or aliases foreign memory.
///
/// # Examples
/// ```
/// use tensor_core::{DType, Shape, TypedTensor};
/// let mut t = TypedTensor::zeros(DType::F32, Shape::matrix(1, 3)).unwrap();
/// t.write_f32(2, 4.0).unwrap();
/// assert_eq!(t.as_f32_slice().unwrap(), &[0.0, 0.0, 4.0]);
/// ```
pub struct TypedTensor {
    shape: Shape,
    data: TensorData,
}

impl TypedTensor {
    /// Allocates a zero-filled owned tensor of `shape.num_elements()` elements.
    pub fn zeros(dtype: DType, shape: Shape) -> Result<Self, TensorError> {
        let len = shape.num_elements();
        let data = match dtype {
            DType::F32 => TensorData::F32(Storage::Owned(HostBuffer::zeroed(len))),
            other => {
                return Err(TensorError::UnsupportedDType {
                    op: "zeros",
                    dtype: other,
                })
            }
        };
        Ok(Self { shape, data })
    }

    /// Creates an owned `f32` tensor from a copy of `values`.
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::check_len(&shape, values.len())?;
        Ok(Self {
            shape,
            data: TensorData::F32(Storage::Owned(HostBuffer::from_slice(values))),
        })
    }

    /// Creates an owned `f32` tensor taking `values` without copying.
    pub fn from_vec_f32(shape: Shape, values: Vec<f32>) -> Result<Self, TensorError> {
        Self::check_len(&shape, values.len())?;
        Ok(Self {
            shape,
            data: TensorData::F32(Storage::Owned(HostBuffer::from_vec(values))),
        })
    }

    /// Wraps `shape.num_elements()` elements of foreign memory starting at `ptr`.
    ///
    /// The view covers exactly the element count implied by `shape`.
    ///
    /// # Safety
    /// `ptr` must point to at least `shape.num_elements()` initialised,
    /// aligned elements of `dtype` that stay valid, and are not freed, for
    /// the whole lifetime of the returned tensor.
    pub unsafe fn from_foreign(
        dtype: DType,
        shape: Shape,
        ptr: *mut c_void,
    ) -> Result<Self, TensorError> {
        let len = shape.num_elements();
        let data = match dtype {
            DType::F32 => {
                let view = ForeignView::new(ptr.cast::<f32>(), len).ok_or(TensorError::NullPointer)?;
                TensorData::F32(Storage::Aliased(view))
            }
            other => {
                return Err(TensorError::UnsupportedDType {
                    op: "from_foreign",
                    dtype: other,
                })
            }
        };
        Ok(Self { shape, data })
    }

    fn check_len(shape: &Shape, actual: usize) -> Result<(), TensorError> {
        let expected = shape.num_elements();
        if actual != expected {
            return Err(TensorError::BufferSizeMismatch { expected, actual });
        }
        Ok(())
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the dimensions.
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.shape.num_elements()
    }

    /// Returns `true` if the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether the storage is owned or aliased.
    pub fn ownership(&self) -> Ownership {
        self.data.ownership()
    }

    /// Returns `true` for a view over foreign memory.
    pub fn is_aliased(&self) -> bool {
        self.ownership() == Ownership::Aliased
    }

    /// Returns the element data tagged by type.
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Interprets the storage as `f32` elements.
    pub fn as_f32_slice(&self) -> Result<&[f32], TensorError> {
        match &self.data {
            TensorData::F32(s) => Ok(s.as_slice()),
        }
    }

    /// Interprets the storage as mutable `f32` elements.
    ///
    /// Fails with [`TensorError::ReadOnlyView`] on aliased storage.
    pub fn as_f32_slice_mut(&mut self) -> Result<&mut [f32], TensorError> {
        match &mut self.data {
            TensorData::F32(s) => s.as_mut_slice(),
        }
    }

    /// Writes `value` at flat index `index`.
    pub fn write_f32(&mut self, index: usize, value: f32) -> Result<(), TensorError> {
        let slice = self.as_f32_slice_mut()?;
        let len = slice.len();
        let slot = slice
            .get_mut(index)
            .ok_or(TensorError::IndexOutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Reads the `f32` at flat index `index`.
    pub fn read_f32(&self, index: usize) -> Result<f32, TensorError> {
        let slice = self.as_f32_slice()?;
        slice.get(index).copied().ok_or(TensorError::IndexOutOfRange {
            index,
            len: slice.len(),
        })
    }

    /// Copies every element of `self` into `dst`.
    ///
    /// Requires equal dtype and equal element count; dimensions themselves
    /// are not compared, so a `[1, 3]` tensor may be copied into a `[3, 1]`
    /// one.
    pub fn copy_into(&self, dst: &mut TypedTensor) -> Result<(), TensorError> {
        self.check_copy_into(dst)?;
        match (&self.data, &mut dst.data) {
            (TensorData::F32(src), TensorData::F32(dst)) => {
                dst.as_mut_slice()?.copy_from_slice(src.as_slice());
            }
        }
        Ok(())
    }

    /// Checks whether [`copy_into`](Self::copy_into) would succeed, without
    /// touching either buffer.
    pub fn check_copy_into(&self, dst: &TypedTensor) -> Result<(), TensorError> {
        if self.dtype() != dst.dtype() {
            return Err(TensorError::DTypeMismatch {
                expected: dst.dtype(),
                actual: self.dtype(),
            });
        }
        if self.len() != dst.len() {
            return Err(TensorError::ElementCountMismatch {
                expected: dst.len(),
                actual: self.len(),
            });
        }
        if dst.is_aliased() {
            return Err(TensorError::ReadOnlyView);
        }
        Ok(())
    }

    /// Returns the stable base address of owned storage, for attaching to
    /// a backend.
    ///
    /// Fails with [`TensorError::ReadOnlyView`] on aliased storage.
    pub fn as_mut_ptr(&mut self) -> Result<*mut c_void, TensorError> {
        match &mut self.data {
            TensorData::F32(Storage::Owned(buf)) => Ok(buf.as_mut_ptr().cast()),
            TensorData::F32(Storage::Aliased(_)) => Err(TensorError::ReadOnlyView),
        }
    }

    /// Returns the base address of the storage.
    pub fn as_ptr(&self) -> *const c_void {
        match &self.data {
            TensorData::F32(s) => s.as_ptr().cast(),
        }
    }
}

impl Clone for TypedTensor {
    fn clone(&self) -> Self {
        let data = match &self.data {
            TensorData::F32(s) => TensorData::F32(Storage::Owned(HostBuffer::from_slice(s.as_slice()))),
        };
        Self {
            shape: self.shape.clone(),
            data,
        }
    }
}

impl PartialEq for TypedTensor {
    fn eq(&self, other: &Self) -> bool {
        if self.shape != other.shape {
            return false;
        }
        match (&self.data, &other.data) {
            (TensorData::F32(a), TensorData::F32(b)) => a.as_slice() == b.as_slice(),
        }
    }
}

impl fmt::Debug for TypedTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("TypedTensor");
        s.field("dtype", &self.dtype())
            .field("shape", &self.shape)
            .field("ownership", &self.ownership());
        match &self.data {
            TensorData::F32(st) => s.field("data", &st.as_slice()),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = TypedTensor::zeros(DType::F32, Shape::matrix(2, 3)).unwrap();
        assert_eq!(t.len(), 6);
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.ownership(), Ownership::Owned);
        assert!(t.as_f32_slice().unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_zeros_rejects_storage_less_dtype() {
        let err = TypedTensor::zeros(DType::F16, Shape::vector(4)).unwrap_err();
        assert_eq!(
            err,
            TensorError::UnsupportedDType {
                op: "zeros",
                dtype: DType::F16
            }
        );
    }

    #[test]
    fn test_from_f32_size_mismatch() {
        let err = TypedTensor::from_f32(Shape::matrix(2, 3), &[1.0; 5]).unwrap_err();
        assert_eq!(
            err,
            TensorError::BufferSizeMismatch {
                expected: 6,
                actual: 5
            }
        );
    }

    #[test]
    fn test_write_bounds_checked() {
        let mut t = TypedTensor::zeros(DType::F32, Shape::matrix(1, 3)).unwrap();
        t.write_f32(1, 0.5).unwrap();
        assert_eq!(t.read_f32(1).unwrap(), 0.5);
        assert_eq!(
            t.write_f32(3, 1.0).unwrap_err(),
            TensorError::IndexOutOfRange { index: 3, len: 3 }
        );
    }

    #[test]
    fn test_copy_into_ignores_dims() {
        let src = TypedTensor::from_f32(Shape::matrix(1, 3), &[0.0, 1.0, 2.0]).unwrap();
        let mut dst = TypedTensor::zeros(DType::F32, Shape::matrix(3, 1)).unwrap();
        src.copy_into(&mut dst).unwrap();
        assert_eq!(dst.as_f32_slice().unwrap(), &[0.0, 1.0, 2.0]);
        assert_eq!(dst.dims(), &[3, 1]);
    }

    #[test]
    fn test_copy_into_count_mismatch_leaves_dst() {
        let src = TypedTensor::from_f32(Shape::matrix(1, 2), &[7.0, 8.0]).unwrap();
        let mut dst = TypedTensor::from_f32(Shape::matrix(1, 3), &[1.0, 2.0, 3.0]).unwrap();
        let err = src.copy_into(&mut dst).unwrap_err();
        assert_eq!(
            err,
            TensorError::ElementCountMismatch {
                expected: 3,
                actual: 2
            }
        );
        assert_eq!(dst.as_f32_slice().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_foreign_view_is_exactly_sized_and_read_only() {
        let mut backing = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut t = unsafe {
            TypedTensor::from_foreign(DType::F32, Shape::matrix(1, 4), backing.as_mut_ptr().cast())
        }
        .unwrap();
        assert!(t.is_aliased());
        assert_eq!(t.as_f32_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(t.write_f32(0, 9.0).unwrap_err(), TensorError::ReadOnlyView);
        assert_eq!(t.as_mut_ptr().unwrap_err(), TensorError::ReadOnlyView);
        drop(t);
        assert_eq!(backing[0], 1.0);
    }

    #[test]
    fn test_foreign_null_pointer() {
        let err = unsafe {
            TypedTensor::from_foreign(DType::F32, Shape::vector(2), std::ptr::null_mut())
        }
        .unwrap_err();
        assert_eq!(err, TensorError::NullPointer);
    }

    #[test]
    fn test_clone_of_alias_is_owned_copy() {
        let mut backing = vec![1.0f32, 2.0];
        let view = unsafe {
            TypedTensor::from_foreign(DType::F32, Shape::vector(2), backing.as_mut_ptr().cast())
        }
        .unwrap();
        let mut copy = view.clone();
        assert_eq!(copy.ownership(), Ownership::Owned);
        copy.write_f32(0, 42.0).unwrap();
        assert_eq!(view.read_f32(0).unwrap(), 1.0);
        assert_eq!(copy, TypedTensor::from_f32(Shape::vector(2), &[42.0, 2.0]).unwrap());
    }

    #[test]
    fn test_attached_pointer_survives_moves() {
        let mut t = TypedTensor::zeros(DType::F32, Shape::vector(3)).unwrap();
        let ptr = t.as_mut_ptr().unwrap();
        let boxed = Box::new(t);
        assert_eq!(boxed.as_ptr(), ptr as *const c_void);
    }
}
