// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pointer-stable element buffers.
//!
//! Backends keep raw addresses of attached buffers for as long as a compiled
//! model lives, so the storage behind a tensor must never move or grow.
//!
//! ```text
//! HostBuffer<T>   ── owns a boxed slice, address fixed until drop
//! ForeignView<T>  ── borrows `len` elements some other owner allocated
//! ```
//!
//! Every access of a [`HostBuffer`] goes through the one raw pointer taken at
//! allocation time, so an address handed to a backend stays valid across
//! reads and writes made through the Rust side.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// An owned, fixed-length heap buffer whose address never changes.
pub struct HostBuffer<T> {
    ptr: NonNull<T>,
    len: usize,
    _owns: PhantomData<T>,
}

impl<T: Copy + Default> HostBuffer<T> {
    /// Allocates `len` default-initialised elements (zeros for numbers).
    pub fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![T::default(); len])
    }

    /// Takes ownership of `values` without copying.
    pub fn from_vec(values: Vec<T>) -> Self {
        let boxed = values.into_boxed_slice();
        let len = boxed.len();
        let ptr = NonNull::from(Box::leak(boxed)).cast::<T>();
        Self {
            ptr,
            len,
            _owns: PhantomData,
        }
    }

    /// Allocates a copy of `values`.
    pub fn from_slice(values: &[T]) -> Self {
        Self::from_vec(values.to_vec())
    }
}

impl<T> HostBuffer<T> {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the elements.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `ptr` came from a leaked `Box<[T]>` of exactly `len` elements
        // and is only freed in `drop`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the elements mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in `as_slice`; `&mut self` guarantees exclusive access on
        // the Rust side.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the stable base address of the buffer.
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Returns the stable base address of the buffer.
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }
}

impl<T> Drop for HostBuffer<T> {
    fn drop(&mut self) {
        let slice = std::ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), self.len);
        // SAFETY: reconstructs the box leaked in `from_vec`; runs once.
        unsafe { drop(Box::from_raw(slice)) };
    }
}

// SAFETY: `HostBuffer<T>` uniquely owns its allocation, like `Vec<T>`.
unsafe impl<T: Send> Send for HostBuffer<T> {}
// SAFETY: shared access only hands out `&[T]`.
unsafe impl<T: Sync> Sync for HostBuffer<T> {}

impl<T: fmt::Debug> fmt::Debug for HostBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuffer")
            .field("len", &self.len)
            .field("ptr", &self.ptr)
            .finish()
    }
}

/// A read-only view over exactly `len` elements owned by someone else.
///
/// The view never frees, resizes, or writes the memory it points at.
pub struct ForeignView<T> {
    ptr: NonNull<T>,
    len: usize,
}

impl<T> ForeignView<T> {
    /// Wraps `len` elements starting at `ptr`. Returns `None` for a null pointer.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `len` properly aligned, initialised
    /// elements for the whole lifetime of the returned view, and nothing may
    /// free that memory while the view exists.
    pub unsafe fn new(ptr: *mut T, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, len })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the view covers no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the viewed elements.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: guaranteed by the contract of `ForeignView::new`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the foreign base address.
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }
}

// SAFETY: the view is only read; the owner of the memory travels with it
// (a runner moves its compiled model and its views together).
unsafe impl<T: Sync> Send for ForeignView<T> {}

impl<T> fmt::Debug for ForeignView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignView")
            .field("len", &self.len)
            .field("ptr", &self.ptr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed() {
        let buf = HostBuffer::<f32>::zeroed(4);
        assert_eq!(buf.len(), 4);
        assert!(buf.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_address_is_stable_across_moves() {
        let mut buf = HostBuffer::from_slice(&[1.0f32, 2.0, 3.0]);
        let before = buf.as_mut_ptr();
        let mut moved = buf;
        moved.as_mut_slice()[0] = 9.0;
        assert_eq!(moved.as_mut_ptr(), before);
        assert_eq!(moved.as_slice(), &[9.0, 2.0, 3.0]);
    }

    #[test]
    fn test_writes_through_raw_pointer_are_visible() {
        let mut buf = HostBuffer::<f32>::zeroed(2);
        let raw = buf.as_mut_ptr();
        unsafe { raw.add(1).write(5.0) };
        assert_eq!(buf.as_slice(), &[0.0, 5.0]);
    }

    #[test]
    fn test_empty_buffer() {
        let buf = HostBuffer::<f32>::zeroed(0);
        assert!(buf.is_empty());
        assert!(buf.as_slice().is_empty());
    }

    #[test]
    fn test_foreign_view() {
        let mut owner = vec![1.0f32, 2.0, 3.0, 4.0];
        let view = unsafe { ForeignView::new(owner.as_mut_ptr(), 2) }.unwrap();
        assert_eq!(view.as_slice(), &[1.0, 2.0]);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_foreign_view_rejects_null() {
        let view = unsafe { ForeignView::<f32>::new(std::ptr::null_mut(), 3) };
        assert!(view.is_none());
    }
}
