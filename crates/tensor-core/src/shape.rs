// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and dimension utilities.

use std::fmt;

/// Describes the dimensionality of a [`crate::TypedTensor`].
///
/// Shapes are immutable once created and provide convenience methods for
/// total element counts and broadcasting compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), 24);
    /// ```
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Creates a 1-D shape.
    pub fn vector(len: usize) -> Self {
        Self { dims: vec![len] }
    }

    /// Creates a 2-D shape (matrix).
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self {
            dims: vec![rows, cols],
        }
    }

    /// Creates a 4-D image-batch shape in `N, C, H, W` order.
    pub fn nchw(n: usize, c: usize, h: usize, w: usize) -> Self {
        Self {
            dims: vec![n, c, h, w],
        }
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements.
    ///
    /// For a scalar shape (rank 0), returns 1.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns `true` if any dimension is zero.
    pub fn has_zero_dim(&self) -> bool {
        self.dims.contains(&0)
    }

    /// Returns `true` if `self` can be broadcast to `target` without
    /// changing `target`.
    ///
    /// Aligning dimensions from the right, each dimension of `self` must
    /// either equal the target dimension or be 1, and `self` may not have a
    /// higher rank than `target`.
    pub fn broadcasts_to(&self, target: &Shape) -> bool {
        if self.rank() > target.rank() {
            return false;
        }
        self.dims
            .iter()
            .rev()
            .zip(target.dims.iter().rev())
            .all(|(&d, &t)| d == t || d == 1)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Convenience: `Shape::from(vec![2, 3])`.
impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

/// Convenience: `Shape::from(&[2, 3][..])`.
impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dims_count_one_element() {
        let s = Shape::new(vec![]);
        assert_eq!(s.rank(), 0);
        assert_eq!(s.num_elements(), 1);
    }

    #[test]
    fn test_matrix_shape() {
        let s = Shape::matrix(3, 4);
        assert_eq!(s.rank(), 2);
        assert_eq!(s.num_elements(), 12);
        assert_eq!(s.dims(), &[3, 4]);
    }

    #[test]
    fn test_nchw() {
        let s = Shape::nchw(1, 3, 224, 224);
        assert_eq!(s.rank(), 4);
        assert_eq!(s.num_elements(), 3 * 224 * 224);
    }

    #[test]
    fn test_zero_dim() {
        assert!(Shape::matrix(0, 3).has_zero_dim());
        assert_eq!(Shape::matrix(0, 3).num_elements(), 0);
        assert!(!Shape::matrix(1, 3).has_zero_dim());
    }

    #[test]
    fn test_broadcasts_to() {
        let target = Shape::matrix(4, 3);
        assert!(Shape::vector(3).broadcasts_to(&target));
        assert!(Shape::matrix(1, 3).broadcasts_to(&target));
        assert!(Shape::matrix(4, 1).broadcasts_to(&target));
        assert!(Shape::new(vec![]).broadcasts_to(&target));
        assert!(!Shape::vector(4).broadcasts_to(&target));
        assert!(!Shape::new(vec![2, 4, 3]).broadcasts_to(&target));
    }

    #[test]
    fn test_display() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(format!("{s}"), "[2, 3, 4]");
    }

    #[test]
    fn test_from_conversions() {
        let s1: Shape = vec![2, 3].into();
        let s2: Shape = (&[2, 3][..]).into();
        assert_eq!(s1, s2);
    }
}
