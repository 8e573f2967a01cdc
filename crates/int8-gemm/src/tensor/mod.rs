//! Tensor views used by every stage of the pipeline.
//!
//! - [`Tensor<T>`]: reference-counted, possibly strided view of up to four
//!   dimensions. Cloning a tensor shares the data block.
//! - [`TensorMut<'a, T>`]: borrowed mutable block of output rows, the write
//!   target of tile unpacking.
//!
//! Matrices are rank ≤ 2 tensors with `h` rows and `w` columns.
//!
//! # Example
//!
//! ```
//! use int8_gemm::Tensor;
//!
//! let a = Tensor::matrix(2, 3, vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! let at = a.transposed().unwrap();
//!
//! assert_eq!(at.rows(), 3);
//! assert_eq!(at.at(2, 1), 6.0);
//! assert_eq!(a.ref_count(), 2); // both views share one block
//! ```

mod mut_;
mod owned;

pub use mut_::TensorMut;
pub use owned::Tensor;

/// Extents of a tensor: `w` is the fastest varying axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: usize,
    w: usize,
    h: usize,
    d: usize,
    c: usize,
}

impl Shape {
    /// A rank-1 shape of `w` elements.
    pub const fn new_1d(w: usize) -> Self {
        Self {
            dims: 1,
            w,
            h: 1,
            d: 1,
            c: 1,
        }
    }

    /// A rank-2 shape: `h` rows of `w` elements.
    pub const fn new_2d(w: usize, h: usize) -> Self {
        Self {
            dims: 2,
            w,
            h,
            d: 1,
            c: 1,
        }
    }

    /// A rank-3 shape: `c` channels of `h × w`.
    pub const fn new_3d(w: usize, h: usize, c: usize) -> Self {
        Self {
            dims: 3,
            w,
            h,
            d: 1,
            c,
        }
    }

    /// A rank-4 shape: `c` channels of `d × h × w`.
    pub const fn new_4d(w: usize, h: usize, d: usize, c: usize) -> Self {
        Self { dims: 4, w, h, d, c }
    }

    /// Rank of the shape (1 to 4).
    #[inline]
    pub fn dims(&self) -> usize {
        self.dims
    }

    #[inline]
    pub fn w(&self) -> usize {
        self.w
    }

    #[inline]
    pub fn h(&self) -> usize {
        self.h
    }

    #[inline]
    pub fn d(&self) -> usize {
        self.d
    }

    #[inline]
    pub fn c(&self) -> usize {
        self.c
    }

    /// Total number of elements.
    #[inline]
    pub fn total(&self) -> usize {
        self.w * self.h * self.d * self.c
    }

    /// True when any extent is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Row-major strides for the four axes, in elements.
    pub(crate) fn contiguous_strides(&self) -> [usize; 4] {
        [1, self.w, self.w * self.h, self.w * self.h * self.d]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_ranks() {
        assert_eq!(Shape::new_1d(5).dims(), 1);
        assert_eq!(Shape::new_2d(5, 4).total(), 20);
        assert_eq!(Shape::new_3d(2, 3, 4).total(), 24);

        let s = Shape::new_4d(2, 3, 4, 5);
        assert_eq!(s.dims(), 4);
        assert_eq!(s.total(), 120);
        assert_eq!(s.contiguous_strides(), [1, 2, 6, 24]);
    }

    #[test]
    fn test_zero_extent_is_empty() {
        assert!(Shape::new_2d(0, 7).is_empty());
        assert!(Shape::new_4d(3, 3, 0, 3).is_empty());
        assert!(!Shape::new_1d(1).is_empty());
    }
}
