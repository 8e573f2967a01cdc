//! Reference-counted tensor view.

use std::ops::Index;
use std::sync::Arc;

use crate::core::TileRange;
use crate::error::{GemmError, Result};

use super::Shape;

/// Strided view over a shared data block.
///
/// The block is reference counted: cloning a tensor, taking a
/// [`view`](Tensor::view) or a [`transposed`](Tensor::transposed) view
/// shares it, and it is freed with the last view. Writes go through
/// [`make_mut`](Tensor::make_mut), which copies the block first if any
/// other view can still observe it.
///
/// ```
/// use int8_gemm::Tensor;
///
/// let mut a = Tensor::matrix(2, 2, vec![1i8, 2, 3, 4]).unwrap();
/// let snapshot = a.clone();
///
/// a.make_mut()[0] = 9;
/// assert_eq!(a.at(0, 0), 9);
/// assert_eq!(snapshot.at(0, 0), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Tensor<T> {
    storage: Arc<Vec<T>>,
    offset: usize,
    shape: Shape,
    strides: [usize; 4],
}

impl<T> Tensor<T> {
    /// Wrap a contiguous vector in a tensor of the given shape.
    pub fn from_vec(shape: Shape, data: Vec<T>) -> Result<Self> {
        if data.len() != shape.total() {
            return Err(GemmError::DimensionMismatch(format!(
                "data length {} does not match shape {:?} ({} elements)",
                data.len(),
                shape,
                shape.total()
            )));
        }
        Ok(Self {
            storage: Arc::new(data),
            offset: 0,
            strides: shape.contiguous_strides(),
            shape,
        })
    }

    /// Create a `rows × cols` matrix from row-major data.
    pub fn matrix(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        Self::from_vec(Shape::new_2d(cols, rows), data)
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[inline]
    pub fn dims(&self) -> usize {
        self.shape.dims()
    }

    #[inline]
    pub fn w(&self) -> usize {
        self.shape.w()
    }

    #[inline]
    pub fn h(&self) -> usize {
        self.shape.h()
    }

    #[inline]
    pub fn d(&self) -> usize {
        self.shape.d()
    }

    #[inline]
    pub fn c(&self) -> usize {
        self.shape.c()
    }

    /// Number of matrix rows (`h`).
    #[inline]
    pub fn rows(&self) -> usize {
        self.shape.h()
    }

    /// Number of matrix columns (`w`).
    #[inline]
    pub fn cols(&self) -> usize {
        self.shape.w()
    }

    /// Size of one element in bytes.
    #[inline]
    pub fn elemsize(&self) -> usize {
        std::mem::size_of::<T>()
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.shape.total()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }

    /// Element strides of the `w`, `h`, `d` and `c` axes.
    #[inline]
    pub fn strides(&self) -> [usize; 4] {
        self.strides
    }

    /// Number of views currently sharing the data block.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.storage)
    }

    /// True when elements are laid out densely in row-major order.
    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.contiguous_strides()
    }

    /// Borrow the elements as a slice when the view is contiguous.
    pub fn as_slice(&self) -> Option<&[T]> {
        if self.is_contiguous() {
            Some(&self.storage[self.offset..self.offset + self.total()])
        } else {
            None
        }
    }

    /// Fail unless the tensor can be read as a matrix.
    pub(crate) fn ensure_matrix(&self) -> Result<()> {
        if self.dims() > 2 {
            return Err(GemmError::UnsupportedRank(self.dims()));
        }
        Ok(())
    }

    /// A view with rows and columns swapped, sharing the data block.
    pub fn transposed(&self) -> Result<Self> {
        self.ensure_matrix()?;
        let [sw, sh, sd, sc] = self.strides;
        Ok(Self {
            storage: Arc::clone(&self.storage),
            offset: self.offset,
            shape: Shape::new_2d(self.rows(), self.cols()),
            strides: [sh, sw, sd, sc],
        })
    }

    /// A rectangular sub-view sharing the data block.
    pub fn view(&self, rows: TileRange, cols: TileRange) -> Result<Self> {
        self.ensure_matrix()?;
        rows.check("rows", self.rows())?;
        cols.check("cols", self.cols())?;
        Ok(Self {
            storage: Arc::clone(&self.storage),
            offset: self.offset + rows.start * self.strides[1] + cols.start * self.strides[0],
            shape: Shape::new_2d(cols.len, rows.len),
            strides: self.strides,
        })
    }

    #[inline]
    fn index_of(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows(), "row {} out of bounds {}", row, self.rows());
        debug_assert!(col < self.cols(), "col {} out of bounds {}", col, self.cols());
        self.offset + row * self.strides[1] + col * self.strides[0]
    }
}

impl<T: Copy> Tensor<T> {
    /// A `rows × cols` matrix with every element set to `value`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        let shape = Shape::new_2d(cols, rows);
        Self {
            storage: Arc::new(vec![value; rows * cols]),
            offset: 0,
            strides: shape.contiguous_strides(),
            shape,
        }
    }

    /// Build a matrix from a function of `(row, col)`.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> T,
    {
        let data = (0..rows * cols).map(|idx| f(idx / cols, idx % cols)).collect();
        let shape = Shape::new_2d(cols, rows);
        Self {
            storage: Arc::new(data),
            offset: 0,
            strides: shape.contiguous_strides(),
            shape,
        }
    }

    /// Element at `(row, col)` of a matrix view.
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> T {
        self.storage[self.index_of(row, col)]
    }

    /// Element at `(row, col)`, or `None` when out of range.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if self.dims() > 2 || row >= self.rows() || col >= self.cols() {
            return None;
        }
        Some(self.at(row, col))
    }

    /// Copy the logical elements out in row-major order.
    pub fn to_vec(&self) -> Vec<T> {
        if let Some(slice) = self.as_slice() {
            return slice.to_vec();
        }
        let [sw, sh, sd, sc] = self.strides;
        let mut out = Vec::with_capacity(self.total());
        for c in 0..self.c() {
            for d in 0..self.d() {
                for h in 0..self.h() {
                    let base = self.offset + c * sc + d * sd + h * sh;
                    out.extend((0..self.w()).map(|w| self.storage[base + w * sw]));
                }
            }
        }
        out
    }

    /// A contiguous tensor with the same logical contents.
    pub fn to_contiguous(&self) -> Self {
        if self.is_contiguous() && self.offset == 0 && self.storage.len() == self.total() {
            return self.clone();
        }
        Self {
            storage: Arc::new(self.to_vec()),
            offset: 0,
            shape: self.shape,
            strides: self.shape.contiguous_strides(),
        }
    }

    /// Unique, contiguous access to the elements.
    ///
    /// Copies the block first when it is shared, strided, or larger than
    /// this view, so no other view ever observes the write.
    pub fn make_mut(&mut self) -> &mut [T] {
        if !(self.is_contiguous() && self.offset == 0 && self.storage.len() == self.total()) {
            *self = Self {
                storage: Arc::new(self.to_vec()),
                offset: 0,
                shape: self.shape,
                strides: self.shape.contiguous_strides(),
            };
        }
        Arc::make_mut(&mut self.storage).as_mut_slice()
    }

    /// Consume the view and return its elements in row-major order.
    pub fn into_vec(self) -> Vec<T> {
        if self.is_contiguous() && self.offset == 0 && self.storage.len() == self.total() {
            match Arc::try_unwrap(self.storage) {
                Ok(data) => data,
                Err(shared) => shared.as_ref().clone(),
            }
        } else {
            self.to_vec()
        }
    }
}

impl<T: Copy + Default> Tensor<T> {
    /// A `rows × cols` matrix of default values.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, T::default())
    }
}

impl<T> Index<(usize, usize)> for Tensor<T> {
    type Output = T;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self.storage[self.index_of(row, col)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tensor<f32> {
        Tensor::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap()
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        let err = Tensor::matrix(2, 3, vec![0i8; 5]).unwrap_err();
        assert!(matches!(err, GemmError::DimensionMismatch(_)));
    }

    #[test]
    fn test_matrix_accessors() {
        let a = sample();
        assert_eq!(a.rows(), 2);
        assert_eq!(a.cols(), 3);
        assert_eq!(a.dims(), 2);
        assert_eq!(a.elemsize(), 4);
        assert_eq!(a.at(1, 2), 6.0);
        assert_eq!(a[(0, 1)], 2.0);
        assert_eq!(a.get(2, 0), None);
        assert!(a.is_contiguous());
    }

    #[test]
    fn test_elemsize_i8() {
        let a = Tensor::<i8>::zeros(3, 3);
        assert_eq!(a.elemsize(), 1);
    }

    #[test]
    fn test_transposed_shares_storage() {
        let a = sample();
        let at = a.transposed().unwrap();

        assert_eq!(at.rows(), 3);
        assert_eq!(at.cols(), 2);
        assert!(!at.is_contiguous());
        assert_eq!(a.ref_count(), 2);
        assert_eq!(at.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        drop(at);
        assert_eq!(a.ref_count(), 1);
    }

    #[test]
    fn test_view_is_strided() {
        let a = Tensor::from_fn(4, 5, |i, j| (i * 10 + j) as i32);
        let v = a
            .view(TileRange::new(1, 2), TileRange::new(2, 3))
            .unwrap();

        assert_eq!(v.rows(), 2);
        assert_eq!(v.cols(), 3);
        assert_eq!(v.at(0, 0), 12);
        assert_eq!(v.at(1, 2), 24);
        assert_eq!(v.to_vec(), vec![12, 13, 14, 22, 23, 24]);
    }

    #[test]
    fn test_view_out_of_bounds() {
        let a = Tensor::<f32>::zeros(4, 4);
        let err = a.view(TileRange::new(3, 2), TileRange::new(0, 4)).unwrap_err();
        assert!(matches!(err, GemmError::TileOutOfBounds { axis: "rows", .. }));
    }

    #[test]
    fn test_make_mut_copies_when_shared() {
        let mut a = sample();
        let b = a.clone();

        a.make_mut()[5] = 60.0;

        assert_eq!(a.at(1, 2), 60.0);
        assert_eq!(b.at(1, 2), 6.0);
        assert_eq!(a.ref_count(), 1);
        assert_eq!(b.ref_count(), 1);
    }

    #[test]
    fn test_make_mut_on_transposed_view() {
        let a = sample();
        let mut at = a.transposed().unwrap();
        at.make_mut()[0] = -1.0;

        assert!(at.is_contiguous());
        assert_eq!(at.at(0, 0), -1.0);
        assert_eq!(a.at(0, 0), 1.0);
    }

    #[test]
    fn test_higher_rank_rejected_as_matrix() {
        let t = Tensor::from_vec(Shape::new_3d(2, 2, 2), vec![0u8; 8]).unwrap();
        assert_eq!(t.transposed().unwrap_err(), GemmError::UnsupportedRank(3));
        assert_eq!(t.get(0, 0), None);
        assert_eq!(t.to_vec().len(), 8);
    }

    #[test]
    fn test_empty_tensor() {
        let t = Tensor::<f32>::zeros(0, 5);
        assert!(t.is_empty());
        assert!(t.to_vec().is_empty());
    }

    #[test]
    fn test_into_vec_roundtrip() {
        let a = sample();
        assert_eq!(a.into_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
