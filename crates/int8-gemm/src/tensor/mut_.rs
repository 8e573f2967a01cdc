//! Mutable row-block view.

use crate::core::TileRange;
use crate::error::{GemmError, Result};

/// Mutable view over a block of consecutive rows of a row-major matrix.
///
/// Row indices are global: the block starting at row 32 is addressed with
/// rows `32..32 + rows()`. Workers receive disjoint blocks of the same
/// output, so each one can write through its own `TensorMut`.
#[derive(Debug)]
pub struct TensorMut<'a, T> {
    data: &'a mut [T],
    row_start: usize,
    rows: usize,
    cols: usize,
}

impl<'a, T> TensorMut<'a, T> {
    /// Wrap `data` as whole rows of width `cols`, starting at global row
    /// `row_start`.
    pub fn new(data: &'a mut [T], row_start: usize, cols: usize) -> Result<Self> {
        if cols == 0 {
            if !data.is_empty() {
                return Err(GemmError::DimensionMismatch(format!(
                    "{} elements cannot form rows of width 0",
                    data.len()
                )));
            }
            return Ok(Self {
                data,
                row_start,
                rows: 0,
                cols,
            });
        }
        if data.len() % cols != 0 {
            return Err(GemmError::DimensionMismatch(format!(
                "{} elements is not a whole number of rows of width {}",
                data.len(),
                cols
            )));
        }
        let rows = data.len() / cols;
        Ok(Self {
            data,
            row_start,
            rows,
            cols,
        })
    }

    /// Global index of the first row.
    #[inline]
    pub fn row_start(&self) -> usize {
        self.row_start
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Global row range covered by this block.
    #[inline]
    pub fn row_range(&self) -> TileRange {
        TileRange::new(self.row_start, self.rows)
    }

    /// Fail unless the region `rows × cols` lies inside this block.
    pub fn check_region(&self, rows: TileRange, cols: TileRange) -> Result<()> {
        if rows.start < self.row_start || rows.end() > self.row_start + self.rows {
            return Err(GemmError::TileOutOfBounds {
                axis: "output rows",
                start: rows.start,
                len: rows.len,
                extent: self.row_start + self.rows,
            });
        }
        cols.check("output cols", self.cols)
    }

    /// Mutable slice of one row, addressed by global index.
    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        debug_assert!(
            row >= self.row_start && row < self.row_start + self.rows,
            "row {} outside block {}..{}",
            row,
            self.row_start,
            self.row_start + self.rows
        );
        let base = (row - self.row_start) * self.cols;
        &mut self.data[base..base + self.cols]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data
    }
}

impl<T: Copy> TensorMut<'_, T> {
    /// Element at global `(row, col)`, or `None` outside the block.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row < self.row_start || col >= self.cols {
            return None;
        }
        self.data.get((row - self.row_start) * self.cols + col).copied()
    }

    /// Write one element at global `(row, col)`.
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        self.check_region(TileRange::new(row, 1), TileRange::new(col, 1))?;
        let idx = (row - self.row_start) * self.cols + col;
        self.data[idx] = value;
        Ok(())
    }
}
