//! Dequantization of integer result tiles.

use crate::error::{GemmError, Result};
use crate::quant::Scales;
use crate::tensor::{Tensor, TensorMut};

use super::kernel::IntTile;
use super::tiling::TileRange;

/// How the bias `C` aligns with the `M × N` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Broadcast {
    /// No bias.
    #[default]
    None,
    /// The first element of `C` is added everywhere.
    Scalar,
    /// `C` holds `M` elements, one per output row.
    PerRow,
    /// `C` holds `N` elements, one per output column.
    PerColumn,
    /// `C` is a full `M × N` matrix.
    Full,
}

/// Element `idx` of a rank <= 2 tensor in row-major order.
#[inline]
fn flat(c: &Tensor<f32>, idx: usize) -> f32 {
    c.at(idx / c.cols(), idx % c.cols())
}

impl Broadcast {
    /// Bias value for output element `(i, j)`.
    #[inline]
    pub fn value(self, c: &Tensor<f32>, i: usize, j: usize) -> f32 {
        match self {
            Broadcast::None => 0.0,
            Broadcast::Scalar => c.at(0, 0),
            Broadcast::PerRow => flat(c, i),
            Broadcast::PerColumn => flat(c, j),
            Broadcast::Full => c.at(i, j),
        }
    }

    /// Check that `c` has the shape this broadcast reads for an `m × n`
    /// output.
    pub fn validate(self, c: &Tensor<f32>, m: usize, n: usize) -> Result<()> {
        c.ensure_matrix()?;
        let ok = match self {
            Broadcast::None => true,
            Broadcast::Scalar => !c.is_empty(),
            Broadcast::PerRow => c.total() == m,
            Broadcast::PerColumn => c.total() == n,
            Broadcast::Full => c.rows() == m && c.cols() == n,
        };
        if ok {
            Ok(())
        } else {
            Err(GemmError::DimensionMismatch(format!(
                "bias {}x{} does not match {:?} broadcast for a {}x{} output",
                c.rows(),
                c.cols(),
                self,
                m,
                n
            )))
        }
    }

    /// Check that `c` covers the output region `i × j`.
    fn check_covers(self, c: &Tensor<f32>, i: TileRange, j: TileRange) -> Result<()> {
        c.ensure_matrix()?;
        match self {
            Broadcast::None => Ok(()),
            Broadcast::Scalar => {
                if c.is_empty() {
                    Err(GemmError::DimensionMismatch(
                        "scalar bias is empty".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            Broadcast::PerRow => i.check("bias", c.total()),
            Broadcast::PerColumn => j.check("bias", c.total()),
            Broadcast::Full => {
                i.check("bias rows", c.rows())?;
                j.check("bias cols", c.cols())
            }
        }
    }
}

/// Row and column descales applied to integer accumulators.
///
/// Row descales are the left operand's scales (one per output row); column
/// descales are the right operand's (one per output column, usually
/// uniform).
#[derive(Debug, Clone, PartialEq)]
pub struct Descales {
    pub rows: Scales,
    pub cols: Scales,
}

impl Descales {
    pub fn new(rows: impl Into<Scales>, cols: impl Into<Scales>) -> Self {
        Self {
            rows: rows.into(),
            cols: cols.into(),
        }
    }

    pub fn validate(&self, m: usize, n: usize) -> Result<()> {
        self.rows.validate(m)?;
        self.cols.validate(n)
    }

    fn check_covers(&self, i: TileRange, j: TileRange) -> Result<()> {
        for (scales, range) in [(&self.rows, i), (&self.cols, j)] {
            if let Some(len) = scales.len() {
                if range.end() > len {
                    return Err(GemmError::ScaleCount {
                        expected: range.end(),
                        got: len,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Output stage of a GEMM: `alpha * (A·B) + beta * C`, optionally
/// transposed.
#[derive(Debug, Clone, Copy)]
pub struct Epilogue<'a> {
    pub c: Option<&'a Tensor<f32>>,
    pub broadcast: Broadcast,
    pub alpha: f32,
    pub beta: f32,
    pub output_transpose: bool,
}

impl Default for Epilogue<'_> {
    fn default() -> Self {
        Self {
            c: None,
            broadcast: Broadcast::None,
            alpha: 1.0,
            beta: 0.0,
            output_transpose: false,
        }
    }
}

impl<'a> Epilogue<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a bias read according to `broadcast`.
    pub fn with_bias(mut self, c: &'a Tensor<f32>, broadcast: Broadcast) -> Self {
        self.c = Some(c);
        self.broadcast = broadcast;
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    /// Write `out[j, i]` instead of `out[i, j]`.
    pub fn transpose_output(mut self, transpose: bool) -> Self {
        self.output_transpose = transpose;
        self
    }

    /// Check bias and broadcast against an `m × n` output.
    pub fn validate(&self, m: usize, n: usize) -> Result<()> {
        match (self.c, self.broadcast) {
            (None, Broadcast::None) => Ok(()),
            (Some(_), Broadcast::None) => Err(GemmError::DimensionMismatch(
                "bias given without a broadcast mode".to_string(),
            )),
            (None, b) => Err(GemmError::DimensionMismatch(format!(
                "{b:?} broadcast given without a bias"
            ))),
            (Some(c), b) => b.validate(c, m, n),
        }
    }

    /// Output element shape for an `m × n` product.
    pub fn output_dims(&self, m: usize, n: usize) -> (usize, usize) {
        if self.output_transpose {
            (n, m)
        } else {
            (m, n)
        }
    }

    #[inline(always)]
    fn apply(&self, acc: i32, di: f32, dj: f32, i: usize, j: usize) -> f32 {
        let v = self.alpha * ((acc as f32 * di) * dj);
        match self.c {
            Some(c) => v + self.beta * self.broadcast.value(c, i, j),
            None => v,
        }
    }
}

/// Dequantize an integer tile into the output.
///
/// Writes `alpha * (acc * descale_row[i] * descale_col[j]) + beta * C(i, j)`
/// for every logical element of the tile, at `out[i, j]`, or at `out[j, i]`
/// when the epilogue transposes. Bias coordinates are always `(i, j)` of
/// the untransposed product. Nothing outside the tile extent is written.
pub fn unpack_output_tile(
    tile: &IntTile,
    out: &mut TensorMut<'_, f32>,
    descales: &Descales,
    epilogue: &Epilogue<'_>,
) -> Result<()> {
    let (i, j) = (tile.i(), tile.j());
    descales.check_covers(i, j)?;
    if let Some(c) = epilogue.c {
        epilogue.broadcast.check_covers(c, i, j)?;
    }

    if epilogue.output_transpose {
        out.check_region(j, i)?;
        for lc in 0..j.len {
            let gj = j.start + lc;
            let dj = descales.cols.get(gj);
            let row = out.row_mut(gj);
            for lr in 0..i.len {
                let gi = i.start + lr;
                let di = descales.rows.get(gi);
                row[gi] = epilogue.apply(tile.get(lr, lc), di, dj, gi, gj);
            }
        }
    } else {
        out.check_region(i, j)?;
        for lr in 0..i.len {
            let gi = i.start + lr;
            let di = descales.rows.get(gi);
            let row = out.row_mut(gi);
            for lc in 0..j.len {
                let gj = j.start + lc;
                let dj = descales.cols.get(gj);
                row[gj] = epilogue.apply(tile.get(lr, lc), di, dj, gi, gj);
            }
        }
    }

    Ok(())
}
