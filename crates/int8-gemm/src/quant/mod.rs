//! Symmetric int8 quantization.
//!
//! A value `v` with scale `s` is stored as `round(clamp(v / s, -127, 127))`.
//! The range is symmetric, so `-128` is never produced. Values beyond the
//! range saturate silently, and NaN maps to `0`.

use rayon::prelude::*;

use crate::error::{GemmError, Result};
use crate::tensor::Tensor;

/// Largest magnitude of a quantized value.
pub const QMAX: f32 = 127.0;

/// How scales are derived from data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantMode {
    /// One scale per matrix row.
    #[default]
    PerRow,
    /// One scale for the whole matrix.
    PerTensor,
}

/// Quantization scales of one operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Scales {
    /// A single scale shared by every channel.
    Uniform(f32),
    /// One scale per channel (row of the left operand, column of the output).
    PerChannel(Vec<f32>),
}

impl Scales {
    /// Scale of channel `idx`.
    ///
    /// Callers validate the vector length against the channel count first.
    #[inline]
    pub fn get(&self, idx: usize) -> f32 {
        match self {
            Scales::Uniform(s) => *s,
            Scales::PerChannel(v) => v[idx],
        }
    }

    /// Number of per-channel entries, or `None` for a uniform scale.
    pub fn len(&self) -> Option<usize> {
        match self {
            Scales::Uniform(_) => None,
            Scales::PerChannel(v) => Some(v.len()),
        }
    }

    /// Check every scale is positive and finite, and that a per-channel
    /// vector covers exactly `channels` channels.
    pub fn validate(&self, channels: usize) -> Result<()> {
        match self {
            Scales::Uniform(s) => check_scale(0, *s),
            Scales::PerChannel(v) => {
                if v.len() != channels {
                    return Err(GemmError::ScaleCount {
                        expected: channels,
                        got: v.len(),
                    });
                }
                v.iter()
                    .enumerate()
                    .try_for_each(|(index, &s)| check_scale(index, s))
            }
        }
    }
}

impl From<f32> for Scales {
    fn from(scale: f32) -> Self {
        Scales::Uniform(scale)
    }
}

impl From<Vec<f32>> for Scales {
    fn from(scales: Vec<f32>) -> Self {
        Scales::PerChannel(scales)
    }
}

#[inline]
fn check_scale(index: usize, value: f32) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(GemmError::InvalidScale { index, value })
    }
}

/// Quantize one value. Rounds half away from zero.
#[inline(always)]
pub fn quantize_value(v: f32, scale: f32) -> i8 {
    (v / scale).round().clamp(-QMAX, QMAX) as i8
}

/// Quantize every row of a matrix with its row scale.
pub fn quantize(src: &Tensor<f32>, scales: &Scales) -> Result<Tensor<i8>> {
    src.ensure_matrix()?;
    let (rows, cols) = (src.rows(), src.cols());
    scales.validate(rows)?;

    if src.is_empty() {
        return Ok(Tensor::zeros(rows, cols));
    }

    let mut data = vec![0i8; rows * cols];
    data.par_chunks_mut(cols).enumerate().for_each(|(r, row)| {
        let scale = scales.get(r);
        for (c, q) in row.iter_mut().enumerate() {
            *q = quantize_value(src.at(r, c), scale);
        }
    });
    Tensor::matrix(rows, cols, data)
}

/// Map quantized values back to `q * scale`.
pub fn dequantize(src: &Tensor<i8>, scales: &Scales) -> Result<Tensor<f32>> {
    src.ensure_matrix()?;
    let (rows, cols) = (src.rows(), src.cols());
    scales.validate(rows)?;
    Ok(Tensor::from_fn(rows, cols, |r, c| {
        src.at(r, c) as f32 * scales.get(r)
    }))
}

/// Derive scales so the largest magnitude maps to 127.
///
/// An all-zero row (or tensor) gets scale `1.0`. Infinite inputs have no
/// usable scale and are rejected.
pub fn absmax_scales(src: &Tensor<f32>, mode: QuantMode) -> Result<Scales> {
    src.ensure_matrix()?;
    match mode {
        QuantMode::PerRow => {
            let scales = (0..src.rows())
                .into_par_iter()
                .map(|r| scale_for(r, row_absmax(src, r)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Scales::PerChannel(scales))
        }
        QuantMode::PerTensor => Ok(Scales::Uniform(absmax_scale(src)?)),
    }
}

/// Single scale mapping the largest magnitude of `src` to 127.
pub fn absmax_scale(src: &Tensor<f32>) -> Result<f32> {
    src.ensure_matrix()?;
    let absmax = (0..src.rows())
        .into_par_iter()
        .map(|r| row_absmax(src, r))
        .reduce(|| 0.0, f32::max);
    scale_for(0, absmax)
}

/// Largest magnitude in row `r`; NaN entries are skipped.
fn row_absmax(src: &Tensor<f32>, r: usize) -> f32 {
    (0..src.cols()).fold(0.0f32, |m, c| m.max(src.at(r, c).abs()))
}

fn scale_for(index: usize, absmax: f32) -> Result<f32> {
    if !absmax.is_finite() {
        return Err(GemmError::InvalidScale {
            index,
            value: absmax,
        });
    }
    let scale = absmax / QMAX;
    // subnormal maxima underflow to zero
    Ok(if scale > 0.0 { scale } else { 1.0 })
}
