//! Error types for the quantized GEMM pipeline.

use thiserror::Error;

/// Errors reported by packing, compute and unpacking.
///
/// Every variant is raised before the offending memory is touched.
/// Saturation of quantized values to `[-127, 127]` is not an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GemmError {
    /// A tile range reaches past the end of its parent matrix.
    #[error("tile out of bounds on axis {axis}: {len} from {start} exceeds extent {extent}")]
    TileOutOfBounds {
        axis: &'static str,
        start: usize,
        len: usize,
        extent: usize,
    },

    /// The contraction lengths of the two operands differ.
    #[error("contraction mismatch: left operand has k={left}, right operand has k={right}")]
    ContractionMismatch { left: usize, right: usize },

    /// Shapes of operands, bias or output disagree.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The operation needs a matrix but the tensor has a higher rank.
    #[error("expected a matrix (rank <= 2), got rank {0}")]
    UnsupportedRank(usize),

    /// A packed tile was produced for a different kernel geometry.
    #[error("packed panel width {got} does not match kernel panel width {expected}")]
    PanelMismatch { expected: usize, got: usize },

    /// A scale factor is zero, negative, or not finite.
    #[error("invalid scale {value} at index {index}: scales must be positive and finite")]
    InvalidScale { index: usize, value: f32 },

    /// A per-channel scale vector has the wrong length.
    #[error("scale vector has {got} entries, expected {expected}")]
    ScaleCount { expected: usize, got: usize },

    /// Tiling parameters are unusable.
    #[error("invalid tiling parameters: {0}")]
    InvalidTiling(&'static str),
}

/// Result type for GEMM operations.
pub type Result<T> = std::result::Result<T, GemmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_out_of_bounds_message() {
        let err = GemmError::TileOutOfBounds {
            axis: "k",
            start: 8,
            len: 16,
            extent: 20,
        };
        assert_eq!(
            err.to_string(),
            "tile out of bounds on axis k: 16 from 8 exceeds extent 20"
        );
    }

    #[test]
    fn test_invalid_scale_message() {
        let err = GemmError::InvalidScale {
            index: 3,
            value: 0.0,
        };
        assert!(err.to_string().contains("index 3"));
    }
}
