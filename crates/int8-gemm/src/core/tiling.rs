use crate::error::{GemmError, Result};
use crate::simd::SimdLevel;

/// Tile sizes used to partition a GEMM problem.
///
/// `tile_i` and `tile_j` bound the output block a single worker owns;
/// `tile_k` bounds the contraction depth of one packed tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingParams {
    /// Block size for the M (output row) dimension.
    pub tile_i: usize,
    /// Block size for the N (output column) dimension.
    pub tile_j: usize,
    /// Block size for the K (contraction) dimension.
    pub tile_k: usize,
}

impl TilingParams {
    /// Default parameters for the AVX2 int8 kernel.
    pub const INT8_AVX2: Self = Self {
        tile_i: 64,
        tile_j: 64,
        tile_k: 256,
    };

    /// Default parameters for the portable and reference kernels.
    pub const PORTABLE: Self = Self {
        tile_i: 32,
        tile_j: 32,
        tile_k: 128,
    };

    /// Create custom tiling parameters.
    pub const fn new(tile_i: usize, tile_j: usize, tile_k: usize) -> Self {
        Self {
            tile_i,
            tile_j,
            tile_k,
        }
    }

    /// Validate that tiling parameters are usable.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.tile_i == 0 || self.tile_j == 0 {
            return Err("tile_i and tile_j must be non-zero");
        }
        if self.tile_k == 0 {
            return Err("tile_k must be non-zero");
        }
        Ok(())
    }

    /// Parameters tuned for a capability level.
    pub fn for_level(level: SimdLevel) -> Self {
        match level {
            SimdLevel::Avx2 | SimdLevel::Avx512 => Self::INT8_AVX2,
            _ => Self::PORTABLE,
        }
    }
}

impl Default for TilingParams {
    fn default() -> Self {
        Self::PORTABLE
    }
}

/// A contiguous range along one axis of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRange {
    pub start: usize,
    pub len: usize,
}

impl TileRange {
    #[inline]
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Range covering `0..extent`.
    #[inline]
    pub const fn full(extent: usize) -> Self {
        Self::new(0, extent)
    }

    /// One past the last index.
    #[inline]
    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fail unless the range fits inside `0..extent`.
    pub fn check(&self, axis: &'static str, extent: usize) -> Result<()> {
        match self.start.checked_add(self.len) {
            Some(end) if end <= extent => Ok(()),
            _ => Err(GemmError::TileOutOfBounds {
                axis,
                start: self.start,
                len: self.len,
                extent,
            }),
        }
    }
}

/// Iterator over blocks for the outer loops.
pub struct BlockIterator {
    total: usize,
    block_size: usize,
    current: usize,
}

impl BlockIterator {
    pub fn new(total: usize, block_size: usize) -> Self {
        Self {
            total,
            block_size,
            current: 0,
        }
    }

    /// Number of blocks the iterator yields in total.
    pub fn count_blocks(total: usize, block_size: usize) -> usize {
        if block_size == 0 {
            0
        } else {
            total.div_ceil(block_size)
        }
    }
}

impl Iterator for BlockIterator {
    type Item = TileRange;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.total || self.block_size == 0 {
            return None;
        }

        let start = self.current;
        let len = (self.total - start).min(self.block_size);
        self.current += len;

        Some(TileRange::new(start, len))
    }
}
