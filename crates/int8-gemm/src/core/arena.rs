use rayon::prelude::*;

use crate::error::Result;

use super::packing::PackedTile;
use super::tiling::TileRange;

/// Packed tiles of one operand for a single GEMM invocation.
///
/// Tiles are indexed by `(block, k_block)`. The arena is filled completely
/// before compute starts and is then only read, so workers borrow it
/// shared.
#[derive(Debug, Clone, Default)]
pub struct PackArena {
    tiles: Vec<PackedTile>,
    k_blocks: usize,
}

impl PackArena {
    /// Pack every `(block, k_block)` pair with `pack`.
    pub fn pack_grid<F>(
        blocks: &[TileRange],
        k_blocks: &[TileRange],
        parallel: bool,
        pack: F,
    ) -> Result<Self>
    where
        F: Fn(TileRange, TileRange) -> Result<PackedTile> + Sync + Send,
    {
        let nk = k_blocks.len();
        let total = blocks.len() * nk;
        let job = |idx: usize| pack(blocks[idx / nk], k_blocks[idx % nk]);

        let tiles = if parallel {
            (0..total).into_par_iter().map(job).collect::<Result<Vec<_>>>()?
        } else {
            (0..total).map(job).collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            tiles,
            k_blocks: nk,
        })
    }

    /// Packed tile of `block` at contraction block `k_block`.
    #[inline]
    pub fn get(&self, block: usize, k_block: usize) -> &PackedTile {
        &self.tiles[block * self.k_blocks + k_block]
    }

    #[inline]
    pub fn k_blocks(&self) -> usize {
        self.k_blocks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Bytes held by all packed tiles.
    pub fn packed_bytes(&self) -> usize {
        self.tiles.iter().map(|t| t.as_slice().len()).sum()
    }
}
