use rayon::prelude::*;

use super::arena::PackArena;
use super::packing::{PackedTile, Transpose};
use super::tiling::{BlockIterator, TileRange, TilingParams};
use super::unpack::{Descales, Epilogue};
use crate::error::{GemmError, Result};
use crate::quant::Scales;
use crate::simd::KernelTable;
use crate::tensor::{Tensor, TensorMut};

/// Operand orientation, tiling and threading of one GEMM call.
///
/// A is logically `M × K`: stored `M × K` for `NoTrans`, `K × M` for
/// `Trans`. B is logically `K × N`: stored `K × N` for `NoTrans`, `N × K`
/// for `Trans`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmConfig {
    pub trans_a: Transpose,
    pub trans_b: Transpose,
    pub tiling: TilingParams,
    /// Pack and compute tiles on the rayon pool.
    pub parallel: bool,
}

impl Default for GemmConfig {
    fn default() -> Self {
        Self {
            trans_a: Transpose::NoTrans,
            trans_b: Transpose::NoTrans,
            tiling: TilingParams::default(),
            parallel: true,
        }
    }
}

impl GemmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trans_a(mut self, trans: Transpose) -> Self {
        self.trans_a = trans;
        self
    }

    pub fn trans_b(mut self, trans: Transpose) -> Self {
        self.trans_b = trans;
        self
    }

    pub fn tiling(mut self, tiling: TilingParams) -> Self {
        self.tiling = tiling;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Logical `(M, N, K)` of `op(A) · op(B)`.
pub fn problem_dims<T>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    config: &GemmConfig,
) -> Result<(usize, usize, usize)> {
    a.ensure_matrix()?;
    b.ensure_matrix()?;

    let (m, ka) = match config.trans_a {
        Transpose::NoTrans => (a.rows(), a.cols()),
        Transpose::Trans => (a.cols(), a.rows()),
    };
    let (kb, n) = match config.trans_b {
        Transpose::NoTrans => (b.rows(), b.cols()),
        Transpose::Trans => (b.cols(), b.rows()),
    };

    if ka != kb {
        return Err(GemmError::ContractionMismatch {
            left: ka,
            right: kb,
        });
    }
    Ok((m, n, ka))
}

/// Quantized GEMM on f32 operands.
///
/// A is quantized per `a_scales` (indexed by output row) and B with the
/// single `b_scale`, both fused into packing. The integer product is
/// dequantized with the same scales and passed through `epilogue`.
pub fn gemm_quantized_tiled(
    table: &KernelTable,
    a: &Tensor<f32>,
    a_scales: &Scales,
    b: &Tensor<f32>,
    b_scale: f32,
    epilogue: &Epilogue<'_>,
    config: &GemmConfig,
) -> Result<Tensor<f32>> {
    let (m, n, k) = problem_dims(a, b, config)?;
    let descales = Descales::new(a_scales.clone(), b_scale);

    let pack_a = |rows: TileRange, ks: TileRange| match config.trans_a {
        Transpose::NoTrans => table.pack_a_tile_quantized(a, rows, ks, a_scales),
        Transpose::Trans => table.transpose_pack_a_tile_quantized(a, rows, ks, a_scales),
    };
    let pack_b = |cols: TileRange, ks: TileRange| match config.trans_b {
        Transpose::Trans => table.pack_b_tile_quantized(b, cols, ks, b_scale),
        Transpose::NoTrans => table.transpose_pack_b_tile_quantized(b, cols, ks, b_scale),
    };

    run_tiled(table, (m, n, k), &descales, epilogue, config, pack_a, pack_b)
}

/// GEMM on pre-quantized int8 operands.
pub fn gemm_int8_tiled(
    table: &KernelTable,
    a: &Tensor<i8>,
    b: &Tensor<i8>,
    descales: &Descales,
    epilogue: &Epilogue<'_>,
    config: &GemmConfig,
) -> Result<Tensor<f32>> {
    let (m, n, k) = problem_dims(a, b, config)?;

    let pack_a = |rows: TileRange, ks: TileRange| match config.trans_a {
        Transpose::NoTrans => table.pack_a_tile(a, rows, ks),
        Transpose::Trans => table.transpose_pack_a_tile(a, rows, ks),
    };
    let pack_b = |cols: TileRange, ks: TileRange| match config.trans_b {
        Transpose::Trans => table.pack_b_tile(b, cols, ks),
        Transpose::NoTrans => table.transpose_pack_b_tile(b, cols, ks),
    };

    run_tiled(table, (m, n, k), descales, epilogue, config, pack_a, pack_b)
}

fn run_tiled<PA, PB>(
    table: &KernelTable,
    (m, n, k): (usize, usize, usize),
    descales: &Descales,
    epilogue: &Epilogue<'_>,
    config: &GemmConfig,
    pack_a: PA,
    pack_b: PB,
) -> Result<Tensor<f32>>
where
    PA: Fn(TileRange, TileRange) -> Result<PackedTile> + Sync + Send,
    PB: Fn(TileRange, TileRange) -> Result<PackedTile> + Sync + Send,
{
    let tiling = config.tiling;
    tiling.validate().map_err(GemmError::InvalidTiling)?;
    descales.validate(m, n)?;
    epilogue.validate(m, n)?;

    let (out_rows, out_cols) = epilogue.output_dims(m, n);
    if m == 0 || n == 0 {
        return Ok(Tensor::zeros(out_rows, out_cols));
    }

    let i_blocks: Vec<TileRange> = BlockIterator::new(m, tiling.tile_i).collect();
    let j_blocks: Vec<TileRange> = BlockIterator::new(n, tiling.tile_j).collect();
    let k_blocks: Vec<TileRange> = BlockIterator::new(k, tiling.tile_k).collect();

    log::trace!(
        "int8 gemm {}x{}x{} on {:?}: {}x{}x{} tiles of {:?}, parallel={}",
        m,
        n,
        k,
        table.backend(),
        i_blocks.len(),
        j_blocks.len(),
        k_blocks.len(),
        tiling,
        config.parallel
    );

    let packed_a = PackArena::pack_grid(&i_blocks, &k_blocks, config.parallel, pack_a)?;
    let packed_b = PackArena::pack_grid(&j_blocks, &k_blocks, config.parallel, pack_b)?;

    // Output rows follow i-blocks, or j-blocks when the output is transposed.
    let transpose = epilogue.output_transpose;
    let (outer, inner, outer_tile) = if transpose {
        (&j_blocks, &i_blocks, tiling.tile_j)
    } else {
        (&i_blocks, &j_blocks, tiling.tile_i)
    };

    let job = |(ob, chunk): (usize, &mut [f32])| -> Result<()> {
        let mut view = TensorMut::new(chunk, outer[ob].start, out_cols)?;
        for ib in 0..inner.len() {
            let (bi, bj) = if transpose { (ib, ob) } else { (ob, ib) };
            let mut tile = table.new_tile(i_blocks[bi], j_blocks[bj]);
            for kb in 0..k_blocks.len() {
                table.compute(packed_a.get(bi, kb), packed_b.get(bj, kb), &mut tile)?;
            }
            table.unpack(&tile, &mut view, descales, epilogue)?;
        }
        Ok(())
    };

    let mut out = vec![0.0f32; out_rows * out_cols];
    // Tile sizes may exceed the output; one block then covers all rows.
    let chunk = outer_tile.min(out_rows) * out_cols;
    if config.parallel {
        out.par_chunks_mut(chunk).enumerate().try_for_each(job)?;
    } else {
        out.chunks_mut(chunk).enumerate().try_for_each(job)?;
    }

    Tensor::matrix(out_rows, out_cols, out)
}
