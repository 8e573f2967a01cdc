use crate::error::{GemmError, Result};

use super::packing::{PackedTile, K_UNROLL};
use super::tiling::TileRange;

/// Trait for int8 GEMM microkernels.
///
/// A microkernel accumulates one `MR × NR` block of `C += A · Bᵀ` in
/// registers, reading one panel of each packed operand.
pub trait Microkernel: Default + Copy + Send + Sync {
    /// Rows of the microkernel (panel width of packed A).
    const MR: usize;

    /// Columns of the microkernel (panel width of packed B).
    const NR: usize;

    /// Execute the microkernel.
    ///
    /// Computes `C[0..MR, 0..NR] += Σ_k A[i, k] · B[j, k]` over the padded
    /// depth `kpad`, with wrapping `i32` accumulation.
    ///
    /// # Safety
    /// - `kpad` must be a multiple of [`K_UNROLL`]
    /// - `a` must point to at least `MR * kpad` bytes (one packed panel)
    /// - `b` must point to at least `NR * kpad` bytes (one packed panel)
    /// - `c` must point to `MR` rows of at least `NR` elements, `ldc` apart
    unsafe fn execute(&self, kpad: usize, a: *const i8, b: *const i8, c: *mut i32, ldc: usize);
}

/// Scalar microkernel, always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceMicrokernel;

impl Microkernel for ReferenceMicrokernel {
    const MR: usize = 4;
    const NR: usize = 4;

    unsafe fn execute(&self, kpad: usize, a: *const i8, b: *const i8, c: *mut i32, ldc: usize) {
        const MR: usize = 4;
        const NR: usize = 4;

        let mut acc = [[0i32; NR]; MR];

        for kg in (0..kpad).step_by(K_UNROLL) {
            let ap = a.add(kg * MR);
            let bp = b.add(kg * NR);
            for (i, row) in acc.iter_mut().enumerate() {
                for (j, sum) in row.iter_mut().enumerate() {
                    for u in 0..K_UNROLL {
                        let prod = (*ap.add(i * K_UNROLL + u) as i32)
                            .wrapping_mul(*bp.add(j * K_UNROLL + u) as i32);
                        *sum = sum.wrapping_add(prod);
                    }
                }
            }
        }

        for (i, row) in acc.iter().enumerate() {
            for (j, &sum) in row.iter().enumerate() {
                let dst = c.add(i * ldc + j);
                *dst = (*dst).wrapping_add(sum);
            }
        }
    }
}

/// Integer accumulator tile for one output block.
///
/// Storage is padded to whole `MR × NR` microtiles. Padded lanes only ever
/// receive products of zero padding, so they stay zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntTile {
    data: Vec<i32>,
    i: TileRange,
    j: TileRange,
    padded_rows: usize,
    ld: usize,
}

impl IntTile {
    /// A zeroed tile covering output rows `i` and columns `j`.
    pub fn new(i: TileRange, j: TileRange, mr: usize, nr: usize) -> Self {
        let padded_rows = i.len.div_ceil(mr.max(1)) * mr;
        let ld = j.len.div_ceil(nr.max(1)) * nr;
        Self {
            data: vec![0; padded_rows * ld],
            i,
            j,
            padded_rows,
            ld,
        }
    }

    /// Output row range.
    #[inline]
    pub fn i(&self) -> TileRange {
        self.i
    }

    /// Output column range.
    #[inline]
    pub fn j(&self) -> TileRange {
        self.j
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.i.len
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.j.len
    }

    /// Row stride of the padded storage.
    #[inline]
    pub fn ld(&self) -> usize {
        self.ld
    }

    #[inline]
    pub fn padded_rows(&self) -> usize {
        self.padded_rows
    }

    /// Accumulator at local `(row, col)`; padded lanes are addressable.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> i32 {
        self.data[row * self.ld + col]
    }

    /// Padded storage, row-major with stride [`ld`](Self::ld).
    #[inline]
    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    /// Zero every accumulator.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }
}

/// Accumulate `c += a · bᵀ` for two packed tiles with microkernel `K`.
///
/// Calling this for successive contraction blocks of the same output block
/// accumulates the full product.
pub fn gemm_tile<K: Microkernel>(a: &PackedTile, b: &PackedTile, c: &mut IntTile) -> Result<()> {
    if a.depth() != b.depth() {
        return Err(GemmError::ContractionMismatch {
            left: a.depth(),
            right: b.depth(),
        });
    }
    if a.panel() != K::MR {
        return Err(GemmError::PanelMismatch {
            expected: K::MR,
            got: a.panel(),
        });
    }
    if b.panel() != K::NR {
        return Err(GemmError::PanelMismatch {
            expected: K::NR,
            got: b.panel(),
        });
    }
    if a.rows() != c.rows()
        || b.rows() != c.cols()
        || c.padded_rows != a.panels() * K::MR
        || c.ld != b.panels() * K::NR
    {
        return Err(GemmError::DimensionMismatch(format!(
            "result tile {}x{} (padded {}x{}) does not fit packed operands {}x{} and {}x{}",
            c.rows(),
            c.cols(),
            c.padded_rows,
            c.ld,
            a.rows(),
            a.depth(),
            b.rows(),
            b.depth()
        )));
    }

    let kpad = a.padded_depth();
    if kpad == 0 {
        return Ok(());
    }

    let kernel = K::default();
    let ld = c.ld;
    for pi in 0..a.panels() {
        let ap = a.panel_slice(pi);
        for pj in 0..b.panels() {
            let bp = b.panel_slice(pj);
            let offset = pi * K::MR * ld + pj * K::NR;
            // SAFETY: panel slices hold MR*kpad and NR*kpad bytes, kpad is a
            // multiple of K_UNROLL, and the IntTile geometry check above
            // guarantees MR rows of NR lanes starting at `offset`.
            unsafe {
                kernel.execute(
                    kpad,
                    ap.as_ptr(),
                    bp.as_ptr(),
                    c.data.as_mut_ptr().add(offset),
                    ld,
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packing::{pack_a_tile, pack_b_tile};
    use crate::tensor::Tensor;

    fn naive(a: &Tensor<i8>, b: &Tensor<i8>) -> Vec<i32> {
        let (m, n, k) = (a.rows(), b.rows(), a.cols());
        let mut out = vec![0i32; m * n];
        for i in 0..m {
            for j in 0..n {
                out[i * n + j] = (0..k).map(|p| a.at(i, p) as i32 * b.at(j, p) as i32).sum();
            }
        }
        out
    }

    fn pack_pair(a: &Tensor<i8>, b: &Tensor<i8>) -> (PackedTile, PackedTile) {
        let k = TileRange::full(a.cols());
        (
            pack_a_tile(a, TileRange::full(a.rows()), k, 4).unwrap(),
            pack_b_tile(b, TileRange::full(b.rows()), k, 4).unwrap(),
        )
    }

    #[test]
    fn test_ones_tile() {
        // A = 2x4 ones, B = 4x3 ones stored as 3x4
        let a = Tensor::filled(2, 4, 1i8);
        let b = Tensor::filled(3, 4, 1i8);
        let (pa, pb) = pack_pair(&a, &b);

        let mut c = IntTile::new(TileRange::full(2), TileRange::full(3), 4, 4);
        gemm_tile::<ReferenceMicrokernel>(&pa, &pb, &mut c).unwrap();

        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(c.get(i, j), 4);
            }
        }
    }

    #[test]
    fn test_matches_naive_odd_sizes() {
        let a = Tensor::from_fn(7, 9, |i, k| ((i * 31 + k * 7) % 255) as i8);
        let b = Tensor::from_fn(5, 9, |j, k| ((j * 13 + k * 17) % 251) as i8);
        let (pa, pb) = pack_pair(&a, &b);

        let mut c = IntTile::new(TileRange::full(7), TileRange::full(5), 4, 4);
        gemm_tile::<ReferenceMicrokernel>(&pa, &pb, &mut c).unwrap();

        let expected = naive(&a, &b);
        for i in 0..7 {
            for j in 0..5 {
                assert_eq!(c.get(i, j), expected[i * 5 + j], "at ({i}, {j})");
            }
        }
    }

    #[test]
    fn test_padded_lanes_stay_zero() {
        let a = Tensor::filled(3, 5, -7i8);
        let b = Tensor::filled(2, 5, 9i8);
        let (pa, pb) = pack_pair(&a, &b);

        let mut c = IntTile::new(TileRange::full(3), TileRange::full(2), 4, 4);
        gemm_tile::<ReferenceMicrokernel>(&pa, &pb, &mut c).unwrap();

        for r in 0..c.padded_rows() {
            for col in 0..c.ld() {
                let expected = if r < 3 && col < 2 { -7 * 9 * 5 } else { 0 };
                assert_eq!(c.get(r, col), expected);
            }
        }
    }

    #[test]
    fn test_accumulates_over_k_blocks() {
        let a = Tensor::from_fn(4, 10, |i, k| (i + k) as i8);
        let b = Tensor::from_fn(4, 10, |j, k| (j * 2 + k) as i8 - 5);
        let rows = TileRange::full(4);

        let mut c = IntTile::new(rows, rows, 4, 4);
        for ks in [TileRange::new(0, 6), TileRange::new(6, 4)] {
            let pa = pack_a_tile(&a, rows, ks, 4).unwrap();
            let pb = pack_b_tile(&b, rows, ks, 4).unwrap();
            gemm_tile::<ReferenceMicrokernel>(&pa, &pb, &mut c).unwrap();
        }

        let expected = naive(&a, &b);
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(c.get(i, j), expected[i * 4 + j]);
            }
        }
    }

    #[test]
    fn test_contraction_mismatch() {
        let a = Tensor::filled(4, 4, 1i8);
        let b = Tensor::filled(4, 5, 1i8);
        let pa = pack_a_tile(&a, TileRange::full(4), TileRange::full(4), 4).unwrap();
        let pb = pack_b_tile(&b, TileRange::full(4), TileRange::full(5), 4).unwrap();

        let mut c = IntTile::new(TileRange::full(4), TileRange::full(4), 4, 4);
        assert_eq!(
            gemm_tile::<ReferenceMicrokernel>(&pa, &pb, &mut c).unwrap_err(),
            GemmError::ContractionMismatch { left: 4, right: 5 }
        );
    }

    #[test]
    fn test_panel_mismatch() {
        let a = Tensor::filled(4, 4, 1i8);
        let pa = pack_a_tile(&a, TileRange::full(4), TileRange::full(4), 8).unwrap();
        let pb = pack_b_tile(&a, TileRange::full(4), TileRange::full(4), 4).unwrap();

        let mut c = IntTile::new(TileRange::full(4), TileRange::full(4), 4, 4);
        assert_eq!(
            gemm_tile::<ReferenceMicrokernel>(&pa, &pb, &mut c).unwrap_err(),
            GemmError::PanelMismatch {
                expected: 4,
                got: 8
            }
        );
    }

    #[test]
    fn test_result_tile_shape_mismatch() {
        let a = Tensor::filled(4, 4, 1i8);
        let (pa, pb) = pack_pair(&a, &a);
        let mut c = IntTile::new(TileRange::full(3), TileRange::full(4), 4, 4);
        assert!(matches!(
            gemm_tile::<ReferenceMicrokernel>(&pa, &pb, &mut c),
            Err(GemmError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_reset() {
        let a = Tensor::filled(2, 4, 3i8);
        let (pa, pb) = pack_pair(&a, &a);
        let mut c = IntTile::new(TileRange::full(2), TileRange::full(2), 4, 4);
        gemm_tile::<ReferenceMicrokernel>(&pa, &pb, &mut c).unwrap();
        assert_eq!(c.get(1, 1), 36);

        c.reset();
        assert!(c.as_slice().iter().all(|&v| v == 0));
    }
}
