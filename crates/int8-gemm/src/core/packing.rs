use crate::error::{GemmError, Result};
use crate::quant::{quantize_value, Scales};
use crate::tensor::Tensor;

use super::tiling::TileRange;

/// Contraction elements stored contiguously per row inside a panel.
pub const K_UNROLL: usize = 4;

/// Transpose specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transpose {
    /// No transpose.
    #[default]
    NoTrans,
    /// Transpose the matrix.
    Trans,
}

/// A quantized tile in kernel layout.
///
/// The logical tile is `rows × depth`. Rows are grouped into panels of
/// `panel` rows and the contraction axis into groups of [`K_UNROLL`]:
///
/// ```text
/// rows=6, depth=5, panel=4:
///
/// panel 0: [k0..4: r0 r1 r2 r3] [k4..8: r0 r1 r2 r3]
/// panel 1: [k0..4: r4 r5 0  0 ] [k4..8: r4 r5 0  0 ]
///
/// each rN is 4 bytes: a[N][k], a[N][k+1], a[N][k+2], a[N][k+3]
/// (positions past depth are 0)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedTile {
    data: Vec<i8>,
    rows: usize,
    depth: usize,
    panel: usize,
}

impl PackedTile {
    /// Logical row count.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Logical contraction depth.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Rows per panel.
    #[inline]
    pub fn panel(&self) -> usize {
        self.panel
    }

    /// Depth rounded up to a multiple of [`K_UNROLL`].
    #[inline]
    pub fn padded_depth(&self) -> usize {
        self.depth.div_ceil(K_UNROLL) * K_UNROLL
    }

    /// Number of panels, including a partial last one.
    #[inline]
    pub fn panels(&self) -> usize {
        self.rows.div_ceil(self.panel)
    }

    #[inline]
    pub fn as_slice(&self) -> &[i8] {
        &self.data
    }

    /// The packed bytes of panel `p`.
    #[inline]
    pub fn panel_slice(&self, p: usize) -> &[i8] {
        let len = self.panel * self.padded_depth();
        &self.data[p * len..(p + 1) * len]
    }

    /// Logical element `(row, k)`.
    pub fn get(&self, row: usize, k: usize) -> i8 {
        self.data[packed_index(row, k, self.panel, self.padded_depth())]
    }

    /// Restore the logical `rows × depth` matrix.
    pub fn unpack(&self) -> Tensor<i8> {
        Tensor::from_fn(self.rows, self.depth, |r, k| self.get(r, k))
    }
}

#[inline(always)]
fn packed_index(row: usize, k: usize, panel: usize, kpad: usize) -> usize {
    let (p, lr) = (row / panel, row % panel);
    p * panel * kpad + (k / K_UNROLL) * panel * K_UNROLL + lr * K_UNROLL + k % K_UNROLL
}

/// Packed buffer length for a `rows × depth` tile.
#[inline]
pub fn packed_size(rows: usize, depth: usize, panel: usize) -> usize {
    rows.div_ceil(panel) * panel * depth.div_ceil(K_UNROLL) * K_UNROLL
}

/// Fill a packed tile from `fetch(row, k)` in local tile coordinates.
fn pack_with<F>(rows: usize, depth: usize, panel: usize, fetch: F) -> PackedTile
where
    F: Fn(usize, usize) -> i8,
{
    let kpad = depth.div_ceil(K_UNROLL) * K_UNROLL;
    let mut data = Vec::with_capacity(packed_size(rows, depth, panel));

    for p in 0..rows.div_ceil(panel) {
        for kg in (0..kpad).step_by(K_UNROLL) {
            for lr in 0..panel {
                let r = p * panel + lr;
                for k in kg..kg + K_UNROLL {
                    data.push(if r < rows && k < depth { fetch(r, k) } else { 0 });
                }
            }
        }
    }

    PackedTile {
        data,
        rows,
        depth,
        panel,
    }
}

fn check_panel(panel: usize) -> Result<()> {
    if panel == 0 {
        return Err(GemmError::InvalidTiling("panel width must be non-zero"));
    }
    Ok(())
}

/// Source stored `rows × K`.
fn check_straight<T>(
    src: &Tensor<T>,
    rows: TileRange,
    ks: TileRange,
    row_axis: &'static str,
    panel: usize,
) -> Result<()> {
    check_panel(panel)?;
    src.ensure_matrix()?;
    rows.check(row_axis, src.rows())?;
    ks.check("k", src.cols())
}

/// Source stored `K × rows`.
fn check_transposed<T>(
    src: &Tensor<T>,
    rows: TileRange,
    ks: TileRange,
    row_axis: &'static str,
    panel: usize,
) -> Result<()> {
    check_panel(panel)?;
    src.ensure_matrix()?;
    rows.check(row_axis, src.cols())?;
    ks.check("k", src.rows())
}

/// Pack a tile of A stored `M × K`.
pub fn pack_a_tile(
    src: &Tensor<i8>,
    rows: TileRange,
    ks: TileRange,
    panel: usize,
) -> Result<PackedTile> {
    check_straight(src, rows, ks, "i", panel)?;
    Ok(pack_with(rows.len, ks.len, panel, |r, k| {
        src.at(rows.start + r, ks.start + k)
    }))
}

/// Pack a tile of A stored `K × M`.
pub fn transpose_pack_a_tile(
    src: &Tensor<i8>,
    rows: TileRange,
    ks: TileRange,
    panel: usize,
) -> Result<PackedTile> {
    check_transposed(src, rows, ks, "i", panel)?;
    Ok(pack_with(rows.len, ks.len, panel, |r, k| {
        src.at(ks.start + k, rows.start + r)
    }))
}

/// Pack a tile of B stored `N × K`.
pub fn pack_b_tile(
    src: &Tensor<i8>,
    cols: TileRange,
    ks: TileRange,
    panel: usize,
) -> Result<PackedTile> {
    check_straight(src, cols, ks, "j", panel)?;
    Ok(pack_with(cols.len, ks.len, panel, |r, k| {
        src.at(cols.start + r, ks.start + k)
    }))
}

/// Pack a tile of B stored `K × N`.
pub fn transpose_pack_b_tile(
    src: &Tensor<i8>,
    cols: TileRange,
    ks: TileRange,
    panel: usize,
) -> Result<PackedTile> {
    check_transposed(src, cols, ks, "j", panel)?;
    Ok(pack_with(cols.len, ks.len, panel, |r, k| {
        src.at(ks.start + k, cols.start + r)
    }))
}

/// Quantize and pack a tile of f32 A stored `M × K`.
///
/// `scales` covers all `M` rows and is indexed by global row.
pub fn pack_a_tile_quantized(
    src: &Tensor<f32>,
    rows: TileRange,
    ks: TileRange,
    scales: &Scales,
    panel: usize,
) -> Result<PackedTile> {
    check_straight(src, rows, ks, "i", panel)?;
    scales.validate(src.rows())?;
    Ok(pack_with(rows.len, ks.len, panel, |r, k| {
        let i = rows.start + r;
        quantize_value(src.at(i, ks.start + k), scales.get(i))
    }))
}

/// Quantize and pack a tile of f32 A stored `K × M`.
pub fn transpose_pack_a_tile_quantized(
    src: &Tensor<f32>,
    rows: TileRange,
    ks: TileRange,
    scales: &Scales,
    panel: usize,
) -> Result<PackedTile> {
    check_transposed(src, rows, ks, "i", panel)?;
    scales.validate(src.cols())?;
    Ok(pack_with(rows.len, ks.len, panel, |r, k| {
        let i = rows.start + r;
        quantize_value(src.at(ks.start + k, i), scales.get(i))
    }))
}

/// Quantize and pack a tile of f32 B stored `N × K` with one scale.
pub fn pack_b_tile_quantized(
    src: &Tensor<f32>,
    cols: TileRange,
    ks: TileRange,
    scale: f32,
    panel: usize,
) -> Result<PackedTile> {
    check_straight(src, cols, ks, "j", panel)?;
    Scales::Uniform(scale).validate(1)?;
    Ok(pack_with(cols.len, ks.len, panel, |r, k| {
        quantize_value(src.at(cols.start + r, ks.start + k), scale)
    }))
}

/// Quantize and pack a tile of f32 B stored `K × N` with one scale.
pub fn transpose_pack_b_tile_quantized(
    src: &Tensor<f32>,
    cols: TileRange,
    ks: TileRange,
    scale: f32,
    panel: usize,
) -> Result<PackedTile> {
    check_transposed(src, cols, ks, "j", panel)?;
    Scales::Uniform(scale).validate(1)?;
    Ok(pack_with(cols.len, ks.len, panel, |r, k| {
        quantize_value(src.at(ks.start + k, cols.start + r), scale)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::quantize;

    fn ramp(rows: usize, cols: usize) -> Tensor<i8> {
        Tensor::from_fn(rows, cols, |r, c| (r * 10 + c) as i8)
    }

    #[test]
    fn test_pack_layout() {
        // rows=6, depth=5, panel=4
        let a = ramp(6, 5);
        let packed = pack_a_tile(&a, TileRange::full(6), TileRange::full(5), 4).unwrap();

        assert_eq!(packed.as_slice().len(), packed_size(6, 5, 4));
        assert_eq!(packed.as_slice().len(), 8 * 8);
        assert_eq!(packed.padded_depth(), 8);
        assert_eq!(packed.panels(), 2);

        let d = packed.as_slice();
        assert_eq!(&d[0..4], &[0, 1, 2, 3]); // row 0, k 0..4
        assert_eq!(&d[4..8], &[10, 11, 12, 13]); // row 1, k 0..4
        assert_eq!(&d[16..20], &[4, 0, 0, 0]); // row 0, k 4..8
        assert_eq!(&d[32..36], &[40, 41, 42, 43]); // row 4, panel 1
        assert_eq!(&d[40..48], &[0; 8]); // rows 6, 7 are padding
    }

    #[test]
    fn test_padding_is_zero() {
        let a = Tensor::filled(3, 3, 7i8);
        let packed = pack_a_tile(&a, TileRange::full(3), TileRange::full(3), 4).unwrap();
        let nonzero = packed.as_slice().iter().filter(|&&v| v != 0).count();
        assert_eq!(nonzero, 9);
    }

    #[test]
    fn test_pack_then_unpack() {
        let a = ramp(7, 9);
        let rows = TileRange::new(2, 5);
        let ks = TileRange::new(1, 7);
        let packed = pack_a_tile(&a, rows, ks, 4).unwrap();
        let expected = a.view(rows, ks).unwrap();
        assert_eq!(packed.unpack().to_vec(), expected.to_vec());
    }

    #[test]
    fn test_straight_and_transpose_pack_agree() {
        let a = ramp(5, 6);
        let at = a.transposed().unwrap().to_contiguous();
        let rows = TileRange::new(1, 3);
        let ks = TileRange::new(2, 4);

        let straight = pack_a_tile(&a, rows, ks, 4).unwrap();
        let transposed = transpose_pack_a_tile(&at, rows, ks, 4).unwrap();
        assert_eq!(straight, transposed);

        let straight_b = pack_b_tile(&a, rows, ks, 8).unwrap();
        let transposed_b = transpose_pack_b_tile(&at, rows, ks, 8).unwrap();
        assert_eq!(straight_b, transposed_b);
    }

    #[test]
    fn test_fused_matches_separate() {
        let a = Tensor::from_fn(5, 7, |r, c| (r as f32 - 2.0) * 3.7 + c as f32 * 0.9);
        let scales = Scales::PerChannel(vec![0.1, 0.2, 0.3, 0.4, 0.5]);
        let rows = TileRange::new(1, 3);
        let ks = TileRange::new(0, 7);

        let q = quantize(&a, &scales).unwrap();
        let separate = pack_a_tile(&q, rows, ks, 4).unwrap();
        let fused = pack_a_tile_quantized(&a, rows, ks, &scales, 4).unwrap();
        assert_eq!(separate, fused);

        let qb = quantize(&a, &Scales::Uniform(0.25)).unwrap();
        let separate_b = pack_b_tile(&qb, rows, ks, 8).unwrap();
        let fused_b = pack_b_tile_quantized(&a, rows, ks, 0.25, 8).unwrap();
        assert_eq!(separate_b, fused_b);
    }

    #[test]
    fn test_out_of_bounds_tile() {
        let a = ramp(4, 4);
        let err = pack_a_tile(&a, TileRange::new(2, 4), TileRange::full(4), 4).unwrap_err();
        assert!(matches!(err, GemmError::TileOutOfBounds { axis: "i", .. }));

        let err = transpose_pack_b_tile(&a, TileRange::full(4), TileRange::new(3, 2), 4)
            .unwrap_err();
        assert!(matches!(err, GemmError::TileOutOfBounds { axis: "k", .. }));
    }

    #[test]
    fn test_fused_rejects_bad_scale() {
        let a = Tensor::<f32>::zeros(2, 2);
        let err = pack_b_tile_quantized(&a, TileRange::full(2), TileRange::full(2), 0.0, 4)
            .unwrap_err();
        assert!(matches!(err, GemmError::InvalidScale { .. }));
    }

    #[test]
    fn test_zero_panel_rejected() {
        let a = ramp(2, 2);
        assert!(pack_a_tile(&a, TileRange::full(2), TileRange::full(2), 0).is_err());
    }

    #[test]
    fn test_empty_depth() {
        let a = ramp(3, 0);
        let packed = pack_a_tile(&a, TileRange::full(3), TileRange::full(0), 4).unwrap();
        assert!(packed.as_slice().is_empty());
        assert_eq!(packed.panels(), 1);
    }
}
