//! Property-based tests for the tile pipeline.
//!
//! Uses proptest to verify invariants that must hold for all inputs:
//! - quantized GEMM stays within the quantization error bound
//! - pack-then-unpack is lossless
//! - straight and transposing packs agree
//! - every backend produces the same integer tiles

use proptest::collection::vec;
use proptest::prelude::*;

use int8_gemm::core::{
    pack_a_tile, pack_b_tile, transpose_pack_a_tile, transpose_pack_b_tile, TileRange,
};
use int8_gemm::quant::{absmax_scale, absmax_scales, QuantMode};
use int8_gemm::{Backend, KernelTable, QuantizedGemm, Tensor};

fn arb_f32_problem() -> impl Strategy<Value = (usize, usize, usize, Vec<f32>, Vec<f32>)> {
    (1usize..12, 1usize..24, 1usize..12).prop_flat_map(|(m, k, n)| {
        (
            Just(m),
            Just(k),
            Just(n),
            vec(-10.0f32..10.0, m * k),
            vec(-10.0f32..10.0, k * n),
        )
    })
}

fn arb_i8_matrix(max_rows: usize, max_cols: usize) -> impl Strategy<Value = Tensor<i8>> {
    (1..=max_rows, 1..=max_cols).prop_flat_map(|(rows, cols)| {
        vec(-127i8..=127, rows * cols)
            .prop_map(move |data| Tensor::matrix(rows, cols, data).unwrap())
    })
}

/// A sub-range of `0..extent`, possibly empty.
fn arb_range(extent: usize) -> impl Strategy<Value = TileRange> {
    (0..=extent).prop_flat_map(move |start| {
        (0..=extent - start).prop_map(move |len| TileRange::new(start, len))
    })
}

proptest! {
    /// |C - A·B| <= K * (sa/2 * max|b| + sb/2 * max|a| + sa*sb/4), per element.
    #[test]
    fn prop_quantized_gemm_error_bound((m, k, n, a_data, b_data) in arb_f32_problem()) {
        let a = Tensor::matrix(m, k, a_data).unwrap();
        let b = Tensor::matrix(k, n, b_data).unwrap();

        let c = QuantizedGemm::new().execute(&a, &b).unwrap();

        let a_scales = absmax_scales(&a, QuantMode::PerRow).unwrap();
        let sb = absmax_scale(&b).unwrap();

        for i in 0..m {
            let sa = a_scales.get(i);
            for j in 0..n {
                let mut exact = 0.0f64;
                let mut bound = 0.0f64;
                let mut magnitude = 0.0f64;
                for p in 0..k {
                    let (av, bv) = (a.at(i, p) as f64, b.at(p, j) as f64);
                    exact += av * bv;
                    magnitude += (av * bv).abs();
                    bound += sa as f64 / 2.0 * bv.abs()
                        + sb as f64 / 2.0 * av.abs()
                        + sa as f64 * sb as f64 / 4.0;
                }
                let err = (c.at(i, j) as f64 - exact).abs();
                // f32 rounding in the epilogue on top of the quantization bound
                let tol = bound * 1.001 + 1e-4 * (1.0 + magnitude);
                prop_assert!(err <= tol, "({}, {}): err {} > bound {}", i, j, err, tol);
            }
        }
    }

    #[test]
    fn prop_pack_then_unpack_is_lossless(
        (src, rows, ks) in arb_i8_matrix(20, 20).prop_flat_map(|t| {
            let (r, c) = (t.rows(), t.cols());
            (Just(t), arb_range(r), arb_range(c))
        }),
        panel in prop_oneof![Just(1usize), Just(3), Just(4), Just(8)],
    ) {
        let packed = pack_a_tile(&src, rows, ks, panel).unwrap();
        let restored = packed.unpack();
        prop_assert_eq!(restored.rows(), rows.len);
        prop_assert_eq!(restored.cols(), ks.len);
        prop_assert_eq!(restored.to_vec(), src.view(rows, ks).unwrap().to_vec());
    }

    #[test]
    fn prop_straight_and_transpose_pack_agree(
        (src, rows, ks) in arb_i8_matrix(16, 16).prop_flat_map(|t| {
            let (r, c) = (t.rows(), t.cols());
            (Just(t), arb_range(r), arb_range(c))
        }),
    ) {
        let stored_t = src.transposed().unwrap().to_contiguous();

        prop_assert_eq!(
            pack_a_tile(&src, rows, ks, 4).unwrap(),
            transpose_pack_a_tile(&stored_t, rows, ks, 4).unwrap()
        );
        prop_assert_eq!(
            pack_b_tile(&src, rows, ks, 8).unwrap(),
            transpose_pack_b_tile(&stored_t, rows, ks, 8).unwrap()
        );
    }

    #[test]
    fn prop_backends_produce_identical_integer_tiles(
        (a, b) in (1usize..14, 1usize..30, 1usize..14).prop_flat_map(|(m, k, n)| (
            vec(-127i8..=127, m * k).prop_map(move |d| Tensor::matrix(m, k, d).unwrap()),
            vec(-127i8..=127, n * k).prop_map(move |d| Tensor::matrix(n, k, d).unwrap()),
        )),
    ) {
        let (m, n, k) = (a.rows(), b.rows(), a.cols());
        let (i, j, ks) = (TileRange::full(m), TileRange::full(n), TileRange::full(k));

        let tiles: Vec<_> = Backend::available()
            .into_iter()
            .map(|backend| {
                let table = KernelTable::for_backend(backend);
                let pa = table.pack_a_tile(&a, i, ks).unwrap();
                let pb = table.pack_b_tile(&b, j, ks).unwrap();
                let mut c = table.new_tile(i, j);
                table.compute(&pa, &pb, &mut c).unwrap();
                c
            })
            .collect();

        for r in 0..m {
            for col in 0..n {
                let expected: i32 = (0..k).map(|p| a.at(r, p) as i32 * b.at(col, p) as i32).sum();
                for tile in &tiles {
                    prop_assert_eq!(tile.get(r, col), expected);
                }
            }
        }
    }
}
