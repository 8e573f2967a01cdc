use crate::core::{Microkernel, K_UNROLL};
use wide::i32x8;

/// AVX2 microkernel for int8 operands.
///
/// 4x8 register blocking with one `i32x8` accumulator per row.
///
/// `execute` runs AVX2 instructions unconditionally. The host must support
/// AVX2; [`KernelTable::for_backend`](crate::simd::KernelTable::for_backend)
/// checks once before building a table on this kernel, and the type is not
/// reachable from outside the crate otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct Avx2Int8Kernel;

impl Microkernel for Avx2Int8Kernel {
    const MR: usize = 4;
    const NR: usize = 8;

    unsafe fn execute(&self, kpad: usize, a: *const i8, b: *const i8, c: *mut i32, ldc: usize) {
        execute_avx2(kpad, a, b, c, ldc);
    }
}

#[target_feature(enable = "avx2")]
unsafe fn execute_avx2(kpad: usize, a: *const i8, b: *const i8, c: *mut i32, ldc: usize) {
    const MR: usize = 4;
    const NR: usize = 8;

    let mut acc = [i32x8::splat(0); MR];

    for kg in (0..kpad).step_by(K_UNROLL) {
        let ap = a.add(kg * MR);
        let bp = b.add(kg * NR);
        for u in 0..K_UNROLL {
            // Gather lane u of each of the 8 B rows
            let mut b_vals = [0i32; NR];
            for (j, v) in b_vals.iter_mut().enumerate() {
                *v = *bp.add(j * K_UNROLL + u) as i32;
            }
            let b_vec = i32x8::from(b_vals);

            for (i, row) in acc.iter_mut().enumerate() {
                let a_vec = i32x8::splat(*ap.add(i * K_UNROLL + u) as i32);
                *row += a_vec * b_vec;
            }
        }
    }

    for (i, row) in acc.iter().enumerate() {
        let lanes = row.to_array();
        for (j, &v) in lanes.iter().enumerate() {
            let dst = c.add(i * ldc + j);
            *dst = (*dst).wrapping_add(v);
        }
    }
}
