use crate::core::{Microkernel, K_UNROLL};
use wide::i32x4;

/// Portable microkernel using the `wide` crate.
///
/// 4x4 register blocking with one `i32x4` accumulator per row. `wide`
/// lowers to SSE2 or NEON where available and to scalar code elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortableKernel;

impl Microkernel for PortableKernel {
    const MR: usize = 4;
    const NR: usize = 4;

    unsafe fn execute(&self, kpad: usize, a: *const i8, b: *const i8, c: *mut i32, ldc: usize) {
        const MR: usize = 4;
        const NR: usize = 4;

        let mut acc = [i32x4::splat(0); MR];

        for kg in (0..kpad).step_by(K_UNROLL) {
            let ap = a.add(kg * MR);
            let bp = b.add(kg * NR);
            for u in 0..K_UNROLL {
                let mut b_vals = [0i32; NR];
                for (j, v) in b_vals.iter_mut().enumerate() {
                    *v = *bp.add(j * K_UNROLL + u) as i32;
                }
                let b_vec = i32x4::from(b_vals);

                for (i, row) in acc.iter_mut().enumerate() {
                    let a_vec = i32x4::splat(*ap.add(i * K_UNROLL + u) as i32);
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
}
