//! Runtime SIMD dispatch for the int8 pipeline.
//!
//! The capability level is detected once. A [`KernelTable`] for that level
//! is bound on first use and every GEMM call goes through it.

mod detect;
pub mod dispatch;
pub mod kernels;

pub use detect::{simd_level, SimdLevel};
pub use dispatch::{bind, is_bound, kernels, KernelTable};
pub use kernels::*;
