//! Quantized int8 tile GEMM with runtime SIMD dispatch.
//!
//! This library computes `alpha * (A · B) + beta * C` for f32 matrices by
//! quantizing the operands to symmetric int8, multiplying tiles with `i32`
//! accumulation, and dequantizing with per-row and per-column scales.
//!
//! # Pipeline
//!
//! Every GEMM call is split into tiles that go through three stages:
//!
//! | Stage | Input | Output |
//! |-------|-------|--------|
//! | pack | f32 or i8 tile | [`PackedTile`] in kernel panel layout |
//! | compute | two packed tiles | [`IntTile`] of `i32` accumulators |
//! | unpack | integer tile, descales, bias | f32 output region |
//!
//! Which implementation runs each stage is decided once per process by the
//! dispatch layer ([`simd::kernels()`]), from the detected [`SimdLevel`].
//!
//! # Quick Start
//!
//! ## Function-based API
//!
//! ```
//! use int8_gemm::{quantized_matmul, Tensor};
//!
//! let a = Tensor::matrix(2, 3, vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! let b = Tensor::matrix(3, 2, vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//!
//! // Dynamic per-row scales for A, one scale for B
//! let c = quantized_matmul(&a, &b).unwrap();
//!
//! // C[1,1] = 4*2 + 5*4 + 6*6 = 64, up to quantization error
//! assert!((c.at(1, 1) - 64.0).abs() < 0.5);
//! ```
//!
//! ## Builder API
//!
//! ```
//! use int8_gemm::{Broadcast, QuantizedGemm, Tensor};
//!
//! let a = Tensor::filled(2, 4, 1.0f32);
//! let b = Tensor::filled(4, 3, 1.0f32);
//! let bias = Tensor::matrix(1, 3, vec![1.0f32, 2.0, 3.0]).unwrap();
//!
//! let c = QuantizedGemm::new()
//!     .a_scales(1.0)
//!     .b_scale(1.0)
//!     .bias(&bias, Broadcast::PerColumn)
//!     .beta(1.0)
//!     .execute(&a, &b)
//!     .unwrap();
//!
//! assert_eq!(c.to_vec(), vec![5.0, 6.0, 7.0, 5.0, 6.0, 7.0]);
//! ```
//!
//! # Quantization
//!
//! Values are stored as `round(clamp(v / scale, -127, 127))`. Saturation
//! is silent; zero, negative or non-finite scales are rejected with
//! [`GemmError::InvalidScale`].
//!
//! # Performance
//!
//! ```
//! use int8_gemm::Backend;
//!
//! println!("Using: {}", Backend::description());
//! ```

pub mod core;
pub mod quant;
pub mod simd;
pub mod tensor;

mod api;
mod backend;
mod error;

// Public API
pub use api::{quantized_matmul, QuantizedGemm};
pub use backend::{version_info, Backend};
pub use error::{GemmError, Result};

// Re-export commonly used types at crate root
pub use core::{
    Broadcast, Descales, Epilogue, GemmConfig, IntTile, PackedTile, TileRange, TilingParams,
    Transpose,
};
pub use quant::{QuantMode, Scales};
pub use simd::{simd_level, KernelTable, SimdLevel};
pub use tensor::{Shape, Tensor, TensorMut};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::{
        quantized_matmul, Backend, Broadcast, Descales, GemmError, QuantMode, QuantizedGemm,
        Scales, Shape, Tensor, TilingParams, Transpose,
    };
}
