//! The int8 tile pipeline.
//!
//! A GEMM call is partitioned into tiles and each tile goes through
//! pack, compute and unpack:
//!
//! 1. Packing: quantized (or already int8) operand tiles are laid out
//!    in panels of the kernel's `MR`/`NR` rows, zero-padded.
//! 2. Compute: a [`Microkernel`] accumulates `i32` products of two
//!    packed tiles into an [`IntTile`].
//! 3. Unpacking: the integer tile is dequantized, combined with the bias
//!    and written to the output.
//!
//! [`gemm_quantized_tiled`] and [`gemm_int8_tiled`] drive the three stages
//! over the whole problem. Packed tiles are handed from the packing phase
//! to compute through a [`PackArena`].

mod arena;
mod gemm;
mod kernel;
mod packing;
mod tiling;
mod unpack;

pub use arena::PackArena;
pub use gemm::{gemm_int8_tiled, gemm_quantized_tiled, problem_dims, GemmConfig};
pub use kernel::{gemm_tile, IntTile, Microkernel, ReferenceMicrokernel};
pub use packing::{
    pack_a_tile, pack_a_tile_quantized, pack_b_tile, pack_b_tile_quantized, packed_size,
    transpose_pack_a_tile, transpose_pack_a_tile_quantized, transpose_pack_b_tile,
    transpose_pack_b_tile_quantized, PackedTile, Transpose, K_UNROLL,
};
pub use tiling::{BlockIterator, TileRange, TilingParams};
pub use unpack::{unpack_output_tile, Broadcast, Descales, Epilogue};
