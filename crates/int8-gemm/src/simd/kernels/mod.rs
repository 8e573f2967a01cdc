//! SIMD microkernel implementations.

#[cfg(target_arch = "x86_64")]
mod avx2;
pub mod portable;

#[cfg(target_arch = "x86_64")]
pub(crate) use avx2::Avx2Int8Kernel;
pub use portable::PortableKernel;
