//! CPU capability detection for the int8 kernels.

use crate::backend::Backend;

/// Instruction set levels the dispatcher distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimdLevel {
    Scalar,
    /// SSE2, the x86-64 baseline.
    Sse2,
    /// AVX without 256-bit integer instructions.
    Avx,
    /// AVX2, 256-bit integer multiply and add.
    Avx2,
    Avx512,
    /// AArch64 NEON.
    Neon,
}

impl SimdLevel {
    /// Probe the running CPU.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                if is_x86_feature_detected!("avx512f") {
                    return SimdLevel::Avx512;
                }
                return SimdLevel::Avx2;
            }
            if is_x86_feature_detected!("avx") {
                return SimdLevel::Avx;
            }
            SimdLevel::Sse2
        }

        #[cfg(target_arch = "aarch64")]
        {
            SimdLevel::Neon
        }

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            SimdLevel::Scalar
        }
    }

    /// Kernel family for this level, if the host can run it.
    ///
    /// Pure mapping with no logging. Levels whose kernels the host lacks
    /// resolve to [`Backend::Portable`].
    pub fn backend(self) -> Backend {
        let wanted = match self {
            SimdLevel::Avx2 | SimdLevel::Avx512 => Backend::Avx2,
            SimdLevel::Sse2 | SimdLevel::Avx | SimdLevel::Neon => Backend::Portable,
            SimdLevel::Scalar => Backend::Reference,
        };
        if wanted.is_available() {
            wanted
        } else {
            Backend::Portable
        }
    }
}

static SIMD_LEVEL: std::sync::OnceLock<SimdLevel> = std::sync::OnceLock::new();

/// The detected level, probed once per process.
pub fn simd_level() -> SimdLevel {
    *SIMD_LEVEL.get_or_init(SimdLevel::detect)
}
