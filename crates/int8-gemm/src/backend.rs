use crate::simd::SimdLevel;

/// Kernel families a [`KernelTable`](crate::simd::KernelTable) can be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Scalar reference kernels.
    Reference,
    /// Portable `wide` kernels (SSE2, NEON or scalar lowering).
    Portable,
    /// AVX2 kernels, x86-64 only.
    Avx2,
}

impl Backend {
    /// The backend of the process-wide kernel table, binding it if needed.
    pub fn current() -> Self {
        crate::simd::kernels().backend()
    }

    /// True when this host can run the backend.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Reference | Backend::Portable => true,
            Backend::Avx2 => {
                #[cfg(target_arch = "x86_64")]
                {
                    is_x86_feature_detected!("avx2")
                }
                #[cfg(not(target_arch = "x86_64"))]
                {
                    false
                }
            }
        }
    }

    /// Every backend this host can run, slowest first.
    pub fn available() -> Vec<Backend> {
        [Backend::Reference, Backend::Portable, Backend::Avx2]
            .into_iter()
            .filter(Backend::is_available)
            .collect()
    }

    /// Get a description of the current SIMD capabilities.
    pub fn description() -> String {
        let kernels = match Backend::current() {
            Backend::Reference => "scalar reference kernels",
            Backend::Portable => "portable wide kernels",
            Backend::Avx2 => "AVX2 int8 kernels",
        };
        let level = match crate::simd::simd_level() {
            SimdLevel::Scalar => "no SIMD",
            SimdLevel::Sse2 => "x86-64 SSE2 (128-bit)",
            SimdLevel::Avx => "x86-64 AVX (256-bit float)",
            SimdLevel::Avx2 => "x86-64 AVX2 (256-bit)",
            SimdLevel::Avx512 => "x86-64 AVX-512 (512-bit)",
            SimdLevel::Neon => "ARM NEON (128-bit)",
        };
        format!("{kernels} on {level}")
    }
}

/// Get information about the library configuration.
pub fn version_info() -> String {
    let table = crate::simd::kernels();
    format!(
        "int8-gemm v{}\nBackend: {}\nSIMD Level: {:?}\nMicrokernel: {}x{}",
        env!("CARGO_PKG_VERSION"),
        Backend::description(),
        crate::simd::simd_level(),
        table.mr(),
        table.nr()
    )
}
