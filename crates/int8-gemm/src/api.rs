use crate::backend::Backend;
use crate::core::{
    gemm_int8_tiled, gemm_quantized_tiled, Broadcast, Descales, Epilogue, GemmConfig,
    TilingParams, Transpose,
};
use crate::error::Result;
use crate::quant::{absmax_scale, absmax_scales, QuantMode, Scales};
use crate::simd::{kernels, KernelTable};
use crate::tensor::Tensor;

/// Simple quantized matrix multiplication: C ≈ A · B
///
/// A (`M × K`) is quantized with one dynamic scale per row and B
/// (`K × N`) with one dynamic scale for the whole matrix.
///
/// # Example
///
/// ```
/// use int8_gemm::{quantized_matmul, Tensor};
///
/// let a = Tensor::matrix(2, 3, vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
/// let b = Tensor::matrix(3, 2, vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
///
/// let c = quantized_matmul(&a, &b).unwrap();
/// assert_eq!(c.rows(), 2);
/// assert!((c.at(0, 0) - 22.0).abs() < 0.5); // 1*1 + 2*3 + 3*5
/// ```
pub fn quantized_matmul(a: &Tensor<f32>, b: &Tensor<f32>) -> Result<Tensor<f32>> {
    QuantizedGemm::new().execute(a, b)
}

/// Builder for quantized GEMM.
///
/// Computes `alpha * (op(A) · op(B)) + beta * C` with int8 operands and
/// `i32` accumulation. Unset scales are derived from the data.
///
/// # Example
///
/// ```
/// use int8_gemm::{Broadcast, QuantizedGemm, Tensor};
///
/// let a = Tensor::filled(2, 4, 1.0f32);
/// let b = Tensor::filled(4, 3, 1.0f32);
/// let bias = Tensor::filled(2, 3, 10.0f32);
///
/// let c = QuantizedGemm::new()
///     .a_scales(1.0)
///     .b_scale(1.0)
///     .bias(&bias, Broadcast::Full)
///     .alpha(2.0)
///     .beta(1.0)
///     .execute(&a, &b)
///     .unwrap();
///
/// assert_eq!(c.to_vec(), vec![18.0; 6]);
/// ```
#[derive(Debug, Clone)]
pub struct QuantizedGemm<'a> {
    trans_a: Transpose,
    trans_b: Transpose,
    a_scales: Option<Scales>,
    a_mode: QuantMode,
    b_scale: Option<f32>,
    epilogue: Epilogue<'a>,
    tiling: Option<TilingParams>,
    parallel: bool,
    backend: Option<Backend>,
}

impl Default for QuantizedGemm<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> QuantizedGemm<'a> {
    pub fn new() -> Self {
        Self {
            trans_a: Transpose::NoTrans,
            trans_b: Transpose::NoTrans,
            a_scales: None,
            a_mode: QuantMode::PerRow,
            b_scale: None,
            epilogue: Epilogue::default(),
            tiling: None,
            parallel: true,
            backend: None,
        }
    }

    /// A is stored `K × M`.
    pub fn trans_a(mut self) -> Self {
        self.trans_a = Transpose::Trans;
        self
    }

    /// B is stored `N × K`.
    pub fn trans_b(mut self) -> Self {
        self.trans_b = Transpose::Trans;
        self
    }

    /// Fixed scales for A, one per output row or uniform.
    pub fn a_scales(mut self, scales: impl Into<Scales>) -> Self {
        self.a_scales = Some(scales.into());
        self
    }

    /// How A's scales are derived when none are given.
    pub fn a_mode(mut self, mode: QuantMode) -> Self {
        self.a_mode = mode;
        self
    }

    /// Fixed scale for B.
    pub fn b_scale(mut self, scale: f32) -> Self {
        self.b_scale = Some(scale);
        self
    }

    pub fn bias(mut self, c: &'a Tensor<f32>, broadcast: Broadcast) -> Self {
        self.epilogue = self.epilogue.with_bias(c, broadcast);
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.epilogue = self.epilogue.alpha(alpha);
        self
    }

    pub fn beta(mut self, beta: f32) -> Self {
        self.epilogue = self.epilogue.beta(beta);
        self
    }

    /// Produce the `N × M` output instead of `M × N`.
    pub fn transpose_output(mut self) -> Self {
        self.epilogue = self.epilogue.transpose_output(true);
        self
    }

    pub fn tiling(mut self, tiling: TilingParams) -> Self {
        self.tiling = Some(tiling);
        self
    }

    /// Run on the calling thread only.
    pub fn serial(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Use a specific backend instead of the process-wide table.
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    fn table(&self) -> KernelTable {
        match self.backend {
            Some(backend) => KernelTable::for_backend(backend),
            None => *kernels(),
        }
    }

    fn config(&self, table: &KernelTable) -> GemmConfig {
        let tiling = self.tiling.unwrap_or(match table.backend() {
            Backend::Avx2 => TilingParams::INT8_AVX2,
            Backend::Reference | Backend::Portable => TilingParams::PORTABLE,
        });
        GemmConfig {
            trans_a: self.trans_a,
            trans_b: self.trans_b,
            tiling,
            parallel: self.parallel,
        }
    }

    /// Quantize `a` and `b` and multiply them.
    pub fn execute(&self, a: &Tensor<f32>, b: &Tensor<f32>) -> Result<Tensor<f32>> {
        let table = self.table();
        let config = self.config(&table);

        let a_scales = match &self.a_scales {
            Some(scales) => scales.clone(),
            None => match self.trans_a {
                Transpose::NoTrans => absmax_scales(a, self.a_mode)?,
                Transpose::Trans => absmax_scales(&a.transposed()?, self.a_mode)?,
            },
        };
        let b_scale = match self.b_scale {
            Some(scale) => scale,
            None => absmax_scale(b)?,
        };

        gemm_quantized_tiled(
            &table,
            a,
            &a_scales,
            b,
            b_scale,
            &self.epilogue,
            &config,
        )
    }

    /// Multiply pre-quantized operands.
    ///
    /// Scales set on the builder are ignored; `descales` supplies them.
    pub fn execute_int8(
        &self,
        a: &Tensor<i8>,
        b: &Tensor<i8>,
        descales: &Descales,
    ) -> Result<Tensor<f32>> {
        let table = self.table();
        let config = self.config(&table);
        gemm_int8_tiled(&table, a, b, descales, &self.epilogue, &config)
    }
}
