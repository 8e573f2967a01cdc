//! Function-pointer kernel tables and the process-wide binding.

use once_cell::sync::OnceCell;

use super::detect::{simd_level, SimdLevel};
use super::kernels::PortableKernel;
use crate::backend::Backend;
use crate::core::{
    gemm_tile, pack_a_tile, pack_a_tile_quantized, pack_b_tile, pack_b_tile_quantized,
    transpose_pack_a_tile, transpose_pack_a_tile_quantized, transpose_pack_b_tile,
    transpose_pack_b_tile_quantized, unpack_output_tile, Descales, Epilogue, IntTile,
    Microkernel, PackedTile, ReferenceMicrokernel, TileRange,
};
use crate::error::Result;
use crate::quant::Scales;
use crate::tensor::{Tensor, TensorMut};

type PackFn = fn(&Tensor<i8>, TileRange, TileRange, usize) -> Result<PackedTile>;
type PackScaledFn =
    fn(&Tensor<f32>, TileRange, TileRange, &Scales, usize) -> Result<PackedTile>;
type PackUniformFn =
    fn(&Tensor<f32>, TileRange, TileRange, f32, usize) -> Result<PackedTile>;
type ComputeFn = fn(&PackedTile, &PackedTile, &mut IntTile) -> Result<()>;
type UnpackFn = fn(&IntTile, &mut TensorMut<'_, f32>, &Descales, &Epilogue<'_>) -> Result<()>;

/// One implementation of every pipeline stage, bound together.
///
/// All entries of a table agree on the kernel geometry: A is packed in
/// panels of `mr` rows and B in panels of `nr` rows, which is what the
/// compute entry expects.
#[derive(Clone, Copy)]
pub struct KernelTable {
    backend: Backend,
    mr: usize,
    nr: usize,
    pack_a: PackFn,
    transpose_pack_a: PackFn,
    pack_b: PackFn,
    transpose_pack_b: PackFn,
    pack_a_quantized: PackScaledFn,
    transpose_pack_a_quantized: PackScaledFn,
    pack_b_quantized: PackUniformFn,
    transpose_pack_b_quantized: PackUniformFn,
    compute: ComputeFn,
    unpack: UnpackFn,
}

impl std::fmt::Debug for KernelTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelTable")
            .field("backend", &self.backend)
            .field("mr", &self.mr)
            .field("nr", &self.nr)
            .finish_non_exhaustive()
    }
}

impl KernelTable {
    fn with_kernel<K: Microkernel>(backend: Backend) -> Self {
        Self {
            backend,
            mr: K::MR,
            nr: K::NR,
            pack_a: pack_a_tile,
            transpose_pack_a: transpose_pack_a_tile,
            pack_b: pack_b_tile,
            transpose_pack_b: transpose_pack_b_tile,
            pack_a_quantized: pack_a_tile_quantized,
            transpose_pack_a_quantized: transpose_pack_a_tile_quantized,
            pack_b_quantized: pack_b_tile_quantized,
            transpose_pack_b_quantized: transpose_pack_b_tile_quantized,
            compute: gemm_tile::<K>,
            unpack: unpack_output_tile,
        }
    }

    /// Scalar table, always available.
    pub fn reference() -> Self {
        Self::with_kernel::<ReferenceMicrokernel>(Backend::Reference)
    }

    /// Table built on the portable `wide` kernel.
    pub fn portable() -> Self {
        Self::with_kernel::<PortableKernel>(Backend::Portable)
    }

    /// Table for a capability level.
    pub fn for_level(level: SimdLevel) -> Self {
        match level {
            SimdLevel::Avx2 | SimdLevel::Avx512 => Self::for_backend(Backend::Avx2),
            SimdLevel::Sse2 | SimdLevel::Avx | SimdLevel::Neon => Self::portable(),
            SimdLevel::Scalar => Self::reference(),
        }
    }

    /// Table for an explicit backend.
    ///
    /// Falls back to the portable table when the host cannot run `backend`.
    pub fn for_backend(backend: Backend) -> Self {
        match backend {
            Backend::Reference => Self::reference(),
            Backend::Portable => Self::portable(),
            Backend::Avx2 => {
                #[cfg(target_arch = "x86_64")]
                {
                    if is_x86_feature_detected!("avx2") {
                        return Self::with_kernel::<super::kernels::Avx2Int8Kernel>(
                            Backend::Avx2,
                        );
                    }
                }
                log::warn!("AVX2 kernels are not available on this host, using portable kernels");
                Self::portable()
            }
        }
    }

    #[inline]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Panel width of packed A.
    #[inline]
    pub fn mr(&self) -> usize {
        self.mr
    }

    /// Panel width of packed B.
    #[inline]
    pub fn nr(&self) -> usize {
        self.nr
    }

    /// Pack a tile of A stored `M × K`.
    pub fn pack_a_tile(
        &self,
        src: &Tensor<i8>,
        rows: TileRange,
        ks: TileRange,
    ) -> Result<PackedTile> {
        (self.pack_a)(src, rows, ks, self.mr)
    }

    /// Pack a tile of A stored `K × M`.
    pub fn transpose_pack_a_tile(
        &self,
        src: &Tensor<i8>,
        rows: TileRange,
        ks: TileRange,
    ) -> Result<PackedTile> {
        (self.transpose_pack_a)(src, rows, ks, self.mr)
    }

    /// Pack a tile of B stored `N × K`.
    pub fn pack_b_tile(
        &self,
        src: &Tensor<i8>,
        cols: TileRange,
        ks: TileRange,
    ) -> Result<PackedTile> {
        (self.pack_b)(src, cols, ks, self.nr)
    }

    /// Pack a tile of B stored `K × N`.
    pub fn transpose_pack_b_tile(
        &self,
        src: &Tensor<i8>,
        cols: TileRange,
        ks: TileRange,
    ) -> Result<PackedTile> {
        (self.transpose_pack_b)(src, cols, ks, self.nr)
    }

    pub fn pack_a_tile_quantized(
        &self,
        src: &Tensor<f32>,
        rows: TileRange,
        ks: TileRange,
        scales: &Scales,
    ) -> Result<PackedTile> {
        (self.pack_a_quantized)(src, rows, ks, scales, self.mr)
    }

    pub fn transpose_pack_a_tile_quantized(
        &self,
        src: &Tensor<f32>,
        rows: TileRange,
        ks: TileRange,
        scales: &Scales,
    ) -> Result<PackedTile> {
        (self.transpose_pack_a_quantized)(src, rows, ks, scales, self.mr)
    }

    pub fn pack_b_tile_quantized(
        &self,
        src: &Tensor<f32>,
        cols: TileRange,
        ks: TileRange,
        scale: f32,
    ) -> Result<PackedTile> {
        (self.pack_b_quantized)(src, cols, ks, scale, self.nr)
    }

    pub fn transpose_pack_b_tile_quantized(
        &self,
        src: &Tensor<f32>,
        cols: TileRange,
        ks: TileRange,
        scale: f32,
    ) -> Result<PackedTile> {
        (self.transpose_pack_b_quantized)(src, cols, ks, scale, self.nr)
    }

    /// A zeroed accumulator tile in this table's geometry.
    pub fn new_tile(&self, i: TileRange, j: TileRange) -> IntTile {
        IntTile::new(i, j, self.mr, self.nr)
    }

    /// Accumulate `c += a · bᵀ`.
    pub fn compute(&self, a: &PackedTile, b: &PackedTile, c: &mut IntTile) -> Result<()> {
        (self.compute)(a, b, c)
    }

    /// Dequantize `tile` into `out`.
    pub fn unpack(
        &self,
        tile: &IntTile,
        out: &mut TensorMut<'_, f32>,
        descales: &Descales,
        epilogue: &Epilogue<'_>,
    ) -> Result<()> {
        (self.unpack)(tile, out, descales, epilogue)
    }
}

static KERNELS: OnceCell<KernelTable> = OnceCell::new();

/// The process-wide kernel table, bound from the detected level on first
/// use.
pub fn kernels() -> &'static KernelTable {
    KERNELS.get_or_init(|| bind_table(simd_level()))
}

/// Bind the process-wide table to `level`.
///
/// The first binding wins. Later calls return the bound table unchanged and
/// log when they asked for a different backend.
pub fn bind(level: SimdLevel) -> &'static KernelTable {
    let table = KERNELS.get_or_init(|| bind_table(level));
    if table.backend() != level.backend() {
        log::warn!(
            "kernel table already bound to {:?}, ignoring request for {:?}",
            table.backend(),
            level
        );
    }
    table
}

/// True once a table has been bound.
pub fn is_bound() -> bool {
    KERNELS.get().is_some()
}

fn bind_table(level: SimdLevel) -> KernelTable {
    let table = KernelTable::for_level(level);
    log::debug!(
        "binding int8 kernels for {:?}: {:?} ({}x{})",
        level,
        table.backend(),
        table.mr(),
        table.nr()
    );
    table
}
