//! Device service seam.
//!
//! Everything the engine needs from a graphics API goes through [`GpuDevice`]:
//! buffer / image / view / sampler / binding lifetimes, host writes, and an
//! immediate (submit-and-wait) transfer queue. Draw commands are not issued
//! through the device; they are recorded into a [`CommandList`] that a backend
//! replays into its own render pass.
//!
//! Two implementations exist:
//! - [`MemoryDevice`]: CPU memory, byte budget, failure injection
//! - `backend::wgpu::WgpuDevice`

mod commands;
mod memory;
mod scope;

pub use commands::{
    Command,
    CommandList,
    CommandMark,
    ImageCopyRegion,
    PipelineKind,
    Span,
    Transfer,
    TransferList,
};
pub use memory::MemoryDevice;
pub use scope::ResourceScope;

use crate::error::DeviceError;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        pub struct $name(pub(crate) u64);

        impl $name {
            /// Raw handle value, unique per device.
            #[inline]
            pub fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

handle!(
    /// Opaque buffer handle.
    BufferId
);
handle!(
    /// Opaque image handle.
    ImageId
);
handle!(ViewId);
handle!(SamplerId);
handle!(
    /// Opaque descriptor set handle.
    BindingId
);

// ── limits ────────────────────────────────────────────────────────────────

/// Alignment rules and size limits the engine must respect.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DeviceLimits {
    /// Dynamic uniform offsets must be multiples of this.
    pub uniform_offset_alignment: u64,

    pub storage_offset_alignment: u64,

    /// Buffer write / copy offsets and sizes must be multiples of this.
    pub copy_alignment: u64,

    /// Row pitch alignment for buffer → image copies.
    pub copy_row_alignment: u32,

    pub max_buffer_size: u64,
}

// ── descriptors ───────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    Storage,
    /// Host-written source of transfer commands.
    Staging,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BufferDesc {
    pub label: &'static str,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ImageFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    R8Unorm,
}

impl ImageFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            ImageFormat::Rgba8Unorm | ImageFormat::Rgba8UnormSrgb => 4,
            ImageFormat::R8Unorm => 1,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ImageDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    /// 6 for cube maps.
    pub layers: u32,
    pub mip_levels: u32,
    pub format: ImageFormat,
}

impl ImageDesc {
    /// Byte size of one tightly packed mip level of one layer.
    pub fn level_size(&self, mip: u32) -> u64 {
        let (w, h) = mip_extent(self.width, self.height, mip);
        w as u64 * h as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// Extent of mip level `mip` of a `width × height` image.
#[inline]
pub fn mip_extent(width: u32, height: u32, mip: u32) -> (u32, u32) {
    ((width >> mip).max(1), (height >> mip).max(1))
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ViewDesc {
    pub image: ImageId,
    pub cube: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AddressMode {
    Repeat,
    MirrorRepeat,
    ClampToEdge,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub address_mode: AddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mip_filter: Filter::Linear,
            address_mode: AddressMode::Repeat,
        }
    }
}

/// Descriptor set contents.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BindingDesc {
    /// Uniform block bound with a dynamic offset; `size` is the block size
    /// visible through each offset.
    UniformDynamic { buffer: BufferId, size: u64 },

    /// Sampled texture; cube-ness follows the view.
    Texture { view: ViewId, sampler: SamplerId },

    /// Read-only storage buffer bound whole.
    Storage { buffer: BufferId, size: u64 },
}

impl BindingDesc {
    /// Number of dynamic offsets this binding consumes when bound.
    #[inline]
    pub fn dynamic_offset_count(&self) -> usize {
        match self {
            BindingDesc::UniformDynamic { .. } => 1,
            _ => 0,
        }
    }
}

// ── device ────────────────────────────────────────────────────────────────

/// Graphics device service.
///
/// Handles are only valid on the device that created them. Destroying an
/// unknown handle is ignored so cleanup paths stay infallible.
pub trait GpuDevice {
    fn limits(&self) -> DeviceLimits;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError>;
    fn destroy_buffer(&mut self, id: BufferId);

    /// Host write into a buffer. `offset` and `data.len()` follow
    /// `copy_alignment`.
    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError>;

    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageId, DeviceError>;
    fn destroy_image(&mut self, id: ImageId);

    /// Replaces one whole mip level of one layer with tightly packed pixels.
    fn write_image(&mut self, id: ImageId, layer: u32, mip: u32, data: &[u8]) -> Result<(), DeviceError>;

    fn create_view(&mut self, desc: &ViewDesc) -> Result<ViewId, DeviceError>;
    fn destroy_view(&mut self, id: ViewId);

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, DeviceError>;
    fn destroy_sampler(&mut self, id: SamplerId);

    fn create_binding(&mut self, desc: &BindingDesc) -> Result<BindingId, DeviceError>;
    fn destroy_binding(&mut self, id: BindingId);

    /// Executes transfers and returns once their source buffers may be reused.
    fn submit_immediate(&mut self, transfers: &TransferList) -> Result<(), DeviceError>;
}

/// Rounds `value` up to a multiple of `alignment` (any non-zero alignment).
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}
