//! Sampled textures.
//!
//! Creation path for every texture kind:
//! 1. pixels are resolved (raw data, one decoded file, or six cube faces)
//! 2. image → view → sampler → binding are acquired inside a [`ResourceScope`]
//! 3. the mip chain is built on the CPU and copied through the staging heap
//!    with one immediate submission
//!
//! Any failure releases what step 2 acquired, in reverse order, and the
//! staging heap is freed on every path once it was allocated.

mod decoder;
mod mips;
mod skybox;

pub use decoder::{DecodedImage, ImageCrateDecoder, ImageDecoder};
pub use mips::{build_chain, full_chain_len};
pub use skybox::{Skybox, CUBE_FACES};

use std::path::Path;

use crate::device::{
    align_up,
    mip_extent,
    BindingDesc,
    BindingId,
    GpuDevice,
    ImageCopyRegion,
    ImageDesc,
    ImageFormat,
    ImageId,
    ResourceScope,
    SamplerDesc,
    SamplerId,
    Transfer,
    TransferList,
    ViewDesc,
    ViewId,
};
use crate::error::{RenderError, Result};
use crate::heap::StagingHeap;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureKind {
    /// 2D texture with a full mip chain.
    D2,
    /// Six-layer cube map with a full mip chain.
    Cube,
    /// 2D texture rewritten by the host or compute work; single mip level.
    Compute,
}

#[derive(Debug, Copy, Clone)]
pub enum TextureSource<'a> {
    /// Tightly packed pixels. Not valid for cube maps.
    Data {
        pixels: &'a [u8],
        width: u32,
        height: u32,
        format: ImageFormat,
    },
    /// An image file, or for cube maps the directory holding [`CUBE_FACES`].
    File { path: &'a Path, srgb: bool },
}

#[derive(Debug, Copy, Clone)]
pub struct TextureDesc<'a> {
    pub kind: TextureKind,
    pub source: TextureSource<'a>,
    pub sampler: SamplerDesc,
}

impl<'a> TextureDesc<'a> {
    pub fn from_data(pixels: &'a [u8], width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            kind: TextureKind::D2,
            source: TextureSource::Data { pixels, width, height, format },
            sampler: SamplerDesc::default(),
        }
    }

    pub fn from_file(path: &'a Path) -> Self {
        Self {
            kind: TextureKind::D2,
            source: TextureSource::File { path, srgb: true },
            sampler: SamplerDesc::default(),
        }
    }
}

/// A fully initialised texture and the binding that samples it.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    image: ImageId,
    view: ViewId,
    sampler: SamplerId,
    binding: BindingId,
    kind: TextureKind,
    format: ImageFormat,
    width: u32,
    height: u32,
    mip_levels: u32,
}

impl Texture {
    /// Creates a texture as a single all-or-nothing operation.
    pub fn create<D: GpuDevice + ?Sized>(
        device: &mut D,
        staging: &mut StagingHeap,
        decoder: &dyn ImageDecoder,
        desc: &TextureDesc<'_>,
    ) -> Result<Texture> {
        let mut scope = ResourceScope::new(device);
        let texture = Self::create_in(&mut scope, staging, decoder, desc)?;
        scope.commit();
        Ok(texture)
    }

    /// Creates a texture whose resources belong to an enclosing scope, so a
    /// later failure in the same scope also releases it.
    pub fn create_in<D: GpuDevice + ?Sized>(
        scope: &mut ResourceScope<'_, D>,
        staging: &mut StagingHeap,
        decoder: &dyn ImageDecoder,
        desc: &TextureDesc<'_>,
    ) -> Result<Texture> {
        let pixels = resolve_pixels(decoder, desc)?;
        let mip_levels = match desc.kind {
            TextureKind::Compute => 1,
            TextureKind::D2 | TextureKind::Cube => full_chain_len(pixels.width, pixels.height),
        };

        let image_desc = ImageDesc {
            label: "strix texture",
            width: pixels.width,
            height: pixels.height,
            layers: pixels.layers.len() as u32,
            mip_levels,
            format: pixels.format,
        };
        let image = scope
            .create_image(&image_desc)
            .map_err(|e| RenderError::from_allocation(image_desc.level_size(0), e))?;
        let view = scope.create_view(&ViewDesc {
            image,
            cube: desc.kind == TextureKind::Cube,
        })?;
        let sampler = scope.create_sampler(&desc.sampler)?;
        let binding = scope.create_binding(&BindingDesc::Texture { view, sampler })?;

        let bpp = pixels.format.bytes_per_pixel();
        let chains: Vec<Vec<Vec<u8>>> = pixels
            .layers
            .iter()
            .map(|layer| build_chain(layer, pixels.width, pixels.height, bpp, mip_levels))
            .collect();
        upload_levels(scope.device(), staging, image, &image_desc, &chains)?;

        Ok(Texture {
            image,
            view,
            sampler,
            binding,
            kind: desc.kind,
            format: pixels.format,
            width: pixels.width,
            height: pixels.height,
            mip_levels,
        })
    }

    #[inline]
    pub fn binding(&self) -> BindingId {
        self.binding
    }

    #[inline]
    pub fn image(&self) -> ImageId {
        self.image
    }

    #[inline]
    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Releases the texture in reverse creation order.
    pub fn destroy<D: GpuDevice + ?Sized>(self, device: &mut D) {
        device.destroy_binding(self.binding);
        device.destroy_sampler(self.sampler);
        device.destroy_view(self.view);
        device.destroy_image(self.image);
    }
}

// ── pixel sources ─────────────────────────────────────────────────────────

struct Pixels {
    width: u32,
    height: u32,
    format: ImageFormat,
    layers: Vec<Vec<u8>>,
}

fn resolve_pixels(decoder: &dyn ImageDecoder, desc: &TextureDesc<'_>) -> Result<Pixels> {
    match (desc.kind, desc.source) {
        (TextureKind::Cube, TextureSource::Data { .. }) => Err(RenderError::invalid(
            "cube textures can only be loaded from a face directory",
        )),

        (_, TextureSource::Data { pixels, width, height, format }) => {
            let expected = width as u64 * height as u64 * format.bytes_per_pixel() as u64;
            if width == 0 || height == 0 || pixels.len() as u64 != expected {
                return Err(RenderError::invalid(format!(
                    "{width}x{height} {format:?} texture needs {expected} bytes, got {}",
                    pixels.len()
                )));
            }
            Ok(Pixels { width, height, format, layers: vec![pixels.to_vec()] })
        }

        (TextureKind::Cube, TextureSource::File { path, srgb }) => load_cube_faces(decoder, path, srgb),

        (_, TextureSource::File { path, srgb }) => {
            let image = decoder.decode(path)?;
            Ok(Pixels {
                width: image.width,
                height: image.height,
                format: rgba_format(srgb),
                layers: vec![image.pixels],
            })
        }
    }
}

// TODO: decode the six faces in parallel; they are independent until the copy.
fn load_cube_faces(decoder: &dyn ImageDecoder, base: &Path, srgb: bool) -> Result<Pixels> {
    let mut layers = Vec::with_capacity(CUBE_FACES.len());
    let mut extent = None;

    for face in CUBE_FACES {
        let path = base.join(face);
        let image = decoder.decode(&path)?;

        match extent {
            None => extent = Some((image.width, image.height)),
            Some(e) if e != (image.width, image.height) => {
                return Err(RenderError::invalid(format!(
                    "cube face {} is {}x{}, expected {}x{}",
                    path.display(),
                    image.width,
                    image.height,
                    e.0,
                    e.1
                )));
            }
            Some(_) => {}
        }
        layers.push(image.pixels);
    }

    let (width, height) = extent.unwrap_or((0, 0));
    Ok(Pixels { width, height, format: rgba_format(srgb), layers })
}

#[inline]
fn rgba_format(srgb: bool) -> ImageFormat {
    if srgb { ImageFormat::Rgba8UnormSrgb } else { ImageFormat::Rgba8Unorm }
}

// ── staging upload ────────────────────────────────────────────────────────

/// Copies `chains[layer][mip]` into `image` through the staging heap.
pub(crate) fn upload_levels<D: GpuDevice + ?Sized>(
    device: &mut D,
    staging: &mut StagingHeap,
    image: ImageId,
    desc: &ImageDesc,
    chains: &[Vec<Vec<u8>>],
) -> Result<()> {
    let limits = device.limits();
    let bpp = desc.format.bytes_per_pixel();
    let offset_alignment = limits.copy_alignment.max(bpp as u64);

    let mut regions = Vec::new();
    let mut total = 0u64;
    for (layer, chain) in chains.iter().enumerate() {
        for (mip, _) in chain.iter().enumerate() {
            let (width, height) = mip_extent(desc.width, desc.height, mip as u32);
            let row = (width * bpp) as u64;
            let pitch = align_up(row, limits.copy_row_alignment.max(1) as u64);

            total = align_up(total, offset_alignment);
            regions.push(ImageCopyRegion {
                buffer_offset: total,
                bytes_per_row: pitch as u32,
                layer: layer as u32,
                mip_level: mip as u32,
                width,
                height,
            });
            total += pitch * height as u64;
        }
    }

    staging.allocate(device, total)?;
    let copied = copy_through_staging(device, staging, image, chains, regions, bpp);
    staging.free();
    copied
}

fn copy_through_staging<D: GpuDevice + ?Sized>(
    device: &mut D,
    staging: &mut StagingHeap,
    image: ImageId,
    chains: &[Vec<Vec<u8>>],
    regions: Vec<ImageCopyRegion>,
    bpp: u32,
) -> Result<()> {
    let bytes = staging.bytes_mut();
    let levels = chains.iter().flat_map(|chain| chain.iter());
    for (region, level) in regions.iter().zip(levels) {
        let row = (region.width * bpp) as usize;
        for y in 0..region.height as usize {
            let dst = region.buffer_offset as usize + y * region.bytes_per_row as usize;
            bytes[dst..dst + row].copy_from_slice(&level[y * row..(y + 1) * row]);
        }
    }
    staging.flush(device)?;

    let mut transfers = TransferList::new();
    transfers.push(Transfer::CopyBufferToImage {
        src: staging.buffer(),
        dst: image,
        regions,
    });
    device.submit_immediate(&transfers)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;
    use crate::device::MemoryDevice;

    /// Decoder serving images from memory.
    #[derive(Default)]
    pub(crate) struct MapDecoder {
        pub(crate) images: HashMap<PathBuf, DecodedImage>,
    }

    impl MapDecoder {
        pub(crate) fn insert(&mut self, path: impl Into<PathBuf>, width: u32, height: u32, fill: u8) {
            self.images.insert(
                path.into(),
                DecodedImage {
                    width,
                    height,
                    channels: 4,
                    pixels: vec![fill; (width * height * 4) as usize],
                },
            );
        }

        pub(crate) fn with_cube(base: &str, size: u32) -> Self {
            let mut decoder = Self::default();
            for (i, face) in CUBE_FACES.iter().enumerate() {
                decoder.insert(Path::new(base).join(face), size, size, i as u8 * 10);
            }
            decoder
        }
    }

    impl ImageDecoder for MapDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedImage> {
            self.images
                .get(path)
                .cloned()
                .ok_or_else(|| RenderError::NotFound { path: path.to_path_buf() })
        }
    }

    fn setup() -> (MemoryDevice, StagingHeap) {
        let mut device = MemoryDevice::new();
        let staging = StagingHeap::new(&mut device, 64).unwrap();
        (device, staging)
    }

    fn cube_desc(base: &Path) -> TextureDesc<'_> {
        TextureDesc {
            kind: TextureKind::Cube,
            source: TextureSource::File { path: base, srgb: true },
            sampler: SamplerDesc::default(),
        }
    }

    // ── data textures ─────────────────────────────────────────────────────

    #[test]
    fn data_texture_uploads_full_chain() {
        let (mut device, mut staging) = setup();
        let pixels: Vec<u8> = (0..16).collect();
        let desc = TextureDesc::from_data(&pixels, 4, 4, ImageFormat::R8Unorm);

        let texture = Texture::create(&mut device, &mut staging, &MapDecoder::default(), &desc).unwrap();

        assert_eq!(texture.mip_levels(), 3);
        assert_eq!(device.image_level(texture.image(), 0, 0).unwrap(), pixels.as_slice());
        assert_eq!(device.image_level(texture.image(), 0, 2).unwrap().len(), 1);
        assert_eq!(device.submit_count(), 1);
        assert!(!staging.is_in_use());
        // staging buffer + image, view, sampler, binding
        assert_eq!(device.live_resources(), 5);
    }

    #[test]
    fn compute_texture_keeps_one_level() {
        let (mut device, mut staging) = setup();
        let pixels = [0u8; 8 * 8 * 4];
        let desc = TextureDesc {
            kind: TextureKind::Compute,
            ..TextureDesc::from_data(&pixels, 8, 8, ImageFormat::Rgba8Unorm)
        };
        let texture = Texture::create(&mut device, &mut staging, &MapDecoder::default(), &desc).unwrap();
        assert_eq!(texture.mip_levels(), 1);
    }

    #[test]
    fn data_size_mismatch_is_invalid() {
        let (mut device, mut staging) = setup();
        let pixels = [0u8; 7];
        let desc = TextureDesc::from_data(&pixels, 2, 2, ImageFormat::R8Unorm);
        let err = Texture::create(&mut device, &mut staging, &MapDecoder::default(), &desc).unwrap_err();
        assert!(matches!(err, RenderError::InvalidValue(_)));
    }

    #[test]
    fn cube_from_data_is_invalid() {
        let (mut device, mut staging) = setup();
        let pixels = [0u8; 4];
        let desc = TextureDesc {
            kind: TextureKind::Cube,
            ..TextureDesc::from_data(&pixels, 1, 1, ImageFormat::Rgba8Unorm)
        };
        let err = Texture::create(&mut device, &mut staging, &MapDecoder::default(), &desc).unwrap_err();
        assert!(matches!(err, RenderError::InvalidValue(_)));
        assert_eq!(device.live_resources(), 1);
    }

    // ── files ─────────────────────────────────────────────────────────────

    #[test]
    fn missing_file_is_not_found() {
        let (mut device, mut staging) = setup();
        let path = Path::new("textures/missing.png");
        let err = Texture::create(&mut device, &mut staging, &MapDecoder::default(), &TextureDesc::from_file(path))
            .unwrap_err();
        assert!(matches!(err, RenderError::NotFound { .. }));
    }

    #[test]
    fn cube_loads_six_faces_with_one_submission() {
        let (mut device, mut staging) = setup();
        let decoder = MapDecoder::with_cube("sky", 4);

        let texture = Texture::create(&mut device, &mut staging, &decoder, &cube_desc(Path::new("sky"))).unwrap();

        let desc = device.image_desc(texture.image()).unwrap();
        assert_eq!((desc.layers, desc.mip_levels), (6, 3));
        assert_eq!(desc.format, ImageFormat::Rgba8UnormSrgb);
        for layer in 0..6u32 {
            let level = device.image_level(texture.image(), layer, 0).unwrap();
            assert!(level.iter().all(|&b| b == layer as u8 * 10), "face {layer} out of order");
        }
        assert_eq!(device.submit_count(), 1);
        // 6 faces × (4×4 + 2×2 + 1×1) RGBA texels did not fit in 64 bytes.
        assert!(staging.capacity() >= 6 * (16 + 4 + 1) * 4);
    }

    #[test]
    fn cube_missing_face_is_not_found() {
        let (mut device, mut staging) = setup();
        let mut decoder = MapDecoder::with_cube("sky", 4);
        decoder.images.remove(&Path::new("sky").join("top.jpg"));

        let err = Texture::create(&mut device, &mut staging, &decoder, &cube_desc(Path::new("sky"))).unwrap_err();
        match err {
            RenderError::NotFound { path } => assert_eq!(path, Path::new("sky").join("top.jpg")),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert_eq!(device.live_resources(), 1);
    }

    #[test]
    fn cube_face_size_mismatch_is_invalid() {
        let (mut device, mut staging) = setup();
        let mut decoder = MapDecoder::with_cube("sky", 4);
        decoder.insert(Path::new("sky").join("back.jpg"), 8, 8, 0);

        let err = Texture::create(&mut device, &mut staging, &decoder, &cube_desc(Path::new("sky"))).unwrap_err();
        assert!(matches!(err, RenderError::InvalidValue(_)));
    }

    // ── rollback ──────────────────────────────────────────────────────────

    #[test]
    fn failure_after_each_acquisition_rolls_back() {
        for successes in 0..4 {
            let (mut device, mut staging) = setup();
            let baseline = device.live_resources();
            let pixels = [255u8; 4];
            device.fail_after(successes);

            let result = Texture::create(
                &mut device,
                &mut staging,
                &MapDecoder::default(),
                &TextureDesc::from_data(&pixels, 1, 1, ImageFormat::Rgba8Unorm),
            );

            assert!(result.is_err(), "failure after {successes} acquisitions not reported");
            assert_eq!(device.live_resources(), baseline, "leak after {successes} acquisitions");
            assert!(!staging.is_in_use());
        }
    }

    #[test]
    fn staging_exhaustion_rolls_back_and_frees() {
        let (mut device, mut staging) = setup();
        let pixels = vec![0u8; 64 * 64 * 4];
        device.set_budget(Some(device.allocated_bytes() + 64 * 64 * 4 * 2));

        let err = Texture::create(
            &mut device,
            &mut staging,
            &MapDecoder::default(),
            &TextureDesc::from_data(&pixels, 64, 64, ImageFormat::Rgba8Unorm),
        )
        .unwrap_err();

        assert!(matches!(err, RenderError::OutOfDeviceMemory { .. }));
        assert_eq!(device.live_resources(), 1);
        assert!(!staging.is_in_use());
    }

    #[test]
    fn destroy_releases_everything() {
        let (mut device, mut staging) = setup();
        let pixels = [1u8; 4];
        let texture = Texture::create(
            &mut device,
            &mut staging,
            &MapDecoder::default(),
            &TextureDesc::from_data(&pixels, 1, 1, ImageFormat::Rgba8Unorm),
        )
        .unwrap();
        texture.destroy(&mut device);
        assert_eq!(device.live_resources(), 1);
    }
}
