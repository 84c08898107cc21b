use std::path::Path;

use crate::device::{AddressMode, BindingId, GpuDevice, SamplerDesc};
use crate::error::{RenderError, Result};
use crate::heap::StagingHeap;

use super::{ImageDecoder, Texture, TextureDesc, TextureKind, TextureSource};

/// Cube face file names, in layer order, resolved against the skybox
/// directory.
pub const CUBE_FACES: [&str; 6] = [
    "left.jpg",
    "right.jpg",
    "top.jpg",
    "bottom.jpg",
    "front.jpg",
    "back.jpg",
];

/// Cube-map environment drawn behind the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Skybox {
    texture: Texture,
}

impl Skybox {
    /// Loads the six faces under `dir` into one cube texture.
    pub fn load<D: GpuDevice + ?Sized>(
        device: &mut D,
        staging: &mut StagingHeap,
        decoder: &dyn ImageDecoder,
        dir: &Path,
    ) -> Result<Self> {
        let desc = TextureDesc {
            kind: TextureKind::Cube,
            source: TextureSource::File { path: dir, srgb: true },
            sampler: SamplerDesc {
                address_mode: AddressMode::ClampToEdge,
                ..SamplerDesc::default()
            },
        };
        Self::from_texture(Texture::create(device, staging, decoder, &desc)?)
    }

    pub fn from_texture(texture: Texture) -> Result<Self> {
        if texture.kind() != TextureKind::Cube {
            return Err(RenderError::invalid(format!(
                "skybox needs a cube texture, got {:?}",
                texture.kind()
            )));
        }
        Ok(Self { texture })
    }

    #[inline]
    pub fn binding(&self) -> BindingId {
        self.texture.binding()
    }

    #[inline]
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn destroy<D: GpuDevice + ?Sized>(self, device: &mut D) {
        self.texture.destroy(device);
    }
}
