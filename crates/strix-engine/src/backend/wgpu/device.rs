use std::collections::HashMap;
use std::num::NonZeroU64;

use anyhow::{Context, Result};

use crate::device::{
    mip_extent,
    BindingDesc,
    BindingId,
    BufferDesc,
    BufferId,
    DeviceLimits,
    GpuDevice,
    ImageCopyRegion,
    ImageDesc,
    ImageId,
    SamplerDesc,
    SamplerId,
    Transfer,
    TransferList,
    ViewDesc,
    ViewId,
};
use crate::error::DeviceError;

use super::convert;
use super::init::WgpuInit;

/// Bind group layouts of every [`BindingDesc`] kind.
///
/// Pipelines registered in a [`PipelineTable`](super::PipelineTable) must be
/// built from these, slot by slot in the order the draw encoders bind sets.
pub struct BindingLayouts {
    /// One uniform buffer at binding 0 with a dynamic offset.
    pub uniform_dynamic: wgpu::BindGroupLayout,
    /// Filterable 2D texture at binding 0, sampler at binding 1.
    pub texture_2d: wgpu::BindGroupLayout,
    pub texture_cube: wgpu::BindGroupLayout,
    /// Read-only storage buffer at binding 0, vertex stage.
    pub storage: wgpu::BindGroupLayout,
}

impl BindingLayouts {
    fn new(device: &wgpu::Device) -> Self {
        let texture = |label, view_dimension| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            })
        };

        let buffer = |label, visibility, ty, has_dynamic_offset| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty,
                        has_dynamic_offset,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            })
        };

        Self {
            uniform_dynamic: buffer(
                "strix uniform layout",
                wgpu::ShaderStages::VERTEX_FRAGMENT,
                wgpu::BufferBindingType::Uniform,
                true,
            ),
            texture_2d: texture("strix texture 2d layout", wgpu::TextureViewDimension::D2),
            texture_cube: texture("strix texture cube layout", wgpu::TextureViewDimension::Cube),
            storage: buffer(
                "strix storage layout",
                wgpu::ShaderStages::VERTEX,
                wgpu::BufferBindingType::Storage { read_only: true },
                false,
            ),
        }
    }
}

struct Image {
    texture: wgpu::Texture,
    desc: ImageDesc,
}

struct View {
    view: wgpu::TextureView,
    cube: bool,
}

pub(super) struct Binding {
    pub group: wgpu::BindGroup,
    pub dynamic_offsets: usize,
}

/// [`GpuDevice`] backed by a wgpu device and queue.
///
/// Host writes go through `Queue::write_buffer` / `write_texture`; immediate
/// transfers are recorded into a fresh encoder, submitted, and waited on.
pub struct WgpuDevice {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    layouts: BindingLayouts,
    limits: DeviceLimits,
    next_id: u64,
    buffers: HashMap<u64, wgpu::Buffer>,
    images: HashMap<u64, Image>,
    views: HashMap<u64, View>,
    samplers: HashMap<u64, wgpu::Sampler>,
    bindings: HashMap<u64, Binding>,
}

impl WgpuDevice {
    /// Creates a device without a surface, for offscreen rendering and tools.
    pub fn new_headless(init: &WgpuInit) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        pollster::block_on(Self::request(&instance, None, init))
    }

    /// Requests an adapter (compatible with `surface` when given) and a device.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn request(instance: &wgpu::Instance, surface: Option<&wgpu::Surface<'_>>, init: &WgpuInit) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(init.label),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let info = adapter.get_info();
        log::info!("wgpu adapter: {} ({:?})", info.name, info.backend);

        Ok(Self::from_parts(adapter, device, queue))
    }

    /// Wraps an already created device and queue.
    pub fn from_parts(adapter: wgpu::Adapter, device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let layouts = BindingLayouts::new(&device);
        let limits = convert::device_limits(&device.limits());
        Self {
            adapter,
            device,
            queue,
            layouts,
            limits,
            next_id: 1,
            buffers: HashMap::new(),
            images: HashMap::new(),
            views: HashMap::new(),
            samplers: HashMap::new(),
            bindings: HashMap::new(),
        }
    }

    #[inline]
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    #[inline]
    pub fn layouts(&self) -> &BindingLayouts {
        &self.layouts
    }

    pub fn buffer(&self, id: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(&id.0)
    }

    pub fn texture(&self, id: ImageId) -> Option<&wgpu::Texture> {
        self.images.get(&id.0).map(|i| &i.texture)
    }

    pub(super) fn binding(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(&id.0)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn lookup_buffer(&self, id: BufferId) -> Result<&wgpu::Buffer, DeviceError> {
        self.buffers.get(&id.0).ok_or(DeviceError::UnknownHandle("buffer"))
    }

    fn lookup_image(&self, id: ImageId) -> Result<&Image, DeviceError> {
        self.images.get(&id.0).ok_or(DeviceError::UnknownHandle("image"))
    }

    fn encode_image_copy(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        src: BufferId,
        dst: ImageId,
        regions: &[ImageCopyRegion],
    ) -> Result<(), DeviceError> {
        let buffer = self.lookup_buffer(src)?;
        let image = self.lookup_image(dst)?;

        for region in regions.iter().filter(|r| r.width > 0 && r.height > 0) {
            if region.layer >= image.desc.layers || region.mip_level >= image.desc.mip_levels {
                return Err(DeviceError::Unsupported(format!(
                    "copy into layer {} mip {}",
                    region.layer, region.mip_level
                )));
            }
            encoder.copy_buffer_to_texture(
                wgpu::TexelCopyBufferInfo {
                    buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: region.buffer_offset,
                        bytes_per_row: Some(region.bytes_per_row),
                        rows_per_image: Some(region.height),
                    },
                },
                wgpu::TexelCopyTextureInfo {
                    texture: &image.texture,
                    mip_level: region.mip_level,
                    origin: wgpu::Origin3d { x: 0, y: 0, z: region.layer },
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width: region.width,
                    height: region.height,
                    depth_or_array_layers: 1,
                },
            );
        }
        Ok(())
    }
}

fn checked_range(offset: u64, len: u64, size: u64) -> Result<(), DeviceError> {
    if offset + len > size {
        return Err(DeviceError::OutOfBounds { offset, len, size });
    }
    Ok(())
}

impl GpuDevice for WgpuDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError> {
        if desc.size > self.limits.max_buffer_size {
            return Err(DeviceError::OutOfMemory { requested: desc.size });
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size,
            usage: convert::buffer_usages(desc.usage),
            mapped_at_creation: false,
        });
        let id = self.next_id();
        self.buffers.insert(id, buffer);
        Ok(BufferId(id))
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.remove(&id.0) {
            buffer.destroy();
        }
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let buffer = self.lookup_buffer(id)?;
        checked_range(offset, data.len() as u64, buffer.size())?;
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageId, DeviceError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.layers == 0 || desc.mip_levels == 0 {
            return Err(DeviceError::Unsupported(format!("empty image {desc:?}")));
        }
        if desc.width > max || desc.height > max {
            return Err(DeviceError::Unsupported(format!(
                "{}x{} image exceeds the {max} px limit",
                desc.width, desc.height
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert::texture_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let id = self.next_id();
        self.images.insert(id, Image { texture, desc: desc.clone() });
        Ok(ImageId(id))
    }

    fn destroy_image(&mut self, id: ImageId) {
        if let Some(image) = self.images.remove(&id.0) {
            image.texture.destroy();
        }
    }

    fn write_image(&mut self, id: ImageId, layer: u32, mip: u32, data: &[u8]) -> Result<(), DeviceError> {
        let image = self.lookup_image(id)?;
        let desc = &image.desc;
        if layer >= desc.layers || mip >= desc.mip_levels {
            return Err(DeviceError::Unsupported(format!("write to layer {layer} mip {mip}")));
        }
        let expected = desc.level_size(mip);
        if data.len() as u64 != expected {
            return Err(DeviceError::OutOfBounds {
                offset: 0,
                len: data.len() as u64,
                size: expected,
            });
        }

        let (width, height) = mip_extent(desc.width, desc.height, mip);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &image.texture,
                mip_level: mip,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * desc.format.bytes_per_pixel()),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_view(&mut self, desc: &ViewDesc) -> Result<ViewId, DeviceError> {
        let image = self.lookup_image(desc.image)?;
        if desc.cube && image.desc.layers != 6 {
            return Err(DeviceError::Unsupported("cube view over non-cube image".to_string()));
        }

        let view = image.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(image.desc.label),
            dimension: Some(if desc.cube {
                wgpu::TextureViewDimension::Cube
            } else {
                wgpu::TextureViewDimension::D2
            }),
            array_layer_count: Some(if desc.cube { 6 } else { 1 }),
            ..Default::default()
        });
        let id = self.next_id();
        self.views.insert(id, View { view, cube: desc.cube });
        Ok(ViewId(id))
    }

    fn destroy_view(&mut self, id: ViewId) {
        self.views.remove(&id.0);
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, DeviceError> {
        let address_mode = convert::address_mode(desc.address_mode);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("strix sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: convert::filter_mode(desc.mag_filter),
            min_filter: convert::filter_mode(desc.min_filter),
            mipmap_filter: convert::mipmap_filter_mode(desc.mip_filter),
            ..Default::default()
        });
        let id = self.next_id();
        self.samplers.insert(id, sampler);
        Ok(SamplerId(id))
    }

    fn destroy_sampler(&mut self, id: SamplerId) {
        self.samplers.remove(&id.0);
    }

    fn create_binding(&mut self, desc: &BindingDesc) -> Result<BindingId, DeviceError> {
        let group = match *desc {
            BindingDesc::UniformDynamic { buffer, size } | BindingDesc::Storage { buffer, size } => {
                let target = self.lookup_buffer(buffer)?;
                checked_range(0, size, target.size())?;
                let layout = match desc {
                    BindingDesc::UniformDynamic { .. } => &self.layouts.uniform_dynamic,
                    _ => &self.layouts.storage,
                };
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("strix buffer binding"),
                    layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: target,
                            offset: 0,
                            size: NonZeroU64::new(size),
                        }),
                    }],
                })
            }
            BindingDesc::Texture { view, sampler } => {
                let view = self.views.get(&view.0).ok_or(DeviceError::UnknownHandle("view"))?;
                let sampler = self.samplers.get(&sampler.0).ok_or(DeviceError::UnknownHandle("sampler"))?;
                let layout = if view.cube { &self.layouts.texture_cube } else { &self.layouts.texture_2d };
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("strix texture binding"),
                    layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&view.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ],
                })
            }
        };

        let id = self.next_id();
        self.bindings.insert(
            id,
            Binding {
                group,
                dynamic_offsets: desc.dynamic_offset_count(),
            },
        );
        Ok(BindingId(id))
    }

    fn destroy_binding(&mut self, id: BindingId) {
        self.bindings.remove(&id.0);
    }

    fn submit_immediate(&mut self, transfers: &TransferList) -> Result<(), DeviceError> {
        if transfers.is_empty() {
            return Ok(());
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("strix transfer encoder"),
        });
        for transfer in transfers.transfers() {
            match transfer {
                Transfer::CopyBuffer { src, src_offset, dst, dst_offset, size } => {
                    let source = self.lookup_buffer(*src)?;
                    let target = self.lookup_buffer(*dst)?;
                    checked_range(*src_offset, *size, source.size())?;
                    checked_range(*dst_offset, *size, target.size())?;
                    encoder.copy_buffer_to_buffer(source, *src_offset, target, *dst_offset, *size);
                }
                Transfer::CopyBufferToImage { src, dst, regions } => {
                    self.encode_image_copy(&mut encoder, *src, *dst, regions)?;
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| DeviceError::Unsupported(format!("waiting for transfers failed: {e}")))?;
        Ok(())
    }
}
