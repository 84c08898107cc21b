use std::collections::HashMap;

use crate::error::DeviceError;

use super::{
    BindingDesc,
    BindingId,
    BufferDesc,
    BufferId,
    DeviceLimits,
    GpuDevice,
    ImageDesc,
    ImageId,
    SamplerDesc,
    SamplerId,
    Transfer,
    TransferList,
    ViewDesc,
    ViewId,
};

struct MemBuffer {
    desc: BufferDesc,
    bytes: Vec<u8>,
}

struct MemImage {
    desc: ImageDesc,
    /// `layer * mip_levels + mip`, tightly packed.
    levels: Vec<Vec<u8>>,
}

impl MemImage {
    fn level_mut(&mut self, layer: u32, mip: u32) -> Option<&mut Vec<u8>> {
        if layer >= self.desc.layers || mip >= self.desc.mip_levels {
            return None;
        }
        self.levels.get_mut((layer * self.desc.mip_levels + mip) as usize)
    }
}

/// Device backed by host memory.
///
/// Behaves like a real device as far as the engine can observe: handles,
/// alignment limits, copies that actually move bytes. Adds two testing hooks:
/// - a byte budget shared by buffers and images
/// - one-shot failure injection on the n-th subsequent `create_*` call
pub struct MemoryDevice {
    limits: DeviceLimits,
    next_id: u64,

    buffers: HashMap<u64, MemBuffer>,
    images: HashMap<u64, MemImage>,
    views: HashMap<u64, ViewDesc>,
    samplers: HashMap<u64, SamplerDesc>,
    bindings: HashMap<u64, BindingDesc>,

    budget: Option<u64>,
    allocated: u64,
    fail_countdown: Option<usize>,
    submits: usize,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits {
            uniform_offset_alignment: 256,
            storage_offset_alignment: 256,
            copy_alignment: 4,
            copy_row_alignment: 1,
            max_buffer_size: 256 * 1024 * 1024,
        })
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            next_id: 1,
            buffers: HashMap::new(),
            images: HashMap::new(),
            views: HashMap::new(),
            samplers: HashMap::new(),
            bindings: HashMap::new(),
            budget: None,
            allocated: 0,
            fail_countdown: None,
            submits: 0,
        }
    }

    /// Caps total buffer + image bytes.
    pub fn set_budget(&mut self, budget: Option<u64>) {
        self.budget = budget;
    }

    /// Lets `successes` more `create_*` calls succeed, then fails exactly one.
    pub fn fail_after(&mut self, successes: usize) {
        self.fail_countdown = Some(successes);
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.allocated
    }

    pub fn submit_count(&self) -> usize {
        self.submits
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    /// Every live handle of every kind.
    pub fn live_resources(&self) -> usize {
        self.buffers.len()
            + self.images.len()
            + self.views.len()
            + self.samplers.len()
            + self.bindings.len()
    }

    pub fn buffer_desc(&self, id: BufferId) -> Option<&BufferDesc> {
        self.buffers.get(&id.0).map(|b| &b.desc)
    }

    pub fn buffer_bytes(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id.0).map(|b| b.bytes.as_slice())
    }

    pub fn image_desc(&self, id: ImageId) -> Option<&ImageDesc> {
        self.images.get(&id.0).map(|i| &i.desc)
    }

    pub fn image_level(&self, id: ImageId, layer: u32, mip: u32) -> Option<&[u8]> {
        let image = self.images.get(&id.0)?;
        if layer >= image.desc.layers || mip >= image.desc.mip_levels {
            return None;
        }
        image
            .levels
            .get((layer * image.desc.mip_levels + mip) as usize)
            .map(Vec::as_slice)
    }

    pub fn binding(&self, id: BindingId) -> Option<&BindingDesc> {
        self.bindings.get(&id.0)
    }

    pub fn view(&self, id: ViewId) -> Option<&ViewDesc> {
        self.views.get(&id.0)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_injected_failure(&mut self, requested: u64) -> Result<(), DeviceError> {
        match self.fail_countdown {
            Some(0) => {
                self.fail_countdown = None;
                Err(DeviceError::OutOfMemory { requested })
            }
            Some(n) => {
                self.fail_countdown = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn reserve(&mut self, bytes: u64) -> Result<(), DeviceError> {
        self.check_injected_failure(bytes)?;
        if let Some(budget) = self.budget {
            if self.allocated + bytes > budget {
                return Err(DeviceError::OutOfMemory { requested: bytes });
            }
        }
        self.allocated += bytes;
        Ok(())
    }

    fn copy_to_image(
        &mut self,
        src: BufferId,
        dst: ImageId,
        regions: &[super::ImageCopyRegion],
    ) -> Result<(), DeviceError> {
        let source = self
            .buffers
            .get(&src.0)
            .ok_or(DeviceError::UnknownHandle("buffer"))?;
        let image = self
            .images
            .get_mut(&dst.0)
            .ok_or(DeviceError::UnknownHandle("image"))?;
        let bpp = image.desc.format.bytes_per_pixel() as u64;

        for region in regions {
            if region.width == 0 || region.height == 0 {
                continue;
            }
            let row = region.width as u64 * bpp;
            let pitch = region.bytes_per_row as u64;
            let span = pitch * (region.height as u64 - 1) + row;
            let size = source.bytes.len() as u64;
            if pitch < row || region.buffer_offset + span > size {
                return Err(DeviceError::OutOfBounds {
                    offset: region.buffer_offset,
                    len: span,
                    size,
                });
            }

            let level = image
                .level_mut(region.layer, region.mip_level)
                .ok_or(DeviceError::Unsupported(format!(
                    "copy into layer {} mip {}",
                    region.layer, region.mip_level
                )))?;
            if level.len() as u64 != row * region.height as u64 {
                return Err(DeviceError::Unsupported(
                    "partial mip level copies".to_string(),
                ));
            }

            for y in 0..region.height as u64 {
                let from = (region.buffer_offset + y * pitch) as usize;
                let to = (y * row) as usize;
                level[to..to + row as usize].copy_from_slice(&source.bytes[from..from + row as usize]);
            }
        }
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), DeviceError> {
        let data = {
            let source = self
                .buffers
                .get(&src.0)
                .ok_or(DeviceError::UnknownHandle("buffer"))?;
            checked_range(src_offset, size, source.bytes.len() as u64)?;
            source.bytes[src_offset as usize..(src_offset + size) as usize].to_vec()
        };
        self.write_buffer(dst, dst_offset, &data)
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn checked_range(offset: u64, len: u64, size: u64) -> Result<(), DeviceError> {
    if offset + len > size {
        return Err(DeviceError::OutOfBounds { offset, len, size });
    }
    Ok(())
}

impl GpuDevice for MemoryDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError> {
        if desc.size > self.limits.max_buffer_size {
            return Err(DeviceError::OutOfMemory { requested: desc.size });
        }
        self.reserve(desc.size)?;
        let id = self.next_id();
        self.buffers.insert(
            id,
            MemBuffer {
                desc: desc.clone(),
                bytes: vec![0; desc.size as usize],
            },
        );
        Ok(BufferId(id))
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.remove(&id.0) {
            self.allocated -= buffer.desc.size;
        }
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let buffer = self
            .buffers
            .get_mut(&id.0)
            .ok_or(DeviceError::UnknownHandle("buffer"))?;
        checked_range(offset, data.len() as u64, buffer.bytes.len() as u64)?;
        buffer.bytes[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageId, DeviceError> {
        if desc.width == 0 || desc.height == 0 || desc.layers == 0 || desc.mip_levels == 0 {
            return Err(DeviceError::Unsupported(format!("empty image {desc:?}")));
        }

        let mut levels = Vec::with_capacity((desc.layers * desc.mip_levels) as usize);
        let mut total = 0;
        for _ in 0..desc.layers {
            for mip in 0..desc.mip_levels {
                let size = desc.level_size(mip);
                total += size;
                levels.push(vec![0; size as usize]);
            }
        }

        self.reserve(total)?;
        let id = self.next_id();
        self.images.insert(id, MemImage { desc: desc.clone(), levels });
        Ok(ImageId(id))
    }

    fn destroy_image(&mut self, id: ImageId) {
        if let Some(image) = self.images.remove(&id.0) {
            let total: usize = image.levels.iter().map(Vec::len).sum();
            self.allocated -= total as u64;
        }
    }

    fn write_image(&mut self, id: ImageId, layer: u32, mip: u32, data: &[u8]) -> Result<(), DeviceError> {
        let image = self
            .images
            .get_mut(&id.0)
            .ok_or(DeviceError::UnknownHandle("image"))?;
        let level = image.level_mut(layer, mip).ok_or(DeviceError::Unsupported(format!(
            "write to layer {layer} mip {mip}"
        )))?;
        if level.len() != data.len() {
            return Err(DeviceError::OutOfBounds {
                offset: 0,
                len: data.len() as u64,
                size: level.len() as u64,
            });
        }
        level.copy_from_slice(data);
        Ok(())
    }

    fn create_view(&mut self, desc: &ViewDesc) -> Result<ViewId, DeviceError> {
        let image = self
            .images
            .get(&desc.image.0)
            .ok_or(DeviceError::UnknownHandle("image"))?;
        if desc.cube && image.desc.layers != 6 {
            return Err(DeviceError::Unsupported("cube view over non-cube image".to_string()));
        }
        self.check_injected_failure(0)?;
        let id = self.next_id();
        self.views.insert(id, *desc);
        Ok(ViewId(id))
    }

    fn destroy_view(&mut self, id: ViewId) {
        self.views.remove(&id.0);
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, DeviceError> {
        self.check_injected_failure(0)?;
        let id = self.next_id();
        self.samplers.insert(id, *desc);
        Ok(SamplerId(id))
    }

    fn destroy_sampler(&mut self, id: SamplerId) {
        self.samplers.remove(&id.0);
    }

    fn create_binding(&mut self, desc: &BindingDesc) -> Result<BindingId, DeviceError> {
        match desc {
            BindingDesc::UniformDynamic { buffer, size } | BindingDesc::Storage { buffer, size } => {
                let target = self
                    .buffers
                    .get(&buffer.0)
                    .ok_or(DeviceError::UnknownHandle("buffer"))?;
                checked_range(0, *size, target.desc.size)?;
            }
            BindingDesc::Texture { view, sampler } => {
                if !self.views.contains_key(&view.0) {
                    return Err(DeviceError::UnknownHandle("view"));
                }
                if !self.samplers.contains_key(&sampler.0) {
                    return Err(DeviceError::UnknownHandle("sampler"));
                }
            }
        }
        self.check_injected_failure(0)?;
        let id = self.next_id();
        self.bindings.insert(id, *desc);
        Ok(BindingId(id))
    }

    fn destroy_binding(&mut self, id: BindingId) {
        self.bindings.remove(&id.0);
    }

    fn submit_immediate(&mut self, transfers: &TransferList) -> Result<(), DeviceError> {
        for transfer in transfers.transfers() {
            match transfer {
                Transfer::CopyBufferToImage { src, dst, regions } => {
                    self.copy_to_image(*src, *dst, regions)?;
                }
                Transfer::CopyBuffer { src, src_offset, dst, dst_offset, size } => {
                    self.copy_buffer(*src, *src_offset, *dst, *dst_offset, *size)?;
                }
            }
        }
        self.submits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BufferUsage, ImageCopyRegion, ImageFormat};

    fn buffer(device: &mut MemoryDevice, size: u64) -> BufferId {
        device
            .create_buffer(&BufferDesc { label: "test", size, usage: BufferUsage::Staging })
            .unwrap()
    }

    // ── accounting ────────────────────────────────────────────────────────

    #[test]
    fn budget_rejects_and_destroy_refunds() {
        let mut device = MemoryDevice::new();
        device.set_budget(Some(100));

        let a = buffer(&mut device, 60);
        let err = device
            .create_buffer(&BufferDesc { label: "b", size: 60, usage: BufferUsage::Vertex })
            .unwrap_err();
        assert_eq!(err, DeviceError::OutOfMemory { requested: 60 });

        device.destroy_buffer(a);
        assert_eq!(device.allocated_bytes(), 0);
        buffer(&mut device, 60);
    }

    #[test]
    fn injected_failure_fires_once() {
        let mut device = MemoryDevice::new();
        device.fail_after(1);
        buffer(&mut device, 4);
        assert!(device.create_sampler(&SamplerDesc::default()).is_err());
        assert!(device.create_sampler(&SamplerDesc::default()).is_ok());
    }

    // ── writes ────────────────────────────────────────────────────────────

    #[test]
    fn write_buffer_is_bounds_checked() {
        let mut device = MemoryDevice::new();
        let id = buffer(&mut device, 8);
        device.write_buffer(id, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.buffer_bytes(id).unwrap(), &[0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(matches!(
            device.write_buffer(id, 8, &[0; 4]),
            Err(DeviceError::OutOfBounds { .. })
        ));
    }

    // ── transfers ─────────────────────────────────────────────────────────

    #[test]
    fn copy_to_image_honours_row_pitch() {
        let mut device = MemoryDevice::new();
        let image = device
            .create_image(&ImageDesc {
                label: "img",
                width: 2,
                height: 2,
                layers: 1,
                mip_levels: 1,
                format: ImageFormat::R8Unorm,
            })
            .unwrap();
        let src = buffer(&mut device, 8);
        device.write_buffer(src, 0, &[1, 2, 9, 9, 3, 4, 9, 9]).unwrap();

        let mut transfers = TransferList::new();
        transfers.push(Transfer::CopyBufferToImage {
            src,
            dst: image,
            regions: vec![ImageCopyRegion {
                buffer_offset: 0,
                bytes_per_row: 4,
                layer: 0,
                mip_level: 0,
                width: 2,
                height: 2,
            }],
        });
        device.submit_immediate(&transfers).unwrap();

        assert_eq!(device.image_level(image, 0, 0).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(device.submit_count(), 1);
    }

    #[test]
    fn cube_view_requires_six_layers() {
        let mut device = MemoryDevice::new();
        let image = device
            .create_image(&ImageDesc {
                label: "img",
                width: 1,
                height: 1,
                layers: 1,
                mip_levels: 1,
                format: ImageFormat::Rgba8Unorm,
            })
            .unwrap();
        assert!(device.create_view(&ViewDesc { image, cube: true }).is_err());
        assert!(device.create_view(&ViewDesc { image, cube: false }).is_ok());
    }
}
