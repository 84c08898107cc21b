use crate::error::DeviceError;

use super::{
    BindingDesc,
    BindingId,
    BufferDesc,
    BufferId,
    GpuDevice,
    ImageDesc,
    ImageId,
    SamplerDesc,
    SamplerId,
    ViewDesc,
    ViewId,
};

#[derive(Debug, Copy, Clone)]
enum Acquired {
    Buffer(BufferId),
    Image(ImageId),
    View(ViewId),
    Sampler(SamplerId),
    Binding(BindingId),
}

/// Rollback guard for multi-resource creation.
///
/// Resources created through the scope are recorded in acquisition order.
/// Dropping the scope without [`commit`](ResourceScope::commit) releases them
/// in reverse order, so a failure partway through leaves nothing behind.
pub struct ResourceScope<'d, D: GpuDevice + ?Sized> {
    device: &'d mut D,
    acquired: Vec<Acquired>,
    committed: bool,
}

impl<'d, D: GpuDevice + ?Sized> ResourceScope<'d, D> {
    pub fn new(device: &'d mut D) -> Self {
        Self {
            device,
            acquired: Vec::new(),
            committed: false,
        }
    }

    /// Device access for calls that do not acquire resources.
    #[inline]
    pub fn device(&mut self) -> &mut D {
        &mut *self.device
    }

    /// Resources acquired so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.acquired.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.acquired.is_empty()
    }

    pub fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError> {
        let id = self.device.create_buffer(desc)?;
        self.acquired.push(Acquired::Buffer(id));
        Ok(id)
    }

    pub fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageId, DeviceError> {
        let id = self.device.create_image(desc)?;
        self.acquired.push(Acquired::Image(id));
        Ok(id)
    }

    pub fn create_view(&mut self, desc: &ViewDesc) -> Result<ViewId, DeviceError> {
        let id = self.device.create_view(desc)?;
        self.acquired.push(Acquired::View(id));
        Ok(id)
    }

    pub fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId, DeviceError> {
        let id = self.device.create_sampler(desc)?;
        self.acquired.push(Acquired::Sampler(id));
        Ok(id)
    }

    pub fn create_binding(&mut self, desc: &BindingDesc) -> Result<BindingId, DeviceError> {
        let id = self.device.create_binding(desc)?;
        self.acquired.push(Acquired::Binding(id));
        Ok(id)
    }

    /// Keeps everything acquired so far.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl<D: GpuDevice + ?Sized> Drop for ResourceScope<'_, D> {
    fn drop(&mut self) {
        if self.committed || self.acquired.is_empty() {
            return;
        }

        log::debug!("rolling back {} device resources", self.acquired.len());
        while let Some(resource) = self.acquired.pop() {
            match resource {
                Acquired::Buffer(id) => self.device.destroy_buffer(id),
                Acquired::Image(id) => self.device.destroy_image(id),
                Acquired::View(id) => self.device.destroy_view(id),
                Acquired::Sampler(id) => self.device.destroy_sampler(id),
                Acquired::Binding(id) => self.device.destroy_binding(id),
            }
        }
    }
}
