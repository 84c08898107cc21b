use bytemuck::Pod;

use crate::device::{align_up, BindingDesc, BindingId, BufferDesc, BufferId, GpuDevice, ResourceScope};
use crate::draw::uniform::{MaterialUniform, ModelUniform, PvmUniform};
use crate::error::{DeviceError, RenderError, Result};

use super::{HeapClass, HeapStats};

/// Sizes of the three uniform blocks a uniform heap exposes through dynamic
/// bindings.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UniformBindingSizes {
    pub common: u64,
    pub model: u64,
    pub material: u64,
}

impl UniformBindingSizes {
    #[inline]
    fn largest(&self) -> u64 {
        self.common.max(self.model).max(self.material)
    }
}

impl Default for UniformBindingSizes {
    fn default() -> Self {
        Self {
            common: size_of::<PvmUniform>() as u64,
            model: size_of::<ModelUniform>() as u64,
            material: size_of::<MaterialUniform>() as u64,
        }
    }
}

/// Dynamic-offset descriptor sets over one uniform heap buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UniformBindings {
    pub common: BindingId,
    pub model: BindingId,
    pub material: BindingId,
}

/// A byte range handed out by a [`FrameHeap`].
///
/// Valid until the heap's next [`reset`](FrameHeap::reset).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameAllocation {
    pub buffer: BufferId,
    pub offset: u64,
    /// Requested size; the heap cursor advanced by this rounded up to the
    /// heap alignment.
    pub size: u64,
    pub dynamic_offset: u32,
    /// Bindings of the buffer this range lives in (uniform heaps only).
    pub bindings: Option<UniformBindings>,
    /// Heap generation at allocation time; bumped by every reset.
    generation: u64,
}

/// A uniform-heap allocation together with the bindings to draw with it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UniformAllocation {
    pub allocation: FrameAllocation,
    pub bindings: UniformBindings,
}

impl UniformAllocation {
    #[inline]
    pub fn dynamic_offset(&self) -> u32 {
        self.allocation.dynamic_offset
    }
}

struct Block {
    buffer: BufferId,
    capacity: u64,
    /// Host copy of the buffer contents, uploaded by `flush`.
    shadow: Vec<u8>,
    used: u64,
    bindings: Option<UniformBindings>,
}

fn create_block<D: GpuDevice + ?Sized>(
    device: &mut D,
    class: HeapClass,
    capacity: u64,
    sizes: &UniformBindingSizes,
) -> Result<Block, DeviceError> {
    let mut scope = ResourceScope::new(device);

    let buffer = scope.create_buffer(&BufferDesc {
        label: class.label(),
        size: capacity,
        usage: class.usage(),
    })?;

    let bindings = if class == HeapClass::Uniform {
        let mut dynamic = |size| scope.create_binding(&BindingDesc::UniformDynamic { buffer, size });
        Some(UniformBindings {
            common: dynamic(sizes.common)?,
            model: dynamic(sizes.model)?,
            material: dynamic(sizes.material)?,
        })
    } else {
        None
    };

    scope.commit();
    Ok(Block {
        buffer,
        capacity,
        shadow: vec![0; capacity as usize],
        used: 0,
        bindings,
    })
}

fn destroy_block<D: GpuDevice + ?Sized>(device: &mut D, block: Block) {
    if let Some(b) = block.bindings {
        device.destroy_binding(b.material);
        device.destroy_binding(b.model);
        device.destroy_binding(b.common);
    }
    device.destroy_buffer(block.buffer);
}

/// Linear allocator over one GPU buffer, reset once per frame.
///
/// Allocations are bump-pointer ranges that never overlap within a frame.
/// When a request does not fit, the current buffer is retired (it stays alive,
/// and is still uploaded, until the next reset) and a buffer of at least
/// double the capacity replaces it; the cursor restarts at 0 in the new
/// buffer. Nothing is migrated because every frame regenerates its data.
///
/// Writes go to a host shadow of the buffer and reach the device in
/// [`flush`](FrameHeap::flush), once per frame.
pub struct FrameHeap {
    class: HeapClass,
    alignment: u64,
    copy_alignment: u64,
    max_capacity: u64,
    binding_sizes: UniformBindingSizes,
    current: Block,
    retired: Vec<Block>,
    generation: u64,
}

impl FrameHeap {
    pub fn new<D: GpuDevice + ?Sized>(
        device: &mut D,
        class: HeapClass,
        capacity: u64,
        max_capacity: Option<u64>,
    ) -> Result<Self> {
        Self::with_binding_sizes(device, class, capacity, max_capacity, UniformBindingSizes::default())
    }

    pub fn with_binding_sizes<D: GpuDevice + ?Sized>(
        device: &mut D,
        class: HeapClass,
        capacity: u64,
        max_capacity: Option<u64>,
        binding_sizes: UniformBindingSizes,
    ) -> Result<Self> {
        let limits = device.limits();
        let copy_alignment = limits.copy_alignment.max(1);
        let alignment = match class {
            HeapClass::Uniform => align_up(limits.uniform_offset_alignment.max(1), copy_alignment),
            HeapClass::Vertex | HeapClass::Index => copy_alignment,
        };

        // Dynamic offsets are u32.
        let max_capacity = max_capacity
            .unwrap_or(limits.max_buffer_size)
            .min(limits.max_buffer_size)
            .min(u32::MAX as u64);

        let floor = match class {
            HeapClass::Uniform => binding_sizes.largest(),
            HeapClass::Vertex | HeapClass::Index => 1,
        };
        let capacity = align_up(capacity.max(floor), alignment);
        if capacity > max_capacity {
            return Err(RenderError::invalid(format!(
                "{class:?} heap capacity {capacity} exceeds maximum {max_capacity}"
            )));
        }

        let current = create_block(device, class, capacity, &binding_sizes)
            .map_err(|e| RenderError::from_allocation(capacity, e))?;

        Ok(Self {
            class,
            alignment,
            copy_alignment,
            max_capacity,
            binding_sizes,
            current,
            retired: Vec::new(),
            generation: 0,
        })
    }

    #[inline]
    pub fn class(&self) -> HeapClass {
        self.class
    }

    #[inline]
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.current.capacity
    }

    /// Bytes consumed in the current buffer.
    #[inline]
    pub fn used(&self) -> u64 {
        self.current.used
    }

    /// Buffer new allocations are served from.
    #[inline]
    pub fn buffer(&self) -> BufferId {
        self.current.buffer
    }

    #[inline]
    pub fn bindings(&self) -> Option<UniformBindings> {
        self.current.bindings
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            class: self.class,
            capacity: self.current.capacity,
            used: self.current.used,
            retired: self.retired.len(),
        }
    }

    /// Reserves `size` bytes, growing the heap if needed.
    ///
    /// Fails with `InvalidValue` for `size == 0` and `OutOfFrameMemory` when the
    /// heap cannot grow far enough; a failed call leaves the heap unchanged.
    pub fn allocate<D: GpuDevice + ?Sized>(&mut self, device: &mut D, size: u64) -> Result<FrameAllocation> {
        if size == 0 {
            return Err(RenderError::invalid(format!(
                "zero-sized {:?} heap allocation",
                self.class
            )));
        }

        let aligned = align_up(size, self.alignment);
        if self.current.used + aligned > self.current.capacity {
            self.grow(device, aligned)?;
        }

        let offset = self.current.used;
        self.current.used += aligned;

        Ok(FrameAllocation {
            buffer: self.current.buffer,
            offset,
            size,
            dynamic_offset: offset as u32,
            bindings: self.current.bindings,
            generation: self.generation,
        })
    }

    /// Allocates and copies `items` in one step.
    pub fn push<D: GpuDevice + ?Sized, T: Pod>(&mut self, device: &mut D, items: &[T]) -> Result<FrameAllocation> {
        let bytes: &[u8] = bytemuck::cast_slice(items);
        let allocation = self.allocate(device, bytes.len() as u64)?;
        self.write(&allocation, bytes)?;
        Ok(allocation)
    }

    /// Stages one uniform block and returns the bindings to draw it with.
    pub fn push_uniform<D: GpuDevice + ?Sized, T: Pod>(&mut self, device: &mut D, value: &T) -> Result<UniformAllocation> {
        if self.class != HeapClass::Uniform {
            return Err(RenderError::invalid(format!(
                "uniform block pushed into {:?} heap",
                self.class
            )));
        }
        let allocation = self.push(device, std::slice::from_ref(value))?;
        let bindings = allocation
            .bindings
            .ok_or_else(|| RenderError::invalid("uniform heap buffer without bindings"))?;
        Ok(UniformAllocation { allocation, bindings })
    }

    /// Host view of an allocation made this frame.
    pub fn bytes_mut(&mut self, allocation: &FrameAllocation) -> Result<&mut [u8]> {
        if allocation.generation != self.generation {
            return Err(RenderError::invalid("allocation outlived a heap reset"));
        }
        let block = if self.current.buffer == allocation.buffer {
            &mut self.current
        } else {
            self.retired
                .iter_mut()
                .find(|b| b.buffer == allocation.buffer)
                .ok_or_else(|| RenderError::invalid("allocation does not belong to this frame"))?
        };

        let start = allocation.offset as usize;
        let end = start + allocation.size as usize;
        if allocation.offset + allocation.size > block.used {
            return Err(RenderError::invalid("allocation range past the heap cursor"));
        }
        Ok(&mut block.shadow[start..end])
    }

    pub fn write(&mut self, allocation: &FrameAllocation, data: &[u8]) -> Result<()> {
        let target = self.bytes_mut(allocation)?;
        if data.len() > target.len() {
            return Err(RenderError::invalid(format!(
                "{} bytes written into a {} byte allocation",
                data.len(),
                target.len()
            )));
        }
        target[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Uploads everything written this frame, retired buffers included.
    pub fn flush<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        for block in self.retired.iter().chain(std::iter::once(&self.current)) {
            if block.used == 0 {
                continue;
            }
            let len = align_up(block.used, self.copy_alignment).min(block.capacity);
            device.write_buffer(block.buffer, 0, &block.shadow[..len as usize])?;
        }
        Ok(())
    }

    /// Frame-begin reset: rewinds the cursor and frees retired buffers.
    ///
    /// Must only run once the GPU has finished with this heap's previous frame.
    pub fn reset<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        for block in self.retired.drain(..) {
            destroy_block(device, block);
        }
        self.current.used = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn destroy<D: GpuDevice + ?Sized>(mut self, device: &mut D) {
        self.reset(device);
        destroy_block(device, self.current);
    }

    fn grow<D: GpuDevice + ?Sized>(&mut self, device: &mut D, needed: u64) -> Result<()> {
        if needed > self.max_capacity {
            return Err(RenderError::OutOfFrameMemory {
                heap: self.class,
                requested: needed,
                source: None,
            });
        }

        let mut capacity = self.current.capacity.saturating_mul(2);
        while capacity < needed {
            capacity = capacity.saturating_mul(2);
        }
        let capacity = capacity.min(self.max_capacity);

        let block = create_block(device, self.class, capacity, &self.binding_sizes).map_err(|e| {
            RenderError::OutOfFrameMemory {
                heap: self.class,
                requested: needed,
                source: Some(e),
            }
        })?;

        log::debug!(
            "{:?} heap grew {} -> {} bytes",
            self.class,
            self.current.capacity,
            capacity
        );

        let old = std::mem::replace(&mut self.current, block);
        self.retired.push(old);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn vertex_heap(device: &mut MemoryDevice, capacity: u64) -> FrameHeap {
        FrameHeap::new(device, HeapClass::Vertex, capacity, None).unwrap()
    }

    // ── monotonicity ──────────────────────────────────────────────────────

    #[test]
    fn offsets_increase_without_overlap() {
        let mut device = MemoryDevice::new();
        let mut heap = vertex_heap(&mut device, 4096);

        let sizes = [10u64, 20, 300, 4, 1];
        let mut end = 0;
        let mut total = 0;
        for size in sizes {
            let a = heap.allocate(&mut device, size).unwrap();
            assert!(a.offset >= end, "allocation overlaps previous range");
            assert_eq!(a.offset % heap.alignment(), 0);
            end = a.offset + size;
            total += align_up(size, heap.alignment());
        }
        assert_eq!(heap.used(), total);
    }

    #[test]
    fn uniform_offsets_follow_device_alignment() {
        let mut device = MemoryDevice::new();
        let mut heap = FrameHeap::new(&mut device, HeapClass::Uniform, 4096, None).unwrap();

        let a = heap.allocate(&mut device, 192).unwrap();
        let b = heap.allocate(&mut device, 32).unwrap();
        assert_eq!((a.dynamic_offset, b.dynamic_offset), (0, 256));
        assert_eq!(heap.used(), 512);
        assert!(a.bindings.is_some());
    }

    #[test]
    fn zero_sized_allocation_is_invalid() {
        let mut device = MemoryDevice::new();
        let mut heap = vertex_heap(&mut device, 64);
        assert!(matches!(heap.allocate(&mut device, 0), Err(RenderError::InvalidValue(_))));
        assert_eq!(heap.used(), 0);
    }

    // ── reset ─────────────────────────────────────────────────────────────

    #[test]
    fn reset_rewinds_to_zero() {
        let mut device = MemoryDevice::new();
        let mut heap = vertex_heap(&mut device, 256);
        heap.allocate(&mut device, 100).unwrap();
        heap.allocate(&mut device, 100).unwrap();

        heap.reset(&mut device);
        assert_eq!(heap.used(), 0);
        heap.reset(&mut device);
        assert_eq!(heap.used(), 0);
        assert_eq!(heap.allocate(&mut device, 16).unwrap().offset, 0);
    }

    // ── growth ────────────────────────────────────────────────────────────

    #[test]
    fn growth_doubles_and_serves_request() {
        let mut device = MemoryDevice::new();
        let mut heap = vertex_heap(&mut device, 256);

        let first = heap.allocate(&mut device, 200).unwrap();
        let second = heap.allocate(&mut device, 200).unwrap();

        assert_eq!(heap.capacity(), 512);
        assert_ne!(first.buffer, second.buffer);
        assert_eq!(second.offset, 0);
        assert_eq!(heap.stats().retired, 1);
        // The retired buffer stays alive for the rest of the frame.
        assert!(device.buffer_bytes(first.buffer).is_some());

        heap.reset(&mut device);
        assert!(device.buffer_bytes(first.buffer).is_none());
        assert_eq!(heap.stats().retired, 0);
    }

    #[test]
    fn growth_keeps_doubling_until_request_fits() {
        let mut device = MemoryDevice::new();
        let mut heap = vertex_heap(&mut device, 256);
        let a = heap.allocate(&mut device, 5000).unwrap();
        assert_eq!(heap.capacity(), 8192);
        assert_eq!(a.offset, 0);
        assert_eq!(heap.used(), 5000);
    }

    #[test]
    fn growth_past_maximum_is_out_of_frame_memory() {
        let mut device = MemoryDevice::new();
        let mut heap = FrameHeap::new(&mut device, HeapClass::Index, 256, Some(1024)).unwrap();

        let err = heap.allocate(&mut device, 2048).unwrap_err();
        assert!(matches!(
            err,
            RenderError::OutOfFrameMemory { heap: HeapClass::Index, source: None, .. }
        ));
        assert!(err.is_frame_recoverable());
        assert_eq!(heap.capacity(), 256);
    }

    #[test]
    fn growth_is_capped_at_maximum() {
        let mut device = MemoryDevice::new();
        let mut heap = FrameHeap::new(&mut device, HeapClass::Vertex, 512, Some(768)).unwrap();
        heap.allocate(&mut device, 400).unwrap();
        heap.allocate(&mut device, 400).unwrap();
        assert_eq!(heap.capacity(), 768);
    }

    #[test]
    fn device_failure_during_growth_leaves_heap_usable() {
        let mut device = MemoryDevice::new();
        let mut heap = vertex_heap(&mut device, 256);
        heap.allocate(&mut device, 200).unwrap();

        device.fail_after(0);
        let err = heap.allocate(&mut device, 200).unwrap_err();
        assert!(matches!(err, RenderError::OutOfFrameMemory { source: Some(_), .. }));

        assert_eq!(heap.capacity(), 256);
        assert_eq!(heap.used(), 200);
        assert_eq!(heap.allocate(&mut device, 40).unwrap().offset, 200);
    }

    #[test]
    fn uniform_growth_recreates_bindings() {
        let mut device = MemoryDevice::new();
        let mut heap = FrameHeap::new(&mut device, HeapClass::Uniform, 256, None).unwrap();

        let a = heap.push_uniform(&mut device, &PvmUniform::default()).unwrap();
        let b = heap.push_uniform(&mut device, &PvmUniform::default()).unwrap();

        assert_ne!(a.bindings, b.bindings);
        match device.binding(b.bindings.common) {
            Some(BindingDesc::UniformDynamic { buffer, size }) => {
                assert_eq!(*buffer, b.allocation.buffer);
                assert_eq!(*size, size_of::<PvmUniform>() as u64);
            }
            other => panic!("unexpected binding {other:?}"),
        }
    }

    #[test]
    fn push_uniform_requires_uniform_heap() {
        let mut device = MemoryDevice::new();
        let mut heap = vertex_heap(&mut device, 256);
        assert!(matches!(
            heap.push_uniform(&mut device, &PvmUniform::default()),
            Err(RenderError::InvalidValue(_))
        ));
    }

    // ── flush ─────────────────────────────────────────────────────────────

    #[test]
    fn flush_uploads_current_and_retired_buffers() {
        let mut device = MemoryDevice::new();
        let mut heap = vertex_heap(&mut device, 8);

        let a = heap.push(&mut device, &[1u32, 2]).unwrap();
        let b = heap.push(&mut device, &[3u32, 4, 5]).unwrap();
        assert_ne!(a.buffer, b.buffer);

        heap.flush(&mut device).unwrap();

        let old: &[u32] = bytemuck::cast_slice(&device.buffer_bytes(a.buffer).unwrap()[..8]);
        assert_eq!(old, &[1, 2]);
        let new: &[u32] = bytemuck::cast_slice(&device.buffer_bytes(b.buffer).unwrap()[..12]);
        assert_eq!(new, &[3, 4, 5]);
    }

    #[test]
    fn stale_allocation_is_rejected_after_reset() {
        let mut device = MemoryDevice::new();
        let mut heap = vertex_heap(&mut device, 64);
        let a = heap.allocate(&mut device, 16).unwrap();
        heap.reset(&mut device);
        assert!(heap.write(&a, &[0; 16]).is_err());
    }

    #[test]
    fn stale_allocation_is_rejected_after_reallocation() {
        let mut device = MemoryDevice::new();
        let mut heap = vertex_heap(&mut device, 64);
        let stale = heap.allocate(&mut device, 16).unwrap();
        heap.reset(&mut device);

        let fresh = heap.allocate(&mut device, 64).unwrap();
        assert_eq!(fresh.offset, stale.offset);
        assert!(heap.write(&stale, &[0xff; 16]).is_err());

        heap.write(&fresh, &[7; 64]).unwrap();
        assert_eq!(heap.bytes_mut(&fresh).unwrap()[..16], [7; 16]);
    }

    #[test]
    fn destroy_releases_device_memory() {
        let mut device = MemoryDevice::new();
        let mut heap = FrameHeap::new(&mut device, HeapClass::Uniform, 256, None).unwrap();
        heap.allocate(&mut device, 200).unwrap();
        heap.allocate(&mut device, 200).unwrap();
        heap.destroy(&mut device);
        assert_eq!(device.live_resources(), 0);
    }
}
