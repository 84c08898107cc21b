//! Transient GPU memory.
//!
//! - [`FrameHeap`]: bump allocator per resource class and per frame in flight,
//!   reset once at frame begin, grown on demand
//! - [`StagingHeap`]: single outstanding host-visible allocation used by
//!   resource uploads
//! - [`FrameHeaps`]: the vertex / index / uniform set of one frame in flight

mod frame;
mod staging;

pub use frame::{FrameAllocation, FrameHeap, UniformAllocation, UniformBindingSizes, UniformBindings};
pub use staging::{StagingAllocation, StagingHeap};

use crate::config::RendererConfig;
use crate::device::{BufferUsage, GpuDevice};
use crate::error::Result;

/// Resource class served by a frame heap.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum HeapClass {
    Vertex,
    Index,
    Uniform,
}

impl HeapClass {
    #[inline]
    pub(crate) fn usage(self) -> BufferUsage {
        match self {
            HeapClass::Vertex => BufferUsage::Vertex,
            HeapClass::Index => BufferUsage::Index,
            HeapClass::Uniform => BufferUsage::Uniform,
        }
    }

    #[inline]
    pub(crate) fn label(self) -> &'static str {
        match self {
            HeapClass::Vertex => "strix vertex heap",
            HeapClass::Index => "strix index heap",
            HeapClass::Uniform => "strix uniform heap",
        }
    }
}

/// Snapshot of a frame heap, used by the stats overlay and tests.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HeapStats {
    pub class: HeapClass,
    pub capacity: u64,
    pub used: u64,
    /// Buffers replaced by growth this frame, still alive until the next reset.
    pub retired: usize,
}

/// The three frame heaps of one frame in flight.
pub struct FrameHeaps {
    pub vertex: FrameHeap,
    pub index: FrameHeap,
    pub uniform: FrameHeap,
}

impl FrameHeaps {
    pub fn new<D: GpuDevice + ?Sized>(device: &mut D, config: &RendererConfig) -> Result<Self> {
        let vertex = FrameHeap::new(device, HeapClass::Vertex, config.vertex_heap_capacity, config.max_heap_capacity)?;
        let index = match FrameHeap::new(device, HeapClass::Index, config.index_heap_capacity, config.max_heap_capacity) {
            Ok(heap) => heap,
            Err(e) => {
                vertex.destroy(device);
                return Err(e);
            }
        };
        let uniform = match FrameHeap::new(device, HeapClass::Uniform, config.uniform_heap_capacity, config.max_heap_capacity) {
            Ok(heap) => heap,
            Err(e) => {
                index.destroy(device);
                vertex.destroy(device);
                return Err(e);
            }
        };
        Ok(Self { vertex, index, uniform })
    }

    pub fn reset<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        self.vertex.reset(device);
        self.index.reset(device);
        self.uniform.reset(device);
    }

    pub fn flush<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        self.vertex.flush(device)?;
        self.index.flush(device)?;
        self.uniform.flush(device)
    }

    pub fn stats(&self) -> [HeapStats; 3] {
        [self.vertex.stats(), self.index.stats(), self.uniform.stats()]
    }

    pub fn destroy<D: GpuDevice + ?Sized>(self, device: &mut D) {
        self.uniform.destroy(device);
        self.index.destroy(device);
        self.vertex.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    #[test]
    fn partial_construction_releases_created_heaps() {
        let mut device = MemoryDevice::new();
        // vertex heap buffer succeeds, index heap buffer fails
        device.fail_after(1);
        assert!(FrameHeaps::new(&mut device, &RendererConfig::default()).is_err());
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn stats_cover_every_class() {
        let mut device = MemoryDevice::new();
        let mut heaps = FrameHeaps::new(&mut device, &RendererConfig::default()).unwrap();
        heaps.index.allocate(&mut device, 12).unwrap();

        let [vertex, index, uniform] = heaps.stats();
        assert_eq!((vertex.class, index.class, uniform.class), (HeapClass::Vertex, HeapClass::Index, HeapClass::Uniform));
        assert_eq!(index.used, 12);

        heaps.reset(&mut device);
        assert_eq!(heaps.stats()[1].used, 0);
        heaps.destroy(&mut device);
        assert_eq!(device.live_resources(), 0);
    }
}
