use crate::device::{align_up, BufferDesc, BufferId, BufferUsage, GpuDevice, Transfer, TransferList};
use crate::error::{RenderError, Result};

/// The outstanding staging range.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StagingAllocation {
    pub buffer: BufferId,
    pub size: u64,
}

/// Host-visible upload buffer with exactly one outstanding allocation.
///
/// Usage is always allocate → write → flush → record copies →
/// `submit_immediate` → [`free`](StagingHeap::free). Allocating again before
/// `free` is a caller bug: it trips a debug assertion, and release builds get
/// `InvalidValue` back.
///
/// A request larger than the capacity replaces the buffer with one of twice
/// the requested size. Contents are never preserved.
pub struct StagingHeap {
    buffer: BufferId,
    capacity: u64,
    copy_alignment: u64,
    shadow: Vec<u8>,
    size: u64,
    in_use: bool,
}

impl StagingHeap {
    pub fn new<D: GpuDevice + ?Sized>(device: &mut D, capacity: u64) -> Result<Self> {
        let copy_alignment = device.limits().copy_alignment.max(1);
        let capacity = align_up(capacity.max(1), copy_alignment);
        let buffer = create_buffer(device, capacity)?;
        Ok(Self {
            buffer,
            capacity,
            copy_alignment,
            shadow: vec![0; capacity as usize],
            size: 0,
            in_use: false,
        })
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    #[inline]
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn allocate<D: GpuDevice + ?Sized>(&mut self, device: &mut D, size: u64) -> Result<StagingAllocation> {
        debug_assert!(!self.in_use, "staging heap allocated while a previous allocation is outstanding");
        if self.in_use {
            log::error!("staging heap allocated while in use");
            return Err(RenderError::invalid("staging heap is already in use"));
        }
        if size == 0 {
            return Err(RenderError::invalid("zero-sized staging allocation"));
        }

        if size > self.capacity {
            let capacity = align_up(size.saturating_mul(2), self.copy_alignment);
            let buffer = create_buffer(device, capacity)?;
            device.destroy_buffer(self.buffer);

            log::debug!("staging heap grew {} -> {} bytes", self.capacity, capacity);
            self.buffer = buffer;
            self.capacity = capacity;
            self.shadow = vec![0; capacity as usize];
        }

        self.in_use = true;
        self.size = size;
        Ok(StagingAllocation { buffer: self.buffer, size })
    }

    /// Host view of the outstanding allocation; empty when nothing is
    /// allocated.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let size = if self.in_use { self.size as usize } else { 0 };
        &mut self.shadow[..size]
    }

    /// Makes the host writes visible to the device.
    pub fn flush<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> Result<()> {
        if !self.in_use {
            return Ok(());
        }
        let len = align_up(self.size, self.copy_alignment).min(self.capacity);
        device.write_buffer(self.buffer, 0, &self.shadow[..len as usize])?;
        Ok(())
    }

    /// Releases the outstanding allocation. Always succeeds.
    #[inline]
    pub fn free(&mut self) {
        self.in_use = false;
        self.size = 0;
    }

    /// Copies each `(dst, bytes)` pair to the start of `dst` with one
    /// immediate submission. The staging allocation is freed on every path.
    pub fn upload_buffers<D: GpuDevice + ?Sized>(&mut self, device: &mut D, uploads: &[(BufferId, &[u8])]) -> Result<()> {
        let mut offsets = Vec::with_capacity(uploads.len());
        let mut total = 0u64;
        for (_, bytes) in uploads {
            total = align_up(total, self.copy_alignment);
            offsets.push(total);
            total += bytes.len() as u64;
        }
        if total == 0 {
            return Ok(());
        }

        self.allocate(device, total)?;
        let uploaded = self.copy_out(device, uploads, &offsets);
        self.free();
        uploaded
    }

    fn copy_out<D: GpuDevice + ?Sized>(&mut self, device: &mut D, uploads: &[(BufferId, &[u8])], offsets: &[u64]) -> Result<()> {
        let staged = self.bytes_mut();
        for ((_, bytes), &offset) in uploads.iter().zip(offsets) {
            staged[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
        }
        self.flush(device)?;

        let mut transfers = TransferList::new();
        for ((dst, bytes), &offset) in uploads.iter().zip(offsets) {
            if bytes.is_empty() {
                continue;
            }
            transfers.push(Transfer::CopyBuffer {
                src: self.buffer,
                src_offset: offset,
                dst: *dst,
                dst_offset: 0,
                size: align_up(bytes.len() as u64, self.copy_alignment),
            });
        }
        device.submit_immediate(&transfers)?;
        Ok(())
    }

    pub fn destroy<D: GpuDevice + ?Sized>(self, device: &mut D) {
        device.destroy_buffer(self.buffer);
    }
}

fn create_buffer<D: GpuDevice + ?Sized>(device: &mut D, size: u64) -> Result<BufferId> {
    device
        .create_buffer(&BufferDesc {
            label: "strix staging heap",
            size,
            usage: BufferUsage::Staging,
        })
        .map_err(|e| RenderError::from_allocation(size, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    // ── exclusion ─────────────────────────────────────────────────────────

    #[test]
    fn allocate_free_allocate_succeeds() {
        let mut device = MemoryDevice::new();
        let mut heap = StagingHeap::new(&mut device, 64).unwrap();

        heap.allocate(&mut device, 16).unwrap();
        assert!(heap.is_in_use());
        heap.free();
        assert!(!heap.is_in_use());
        heap.allocate(&mut device, 16).unwrap();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "staging heap allocated while a previous allocation is outstanding")]
    fn double_allocate_faults() {
        let mut device = MemoryDevice::new();
        let mut heap = StagingHeap::new(&mut device, 64).unwrap();
        heap.allocate(&mut device, 16).unwrap();
        let _ = heap.allocate(&mut device, 16);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn double_allocate_is_invalid_in_release() {
        let mut device = MemoryDevice::new();
        let mut heap = StagingHeap::new(&mut device, 64).unwrap();
        heap.allocate(&mut device, 16).unwrap();
        assert!(matches!(
            heap.allocate(&mut device, 16),
            Err(RenderError::InvalidValue(_))
        ));
    }

    #[test]
    fn free_is_unconditional() {
        let mut device = MemoryDevice::new();
        let mut heap = StagingHeap::new(&mut device, 64).unwrap();
        heap.free();
        heap.free();
        assert!(heap.bytes_mut().is_empty());
    }

    // ── growth ────────────────────────────────────────────────────────────

    #[test]
    fn oversized_request_reallocates_at_twice_the_size() {
        let mut device = MemoryDevice::new();
        let mut heap = StagingHeap::new(&mut device, 64).unwrap();
        let old = heap.buffer();

        let a = heap.allocate(&mut device, 100).unwrap();
        assert_eq!(heap.capacity(), 200);
        assert_ne!(a.buffer, old);
        assert!(device.buffer_bytes(old).is_none());
        assert_eq!(device.live_buffers(), 1);
    }

    #[test]
    fn failed_growth_keeps_old_buffer_and_stays_free() {
        let mut device = MemoryDevice::new();
        let mut heap = StagingHeap::new(&mut device, 64).unwrap();
        device.fail_after(0);

        let err = heap.allocate(&mut device, 100).unwrap_err();
        assert!(matches!(err, RenderError::OutOfDeviceMemory { requested: 200, .. }));
        assert!(!heap.is_in_use());
        assert_eq!(heap.capacity(), 64);
        assert!(device.buffer_bytes(heap.buffer()).is_some());
    }

    // ── writes ────────────────────────────────────────────────────────────

    #[test]
    fn flush_uploads_outstanding_bytes() {
        let mut device = MemoryDevice::new();
        let mut heap = StagingHeap::new(&mut device, 16).unwrap();
        heap.allocate(&mut device, 6).unwrap();
        heap.bytes_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        heap.flush(&mut device).unwrap();
        assert_eq!(&device.buffer_bytes(heap.buffer()).unwrap()[..6], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn upload_buffers_copies_each_range_and_frees() {
        let mut device = MemoryDevice::new();
        let mut heap = StagingHeap::new(&mut device, 4).unwrap();
        let dst = |device: &mut MemoryDevice| {
            device
                .create_buffer(&BufferDesc { label: "dst", size: 8, usage: BufferUsage::Vertex })
                .unwrap()
        };
        let (a, b) = (dst(&mut device), dst(&mut device));

        heap.upload_buffers(&mut device, &[(a, &[1, 2, 3, 4, 5, 6][..]), (b, &[9, 9, 9, 9][..])])
            .unwrap();

        assert_eq!(&device.buffer_bytes(a).unwrap()[..6], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(&device.buffer_bytes(b).unwrap()[..4], &[9, 9, 9, 9]);
        assert_eq!(device.submit_count(), 1);
        assert!(!heap.is_in_use());
    }

    #[test]
    fn failed_upload_still_frees() {
        let mut device = MemoryDevice::new();
        let mut heap = StagingHeap::new(&mut device, 16).unwrap();
        let unknown = BufferId(999);

        assert!(heap.upload_buffers(&mut device, &[(unknown, &[1, 2, 3, 4][..])]).is_err());
        assert!(!heap.is_in_use());
    }
}
