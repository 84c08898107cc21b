/// Drawable area in physical pixels.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width and height as floats, never below 1.
    #[inline]
    pub fn size_f32(&self) -> (f32, f32) {
        (self.width.max(1) as f32, self.height.max(1) as f32)
    }
}

/// Renderer construction parameters.
///
/// Heap capacities are initial sizes; every frame heap grows on demand up to
/// `max_heap_capacity`.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Frames whose GPU work may be pending at once. Every frame heap and
    /// per-model skin buffer is duplicated this many times.
    pub frames_in_flight: usize,

    pub vertex_heap_capacity: u64,
    pub index_heap_capacity: u64,
    pub uniform_heap_capacity: u64,

    /// Initial staging heap size in bytes.
    pub staging_capacity: u64,

    /// Upper bound for a single frame heap buffer. `None` leaves it to the
    /// device's maximum buffer size.
    pub max_heap_capacity: Option<u64>,

    pub viewport: Viewport,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            vertex_heap_capacity: 64 * 1024,
            index_heap_capacity: 64 * 1024,
            uniform_heap_capacity: 64 * 1024,
            staging_capacity: 1024 * 1024,
            max_heap_capacity: Some(256 * 1024 * 1024),
            viewport: Viewport::new(600, 600),
        }
    }
}
