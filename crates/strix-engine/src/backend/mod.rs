//! Graphics API backends implementing [`GpuDevice`](crate::device::GpuDevice).
//!
//! The CPU-backed [`MemoryDevice`](crate::device::MemoryDevice) lives next to
//! the trait; real GPU backends live here.

pub mod wgpu;
