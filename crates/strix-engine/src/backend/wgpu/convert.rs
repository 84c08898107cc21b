//! Engine descriptor enums to their wgpu counterparts.

use crate::device::{AddressMode, BufferUsage, DeviceLimits, Filter, ImageFormat};

pub(super) fn buffer_usages(usage: BufferUsage) -> wgpu::BufferUsages {
    let base = wgpu::BufferUsages::COPY_DST;
    match usage {
        BufferUsage::Vertex => base | wgpu::BufferUsages::VERTEX,
        BufferUsage::Index => base | wgpu::BufferUsages::INDEX,
        BufferUsage::Uniform => base | wgpu::BufferUsages::UNIFORM,
        BufferUsage::Storage => base | wgpu::BufferUsages::STORAGE,
        BufferUsage::Staging => base | wgpu::BufferUsages::COPY_SRC,
    }
}

pub(super) fn texture_format(format: ImageFormat) -> wgpu::TextureFormat {
    match format {
        ImageFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        ImageFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        ImageFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
    }
}

pub(super) fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

pub(super) fn mipmap_filter_mode(filter: Filter) -> wgpu::MipmapFilterMode {
    match filter {
        Filter::Nearest => wgpu::MipmapFilterMode::Nearest,
        Filter::Linear => wgpu::MipmapFilterMode::Linear,
    }
}

pub(super) fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

pub(super) fn device_limits(limits: &wgpu::Limits) -> DeviceLimits {
    DeviceLimits {
        uniform_offset_alignment: limits.min_uniform_buffer_offset_alignment as u64,
        storage_offset_alignment: limits.min_storage_buffer_offset_alignment as u64,
        copy_alignment: wgpu::COPY_BUFFER_ALIGNMENT,
        copy_row_alignment: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
        max_buffer_size: limits.max_buffer_size,
    }
}
