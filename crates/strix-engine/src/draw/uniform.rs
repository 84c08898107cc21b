//! Uniform block layouts staged in the uniform heap.
//!
//! Matrices are stored column-major, matching glam and WGSL.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Projection / view / model block shared by every non-model pipeline.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PvmUniform {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
}

impl PvmUniform {
    pub fn new(projection: Mat4, view: Mat4, model: Mat4) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
        }
    }
}

impl Default for PvmUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

/// Per-primitive block of a model draw.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ModelUniform {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub light: [f32; 4],
    /// Skin buffer slot of the drawing node, used when a vertex has no joints.
    pub node_slot: u32,
    pub _pad: [u32; 3],
}

impl ModelUniform {
    pub fn new(projection: Mat4, view: Mat4, model: Mat4, light: Vec4, node_slot: u32) -> Self {
        Self {
            projection: projection.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            light: light.to_array(),
            node_slot,
            _pad: [0; 3],
        }
    }
}

/// Material parameters.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    pub base_color_factor: [f32; 4],
    pub alpha_cutoff: f32,
    /// 0 or 1.
    pub alpha_mask: u32,
    pub _pad: [u32; 2],
}

impl Default for MaterialUniform {
    fn default() -> Self {
        Self {
            base_color_factor: [1.0; 4],
            alpha_cutoff: 0.5,
            alpha_mask: 0,
            _pad: [0; 2],
        }
    }
}
