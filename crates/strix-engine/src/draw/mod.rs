//! Drawable submission.
//!
//! Every drawable kind has one encoder. All of them follow the same protocol
//! against the current frame's heaps:
//! 1. stage vertex / index / uniform data (any failure aborts the drawable)
//! 2. record pipeline, buffer and descriptor set binds
//! 3. record the draw
//!
//! Encoders never reset heaps or clear the command list; that belongs to the
//! frame boundary in [`Renderer`](crate::Renderer).

mod cloth;
mod fixed;
mod model;
mod quad;

pub mod uniform;
pub mod vertex;

pub use cloth::{cloth_indices, ClothMesh};
pub use fixed::{skybox_vertices, GRID_VERTEX_COUNT, SKYBOX_INDICES};
pub use quad::{quad_vertices, FluidQuad, Quad, Text, QUAD_INDICES};

use bytemuck::Pod;

use crate::camera::Camera;
use crate::config::Viewport;
use crate::device::{BindingId, CommandList, GpuDevice, PipelineKind};
use crate::error::Result;
use crate::heap::{FrameAllocation, FrameHeaps, UniformAllocation};
use crate::model::Model;
use crate::texture::Skybox;

use self::uniform::PvmUniform;
use self::vertex::PcuVertex;

/// One submission, dispatched by kind through
/// [`Renderer::submit`](crate::Renderer::submit).
pub enum Drawable<'a> {
    Quad(&'a Quad),
    /// Screen-space glyph run.
    Text(&'a Text<'a>),
    /// Mutable: submission writes this frame's skin matrices.
    Model(&'a mut Model),
    Skybox(&'a Skybox),
    /// Vertex-less overlay drawn from the camera uniform alone.
    Grid,
    Cloth(&'a ClothMesh<'a>),
    Fluid(&'a FluidQuad<'a>),
}

impl Drawable<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Drawable::Quad(_) => "quad",
            Drawable::Text(_) => "text",
            Drawable::Model(_) => "model",
            Drawable::Skybox(_) => "skybox",
            Drawable::Grid => "grid",
            Drawable::Cloth(_) => "cloth",
            Drawable::Fluid(_) => "fluid",
        }
    }
}

/// Reused host-side geometry for generated drawables.
#[derive(Debug, Default)]
pub(crate) struct Scratch {
    pub vertices: Vec<PcuVertex>,
    pub indices: Vec<u32>,
    /// Skins written by the current model submission.
    pub skins_touched: Vec<bool>,
}

impl Scratch {
    fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }
}

/// Everything an encoder may touch for one submission.
pub(crate) struct Encoder<'r, D: GpuDevice + ?Sized> {
    pub device: &'r mut D,
    pub heaps: &'r mut FrameHeaps,
    pub commands: &'r mut CommandList,
    pub scratch: &'r mut Scratch,
    pub camera: &'r Camera,
    pub viewport: Viewport,
    pub frame_index: usize,
    /// 1×1 white texture for materials and quads without one.
    pub fallback: BindingId,
}

impl<D: GpuDevice + ?Sized> Encoder<'_, D> {
    pub fn encode(&mut self, drawable: Drawable<'_>) -> Result<()> {
        match drawable {
            Drawable::Quad(q) => quad::encode_quad(self, q),
            Drawable::Text(t) => quad::encode_text(self, t),
            Drawable::Model(m) => model::encode(self, m),
            Drawable::Skybox(s) => fixed::encode_skybox(self, s),
            Drawable::Grid => fixed::encode_grid(self),
            Drawable::Cloth(c) => cloth::encode(self, c),
            Drawable::Fluid(f) => quad::encode_fluid(self, f),
        }
    }

    fn push_vertices<T: Pod>(&mut self, vertices: &[T]) -> Result<FrameAllocation> {
        self.heaps.vertex.push(&mut *self.device, vertices)
    }

    fn push_indices(&mut self, indices: &[u32]) -> Result<FrameAllocation> {
        self.heaps.index.push(&mut *self.device, indices)
    }

    fn push_uniform<T: Pod>(&mut self, value: &T) -> Result<UniformAllocation> {
        self.heaps.uniform.push_uniform(&mut *self.device, value)
    }

    /// Stages the scratch geometry and records one indexed draw with sets
    /// `[common, texture]`.
    fn draw_scratch(&mut self, pipeline: PipelineKind, uniform: &PvmUniform, texture: BindingId) -> Result<()> {
        if self.scratch.indices.is_empty() {
            return Ok(());
        }

        let vertices = self.heaps.vertex.push(&mut *self.device, &self.scratch.vertices)?;
        let indices = self.heaps.index.push(&mut *self.device, &self.scratch.indices)?;
        let uniform = self.push_uniform(uniform)?;

        self.commands.bind_pipeline(pipeline);
        self.commands.bind_vertex_buffer(vertices.buffer, vertices.offset);
        self.commands.bind_index_buffer(indices.buffer, indices.offset);
        self.commands
            .bind_groups(0, &[uniform.bindings.common, texture], &[uniform.dynamic_offset()]);
        self.commands.draw_indexed(self.scratch.indices.len() as u32, 0, 0);
        Ok(())
    }
}
