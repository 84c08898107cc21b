use glam::{Mat4, Vec2, Vec3};
use strix_sim::FluidSimulation;

use crate::device::{BindingId, GpuDevice, ImageFormat, PipelineKind};
use crate::error::{RenderError, Result};
use crate::text::GlyphSource;
use crate::texture::{Texture, TextureKind};

use super::uniform::PvmUniform;
use super::vertex::PcuVertex;
use super::Encoder;

/// Two triangles over the quad vertex order of [`quad_vertices`].
pub const QUAD_INDICES: [u32; 6] = [2, 3, 1, 1, 0, 2];

/// Corners `p0`, `(p1.x, p0.y)`, `(p0.x, p1.y)`, `p1` with the matching uv
/// corners.
pub fn quad_vertices(p0: Vec2, p1: Vec2, uv0: Vec2, uv1: Vec2, z: f32, color: Vec3) -> [PcuVertex; 4] {
    [
        PcuVertex::new(p0.extend(z), color, uv0),
        PcuVertex::new(Vec3::new(p1.x, p0.y, z), color, Vec2::new(uv1.x, uv0.y)),
        PcuVertex::new(Vec3::new(p0.x, p1.y, z), color, Vec2::new(uv0.x, uv1.y)),
        PcuVertex::new(p1.extend(z), color, uv1),
    ]
}

/// Textured rectangle in model space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Quad {
    pub p0: Vec2,
    pub p1: Vec2,
    pub uv0: Vec2,
    pub uv1: Vec2,
    pub z: f32,
    pub color: Vec3,
    pub model: Mat4,
    /// `None` samples the renderer's white fallback texture.
    pub texture: Option<BindingId>,
}

impl Quad {
    pub fn new(p0: Vec2, p1: Vec2, texture: Option<BindingId>) -> Self {
        Self {
            p0,
            p1,
            uv0: Vec2::ZERO,
            uv1: Vec2::ONE,
            z: 0.0,
            color: Vec3::ONE,
            model: Mat4::IDENTITY,
            texture,
        }
    }
}

/// Screen-space text.
///
/// `position` is the pen origin of the first line in normalised device
/// coordinates; glyph metrics are pixels of the current viewport.
pub struct Text<'a> {
    pub text: &'a str,
    pub position: Vec2,
    pub color: Vec3,
    pub font: &'a dyn GlyphSource,
}

/// Full-screen display of a fluid's dye field.
///
/// `texture` must be a single-level `Rgba8Unorm` texture of the fluid's grid
/// size, see [`Renderer::create_fluid_texture`](crate::Renderer::create_fluid_texture).
pub struct FluidQuad<'a> {
    pub fluid: &'a FluidSimulation,
    pub texture: &'a Texture,
}

pub(super) fn encode_quad<D: GpuDevice + ?Sized>(enc: &mut Encoder<'_, D>, quad: &Quad) -> Result<()> {
    enc.scratch.clear();
    enc.scratch
        .vertices
        .extend(quad_vertices(quad.p0, quad.p1, quad.uv0, quad.uv1, quad.z, quad.color));
    enc.scratch.indices.extend(QUAD_INDICES);

    let uniform = PvmUniform::new(enc.camera.projection, enc.camera.view, quad.model);
    let texture = quad.texture.unwrap_or(enc.fallback);
    enc.draw_scratch(PipelineKind::Basic, &uniform, texture)
}

pub(super) fn encode_text<D: GpuDevice + ?Sized>(enc: &mut Encoder<'_, D>, text: &Text<'_>) -> Result<()> {
    let (w, h) = enc.viewport.size_f32();
    let origin = Vec2::new(text.position.x * w * 0.5, -text.position.y * h * 0.5);
    let mut pen = origin;

    enc.scratch.clear();
    for c in text.text.chars() {
        if c == '\n' {
            pen = Vec2::new(origin.x, pen.y + text.font.line_height());
            continue;
        }
        let Some(glyph) = text.font.fill_glyph(c, &mut pen) else {
            continue;
        };

        let base = enc.scratch.vertices.len() as u32;
        for (position, uv) in glyph.positions.iter().zip(glyph.uvs) {
            enc.scratch.vertices.push(PcuVertex::new(position.extend(0.0), text.color, uv));
        }
        enc.scratch.indices.extend(QUAD_INDICES.map(|i| base + i));
    }

    // Pixels (+Y down, origin at the viewport centre) to clip space.
    let model = Mat4::from_scale(Vec3::new(2.0 / w, -2.0 / h, 1.0));
    let uniform = PvmUniform::new(Mat4::IDENTITY, Mat4::IDENTITY, model);
    enc.draw_scratch(PipelineKind::Text, &uniform, text.font.binding())
}

pub(super) fn encode_fluid<D: GpuDevice + ?Sized>(enc: &mut Encoder<'_, D>, fluid: &FluidQuad<'_>) -> Result<()> {
    let texture = fluid.texture;
    let grid = (fluid.fluid.width() as u32, fluid.fluid.height() as u32);
    if texture.size() != grid || texture.format() != ImageFormat::Rgba8Unorm || texture.kind() != TextureKind::Compute {
        return Err(RenderError::invalid(format!(
            "fluid texture is {:?} {:?} {:?}, grid is {}x{}",
            texture.kind(),
            texture.format(),
            texture.size(),
            grid.0,
            grid.1
        )));
    }
    enc.device.write_image(texture.image(), 0, 0, &fluid.fluid.dye_rgba8())?;

    enc.scratch.clear();
    enc.scratch
        .vertices
        .extend(quad_vertices(Vec2::NEG_ONE, Vec2::ONE, Vec2::ZERO, Vec2::ONE, 0.0, Vec3::ONE));
    enc.scratch.indices.extend(QUAD_INDICES);
    enc.draw_scratch(PipelineKind::Basic, &PvmUniform::default(), texture.binding())
}
