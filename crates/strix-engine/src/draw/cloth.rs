use glam::{Vec2, Vec3};
use strix_sim::ClothSimulation;

use crate::device::{BindingId, GpuDevice, PipelineKind};
use crate::error::Result;

use super::uniform::PvmUniform;
use super::vertex::PcuVertex;
use super::Encoder;

/// Cloth surface regenerated from the particle grid on every submission.
pub struct ClothMesh<'a> {
    pub cloth: &'a ClothSimulation,
    pub color: Vec3,
    /// `None` samples the renderer's white fallback texture.
    pub texture: Option<BindingId>,
}

/// Appends `(height - 1) * (width - 1) * 6` indices: per cell `k`, the
/// triangles `k+w, k+w+1, k+1` and `k+1, k, k+w`.
pub fn cloth_indices(width: usize, height: usize, out: &mut Vec<u32>) {
    if width < 2 || height < 2 {
        return;
    }
    out.reserve((height - 1) * (width - 1) * 6);
    let w = width as u32;
    for row in 0..height as u32 - 1 {
        for col in 0..w - 1 {
            let k = row * w + col;
            out.extend([k + w, k + w + 1, k + 1, k + 1, k, k + w]);
        }
    }
}

pub(super) fn encode<D: GpuDevice + ?Sized>(enc: &mut Encoder<'_, D>, mesh: &ClothMesh<'_>) -> Result<()> {
    let cloth = mesh.cloth;
    let (w, h) = (cloth.width(), cloth.height());

    enc.scratch.clear();
    enc.scratch.vertices.reserve(w * h);
    // grid is at least 2x2, so uv spans [0, 1] on both axes
    let (u_last, v_last) = ((w - 1) as f32, (h - 1) as f32);
    for row in 0..h {
        for col in 0..w {
            let particle = &cloth.particles()[cloth.index(row, col)];
            let uv = Vec2::new(col as f32 / u_last, row as f32 / v_last);
            enc.scratch.vertices.push(PcuVertex::new(particle.position, mesh.color, uv));
        }
    }
    cloth_indices(w, h, &mut enc.scratch.indices);

    let uniform = PvmUniform::new(enc.camera.projection, enc.camera.view, cloth.model);
    let texture = mesh.texture.unwrap_or(enc.fallback);
    enc.draw_scratch(PipelineKind::Basic, &uniform, texture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Command;
    use crate::draw::tests::Harness;
    use crate::draw::Drawable;
    use approx::assert_relative_eq;
    use strix_sim::ClothConfig;

    #[test]
    fn index_count_and_winding() {
        let mut indices = Vec::new();
        cloth_indices(3, 2, &mut indices);
        assert_eq!(indices, vec![3, 4, 1, 1, 0, 3, 4, 5, 2, 2, 1, 4]);

        indices.clear();
        cloth_indices(32, 32, &mut indices);
        assert_eq!(indices.len(), 31 * 31 * 6);
        assert!(indices.iter().all(|&i| i < 32 * 32));
    }

    #[test]
    fn degenerate_grid_has_no_indices() {
        let mut indices = Vec::new();
        cloth_indices(1, 5, &mut indices);
        assert!(indices.is_empty());
    }

    #[test]
    fn vertices_track_particles_every_submission() {
        let mut h = Harness::new();
        let mut cloth = ClothSimulation::new(ClothConfig { width: 4, height: 3, ..ClothConfig::default() });

        h.encode(Drawable::Cloth(&ClothMesh { cloth: &cloth, color: Vec3::ONE, texture: None })).unwrap();
        assert!(h
            .commands
            .commands()
            .contains(&Command::DrawIndexed { index_count: 3 * 2 * 6, first_index: 0, base_vertex: 0 }));

        cloth.step(1.0);
        h.encode(Drawable::Cloth(&ClothMesh { cloth: &cloth, color: Vec3::ONE, texture: None })).unwrap();

        let (vertex, _) = h.last_buffers();
        let (buffer, offset) = vertex.unwrap();
        let v = h.staged::<PcuVertex>(buffer, offset, 12);
        for (vertex, particle) in v.iter().zip(cloth.particles()) {
            assert_eq!(vertex.position, particle.position.to_array());
        }
        // row 2, col 1
        assert_relative_eq!(v[9].uv[0], 1.0 / 3.0);
        assert_relative_eq!(v[9].uv[1], 1.0);
    }

    #[test]
    fn uvs_span_unit_square() {
        let mut h = Harness::new();
        let cloth = ClothSimulation::new(ClothConfig { width: 4, height: 4, ..ClothConfig::default() });
        h.encode(Drawable::Cloth(&ClothMesh { cloth: &cloth, color: Vec3::ONE, texture: None })).unwrap();

        let (vertex, _) = h.last_buffers();
        let (buffer, offset) = vertex.unwrap();
        let v = h.staged::<PcuVertex>(buffer, offset, 16);
        assert_eq!(v[0].uv, [0.0, 0.0]);
        assert_eq!(v[15].uv, [1.0, 1.0]);
    }
}
