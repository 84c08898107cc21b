//! Drawables with fixed geometry: skybox cube and grid overlay.

use glam::Mat4;

use crate::device::{GpuDevice, PipelineKind};
use crate::error::Result;
use crate::texture::Skybox;

use super::uniform::PvmUniform;
use super::vertex::PVertex;
use super::Encoder;

/// Six faces, two triangles each, over the corners of [`skybox_vertices`].
#[rustfmt::skip]
pub const SKYBOX_INDICES: [u32; 36] = [
    2, 3, 1, 1, 0, 2,
    3, 7, 5, 5, 1, 3,
    6, 2, 0, 0, 4, 6,
    7, 6, 4, 4, 5, 7,
    3, 2, 6, 6, 7, 3,
    4, 0, 1, 1, 5, 4,
];

/// Vertices the grid shader generates from `vertex_index` alone.
pub const GRID_VERTEX_COUNT: u32 = 12;

/// Unit cube corners; bit 0 of the index selects +X, bit 1 +Y, bit 2 +Z.
pub fn skybox_vertices() -> [PVertex; 8] {
    std::array::from_fn(|i| {
        let axis = |bit: usize| if i & (1 << bit) != 0 { 1.0 } else { -1.0 };
        PVertex { position: [axis(0), axis(1), axis(2)] }
    })
}

pub(super) fn encode_skybox<D: GpuDevice + ?Sized>(enc: &mut Encoder<'_, D>, skybox: &Skybox) -> Result<()> {
    let pvm = PvmUniform::new(enc.camera.projection, enc.camera.rotation_only_view(), Mat4::IDENTITY);
    let vertices = enc.push_vertices(&skybox_vertices())?;
    let indices = enc.push_indices(&SKYBOX_INDICES)?;
    let uniform = enc.push_uniform(&pvm)?;

    enc.commands.bind_pipeline(PipelineKind::Skybox);
    enc.commands.bind_vertex_buffer(vertices.buffer, vertices.offset);
    enc.commands.bind_index_buffer(indices.buffer, indices.offset);
    enc.commands
        .bind_groups(0, &[uniform.bindings.common, skybox.binding()], &[uniform.dynamic_offset()]);
    enc.commands.draw_indexed(SKYBOX_INDICES.len() as u32, 0, 0);
    Ok(())
}

pub(super) fn encode_grid<D: GpuDevice + ?Sized>(enc: &mut Encoder<'_, D>) -> Result<()> {
    let pvm = PvmUniform::new(enc.camera.projection, enc.camera.view, Mat4::IDENTITY);
    let uniform = enc.push_uniform(&pvm)?;

    enc.commands.bind_pipeline(PipelineKind::Grid);
    enc.commands
        .bind_groups(0, &[uniform.bindings.common], &[uniform.dynamic_offset()]);
    enc.commands.draw(GRID_VERTEX_COUNT, 0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Command;
    use crate::draw::tests::Harness;
    use crate::draw::Drawable;
    use crate::heap::StagingHeap;
    use crate::texture::tests::MapDecoder;
    use glam::Vec3;
    use std::path::Path;

    #[test]
    fn every_skybox_face_is_planar() {
        let v = skybox_vertices();
        for face in SKYBOX_INDICES.chunks(6) {
            // the four distinct corners of a face share one coordinate
            let corner = |i: u32| v[i as usize].position;
            let shared = (0..3).any(|axis| face.iter().all(|&i| corner(i)[axis] == corner(face[0])[axis]));
            assert!(shared, "face {face:?} is not axis aligned");
        }
    }

    #[test]
    fn skybox_strips_translation() {
        let mut h = Harness::new();
        h.camera.look_at(Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO);
        let mut staging = StagingHeap::new(&mut h.device, 64).unwrap();
        let skybox = Skybox::load(&mut h.device, &mut staging, &MapDecoder::with_cube("sky", 1), Path::new("sky")).unwrap();

        h.encode(Drawable::Skybox(&skybox)).unwrap();

        assert!(h
            .commands
            .commands()
            .contains(&Command::DrawIndexed { index_count: 36, first_index: 0, base_vertex: 0 }));
        let Command::BindGroups { sets, dynamic_offsets, .. } = h.commands.commands()[3] else {
            panic!("expected descriptor sets");
        };
        assert_eq!(h.commands.sets(sets)[1], skybox.binding());

        let offset = h.commands.dynamic_offsets(dynamic_offsets)[0] as u64;
        let buffer = h.heaps.uniform.buffer();
        let uniform = h.staged::<PvmUniform>(buffer, offset, 1)[0];
        assert_eq!(uniform.view[3], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(uniform.model, PvmUniform::default().model);
    }

    #[test]
    fn grid_draws_without_vertex_buffers() {
        let mut h = Harness::new();
        h.encode(Drawable::Grid).unwrap();

        let cmds = h.commands.commands();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0], Command::BindPipeline(PipelineKind::Grid));
        assert_eq!(cmds[2], Command::Draw { vertex_count: 12, first_vertex: 0 });
        assert_eq!(h.heaps.vertex.used(), 0);
        assert_eq!(h.heaps.index.used(), 0);
    }
}
