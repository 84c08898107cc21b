use crate::device::{GpuDevice, PipelineKind};
use crate::error::{RenderError, Result};
use crate::model::{Model, NodeId};

use super::uniform::{MaterialUniform, ModelUniform};
use super::Encoder;

/// Pre-order walk of the node forest. Each mesh node gets its accumulated
/// matrix written into this frame's skin slot, then one indexed draw per
/// non-empty primitive.
pub(super) fn encode<D: GpuDevice + ?Sized>(enc: &mut Encoder<'_, D>, model: &mut Model) -> Result<()> {
    let frames = model.skins.len();
    if frames == 0 {
        return Err(RenderError::invalid("model has no skin frames"));
    }
    let frame = enc.frame_index % frames;
    let implicit = model.implicit_skin();

    let Model {
        nodes,
        roots,
        meshes,
        materials,
        textures,
        vertex_buffer,
        index_buffer,
        skins,
        transform,
        light,
    } = model;
    let skins = &mut skins[frame];
    let touched = &mut enc.scratch.skins_touched;
    touched.clear();
    touched.resize(skins.len(), false);
    let mut bound = false;

    let mut stack: Vec<NodeId> = roots.iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        let node = &nodes[id];
        stack.extend(node.children.iter().rev());

        let Some(mesh) = node.mesh else {
            continue;
        };

        let mut matrix = node.local;
        let mut parent = node.parent;
        while let Some(p) = parent {
            matrix = nodes[p].local * matrix;
            parent = nodes[p].parent;
        }

        let skin_id = node.skin.unwrap_or(implicit);
        let skin = &mut skins[skin_id];
        skin.matrices[id] = matrix;
        touched[skin_id] = true;
        let skin_binding = skin.binding;

        for primitive in meshes[mesh].primitives.iter().filter(|p| p.index_count > 0) {
            let material = primitive.material.map(|m| materials[m]).unwrap_or_default();
            let texture = |t: Option<usize>| t.map_or(enc.fallback, |t| textures[t].binding());
            let base_color = texture(material.base_color);
            let normal = texture(material.normal);

            let camera = enc.camera;
            let uniforms = &mut enc.heaps.uniform;
            let model_uniform = uniforms.push_uniform(
                &mut *enc.device,
                &ModelUniform::new(camera.projection, camera.view, *transform, *light, id as u32),
            )?;
            let material_uniform = uniforms.push_uniform(
                &mut *enc.device,
                &MaterialUniform {
                    base_color_factor: material.base_color_factor.to_array(),
                    alpha_cutoff: material.alpha_cutoff,
                    alpha_mask: material.alpha_mask as u32,
                    _pad: [0; 2],
                },
            )?;

            if !bound {
                enc.commands.bind_pipeline(PipelineKind::Model);
                enc.commands.bind_vertex_buffer(*vertex_buffer, 0);
                enc.commands.bind_index_buffer(*index_buffer, 0);
                bound = true;
            }

            enc.commands.bind_groups(
                0,
                &[
                    model_uniform.bindings.model,
                    base_color,
                    normal,
                    skin_binding,
                    material_uniform.bindings.material,
                ],
                &[model_uniform.dynamic_offset(), material_uniform.dynamic_offset()],
            );
            enc.commands.draw_indexed(primitive.index_count, primitive.first_index, 0);
        }
    }

    for (skin, _) in skins.iter().zip(touched.iter()).filter(|(_, t)| **t) {
        skin.upload(&mut *enc.device)?;
    }
    Ok(())
}
