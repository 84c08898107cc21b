use crate::device::{Command, CommandList, PipelineKind};
use crate::error::DeviceError;

use super::device::WgpuDevice;

/// Render pipelines by [`PipelineKind`], supplied by the user.
#[derive(Default)]
pub struct PipelineTable {
    pipelines: [Option<wgpu::RenderPipeline>; PipelineKind::ALL.len()],
}

impl PipelineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pipeline` for `kind`, returning the one it replaces.
    pub fn insert(&mut self, kind: PipelineKind, pipeline: wgpu::RenderPipeline) -> Option<wgpu::RenderPipeline> {
        self.pipelines[kind.index()].replace(pipeline)
    }

    #[inline]
    pub fn get(&self, kind: PipelineKind) -> Option<&wgpu::RenderPipeline> {
        self.pipelines[kind.index()].as_ref()
    }

    /// Kinds without a pipeline; drawing any of them fails the replay.
    pub fn missing(&self) -> Vec<PipelineKind> {
        PipelineKind::ALL.into_iter().filter(|k| self.get(*k).is_none()).collect()
    }
}

/// Target for one replayed frame (color view plus optional depth).
pub struct RenderTarget<'a> {
    pub color: &'a wgpu::TextureView,
    pub depth: Option<&'a wgpu::TextureView>,
    pub clear_color: wgpu::Color,
}

impl WgpuDevice {
    /// Records `commands` into a new render pass over `target` and submits it.
    ///
    /// Frame heaps must have been flushed (`Renderer::end_frame`) first.
    pub fn render(&self, target: &RenderTarget<'_>, commands: &CommandList, pipelines: &PipelineTable) -> Result<(), DeviceError> {
        let mut encoder = self.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("strix frame encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("strix frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.color,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(target.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: target.depth.map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            replay(self, &mut pass, commands, pipelines)?;
        }

        self.queue().submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

/// Replays a recorded command list into `pass`.
///
/// Fails on a handle the device does not know, a pipeline kind missing from
/// `pipelines`, or dynamic offsets that do not match the bound sets.
pub fn replay(
    device: &WgpuDevice,
    pass: &mut wgpu::RenderPass<'_>,
    commands: &CommandList,
    pipelines: &PipelineTable,
) -> Result<(), DeviceError> {
    for command in commands.commands() {
        match *command {
            Command::BindPipeline(kind) => {
                let pipeline = pipelines
                    .get(kind)
                    .ok_or_else(|| DeviceError::Unsupported(format!("no pipeline registered for {kind:?}")))?;
                pass.set_pipeline(pipeline);
            }
            Command::BindVertexBuffer { buffer, offset } => {
                let buffer = device.buffer(buffer).ok_or(DeviceError::UnknownHandle("buffer"))?;
                pass.set_vertex_buffer(0, buffer.slice(offset..));
            }
            Command::BindIndexBuffer { buffer, offset } => {
                let buffer = device.buffer(buffer).ok_or(DeviceError::UnknownHandle("buffer"))?;
                pass.set_index_buffer(buffer.slice(offset..), wgpu::IndexFormat::Uint32);
            }
            Command::BindGroups { first, sets, dynamic_offsets } => {
                let offsets = commands.dynamic_offsets(dynamic_offsets);
                let mut cursor = 0;
                for (slot, id) in commands.sets(sets).iter().enumerate() {
                    let binding = device.binding(*id).ok_or(DeviceError::UnknownHandle("binding"))?;
                    let taken = take_offsets(offsets, &mut cursor, binding.dynamic_offsets)?;
                    pass.set_bind_group(first + slot as u32, &binding.group, taken);
                }
                if cursor != offsets.len() {
                    return Err(offset_mismatch(offsets.len(), cursor));
                }
            }
            Command::DrawIndexed { index_count, first_index, base_vertex } => {
                pass.draw_indexed(first_index..first_index + index_count, base_vertex, 0..1);
            }
            Command::Draw { vertex_count, first_vertex } => {
                pass.draw(first_vertex..first_vertex + vertex_count, 0..1);
            }
        }
    }
    Ok(())
}

/// Next `count` offsets of a `BindGroups` command.
fn take_offsets<'o>(offsets: &'o [u32], cursor: &mut usize, count: usize) -> Result<&'o [u32], DeviceError> {
    let end = *cursor + count;
    let taken = offsets.get(*cursor..end).ok_or_else(|| offset_mismatch(offsets.len(), end))?;
    *cursor = end;
    Ok(taken)
}

fn offset_mismatch(recorded: usize, consumed: usize) -> DeviceError {
    DeviceError::Unsupported(format!(
        "bound sets take {consumed} dynamic offsets, {recorded} recorded"
    ))
}
