//! wgpu backend.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue (headless or with a surface)
//! - mapping engine handles onto wgpu buffers, textures and bind groups
//! - replaying a recorded [`CommandList`](crate::device::CommandList) into a render pass
//! - surface configuration and surface error handling
//!
//! Pipelines are created by the user against [`BindingLayouts`] and the vertex
//! layouts in [`draw::vertex`](crate::draw::vertex), then registered in a
//! [`PipelineTable`].

mod convert;
mod device;
mod init;
mod replay;
mod surface;

pub use device::{BindingLayouts, WgpuDevice};
pub use init::WgpuInit;
pub use replay::{replay, PipelineTable, RenderTarget};
pub use surface::{SurfaceErrorAction, WgpuSurface};
