//! Strix engine crate.
//!
//! Owns the per-frame GPU submission path:
//! - `heap`: frame ring heaps (vertex / index / uniform) and the staging heap
//! - `device`: the narrow device seam plus a CPU-backed implementation
//! - `texture`, `text`, `model`: resources built through the staging heap
//! - `draw`: one encoder per drawable kind, all funnelled through [`Renderer::submit`]
//! - `backend::wgpu`: the wgpu implementation of the device seam
//! - `input`, `time`, `logging`: pointer handling, frame timing and log setup

pub mod backend;
pub mod camera;
pub mod config;
pub mod device;
pub mod draw;
pub mod error;
pub mod heap;
pub mod input;
pub mod logging;
pub mod model;
pub mod text;
pub mod texture;
pub mod time;

mod renderer;

pub use camera::Camera;
pub use config::{RendererConfig, Viewport};
pub use error::{DeviceError, RenderError, Result};
pub use renderer::{FrameOutcome, Renderer};

pub use strix_sim as sim;
