//! Strix simulation crate.
//!
//! CPU integrators whose per-frame state is read back by the renderer:
//! - [`cloth`]: mass-spring Verlet cloth over a fixed 4-neighbour particle grid
//! - [`fluid`]: grid advection of velocity and dye with a pressure projection

pub mod cloth;
pub mod fluid;

pub use cloth::{ClothConfig, ClothParticle, ClothSimulation, Link, CLOTH_Y_FLIP};
pub use fluid::{FluidConfig, FluidSimulation};
