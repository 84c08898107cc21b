//! Platform-agnostic pointer input.
//!
//! The platform layer translates its own events into [`PointerEvent`]s;
//! controllers such as [`ClothDrag`] consume them.

mod drag;
mod types;

pub use drag::ClothDrag;
pub use types::{MouseButton, MouseButtonState, PointerEvent, PointerState};
