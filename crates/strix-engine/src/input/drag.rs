use glam::{Vec2, Vec4};
use strix_sim::ClothSimulation;

use crate::config::Viewport;

use super::types::{MouseButton, MouseButtonState, PointerEvent};

/// Drags cloth particles with the left mouse button.
///
/// Press picks the particle nearest the pointer, motion while held moves it,
/// release lets go. Pointer coordinates are mapped into the cloth's local
/// plane through the inverse of `cloth.model` (a Y flip by default), assuming
/// the cloth is drawn with an identity camera.
#[derive(Debug, Default)]
pub struct ClothDrag {
    pointer: Option<Vec2>,
    grabbed: Option<usize>,
}

impl ClothDrag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Particle currently held, if any.
    #[inline]
    pub fn grabbed(&self) -> Option<usize> {
        self.grabbed
    }

    pub fn handle(&mut self, cloth: &mut ClothSimulation, viewport: Viewport, event: PointerEvent) {
        match event {
            PointerEvent::Moved { x, y } => {
                let point = to_cloth_plane(cloth, viewport, x, y);
                self.pointer = Some(point);
                if let Some(id) = self.grabbed {
                    // pinned particles stay put; the grab is kept so the
                    // pointer cannot pick up a different particle mid-drag
                    cloth.set_particle_position(id, point);
                }
            }
            PointerEvent::Button { button: MouseButton::Left, state: MouseButtonState::Pressed } => {
                if let Some(point) = self.pointer {
                    let id = cloth.select_nearest(point);
                    log::debug!("cloth drag: grabbed particle {id}");
                    self.grabbed = Some(id);
                    cloth.set_particle_position(id, point);
                }
            }
            PointerEvent::Button { button: MouseButton::Left, state: MouseButtonState::Released }
            | PointerEvent::Left => {
                self.grabbed = None;
            }
            PointerEvent::Button { .. } => {}
        }
    }
}

/// Pixels (top-left origin, +Y down) to the cloth's local XY plane.
fn to_cloth_plane(cloth: &ClothSimulation, viewport: Viewport, x: f32, y: f32) -> Vec2 {
    let (w, h) = viewport.size_f32();
    let ndc = Vec4::new(x / w * 2.0 - 1.0, 1.0 - y / h * 2.0, 0.0, 1.0);
    let local = cloth.model.inverse() * ndc;
    if local.w.abs() > f32::EPSILON {
        local.truncate().truncate() / local.w
    } else {
        local.truncate().truncate()
    }
}
