/// Mouse button identifier.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MouseButtonState {
    Pressed,
    Released,
}

/// Pointer event in physical pixels, origin top-left, +Y down.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PointerEvent {
    Moved { x: f32, y: f32 },
    Button { button: MouseButton, state: MouseButtonState },
    /// Pointer left the window.
    Left,
}

/// Current pointer position and held buttons.
#[derive(Debug, Clone, Default)]
pub struct PointerState {
    pub position: Option<(f32, f32)>,
    buttons_down: Vec<MouseButton>,
}

impl PointerState {
    pub fn apply(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Moved { x, y } => self.position = Some((x, y)),
            PointerEvent::Button { button, state: MouseButtonState::Pressed } => {
                if !self.buttons_down.contains(&button) {
                    self.buttons_down.push(button);
                }
            }
            PointerEvent::Button { button, state: MouseButtonState::Released } => {
                self.buttons_down.retain(|b| *b != button);
            }
            PointerEvent::Left => {
                // Releases outside the window are never delivered.
                self.position = None;
                self.buttons_down.clear();
            }
        }
    }

    #[inline]
    pub fn is_down(&self, button: MouseButton) -> bool {
        self.buttons_down.contains(&button)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_release_and_leave() {
        let mut state = PointerState::default();
        state.apply(PointerEvent::Moved { x: 1.0, y: 2.0 });
        state.apply(PointerEvent::Button { button: MouseButton::Left, state: MouseButtonState::Pressed });
        state.apply(PointerEvent::Button { button: MouseButton::Left, state: MouseButtonState::Pressed });
        assert!(state.is_down(MouseButton::Left));
        assert_eq!(state.position, Some((1.0, 2.0)));

        state.apply(PointerEvent::Button { button: MouseButton::Left, state: MouseButtonState::Released });
        assert!(!state.is_down(MouseButton::Left));

        state.apply(PointerEvent::Button { button: MouseButton::Right, state: MouseButtonState::Pressed });
        state.apply(PointerEvent::Left);
        assert!(!state.is_down(MouseButton::Right));
        assert_eq!(state.position, None);
    }
}
