//! winit event translation.

use winit::event::{DeviceEvent, ElementState, MouseScrollDelta, WindowEvent};
use winit::keyboard::PhysicalKey;

use crate::event::{Axis, InputEvent, InputSource, Modifiers, MouseButton};

/// Pixel scroll distance treated as one line.
pub const PIXELS_PER_LINE: f64 = 100.0;

/// Turns winit events into [`InputEvent`]s, stamping the current modifiers.
#[derive(Debug, Default)]
pub struct InputTranslator {
    modifiers: Modifiers,
}

impl InputTranslator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Events for one window event. Most produce none or one; cursor motion
    /// and two-axis scrolling produce two.
    pub fn translate_window_event(&mut self, event: &WindowEvent) -> Vec<InputEvent> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => self
                .key(event.physical_key, event.state, event.repeat)
                .into_iter()
                .collect(),
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = Modifiers::from(modifiers.state());
                Vec::new()
            }
            WindowEvent::MouseInput { button, state, .. } => {
                vec![self.mouse_button(MouseButton::from(*button), *state)]
            }
            WindowEvent::CursorMoved { position, .. } => self.cursor(position.x, position.y),
            WindowEvent::MouseWheel { delta, .. } => self.wheel(*delta),
            // Modifier releases are not delivered while unfocused.
            WindowEvent::Focused(false) => {
                self.modifiers = Modifiers::empty();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Events for raw device input.
    pub fn translate_device_event(&self, event: &DeviceEvent) -> Vec<InputEvent> {
        match event {
            DeviceEvent::MouseMotion { delta } => self.pair(
                (Axis::MouseDeltaX, delta.0),
                (Axis::MouseDeltaY, delta.1),
            ),
            _ => Vec::new(),
        }
    }

    /// A physical key transition. Keys winit cannot identify are dropped.
    #[must_use]
    pub fn key(&self, key: PhysicalKey, state: ElementState, repeat: bool) -> Option<InputEvent> {
        let PhysicalKey::Code(code) = key else {
            tracing::trace!("Ignoring unidentified key {:?}", key);
            return None;
        };
        Some(
            InputEvent::button(InputSource::Key(code), state.is_pressed(), repeat)
                .with_modifiers(self.modifiers),
        )
    }

    #[must_use]
    pub fn mouse_button(&self, button: MouseButton, state: ElementState) -> InputEvent {
        InputEvent::button(InputSource::MouseButton(button), state.is_pressed(), false)
            .with_modifiers(self.modifiers)
    }

    #[must_use]
    pub fn cursor(&self, x: f64, y: f64) -> Vec<InputEvent> {
        self.pair((Axis::CursorX, x), (Axis::CursorY, y))
    }

    /// Scroll in lines; zero axes are omitted.
    #[must_use]
    pub fn wheel(&self, delta: MouseScrollDelta) -> Vec<InputEvent> {
        let (x, y) = match delta {
            MouseScrollDelta::LineDelta(x, y) => (f64::from(x), f64::from(y)),
            MouseScrollDelta::PixelDelta(pos) => (pos.x / PIXELS_PER_LINE, pos.y / PIXELS_PER_LINE),
        };
        [(Axis::WheelX, x), (Axis::WheelY, y)]
            .into_iter()
            .filter(|(_, value)| *value != 0.0)
            .map(|(axis, value)| InputEvent::axis(axis, value as f32).with_modifiers(self.modifiers))
            .collect()
    }

    fn pair(&self, first: (Axis, f64), second: (Axis, f64)) -> Vec<InputEvent> {
        vec![
            InputEvent::axis(first.0, first.1 as f32).with_modifiers(self.modifiers),
            InputEvent::axis(second.0, second.1 as f32).with_modifiers(self.modifiers),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use winit::dpi::PhysicalPosition;
    use winit::keyboard::{KeyCode, NativeKeyCode};

    #[test]
    fn key_press_and_repeat() {
        let translator = InputTranslator::new();
        let event = translator
            .key(PhysicalKey::Code(KeyCode::KeyW), ElementState::Pressed, true)
            .unwrap();
        assert_eq!(event.source, InputSource::Key(KeyCode::KeyW));
        assert!(event.repeat);
        assert!(event.is_pressed());

        let release = translator
            .key(PhysicalKey::Code(KeyCode::KeyW), ElementState::Released, false)
            .unwrap();
        assert!(!release.is_pressed());
    }

    #[test]
    fn unidentified_keys_are_dropped() {
        let translator = InputTranslator::new();
        let key = PhysicalKey::Unidentified(NativeKeyCode::Unidentified);
        assert!(translator.key(key, ElementState::Pressed, false).is_none());
    }

    #[test]
    fn pixel_scroll_converts_to_lines() {
        let translator = InputTranslator::new();
        let events = translator.wheel(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 250.0)));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, InputSource::Axis(Axis::WheelY));
        assert_relative_eq!(events[0].value, 2.5);
    }

    #[test]
    fn cursor_reports_both_axes() {
        let translator = InputTranslator::new();
        let events = translator.cursor(12.0, 34.0);
        assert_eq!(events[0].source, InputSource::Axis(Axis::CursorX));
        assert_relative_eq!(events[1].value, 34.0);
    }

    #[test]
    fn focus_loss_clears_modifiers() {
        let mut translator = InputTranslator::new();
        translator.modifiers = Modifiers::CTRL;
        let events = translator.translate_window_event(&WindowEvent::Focused(false));
        assert!(events.is_empty());
        assert!(translator.modifiers().is_empty());
    }
}
