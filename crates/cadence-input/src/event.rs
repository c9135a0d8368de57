//! Engine input events.

use bitflags::bitflags;
use winit::event::MouseButton as WinitMouseButton;
use winit::keyboard::{KeyCode, ModifiersState};

/// Magnitude at or above which a button event counts as a press.
pub const PRESS_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    Other(u16),
}

impl From<WinitMouseButton> for MouseButton {
    fn from(button: WinitMouseButton) -> Self {
        match button {
            WinitMouseButton::Left => Self::Left,
            WinitMouseButton::Right => Self::Right,
            WinitMouseButton::Middle => Self::Middle,
            WinitMouseButton::Back => Self::Back,
            WinitMouseButton::Forward => Self::Forward,
            WinitMouseButton::Other(id) => Self::Other(id),
        }
    }
}

/// Continuous inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Cursor position in window pixels.
    CursorX,
    CursorY,
    /// Raw mouse motion since the last event.
    MouseDeltaX,
    MouseDeltaY,
    /// Scroll in lines.
    WheelX,
    WheelY,
}

/// What produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    Key(KeyCode),
    MouseButton(MouseButton),
    Axis(Axis),
}

impl InputSource {
    /// Keys and mouse buttons; axes are not buttons.
    #[must_use]
    pub const fn is_button(self) -> bool {
        !matches!(self, Self::Axis(_))
    }
}

bitflags! {
    /// Modifier keys held when an event was produced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0000_0001;
        const CTRL  = 0b0000_0010;
        const ALT   = 0b0000_0100;
        const SUPER = 0b0000_1000;
    }
}

impl From<ModifiersState> for Modifiers {
    fn from(state: ModifiersState) -> Self {
        let mut modifiers = Self::empty();
        modifiers.set(Self::SHIFT, state.shift_key());
        modifiers.set(Self::CTRL, state.control_key());
        modifiers.set(Self::ALT, state.alt_key());
        modifiers.set(Self::SUPER, state.super_key());
        modifiers
    }
}

/// One discrete input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    pub source: InputSource,
    /// Device index; keyboard and mouse are always port 0.
    pub port: u32,
    /// Key auto-repeat.
    pub repeat: bool,
    /// 1.0/0.0 for buttons, the axis value otherwise.
    pub value: f32,
    pub modifiers: Modifiers,
}

impl InputEvent {
    #[must_use]
    pub fn button(source: InputSource, pressed: bool, repeat: bool) -> Self {
        Self {
            source,
            port: 0,
            repeat,
            value: if pressed { 1.0 } else { 0.0 },
            modifiers: Modifiers::empty(),
        }
    }

    #[must_use]
    pub fn axis(axis: Axis, value: f32) -> Self {
        Self {
            source: InputSource::Axis(axis),
            port: 0,
            repeat: false,
            value,
            modifiers: Modifiers::empty(),
        }
    }

    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    #[must_use]
    pub fn is_pressed(&self) -> bool {
        self.value >= PRESS_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_events_carry_unit_magnitude() {
        let down = InputEvent::button(InputSource::Key(KeyCode::Space), true, false);
        let up = InputEvent::button(InputSource::Key(KeyCode::Space), false, false);
        assert!(down.is_pressed());
        assert!(!up.is_pressed());
        assert_eq!(down.port, 0);
    }

    #[test]
    fn modifiers_from_winit_state() {
        let mods = Modifiers::from(ModifiersState::SHIFT | ModifiersState::SUPER);
        assert_eq!(mods, Modifiers::SHIFT | Modifiers::SUPER);
        assert!(Modifiers::from(ModifiersState::empty()).is_empty());
    }

    #[test]
    fn axes_are_not_buttons() {
        assert!(InputSource::MouseButton(MouseButton::Left).is_button());
        assert!(!InputSource::Axis(Axis::WheelY).is_button());
    }
}
