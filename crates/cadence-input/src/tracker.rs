//! Per-frame button state built from input events.

use hashbrown::HashMap;

use crate::event::{Axis, InputEvent, InputSource};

/// Press/release state with single-frame edges.
///
/// ```text
/// Released -press-> JustPressed -end_frame-> Pressed
///     ^                                        |
///     +--end_frame-- JustReleased <-release----+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonState {
    JustPressed,
    Pressed,
    JustReleased,
    #[default]
    Released,
}

impl ButtonState {
    #[inline]
    #[must_use]
    pub const fn is_down(self) -> bool {
        matches!(self, Self::JustPressed | Self::Pressed)
    }

    /// Apply a press (`true`) or release. Repeated presses keep the state.
    pub fn apply(&mut self, pressed: bool) {
        *self = match (pressed, self.is_down()) {
            (true, false) => Self::JustPressed,
            (false, true) => Self::JustReleased,
            _ => *self,
        };
    }

    pub fn end_frame(&mut self) {
        *self = match *self {
            Self::JustPressed => Self::Pressed,
            Self::JustReleased => Self::Released,
            state => state,
        };
    }
}

/// Folds [`InputEvent`]s into queryable state. Call [`Self::end_frame`] once
/// per frame after the game has read it.
#[derive(Debug, Default)]
pub struct ButtonTracker {
    buttons: HashMap<InputSource, ButtonState>,
    axes: HashMap<Axis, f32>,
}

impl ButtonTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: &InputEvent) {
        match event.source {
            InputSource::Axis(axis) => {
                let value = self.axes.entry(axis).or_default();
                if is_relative(axis) {
                    *value += event.value;
                } else {
                    *value = event.value;
                }
            }
            source => self
                .buttons
                .entry(source)
                .or_default()
                .apply(event.is_pressed()),
        }
    }

    #[must_use]
    pub fn state(&self, source: InputSource) -> ButtonState {
        self.buttons.get(&source).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_down(&self, source: InputSource) -> bool {
        self.state(source).is_down()
    }

    #[must_use]
    pub fn just_pressed(&self, source: InputSource) -> bool {
        self.state(source) == ButtonState::JustPressed
    }

    #[must_use]
    pub fn just_released(&self, source: InputSource) -> bool {
        self.state(source) == ButtonState::JustReleased
    }

    /// Latest absolute value, or the sum this frame for relative axes.
    #[must_use]
    pub fn axis(&self, axis: Axis) -> f32 {
        self.axes.get(&axis).copied().unwrap_or_default()
    }

    /// Settle edges and reset relative axes.
    pub fn end_frame(&mut self) {
        for state in self.buttons.values_mut() {
            state.end_frame();
        }
        for (axis, value) in &mut self.axes {
            if is_relative(*axis) {
                *value = 0.0;
            }
        }
    }

    /// Release everything, e.g. after focus loss.
    pub fn clear(&mut self) {
        self.buttons.clear();
        self.axes.clear();
    }
}

const fn is_relative(axis: Axis) -> bool {
    !matches!(axis, Axis::CursorX | Axis::CursorY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MouseButton;
    use approx::assert_relative_eq;
    use winit::keyboard::KeyCode;

    const SPACE: InputSource = InputSource::Key(KeyCode::Space);

    #[test]
    fn state_transitions() {
        let mut state = ButtonState::Released;
        state.apply(true);
        assert_eq!(state, ButtonState::JustPressed);
        state.apply(true);
        assert_eq!(state, ButtonState::JustPressed);
        state.end_frame();
        assert_eq!(state, ButtonState::Pressed);
        state.apply(false);
        assert_eq!(state, ButtonState::JustReleased);
        state.end_frame();
        assert_eq!(state, ButtonState::Released);
        state.apply(false);
        assert_eq!(state, ButtonState::Released);
    }

    #[test]
    fn tracks_edges_across_frames() {
        let mut tracker = ButtonTracker::new();
        tracker.handle(&InputEvent::button(SPACE, true, false));
        assert!(tracker.just_pressed(SPACE));

        tracker.end_frame();
        tracker.handle(&InputEvent::button(SPACE, true, true));
        assert!(tracker.is_down(SPACE));
        assert!(!tracker.just_pressed(SPACE));

        tracker.handle(&InputEvent::button(SPACE, false, false));
        assert!(tracker.just_released(SPACE));
        assert!(!tracker.is_down(InputSource::MouseButton(MouseButton::Left)));
    }

    #[test]
    fn relative_axes_sum_and_reset() {
        let mut tracker = ButtonTracker::new();
        tracker.handle(&InputEvent::axis(Axis::MouseDeltaX, 2.0));
        tracker.handle(&InputEvent::axis(Axis::MouseDeltaX, 3.0));
        tracker.handle(&InputEvent::axis(Axis::CursorX, 10.0));
        tracker.handle(&InputEvent::axis(Axis::CursorX, 40.0));
        assert_relative_eq!(tracker.axis(Axis::MouseDeltaX), 5.0);
        assert_relative_eq!(tracker.axis(Axis::CursorX), 40.0);

        tracker.end_frame();
        assert_relative_eq!(tracker.axis(Axis::MouseDeltaX), 0.0);
        assert_relative_eq!(tracker.axis(Axis::CursorX), 40.0);
    }
}
