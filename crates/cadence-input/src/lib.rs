//! Input handling for the Cadence engine.
//!
//! Window and device events from winit are translated into [`InputEvent`]s:
//! a source (key, mouse button or axis), a port index, a repeat flag and a
//! float magnitude. Events are broadcast to every callback registered with an
//! [`InputDispatcher`]; [`ButtonTracker`] folds them into per-frame button
//! state for polling-style game code.
//!
//! ```ignore
//! let mut dispatcher = InputDispatcher::new();
//! let id = dispatcher.register(|event| {
//!     if event.source == InputSource::Key(KeyCode::Escape) && event.is_pressed() {
//!         // ...
//!     }
//! });
//!
//! // In the window event handler
//! for event in translator.translate_window_event(&event) {
//!     dispatcher.dispatch(&event);
//! }
//! ```

mod dispatcher;
mod event;
mod tracker;
mod translate;

pub use dispatcher::{InputDispatcher, ListenerId};
pub use event::{Axis, InputEvent, InputSource, Modifiers, MouseButton, PRESS_THRESHOLD};
pub use tracker::{ButtonState, ButtonTracker};
pub use translate::{InputTranslator, PIXELS_PER_LINE};

pub use winit::keyboard::KeyCode;
