//! `Game` trait definition.

use cadence_input::InputEvent;

use crate::context::AppContext;
use crate::frame::FrameContext;

/// Trait for Cadence applications.
///
/// The loop calls, once per iteration: [`Game::tick`] with the frame delta,
/// [`Game::fixed_tick`] zero or more times to catch the simulation up, then
/// [`Game::render`] between the backend's `begin_frame` and `end_frame`.
pub trait Game: Sized {
    /// Called once after the window, graphics backend and audio exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Variable-rate update with the wall-clock delta in seconds.
    #[allow(unused_variables)]
    fn tick(&mut self, ctx: &mut AppContext, dt: f64) {}

    /// Fixed-rate simulation step of exactly `step` seconds.
    #[allow(unused_variables)]
    fn fixed_tick(&mut self, ctx: &mut AppContext, step: f64) {}

    /// Record draws for the current frame.
    ///
    /// An error skips the rest of this frame's draws; the frame is still
    /// submitted. Fatal GPU errors end the application.
    #[allow(unused_variables)]
    fn render(&mut self, frame: &mut FrameContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Every input event, after registered dispatcher callbacks ran.
    #[allow(unused_variables)]
    fn on_input(&mut self, ctx: &mut AppContext, event: &InputEvent) {}

    /// The surface was recreated at a new size.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    #[allow(unused_variables)]
    fn on_focus(&mut self, ctx: &mut AppContext, focused: bool) {}

    /// Called before shutdown with the GPU idle.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
