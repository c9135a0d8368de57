//! Application context.

use std::sync::Arc;

use cadence_audio::AudioSystem;
use cadence_gpu::{GraphicsBackend, SurfaceId};
use cadence_input::{ButtonTracker, InputDispatcher};
use winit::window::Window;

/// State shared with every [`Game`](crate::Game) callback.
pub struct AppContext {
    /// The graphics backend chosen at startup.
    pub graphics: Box<dyn GraphicsBackend>,
    /// Main presentation surface.
    pub surface: Option<SurfaceId>,
    /// Input callbacks; every event is broadcast here first.
    pub input: InputDispatcher,
    /// Polled button and axis state, settled at the end of each frame.
    pub buttons: ButtonTracker,
    pub audio: AudioSystem,
    /// `None` for headless runs.
    pub window: Option<Arc<Window>>,
    frame_count: u64,
    elapsed: f64,
    exit_requested: bool,
}

impl AppContext {
    pub fn new(
        graphics: Box<dyn GraphicsBackend>,
        surface: Option<SurfaceId>,
        audio: AudioSystem,
        window: Option<Arc<Window>>,
    ) -> Self {
        Self {
            graphics,
            surface,
            input: InputDispatcher::new(),
            buttons: ButtonTracker::new(),
            audio,
            window,
            frame_count: 0,
            elapsed: 0.0,
            exit_requested: false,
        }
    }

    /// Frames completed so far, including skipped ones.
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Wall-clock seconds accumulated by the loop.
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Leave the loop after the current frame.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub const fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Width over height of the main surface, `1.0` without one.
    pub fn aspect_ratio(&self) -> f32 {
        self.surface
            .and_then(|id| self.graphics.surface_info(id).ok())
            .map_or(1.0, |info| info.width as f32 / info.height.max(1) as f32)
    }

    pub(crate) fn advance(&mut self, dt: f64) {
        self.frame_count += 1;
        self.elapsed += dt;
    }

    /// Wait for the GPU to finish everything submitted so far.
    pub(crate) fn flush(&mut self) {
        if let Err(e) = self.graphics.flush() {
            tracing::error!("Failed to flush GPU work: {e}");
        }
    }

    /// Release the surface, the backend and the audio device.
    pub(crate) fn shutdown(&mut self) {
        if let Some(surface) = self.surface.take() {
            if let Err(e) = self.graphics.destroy_surface(surface) {
                tracing::warn!("Failed to destroy surface: {e}");
            }
        }
        if let Err(e) = self.graphics.shutdown() {
            tracing::error!("Graphics shutdown failed: {e}");
        }
        self.audio.shutdown();
    }
}
