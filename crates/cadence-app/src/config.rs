//! Application configuration.

use std::time::Duration;

use cadence_core::{BackendKind, EngineConfig, FixedStep};
use cadence_gpu::{GpuTimeline, GraphicsConfig};

/// Application configuration.
///
/// Wraps the file-level [`EngineConfig`] with builder methods and the few
/// settings that only make sense in code.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    /// Open an audio output device.
    pub audio: bool,
    /// Simulated GPU behaviour when the headless backend is selected.
    pub headless_timeline: GpuTimeline,
}

impl AppConfig {
    /// Create a new config with the given window title.
    pub fn new(title: impl Into<String>) -> Self {
        let mut config = Self {
            audio: true,
            ..Self::default()
        };
        config.engine.window.title = title.into();
        config
    }

    /// Wrap a loaded engine config.
    pub fn from_engine_config(engine: EngineConfig) -> Self {
        Self {
            engine,
            audio: true,
            headless_timeline: GpuTimeline::default(),
        }
    }

    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.engine.window.width = width;
        self.engine.window.height = height;
        self
    }

    #[must_use]
    pub const fn with_vsync(mut self, vsync: bool) -> Self {
        self.engine.window.vsync = vsync;
        self
    }

    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.engine.graphics.backend = backend;
        self
    }

    #[must_use]
    pub const fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.engine.graphics.frames_in_flight = frames;
        self
    }

    #[must_use]
    pub const fn with_software_adapter(mut self, software: bool) -> Self {
        self.engine.graphics.use_software_adapter = software;
        self
    }

    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.engine.graphics.validation = validation;
        self
    }

    #[must_use]
    pub const fn with_fixed_time_slice(mut self, seconds: f64) -> Self {
        self.engine.timing.fixed_time_slice = seconds;
        self
    }

    /// Per-frame catch-up cap; `None` disables it.
    #[must_use]
    pub fn with_max_fixed_steps(mut self, max: Option<u32>) -> Self {
        self.engine.timing.max_fixed_steps = max.unwrap_or(0);
        self
    }

    #[must_use]
    pub const fn with_target_fps(mut self, fps: u32) -> Self {
        self.engine.timing.target_fps = Some(fps);
        self
    }

    /// Show a modal dialog on fatal errors.
    #[must_use]
    pub const fn with_fatal_dialog(mut self, dialog: bool) -> Self {
        self.engine.window.fatal_dialog = dialog;
        self
    }

    #[must_use]
    pub const fn with_audio(mut self, audio: bool) -> Self {
        self.audio = audio;
        self
    }

    #[must_use]
    pub const fn with_headless_timeline(mut self, timeline: GpuTimeline) -> Self {
        self.headless_timeline = timeline;
        self
    }

    pub fn title(&self) -> &str {
        &self.engine.window.title
    }

    pub fn validate(&self) -> cadence_core::Result<()> {
        self.engine.validate()
    }

    /// Backend parameters, loading shader files named in the config.
    pub fn graphics_config(&self) -> cadence_core::Result<GraphicsConfig> {
        Ok(
            GraphicsConfig::from_section(self.title(), &self.engine.graphics)?
                .with_headless_timeline(self.headless_timeline),
        )
    }

    /// Accumulator for the configured time slice and cap.
    ///
    /// Call [`Self::validate`] first; a non-positive slice panics.
    pub fn fixed_step(&self) -> FixedStep {
        FixedStep::new(self.engine.timing.fixed_time_slice)
            .with_max_steps(self.engine.timing.step_cap())
    }

    pub fn target_frame_time(&self) -> Option<Duration> {
        self.engine
            .timing
            .target_fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn builder_writes_through_to_sections() {
        let config = AppConfig::new("Test")
            .with_size(640, 480)
            .with_backend(BackendKind::Headless)
            .with_frames_in_flight(3)
            .with_max_fixed_steps(None)
            .with_target_fps(50);

        assert_eq!(config.title(), "Test");
        assert_eq!(config.engine.window.width, 640);
        assert_eq!(config.engine.graphics.backend, BackendKind::Headless);
        assert_eq!(config.fixed_step().max_steps_per_frame(), None);
        assert_eq!(config.target_frame_time(), Some(Duration::from_millis(20)));
        assert!(config.audio);
        config.validate().unwrap();
    }

    #[test]
    fn fixed_step_follows_timing_section() {
        let config = AppConfig::new("Test")
            .with_fixed_time_slice(0.01)
            .with_max_fixed_steps(Some(4));
        let step = config.fixed_step();
        assert_relative_eq!(step.time_slice(), 0.01);
        assert_eq!(step.max_steps_per_frame(), Some(4));
    }

    #[test]
    fn invalid_frame_count_fails_validation() {
        let config = AppConfig::new("Test").with_frames_in_flight(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn graphics_config_carries_headless_timeline() {
        let config = AppConfig::new("Test")
            .with_backend(BackendKind::Headless)
            .with_headless_timeline(GpuTimeline::Latency(2));
        let graphics = config.graphics_config().unwrap();
        assert_eq!(graphics.headless_timeline, GpuTimeline::Latency(2));
        assert_eq!(graphics.app_name, "Test");
    }
}
