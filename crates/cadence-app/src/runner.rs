//! Application runners: winit event loop and headless.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cadence_audio::AudioSystem;
use cadence_core::BackendKind;
use cadence_gpu::{create_backend, SurfaceDesc};
use cadence_input::InputTranslator;
use cadence_platform::{
    client_size, raw_display_handle, FatalReporter, PendingResize, WindowDesc,
    WindowNotification,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::driver::{LoopDriver, LoopStats};
use crate::game::Game;

/// Install the global `tracing` subscriber.
///
/// Honours `RUST_LOG`, defaulting to `info`. Does nothing if a subscriber is
/// already installed.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

/// Run a [`Game`] in a window until it exits.
///
/// Fatal errors are reported through [`FatalReporter`] and terminate the
/// process with [`cadence_platform::FATAL_EXIT_CODE`].
pub fn run_app<G: Game + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();

    let reporter = FatalReporter::from_section(&config.engine.window);
    if let Err(e) = config.validate() {
        reporter.abort(&format!("Invalid configuration: {e}"));
    }

    info!("{} starting...", config.title());

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<G> {
        config,
        state: None,
        fatal: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
        runner.fatal.get_or_insert_with(|| e.into());
    }

    if let Some(mut state) = runner.state.take() {
        state.shutdown();
    }

    if let Some(err) = runner.fatal {
        reporter.abort(&format!("{err:#}"));
    }

    info!("Exited cleanly");
    Ok(())
}

/// Run a [`Game`] for `frames` iterations without a window.
///
/// Uses the headless backend with an offscreen surface and no audio device.
/// Every iteration advances the clock by exactly one fixed time slice.
/// Stops early when the game requests exit.
pub fn run_headless<G: Game>(config: AppConfig, frames: u64) -> anyhow::Result<LoopStats> {
    let config = config.with_backend(BackendKind::Headless).with_audio(false);
    config.validate()?;

    let graphics = create_backend(BackendKind::Headless, &config.graphics_config()?, None)?;
    let mut state = AppState::<G>::new(&config, graphics, None)?;
    let dt = config.engine.timing.fixed_time_slice;

    let mut result = Ok(());
    for _ in 0..frames {
        if let Err(e) = state.driver.step(&mut state.game, &mut state.ctx, dt) {
            result = Err(e);
            break;
        }
        if state.ctx.exit_requested() {
            break;
        }
    }

    let stats = state.driver.stats();
    state.shutdown();
    result.map(|()| stats)
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<G: Game> {
    config: AppConfig,
    state: Option<AppState<G>>,
    fatal: Option<anyhow::Error>,
}

struct AppState<G: Game> {
    ctx: AppContext,
    game: G,
    driver: LoopDriver,
    translator: InputTranslator,
    resize: PendingResize,
    target_frame_time: Option<Duration>,
}

impl<G: Game + 'static> ApplicationHandler for AppRunner<G> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() || self.fatal.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => self.fail(event_loop, e.context("Failed to initialize application")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        state.handle_input(&event);

        let result = match WindowNotification::from_window_event(&event) {
            Some(WindowNotification::Resized { width, height }) => {
                state.resize.push(width, height);
                Ok(())
            }
            Some(WindowNotification::CloseRequested | WindowNotification::Destroyed) => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.shutdown();
                }
                event_loop.exit();
                return;
            }
            Some(WindowNotification::Focused(focused)) => {
                if focused {
                    state.driver.reset_clock();
                } else {
                    state.ctx.buttons.clear();
                }
                state.game.on_focus(&mut state.ctx, focused);
                Ok(())
            }
            None if matches!(event, WindowEvent::RedrawRequested) => state.redraw(),
            None => Ok(()),
        };

        if let Err(e) = result {
            self.fail(event_loop, e);
            return;
        }

        if self.state.as_ref().is_some_and(|s| s.ctx.exit_requested()) {
            info!("Exit requested");
            if let Some(mut state) = self.state.take() {
                state.shutdown();
            }
            event_loop.exit();
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let Some(state) = &mut self.state {
            let events = state.translator.translate_device_event(&event);
            state.deliver(&events);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.state.as_ref().and_then(|s| s.ctx.window.as_ref()) {
            window.request_redraw();
        }
    }
}

impl<G: Game + 'static> AppRunner<G> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<G>> {
        let window = Arc::new(WindowDesc::from_section(&self.config.engine.window).create(event_loop)?);

        let kind = self.config.engine.graphics.backend;
        let display = raw_display_handle(event_loop)
            .map_err(|e| tracing::warn!("{e}"))
            .ok();
        let graphics = create_backend(kind, &self.config.graphics_config()?, display)?;
        let adapter = graphics.adapter_info();
        info!(
            "GPU: {} ({}{})",
            adapter.name,
            adapter.api_version,
            if adapter.software { ", software" } else { "" }
        );

        AppState::new(&self.config, graphics, Some(window))
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.fatal = Some(err);
        event_loop.exit();
    }
}

impl<G: Game> AppState<G> {
    fn new(
        config: &AppConfig,
        mut graphics: Box<dyn cadence_gpu::GraphicsBackend>,
        window: Option<Arc<winit::window::Window>>,
    ) -> anyhow::Result<Self> {
        let vsync = config.engine.window.vsync;
        let surface = match &window {
            Some(window) if graphics.kind() != BackendKind::Headless => {
                let (width, height) = client_size(window);
                graphics.create_surface(&SurfaceDesc::window(&**window, width, height, vsync))?
            }
            Some(window) => {
                let (width, height) = client_size(window);
                graphics.create_surface(&SurfaceDesc::offscreen(width, height))?
            }
            None => graphics.create_surface(&SurfaceDesc::offscreen(
                config.engine.window.width,
                config.engine.window.height,
            ))?,
        };

        let audio = if config.audio {
            AudioSystem::init()
        } else {
            AudioSystem::muted()
        };

        let mut ctx = AppContext::new(graphics, Some(surface), audio, window);
        let game = match G::init(&mut ctx) {
            Ok(game) => game,
            Err(e) => {
                ctx.shutdown();
                return Err(e.context("Game initialization failed"));
            }
        };

        Ok(Self {
            ctx,
            game,
            driver: LoopDriver::new(config.fixed_step()),
            translator: InputTranslator::new(),
            resize: PendingResize::new(),
            target_frame_time: config.target_frame_time(),
        })
    }

    fn handle_input(&mut self, event: &WindowEvent) {
        let events = self.translator.translate_window_event(event);
        self.deliver(&events);
    }

    fn deliver(&mut self, events: &[cadence_input::InputEvent]) {
        for event in events {
            self.ctx.buttons.handle(event);
            self.ctx.input.dispatch(event);
            self.game.on_input(&mut self.ctx, event);
        }
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn redraw(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        if let Some((width, height)) = self.resize.take() {
            let was_suspended = self.surface_suspended();
            self.driver.resize(&mut self.game, &mut self.ctx, width, height)?;
            if was_suspended && !self.surface_suspended() {
                self.driver.reset_clock();
            }
        }

        self.driver.iterate(&mut self.game, &mut self.ctx, frame_start)?;

        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn surface_suspended(&self) -> bool {
        self.ctx
            .surface
            .and_then(|surface| self.ctx.graphics.surface_info(surface).ok())
            .is_some_and(|info| info.suspended)
    }

    /// Drain the GPU, let the game clean up, then release everything.
    fn shutdown(&mut self) {
        self.ctx.flush();
        self.game.cleanup(&mut self.ctx);
        self.ctx.shutdown();

        let stats = self.driver.stats();
        info!(
            "Ran {} frames ({} presented, {} skipped, {} fixed steps, {:.3}s dropped)",
            stats.frames, stats.presented, stats.skipped, stats.fixed_steps, stats.dropped_seconds
        );
        if self.resize.coalesced() > 0 {
            tracing::debug!("Coalesced {} resize events", self.resize.coalesced());
        }
    }
}
