//! Loop driver behaviour against the headless backend.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use cadence_app::{
    run_headless, AppConfig, AppContext, FrameContext, FrameOutcome, Game, LoopDriver,
};
use cadence_audio::AudioSystem;
use cadence_core::{FixedStep, Severity};
use cadence_gpu::{
    GraphicsBackend, GraphicsConfig, HeadlessBackend, HeadlessProbe, MeshData, MeshHandle,
    RenderData, SurfaceDesc,
};
use cadence_input::{InputEvent, InputSource, KeyCode};
use glam::Mat4;

#[derive(Default)]
struct Counter {
    ticks: u32,
    fixed_ticks: u32,
    renders: u32,
    fixed_time: f64,
    mesh: Option<MeshHandle>,
}

impl Game for Counter {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let mesh = ctx.graphics.load_meshes(&[MeshData::cube(1.0)])?[0];
        Ok(Self {
            mesh: Some(mesh),
            ..Self::default()
        })
    }

    fn tick(&mut self, _ctx: &mut AppContext, _dt: f64) {
        self.ticks += 1;
    }

    fn fixed_tick(&mut self, _ctx: &mut AppContext, step: f64) {
        self.fixed_ticks += 1;
        self.fixed_time += step;
    }

    fn render(&mut self, frame: &mut FrameContext<'_>) -> anyhow::Result<()> {
        self.renders += 1;
        if let Some(mesh) = self.mesh {
            frame.draw(&[RenderData::new(mesh, &Mat4::IDENTITY)], &Mat4::IDENTITY)?;
        }
        Ok(())
    }
}

fn headless_context() -> (AppContext, HeadlessProbe) {
    let config = GraphicsConfig::default().with_frames_in_flight(2);
    let mut backend = HeadlessBackend::new(&config).unwrap();
    let probe = backend.probe();
    let surface = backend.create_surface(&SurfaceDesc::offscreen(320, 240)).unwrap();
    let ctx = AppContext::new(Box::new(backend), Some(surface), AudioSystem::muted(), None);
    (ctx, probe)
}

#[test]
fn slow_frames_run_several_fixed_ticks() {
    let (mut ctx, _probe) = headless_context();
    let mut game = Counter::init(&mut ctx).unwrap();
    let mut driver = LoopDriver::new(FixedStep::new(0.001));

    for _ in 0..3 {
        let outcome = driver.step(&mut game, &mut ctx, 0.0033).unwrap();
        assert!(outcome.steps() >= 3);
    }

    assert_eq!(game.ticks, 3);
    assert_eq!(game.fixed_ticks, 9);
    assert_eq!(driver.stats().fixed_steps, 9);
    assert!(driver.fixed().remainder() < 0.001);
}

#[test]
fn fixed_ticks_match_floor_of_elapsed_time() {
    let (mut ctx, _probe) = headless_context();
    let mut game = Counter::init(&mut ctx).unwrap();
    let slice = 1.0 / 60.0;
    let mut driver = LoopDriver::new(FixedStep::new(slice));

    let deltas = [0.004, 0.021, 0.0, 0.05, 0.0166, 0.1, 0.003];
    for dt in deltas {
        driver.step(&mut game, &mut ctx, dt).unwrap();
    }

    let total: f64 = deltas.iter().sum();
    assert_eq!(u64::from(game.fixed_ticks), (total / slice).floor() as u64);
    assert_relative_eq!(game.fixed_time, f64::from(game.fixed_ticks) * slice, epsilon = 1e-9);
    assert!(driver.fixed().remainder() < slice);
    assert_eq!(driver.stats().dropped_seconds, 0.0);
}

#[test]
fn capped_catch_up_reports_dropped_time() {
    let (mut ctx, _probe) = headless_context();
    let mut game = Counter::init(&mut ctx).unwrap();
    let mut driver = LoopDriver::new(FixedStep::new(0.01).with_max_steps(Some(5)));

    let outcome = driver.step(&mut game, &mut ctx, 0.1).unwrap();

    assert_eq!(outcome.steps(), 5);
    assert_eq!(driver.stats().max_steps_in_frame, 5);
    assert_relative_eq!(driver.stats().dropped_seconds, 0.05, epsilon = 1e-9);
}

#[test]
fn every_iteration_renders_and_presents() {
    let (mut ctx, probe) = headless_context();
    let mut game = Counter::init(&mut ctx).unwrap();
    let mut driver = LoopDriver::new(FixedStep::new(1.0 / 60.0));

    for _ in 0..4 {
        let outcome = driver.step(&mut game, &mut ctx, 1.0 / 60.0).unwrap();
        let FrameOutcome::Presented { draws, .. } = outcome else {
            panic!("expected a presented frame, got {outcome:?}");
        };
        assert_eq!(draws.draws, 1);
    }

    assert_eq!(game.renders, 4);
    assert_eq!(probe.presents(), 4);
    assert_eq!(ctx.frame_count(), 4);
    assert_relative_eq!(ctx.elapsed(), 4.0 / 60.0, epsilon = 1e-12);
}

#[test]
fn retryable_present_failure_skips_the_frame() {
    let (mut ctx, probe) = headless_context();
    let mut game = Counter::init(&mut ctx).unwrap();
    let mut driver = LoopDriver::new(FixedStep::new(1.0 / 60.0));

    probe.fail_next_presents(1);
    let outcome = driver.step(&mut game, &mut ctx, 1.0 / 60.0).unwrap();
    assert!(matches!(
        outcome,
        FrameOutcome::Skipped {
            severity: Severity::Retryable,
            ..
        }
    ));

    let outcome = driver.step(&mut game, &mut ctx, 1.0 / 60.0).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(probe.presents(), 1);

    let stats = driver.stats();
    assert_eq!((stats.frames, stats.presented, stats.skipped), (2, 1, 1));
    assert_eq!(game.renders, 2);
}

#[test]
fn render_error_keeps_the_frame() {
    struct Failing;

    impl Game for Failing {
        fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn render(&mut self, _frame: &mut FrameContext<'_>) -> anyhow::Result<()> {
            anyhow::bail!("scene not ready")
        }
    }

    let (mut ctx, probe) = headless_context();
    let mut game = Failing;
    let mut driver = LoopDriver::new(FixedStep::new(1.0 / 60.0));

    let outcome = driver.step(&mut game, &mut ctx, 1.0 / 60.0).unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(probe.presents(), 1);
}

#[test]
fn reset_clock_swallows_a_long_pause() {
    let (mut ctx, _probe) = headless_context();
    let mut game = Counter::init(&mut ctx).unwrap();
    let mut driver = LoopDriver::new(FixedStep::new(1.0 / 60.0));

    let start = Instant::now();
    driver.iterate(&mut game, &mut ctx, start).unwrap();
    driver
        .iterate(&mut game, &mut ctx, start + Duration::from_millis(10))
        .unwrap();
    assert!(driver.fixed().remainder() > 0.0);

    driver.reset_clock();
    assert_eq!(driver.fixed().remainder(), 0.0);

    let outcome = driver
        .iterate(&mut game, &mut ctx, start + Duration::from_secs(10))
        .unwrap();
    assert_eq!(outcome.steps(), 0);
    assert_eq!(driver.stats().dropped_seconds, 0.0);
    assert_eq!(game.fixed_ticks, 0);

    let outcome = driver
        .iterate(
            &mut game,
            &mut ctx,
            start + Duration::from_secs(10) + Duration::from_millis(20),
        )
        .unwrap();
    assert_eq!(outcome.steps(), 1);
}

#[test]
fn resize_notifies_game_only_on_change() {
    #[derive(Default)]
    struct Resizable {
        resizes: Vec<(u32, u32)>,
    }

    impl Game for Resizable {
        fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
            Ok(Self::default())
        }

        fn on_resize(&mut self, _ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
            self.resizes.push((width, height));
            Ok(())
        }
    }

    let (mut ctx, probe) = headless_context();
    let mut game = Resizable::init(&mut ctx).unwrap();
    let driver = LoopDriver::new(FixedStep::new(1.0 / 60.0));

    driver.resize(&mut game, &mut ctx, 320, 240).unwrap();
    driver.resize(&mut game, &mut ctx, 0, 240).unwrap();
    driver.resize(&mut game, &mut ctx, 640, 480).unwrap();

    assert_eq!(game.resizes, vec![(640, 480)]);
    assert_eq!(probe.swapchain_rebuilds(), 1);
    assert_relative_eq!(ctx.aspect_ratio(), 640.0 / 480.0);
}

#[test]
fn input_reaches_dispatcher_and_tracker() {
    let (mut ctx, _probe) = headless_context();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    ctx.input.register(move |event| sink.borrow_mut().push(event.source));

    let space = InputSource::Key(KeyCode::Space);
    let event = InputEvent::button(space, true, false);
    ctx.buttons.handle(&event);
    ctx.input.dispatch(&event);

    assert_eq!(*seen.borrow(), vec![space]);
    assert!(ctx.buttons.just_pressed(space));

    let mut game = Counter::init(&mut ctx).unwrap();
    let mut driver = LoopDriver::new(FixedStep::new(1.0 / 60.0));
    driver.step(&mut game, &mut ctx, 1.0 / 60.0).unwrap();

    assert!(!ctx.buttons.just_pressed(space));
    assert!(ctx.buttons.is_down(space));
}

#[test]
fn headless_run_counts_frames_and_ticks() {
    let config = AppConfig::new("headless")
        .with_fixed_time_slice(0.01)
        .with_frames_in_flight(3);

    let stats = run_headless::<Counter>(config, 25).unwrap();

    assert_eq!(stats.frames, 25);
    assert_eq!(stats.presented, 25);
    assert_eq!(stats.skipped, 0);
    assert!((24..=25).contains(&stats.fixed_steps));
}

#[test]
fn headless_run_stops_on_exit_request() {
    struct Quitter {
        frames: u32,
    }

    impl Game for Quitter {
        fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
            Ok(Self { frames: 0 })
        }

        fn tick(&mut self, ctx: &mut AppContext, _dt: f64) {
            self.frames += 1;
            if self.frames == 3 {
                ctx.request_exit();
            }
        }
    }

    let stats = run_headless::<Quitter>(AppConfig::new("quit"), 100).unwrap();
    assert_eq!(stats.frames, 3);
}
