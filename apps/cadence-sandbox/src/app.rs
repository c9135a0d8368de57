//! Spinning-cube sandbox game.

use cadence_app::{
    AppContext, FrameContext, Game, InputEvent, InputSource, KeyCode, MeshData, MeshHandle,
    RenderData,
};
use glam::{Mat4, Vec3};

use crate::args::SandboxArgs;

/// Radians per second.
const SPIN_SPEED: f32 = 1.2;
const CUBE_SIZE: f32 = 1.0;

pub struct Sandbox {
    cube: MeshHandle,
    /// Spin angle at the last two fixed steps, for interpolation.
    angle: f32,
    previous_angle: f32,
    spinning: bool,
    aspect: f32,
    frame_limit: Option<u64>,
}

impl Sandbox {
    fn view_projection(&self) -> Mat4 {
        let projection = Mat4::perspective_rh(60f32.to_radians(), self.aspect, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 1.5, 3.5), Vec3::ZERO, Vec3::Y);
        projection * view
    }
}

impl Game for Sandbox {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let cube = ctx.graphics.load_meshes(&[MeshData::cube(CUBE_SIZE)])?[0];
        let frame_limit = SandboxArgs::from_env().ok().and_then(|args| args.frames);

        tracing::info!(
            "Sandbox ready on {} ({} frames in flight)",
            ctx.graphics.kind(),
            ctx.graphics.frames_in_flight()
        );

        Ok(Self {
            cube,
            angle: 0.0,
            previous_angle: 0.0,
            spinning: true,
            aspect: ctx.aspect_ratio(),
            frame_limit,
        })
    }

    fn tick(&mut self, ctx: &mut AppContext, _dt: f64) {
        if ctx.buttons.just_pressed(InputSource::Key(KeyCode::Space)) {
            self.spinning = !self.spinning;
            tracing::info!("Spin {}", if self.spinning { "resumed" } else { "paused" });
        }

        if self.frame_limit.is_some_and(|limit| ctx.frame_count() + 1 >= limit) {
            ctx.request_exit();
        }
    }

    fn fixed_tick(&mut self, _ctx: &mut AppContext, step: f64) {
        self.previous_angle = self.angle;
        if self.spinning {
            self.angle = (self.angle + SPIN_SPEED * step as f32) % std::f32::consts::TAU;
        }
    }

    fn render(&mut self, frame: &mut FrameContext<'_>) -> anyhow::Result<()> {
        let mut angle = self.angle;
        if angle < self.previous_angle {
            angle += std::f32::consts::TAU;
        }
        let angle = self.previous_angle + (angle - self.previous_angle) * frame.alpha as f32;

        let world = Mat4::from_rotation_y(angle) * Mat4::from_rotation_x(angle * 0.5);
        let stats = frame.draw(&[RenderData::new(self.cube, &world)], &self.view_projection())?;
        if stats.skipped > 0 && frame.frame_number % 600 == 0 {
            tracing::debug!("{} draws skipped", stats.skipped);
        }
        Ok(())
    }

    fn on_input(&mut self, ctx: &mut AppContext, event: &InputEvent) {
        if event.source == InputSource::Key(KeyCode::Escape) && event.is_pressed() {
            ctx.request_exit();
        }
    }

    fn on_resize(&mut self, ctx: &mut AppContext, _width: u32, _height: u32) -> anyhow::Result<()> {
        self.aspect = ctx.aspect_ratio();
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        if let Err(e) = ctx.graphics.free_mesh(self.cube) {
            tracing::warn!("Failed to free cube mesh: {e}");
        }
    }
}
