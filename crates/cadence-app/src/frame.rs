//! Per-frame context for rendering.

use cadence_gpu::{DrawStats, GraphicsBackend, RenderData, SurfaceId};
use glam::Mat4;

/// The open frame handed to [`Game::render`](crate::Game::render).
pub struct FrameContext<'a> {
    graphics: &'a mut dyn GraphicsBackend,
    surfaces: &'a [SurfaceId],
    /// Frame delta in seconds.
    pub dt: f64,
    /// How far the simulation is into the next fixed step, in `[0, 1)`.
    pub alpha: f64,
    pub frame_number: u64,
    stats: DrawStats,
}

impl<'a> FrameContext<'a> {
    pub(crate) fn new(
        graphics: &'a mut dyn GraphicsBackend,
        surfaces: &'a [SurfaceId],
        dt: f64,
        alpha: f64,
        frame_number: u64,
    ) -> Self {
        Self {
            graphics,
            surfaces,
            dt,
            alpha,
            frame_number,
            stats: DrawStats::default(),
        }
    }

    /// Record `draws` into every surface of this frame.
    pub fn draw(
        &mut self,
        draws: &[RenderData<'_>],
        view_projection: &Mat4,
    ) -> cadence_gpu::Result<DrawStats> {
        let stats = self.graphics.render(self.surfaces, draws, view_projection)?;
        self.stats.merge(stats);
        Ok(stats)
    }

    pub fn surfaces(&self) -> &[SurfaceId] {
        self.surfaces
    }

    pub fn graphics(&self) -> &dyn GraphicsBackend {
        &*self.graphics
    }

    /// Draw counts accumulated this frame.
    pub const fn stats(&self) -> DrawStats {
        self.stats
    }
}
