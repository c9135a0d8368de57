//! The game loop driver.
//!
//! One [`LoopDriver::iterate`] is one loop iteration: sample the clock, run
//! the variable tick, drain the fixed-step accumulator, then begin, render
//! and end a GPU frame. GPU errors are sorted by severity: fatal ones end the
//! loop, everything else drops the frame and the loop carries on.

use std::time::Instant;

use cadence_core::{Classify, FixedStep, FrameTimer, Severity};
use cadence_gpu::{DrawStats, GpuError, ResizeOutcome};

use crate::context::AppContext;
use crate::frame::FrameContext;
use crate::game::Game;

/// What happened to the GPU frame of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Submitted and presented.
    Presented { steps: u32, draws: DrawStats },
    /// Dropped after a non-fatal error.
    Skipped { steps: u32, severity: Severity },
}

impl FrameOutcome {
    pub const fn steps(self) -> u32 {
        match self {
            Self::Presented { steps, .. } | Self::Skipped { steps, .. } => steps,
        }
    }
}

/// Running totals over the driver's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopStats {
    pub frames: u64,
    pub presented: u64,
    pub skipped: u64,
    pub fixed_steps: u64,
    /// Simulation time discarded by the catch-up cap.
    pub dropped_seconds: f64,
    /// Largest number of fixed steps in one frame.
    pub max_steps_in_frame: u32,
}

/// Frame timer plus fixed-step accumulator.
#[derive(Debug)]
pub struct LoopDriver {
    timer: FrameTimer,
    fixed: FixedStep,
    stats: LoopStats,
}

impl LoopDriver {
    pub fn new(fixed: FixedStep) -> Self {
        Self {
            timer: FrameTimer::new(),
            fixed,
            stats: LoopStats::default(),
        }
    }

    pub const fn stats(&self) -> LoopStats {
        self.stats
    }

    pub const fn fixed(&self) -> &FixedStep {
        &self.fixed
    }

    /// Forget the last clock sample and any accumulated simulation time.
    ///
    /// The next [`iterate`](Self::iterate) sees a zero delta, so a pause
    /// (focus loss, minimized window, debugger break) is not replayed.
    pub fn reset_clock(&mut self) {
        tracing::debug!(
            "Clock reset, discarding {:.4}s of accumulated time",
            self.fixed.remainder()
        );
        self.timer.reset();
        self.fixed.reset();
    }

    /// Run one iteration with the clock sampled at `now`.
    ///
    /// Returns `Err` only for fatal errors.
    pub fn iterate<G: Game>(
        &mut self,
        game: &mut G,
        ctx: &mut AppContext,
        now: Instant,
    ) -> anyhow::Result<FrameOutcome> {
        let dt = self.timer.advance(now);
        self.step(game, ctx, dt)
    }

    /// Run one iteration with an explicit frame delta.
    pub fn step<G: Game>(
        &mut self,
        game: &mut G,
        ctx: &mut AppContext,
        dt: f64,
    ) -> anyhow::Result<FrameOutcome> {
        game.tick(ctx, dt);

        let batch = self.fixed.accumulate(dt);
        let slice = self.fixed.time_slice();
        for _ in 0..batch.steps {
            game.fixed_tick(ctx, slice);
        }

        self.stats.fixed_steps += u64::from(batch.steps);
        self.stats.max_steps_in_frame = self.stats.max_steps_in_frame.max(batch.steps);
        self.stats.dropped_seconds += batch.dropped_seconds;

        let outcome = self.render(game, ctx, dt, batch.steps)?;

        ctx.buttons.end_frame();
        ctx.advance(dt);
        self.stats.frames += 1;
        match outcome {
            FrameOutcome::Presented { .. } => self.stats.presented += 1,
            FrameOutcome::Skipped { .. } => self.stats.skipped += 1,
        }
        Ok(outcome)
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render<G: Game>(
        &self,
        game: &mut G,
        ctx: &mut AppContext,
        dt: f64,
        steps: u32,
    ) -> anyhow::Result<FrameOutcome> {
        if let Err(err) = ctx.graphics.begin_frame() {
            return skip_frame(err.severity(), err.into(), steps);
        }

        // begin_frame succeeded, so end_frame must run whatever render does.
        let frame_number = ctx.frame_count();
        let mut frame = FrameContext::new(
            ctx.graphics.as_mut(),
            ctx.surface.as_slice(),
            dt,
            self.fixed.alpha(),
            frame_number,
        );
        let rendered = game.render(&mut frame);
        let draws = frame.stats();
        let ended = ctx.graphics.end_frame();

        if let Err(err) = rendered {
            let severity = severity_of(&err);
            if severity.is_fatal() {
                return Err(err);
            }
            tracing::warn!("Render failed, frame draws incomplete: {err:#}");
        }

        match ended {
            Ok(()) => Ok(FrameOutcome::Presented { steps, draws }),
            Err(err) => {
                if matches!(err, GpuError::OutOfDate) {
                    resume_surface(ctx);
                }
                skip_frame(err.severity(), err.into(), steps)
            }
        }
    }

    /// Apply a window resize to the main surface and tell the game.
    pub fn resize<G: Game>(
        &self,
        game: &mut G,
        ctx: &mut AppContext,
        width: u32,
        height: u32,
    ) -> anyhow::Result<()> {
        let Some(surface) = ctx.surface else {
            return Ok(());
        };

        match ctx.graphics.resize_surface(surface, width, height) {
            Ok(ResizeOutcome::Resized { width, height }) => {
                tracing::info!("Resized to {}x{}", width, height);
                game.on_resize(ctx, width, height)
            }
            Ok(ResizeOutcome::Unchanged) => {
                tracing::debug!("Ignoring resize to current size {}x{}", width, height);
                Ok(())
            }
            Err(err) if err.severity().is_fatal() => Err(err.into()),
            Err(err) => {
                tracing::debug!("Resize to {}x{} ignored: {}", width, height, err);
                Ok(())
            }
        }
    }
}

/// Re-request the current size of a surface suspended by a failed present.
fn resume_surface(ctx: &mut AppContext) {
    let Some(surface) = ctx.surface else {
        return;
    };
    let Ok(info) = ctx.graphics.surface_info(surface) else {
        return;
    };
    if info.suspended {
        if let Err(err) = ctx.graphics.resize_surface(surface, info.width, info.height) {
            tracing::debug!("Surface {:?} stays suspended: {}", surface, err);
        }
    }
}

fn severity_of(err: &anyhow::Error) -> Severity {
    err.downcast_ref::<GpuError>()
        .map_or(Severity::Retryable, Classify::severity)
}

fn skip_frame(severity: Severity, err: anyhow::Error, steps: u32) -> anyhow::Result<FrameOutcome> {
    match severity {
        Severity::Fatal => Err(err),
        Severity::Retryable => {
            tracing::warn!("Dropping frame: {err:#}");
            Ok(FrameOutcome::Skipped { steps, severity })
        }
        Severity::Ignorable => {
            tracing::debug!("Dropping frame: {err:#}");
            Ok(FrameOutcome::Skipped { steps, severity })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_errors_are_retryable() {
        let err = anyhow::anyhow!("shader compile failed");
        assert_eq!(severity_of(&err), Severity::Retryable);

        let err: anyhow::Error = GpuError::DeviceLost.into();
        assert_eq!(severity_of(&err), Severity::Fatal);
    }

    #[test]
    fn fatal_errors_are_not_skipped() {
        let err: anyhow::Error = GpuError::DeviceLost.into();
        assert!(skip_frame(Severity::Fatal, err, 1).is_err());

        let err: anyhow::Error = GpuError::OutOfDate.into();
        assert_eq!(
            skip_frame(Severity::Retryable, err, 2).unwrap(),
            FrameOutcome::Skipped {
                steps: 2,
                severity: Severity::Retryable
            }
        );
    }
}
