//! Frame timing and fixed-step accumulation.
//!
//! [`FrameTimer`] turns wall-clock samples into per-frame deltas.
//! [`FixedStep`] accumulates those deltas into a whole number of fixed
//! simulation steps, carrying the remainder into the next frame.

use std::time::Instant;

/// Converts wall-clock samples into frame deltas.
#[derive(Debug, Clone, Default)]
pub struct FrameTimer {
    last_sample: Option<Instant>,
}

impl FrameTimer {
    /// Create a timer with no previous sample.
    #[must_use]
    pub const fn new() -> Self {
        Self { last_sample: None }
    }

    /// Record a new sample and return the seconds elapsed since the previous one.
    ///
    /// The first call returns `0.0`. A sample older than the previous one also
    /// returns `0.0` rather than a negative delta.
    pub fn advance(&mut self, now: Instant) -> f64 {
        let delta = self
            .last_sample
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f64());
        self.last_sample = Some(now);
        delta
    }

    /// Forget the previous sample so the next `advance` returns `0.0`.
    ///
    /// Used after the loop was suspended (focus loss, minimized window) so the
    /// pause is not replayed as simulation time.
    pub fn reset(&mut self) {
        self.last_sample = None;
    }

    /// The most recent sample, if any.
    #[must_use]
    pub const fn last_sample(&self) -> Option<Instant> {
        self.last_sample
    }
}

/// Result of draining the accumulator for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepBatch {
    /// Fixed steps to run this frame.
    pub steps: u32,
    /// Simulation time discarded because the per-frame cap was reached.
    pub dropped_seconds: f64,
}

impl StepBatch {
    /// Returns `true` if the catch-up cap discarded time this frame.
    #[must_use]
    pub fn dropped(&self) -> bool {
        self.dropped_seconds > 0.0
    }
}

/// Fixed time-slice accumulator.
///
/// Catch-up never skips a step: under slowdown several steps fire in the same
/// frame. An optional cap bounds the number of steps per frame; time beyond
/// the cap is dropped in whole slices, so the remainder stays below one slice.
#[derive(Debug, Clone)]
pub struct FixedStep {
    time_slice: f64,
    accumulated: f64,
    max_steps_per_frame: Option<u32>,
    total_steps: u64,
    total_dropped: f64,
}

impl FixedStep {
    /// Create an uncapped accumulator.
    ///
    /// # Panics
    /// Panics if `time_slice` is not a positive, finite number of seconds.
    #[must_use]
    pub fn new(time_slice: f64) -> Self {
        assert!(
            time_slice.is_finite() && time_slice > 0.0,
            "fixed time slice must be positive"
        );
        Self {
            time_slice,
            accumulated: 0.0,
            max_steps_per_frame: None,
            total_steps: 0,
            total_dropped: 0.0,
        }
    }

    /// Set the per-frame catch-up cap (`None` for uncapped).
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps_per_frame: Option<u32>) -> Self {
        self.max_steps_per_frame = max_steps_per_frame;
        self
    }

    /// Add a frame delta and return how many fixed steps must run.
    ///
    /// Non-finite or negative deltas are ignored.
    pub fn accumulate(&mut self, delta_seconds: f64) -> StepBatch {
        if delta_seconds.is_finite() && delta_seconds > 0.0 {
            self.accumulated += delta_seconds;
        }

        let mut steps = 0u32;
        while self.accumulated >= self.time_slice {
            if self.max_steps_per_frame.is_some_and(|max| steps >= max) {
                break;
            }
            self.accumulated -= self.time_slice;
            steps += 1;
        }

        let mut dropped_seconds = 0.0;
        if self.accumulated >= self.time_slice {
            let before = self.accumulated;
            self.accumulated = self.accumulated.rem_euclid(self.time_slice);
            dropped_seconds = before - self.accumulated;
            self.total_dropped += dropped_seconds;
            tracing::warn!(
                steps,
                dropped_ms = dropped_seconds * 1000.0,
                "Fixed-step catch-up cap reached, dropping simulation time"
            );
        }

        self.total_steps += u64::from(steps);
        StepBatch {
            steps,
            dropped_seconds,
        }
    }

    /// Fraction of a slice left in the accumulator, in `[0, 1)`.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.accumulated / self.time_slice
    }

    /// The fixed step size in seconds.
    #[must_use]
    pub const fn time_slice(&self) -> f64 {
        self.time_slice
    }

    /// Seconds carried over to the next frame.
    #[must_use]
    pub const fn remainder(&self) -> f64 {
        self.accumulated
    }

    /// Per-frame step cap.
    #[must_use]
    pub const fn max_steps_per_frame(&self) -> Option<u32> {
        self.max_steps_per_frame
    }

    /// Total steps produced since creation.
    #[must_use]
    pub const fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Total simulation time dropped by the cap since creation.
    #[must_use]
    pub const fn total_dropped(&self) -> f64 {
        self.total_dropped
    }

    /// Discard any accumulated time.
    pub fn reset(&mut self) {
        self.accumulated = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    #[test]
    fn first_advance_is_zero() {
        let mut timer = FrameTimer::new();
        let start = Instant::now();
        assert_eq!(timer.advance(start), 0.0);
        let delta = timer.advance(start + Duration::from_millis(16));
        assert_relative_eq!(delta, 0.016, epsilon = 1e-9);
    }

    #[test]
    fn backwards_sample_is_clamped() {
        let mut timer = FrameTimer::new();
        let start = Instant::now() + Duration::from_secs(1);
        timer.advance(start);
        assert_eq!(timer.advance(start - Duration::from_millis(5)), 0.0);
    }

    #[test]
    fn reset_forgets_pause() {
        let mut timer = FrameTimer::new();
        let start = Instant::now();
        timer.advance(start);
        timer.reset();
        assert_eq!(timer.advance(start + Duration::from_secs(10)), 0.0);
    }

    #[test]
    fn exact_slice_fires_one_step() {
        let mut fixed = FixedStep::new(0.25);
        let batch = fixed.accumulate(0.25);
        assert_eq!(batch.steps, 1);
        assert_eq!(fixed.remainder(), 0.0);
    }

    #[test]
    fn steps_match_floor_of_total_time() {
        // Power-of-two slice and deltas keep the arithmetic exact.
        let slice = 1.0 / 64.0;
        let mut fixed = FixedStep::new(slice);
        let mut seed = 0x2545_f491_u32;
        let mut total_time = 0.0;
        let mut total_steps = 0u64;

        for _ in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let delta = f64::from(seed % 80) / 1024.0;
            total_time += delta;
            total_steps += u64::from(fixed.accumulate(delta).steps);

            assert!(fixed.remainder() < slice);
            assert!(fixed.remainder() >= 0.0);
        }

        assert_eq!(total_steps, (total_time / slice).floor() as u64);
        assert_eq!(fixed.total_steps(), total_steps);
    }

    #[test]
    fn fast_frames_catch_up_without_skipping() {
        let mut fixed = FixedStep::new(0.001);
        let mut total = 0;
        for _ in 0..3 {
            let batch = fixed.accumulate(0.0033);
            assert!(batch.steps >= 3);
            assert!(!batch.dropped());
            total += batch.steps;
        }
        assert_eq!(total, 9);
        assert!(fixed.remainder() < 0.001);
    }

    #[test]
    fn cap_drops_whole_slices_only() {
        let mut fixed = FixedStep::new(0.01).with_max_steps(Some(4));
        let batch = fixed.accumulate(0.105);

        assert_eq!(batch.steps, 4);
        assert_relative_eq!(batch.dropped_seconds, 0.06, epsilon = 1e-9);
        assert_relative_eq!(fixed.remainder(), 0.005, epsilon = 1e-9);
        assert_relative_eq!(fixed.alpha(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn invalid_deltas_are_ignored() {
        let mut fixed = FixedStep::new(0.01);
        assert_eq!(fixed.accumulate(f64::NAN).steps, 0);
        assert_eq!(fixed.accumulate(-1.0).steps, 0);
        assert_eq!(fixed.accumulate(f64::INFINITY).steps, 0);
        assert_eq!(fixed.remainder(), 0.0);
    }
}
