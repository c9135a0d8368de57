//! Core types, timing, and configuration for the Cadence engine.
//!
//! This crate provides the foundations shared by every other crate:
//! - Error types and the fatal/retryable/ignorable severity split
//! - Frame timing and the fixed-step accumulator
//! - Engine configuration loaded from TOML

pub mod config;
pub mod error;
pub mod time;

pub use config::{BackendKind, EngineConfig, GraphicsSection, TimingSection, WindowSection};
pub use error::{Classify, Error, Result, Severity};
pub use time::{FixedStep, FrameTimer, StepBatch};

pub use glam;

/// Engine-wide constants
pub mod constants {
    /// Default fixed simulation step (60 Hz).
    pub const DEFAULT_FIXED_TIME_SLICE: f64 = 1.0 / 60.0;
    /// Default cap on fixed steps drained in a single frame.
    pub const DEFAULT_MAX_FIXED_STEPS: u32 = 240;
    /// Smallest supported number of frames in flight.
    pub const MIN_FRAMES_IN_FLIGHT: usize = 2;
    /// Largest supported number of frames in flight.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
}
