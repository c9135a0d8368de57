//! Application framework for the Cadence engine.
//!
//! This crate provides:
//! - The [`Game`] trait with variable and fixed-rate tick callbacks
//! - The [`LoopDriver`] that turns wall-clock time into ticks and frames
//! - A winit runner ([`run_app`]) and a window-less one ([`run_headless`])
//!
//! # Example
//!
//! ```no_run
//! use cadence_app::{run_app, AppConfig, AppContext, Game};
//!
//! struct Empty;
//!
//! impl Game for Empty {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(Self)
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<Empty>(AppConfig::new("Empty"))
//! }
//! ```

mod config;
mod context;
mod driver;
mod frame;
mod game;
mod runner;

pub use config::AppConfig;
pub use context::AppContext;
pub use driver::{FrameOutcome, LoopDriver, LoopStats};
pub use frame::FrameContext;
pub use game::Game;
pub use runner::{init_logging, run_app, run_headless};

// Re-export commonly used types for convenience
pub use cadence_core::{BackendKind, EngineConfig};
pub use cadence_gpu::{GraphicsBackend, MeshData, MeshHandle, RenderData, Vertex};
pub use cadence_input::{InputEvent, InputSource, KeyCode};
pub use glam;
