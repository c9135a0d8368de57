//! Cadence Engine Sandbox
//!
//! Opens a window and spins a cube through the fixed-step game loop.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p cadence-sandbox -- [OPTIONS]
//! ```
//!
//! Settings come from `cadence.toml` in the working directory when present;
//! command line options override them. `--backend headless` runs without a
//! window for `--frames` iterations and prints the loop statistics.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod args;

use cadence_app::{init_logging, run_app, run_headless, AppConfig, BackendKind, EngineConfig};

use crate::app::Sandbox;
use crate::args::{print_help, SandboxArgs};

const TITLE: &str = "Cadence Sandbox";
const HEADLESS_FRAMES: u64 = 600;

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = SandboxArgs::from_env()?;
    if args.help {
        print_help();
        return Ok(());
    }

    let mut engine = EngineConfig::load_or_default(&args.config)?;
    if !args.config.exists() {
        engine.window.title = TITLE.to_string();
    }

    let mut config = AppConfig::from_engine_config(engine);
    if let Some(backend) = args.backend {
        config = config.with_backend(backend);
    }
    if args.software {
        config = config.with_software_adapter(true);
    }

    if config.engine.graphics.backend == BackendKind::Headless {
        let frames = args.frames.unwrap_or(HEADLESS_FRAMES);
        let stats = run_headless::<Sandbox>(config, frames)?;
        println!(
            "{} frames: {} presented, {} skipped, {} fixed steps (max {} per frame), {:.3}s dropped",
            stats.frames,
            stats.presented,
            stats.skipped,
            stats.fixed_steps,
            stats.max_steps_in_frame,
            stats.dropped_seconds
        );
        return Ok(());
    }

    run_app::<Sandbox>(config)
}
