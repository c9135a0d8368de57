//! Platform glue for the Cadence engine.
//!
//! Window creation via winit, translation of the window notifications the
//! render core cares about, and blocking fatal-error reports.

mod fatal;
mod notify;
mod window;

use cadence_core::{Classify, Severity};
use thiserror::Error;

pub use fatal::{FatalReporter, FATAL_EXIT_CODE};
pub use notify::{PendingResize, WindowNotification};
pub use window::{client_size, raw_display_handle, WindowDesc};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
    #[error("Window handle unavailable: {0}")]
    WindowHandle(String),
}

impl Classify for PlatformError {
    fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
