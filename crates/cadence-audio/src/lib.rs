//! Audio for the Cadence engine.
//!
//! Only the device lifetime lives here: [`AudioSystem::init`] opens the
//! default output through kira and [`AudioSystem::shutdown`] closes it. A
//! machine without an output device runs muted.

use cadence_core::{Classify, Severity};
use kira::manager::backend::DefaultBackend;
use kira::manager::{AudioManager, AudioManagerSettings};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio device initialization failed: {0}")]
    Init(String),
}

impl Classify for AudioError {
    fn severity(&self) -> Severity {
        Severity::Ignorable
    }
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Owns the audio output for the lifetime of the application.
pub struct AudioSystem {
    manager: Option<AudioManager<DefaultBackend>>,
}

impl std::fmt::Debug for AudioSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSystem")
            .field("active", &self.is_active())
            .finish()
    }
}

impl AudioSystem {
    /// Open the default output, falling back to [`Self::muted`].
    #[must_use]
    pub fn init() -> Self {
        match Self::try_init() {
            Ok(audio) => audio,
            Err(err) => {
                tracing::warn!("{}, running muted", err);
                Self::muted()
            }
        }
    }

    /// Open the default output.
    pub fn try_init() -> Result<Self> {
        let manager = AudioManager::<DefaultBackend>::new(AudioManagerSettings::default())
            .map_err(|e| AudioError::Init(e.to_string()))?;
        tracing::info!("Audio output initialized");
        Ok(Self {
            manager: Some(manager),
        })
    }

    /// An audio system with no device behind it.
    #[must_use]
    pub const fn muted() -> Self {
        Self { manager: None }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.manager.is_some()
    }

    /// Close the output. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.manager.take().is_some() {
            tracing::info!("Audio output shut down");
        }
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muted_system_shuts_down_cleanly() {
        let mut audio = AudioSystem::muted();
        assert!(!audio.is_active());
        audio.shutdown();
        audio.shutdown();
    }

    #[test]
    fn init_errors_are_not_fatal() {
        let err = AudioError::Init("no device".into());
        assert_eq!(err.severity(), Severity::Ignorable);
    }
}
