//! Error types for the engine.

use thiserror::Error;

/// How the game loop must react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Unrecoverable. Report and terminate the process.
    Fatal,
    /// The current frame is lost; log and continue with the next one.
    Retryable,
    /// Nothing to do beyond a debug log (late or duplicate notifications).
    Ignorable,
}

impl Severity {
    /// Returns `true` for [`Severity::Fatal`].
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Fatal)
    }
}

/// Errors that know their own [`Severity`].
pub trait Classify {
    /// Classify this error.
    fn severity(&self) -> Severity;
}

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration value out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Platform error
    #[error("Platform error: {0}")]
    Platform(String),
}

impl Classify for Error {
    fn severity(&self) -> Severity {
        match self {
            Self::Io(_) | Self::ConfigParse(_) | Self::InvalidConfig(_) | Self::Platform(_) => {
                Severity::Fatal
            }
            Self::InvalidData(_) => Severity::Retryable,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_fatal() {
        let err = Error::InvalidConfig("frames_in_flight".into());
        assert!(err.severity().is_fatal());
        assert_eq!(
            Error::InvalidData("bad".into()).severity(),
            Severity::Retryable
        );
    }
}
