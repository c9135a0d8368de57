//! Blocking fatal-error notification.

use cadence_core::WindowSection;
use rfd::{MessageButtons, MessageDialog, MessageLevel};

/// Process exit code after a fatal error.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Reports unrecoverable errors to the user before the process exits.
#[derive(Debug, Clone)]
pub struct FatalReporter {
    title: String,
    show_dialog: bool,
}

impl FatalReporter {
    #[must_use]
    pub fn new(title: impl Into<String>, show_dialog: bool) -> Self {
        Self {
            title: title.into(),
            show_dialog,
        }
    }

    #[must_use]
    pub fn from_section(section: &WindowSection) -> Self {
        Self::new(section.title.clone(), section.fatal_dialog)
    }

    #[must_use]
    pub const fn shows_dialog(&self) -> bool {
        self.show_dialog
    }

    /// Log `message` and, when enabled, block on a modal error dialog.
    pub fn report(&self, message: &str) {
        tracing::error!("Fatal: {}", message);
        if self.show_dialog {
            MessageDialog::new()
                .set_level(MessageLevel::Error)
                .set_title(format!("{} - fatal error", self.title))
                .set_description(message)
                .set_buttons(MessageButtons::Ok)
                .show();
        }
    }

    /// Report and terminate with [`FATAL_EXIT_CODE`].
    pub fn abort(&self, message: &str) -> ! {
        self.report(message);
        std::process::exit(FATAL_EXIT_CODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialog_follows_config() {
        let section = WindowSection {
            fatal_dialog: false,
            ..WindowSection::default()
        };
        let reporter = FatalReporter::from_section(&section);
        assert!(!reporter.shows_dialog());
        // Without a dialog this only logs and must not block.
        reporter.report("device lost");
    }
}
