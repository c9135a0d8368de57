//! Window description and handle helpers.

use cadence_core::WindowSection;
use raw_window_handle::{HasDisplayHandle, RawDisplayHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

use crate::{PlatformError, Result};

/// Window configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDesc {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    pub vsync: bool,
}

impl Default for WindowDesc {
    fn default() -> Self {
        Self {
            title: "Cadence".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
            vsync: true,
        }
    }
}

impl WindowDesc {
    #[must_use]
    pub fn from_section(section: &WindowSection) -> Self {
        Self {
            title: section.title.clone(),
            width: section.width,
            height: section.height,
            resizable: true,
            vsync: section.vsync,
        }
    }

    /// winit attributes for this description.
    #[must_use]
    pub fn attributes(&self) -> WindowAttributes {
        Window::default_attributes()
            .with_title(&self.title)
            .with_inner_size(PhysicalSize::new(self.width.max(1), self.height.max(1)))
            .with_resizable(self.resizable)
    }

    /// Create the window on a running event loop.
    pub fn create(&self, event_loop: &ActiveEventLoop) -> Result<Window> {
        let window = event_loop
            .create_window(self.attributes())
            .map_err(|e| PlatformError::WindowCreation(e.to_string()))?;
        let (width, height) = client_size(&window);
        tracing::info!("Created window '{}' ({}x{})", self.title, width, height);
        Ok(window)
    }
}

/// Client-area size in physical pixels. Minimised windows report zero.
#[must_use]
pub fn client_size(window: &Window) -> (u32, u32) {
    let size = window.inner_size();
    (size.width, size.height)
}

/// Raw display handle, needed by Vulkan to pick surface extensions.
pub fn raw_display_handle(source: &impl HasDisplayHandle) -> Result<RawDisplayHandle> {
    source
        .display_handle()
        .map(|handle| handle.as_raw())
        .map_err(|e| PlatformError::WindowHandle(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desc_follows_config_section() {
        let section = WindowSection {
            title: "Sandbox".to_string(),
            width: 640,
            height: 480,
            vsync: false,
            ..WindowSection::default()
        };
        let desc = WindowDesc::from_section(&section);
        assert_eq!(desc.title, "Sandbox");
        assert_eq!((desc.width, desc.height), (640, 480));
        assert!(!desc.vsync);
        assert!(desc.resizable);
    }
}
