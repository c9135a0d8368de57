//! Window notifications consumed by the loop driver.

use winit::event::WindowEvent;

/// The subset of window events the render core reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowNotification {
    /// New client-area size in physical pixels. Either side may be zero.
    Resized { width: u32, height: u32 },
    CloseRequested,
    Focused(bool),
    Destroyed,
}

impl WindowNotification {
    /// Translate a winit event, ignoring everything the core does not need.
    #[must_use]
    pub fn from_window_event(event: &WindowEvent) -> Option<Self> {
        match event {
            WindowEvent::Resized(size) => Some(Self::Resized {
                width: size.width,
                height: size.height,
            }),
            WindowEvent::CloseRequested => Some(Self::CloseRequested),
            WindowEvent::Focused(focused) => Some(Self::Focused(*focused)),
            WindowEvent::Destroyed => Some(Self::Destroyed),
            _ => None,
        }
    }
}

/// Coalesces resize notifications between frames.
///
/// Windows can deliver many resizes per frame while a border is dragged; only
/// the last one is applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingResize {
    pending: Option<(u32, u32)>,
    coalesced: u32,
}

impl PendingResize {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: None,
            coalesced: 0,
        }
    }

    pub fn push(&mut self, width: u32, height: u32) {
        if self.pending.replace((width, height)).is_some() {
            self.coalesced += 1;
        }
    }

    /// Take the latest size, if any arrived since the last call.
    pub fn take(&mut self) -> Option<(u32, u32)> {
        self.pending.take()
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Resizes superseded before they were applied.
    #[must_use]
    pub const fn coalesced(&self) -> u32 {
        self.coalesced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn translates_core_events() {
        assert_eq!(
            WindowNotification::from_window_event(&WindowEvent::Resized(PhysicalSize::new(
                800, 0
            ))),
            Some(WindowNotification::Resized {
                width: 800,
                height: 0
            })
        );
        assert_eq!(
            WindowNotification::from_window_event(&WindowEvent::CloseRequested),
            Some(WindowNotification::CloseRequested)
        );
        assert_eq!(
            WindowNotification::from_window_event(&WindowEvent::Focused(false)),
            Some(WindowNotification::Focused(false))
        );
        assert_eq!(
            WindowNotification::from_window_event(&WindowEvent::RedrawRequested),
            None
        );
    }

    #[test]
    fn keeps_only_the_latest_resize() {
        let mut pending = PendingResize::new();
        assert_eq!(pending.take(), None);

        pending.push(100, 100);
        pending.push(200, 150);
        pending.push(300, 200);
        assert!(pending.is_pending());
        assert_eq!(pending.take(), Some((300, 200)));
        assert_eq!(pending.take(), None);
        assert_eq!(pending.coalesced(), 2);
    }
}
