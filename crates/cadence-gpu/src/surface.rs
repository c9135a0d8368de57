//! Presentation surfaces.
//!
//! Backend-neutral bookkeeping for a swapchain: extent, back-buffer count,
//! viewport and scissor, and the suspended flag used while a window has a
//! zero-sized client area. Each backend pairs a [`SurfaceState`] with its own
//! swapchain objects.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{GpuError, Result};

/// Identifies a surface within one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u32);

impl SurfaceId {
    /// Wrap a raw index.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw index.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Anything that can hand out raw window and display handles.
pub trait WindowHandleSource: HasWindowHandle + HasDisplayHandle {}

impl<T: HasWindowHandle + HasDisplayHandle + ?Sized> WindowHandleSource for T {}

/// What a surface presents to.
#[derive(Clone, Copy)]
pub enum SurfaceTarget<'a> {
    /// A native window.
    Window(&'a dyn WindowHandleSource),
    /// No window; only the headless backend accepts this.
    Offscreen,
}

impl std::fmt::Debug for SurfaceTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Window(_) => f.write_str("Window"),
            Self::Offscreen => f.write_str("Offscreen"),
        }
    }
}

/// Parameters for `create_surface`.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceDesc<'a> {
    /// Presentation target.
    pub target: SurfaceTarget<'a>,
    /// Client-area width in pixels.
    pub width: u32,
    /// Client-area height in pixels.
    pub height: u32,
    /// Present with vertical sync.
    pub vsync: bool,
}

impl<'a> SurfaceDesc<'a> {
    /// Describe a window surface.
    #[must_use]
    pub fn window(window: &'a dyn WindowHandleSource, width: u32, height: u32, vsync: bool) -> Self {
        Self {
            target: SurfaceTarget::Window(window),
            width,
            height,
            vsync,
        }
    }

    /// Describe an offscreen surface.
    #[must_use]
    pub const fn offscreen(width: u32, height: u32) -> Self {
        Self {
            target: SurfaceTarget::Offscreen,
            width,
            height,
            vsync: false,
        }
    }
}

/// Viewport in pixels with a depth range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-surface viewport with depth `[0, 1]`.
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    /// Full-surface scissor.
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: i32::try_from(width).unwrap_or(i32::MAX),
            bottom: i32::try_from(height).unwrap_or(i32::MAX),
        }
    }
}

/// What a resize request requires of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// Same size as before; nothing was recreated.
    Unchanged,
    /// Back buffers were recreated at the new size.
    Resized { width: u32, height: u32 },
}

/// How a frame should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentRequest {
    /// Wait for vertical blank.
    Vsync,
    /// Present immediately, tearing if the backend allows it.
    Immediate { allow_tearing: bool },
}

/// Pick the present path for the vsync preference and tearing support.
#[must_use]
pub const fn present_request(vsync: bool, tearing_supported: bool) -> PresentRequest {
    if vsync {
        PresentRequest::Vsync
    } else {
        PresentRequest::Immediate {
            allow_tearing: tearing_supported,
        }
    }
}

/// Snapshot of a surface for callers above the facade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceInfo {
    pub id: SurfaceId,
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub viewport: Viewport,
    pub scissor: ScissorRect,
    pub vsync: bool,
    pub suspended: bool,
}

/// Backend-neutral surface state.
#[derive(Debug, Clone)]
pub struct SurfaceState {
    width: u32,
    height: u32,
    buffer_count: u32,
    vsync: bool,
    suspended: bool,
    /// Buffers were released and never recreated.
    stale: bool,
    viewport: Viewport,
    scissor: ScissorRect,
}

impl SurfaceState {
    /// Create state for a new swapchain. Zero dimensions are clamped to 1.
    #[must_use]
    pub fn new(width: u32, height: u32, buffer_count: u32, vsync: bool) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            buffer_count,
            vsync,
            suspended: false,
            stale: false,
            viewport: Viewport::full(width, height),
            scissor: ScissorRect::full(width, height),
        }
    }

    /// Decide what a resize to `width`x`height` needs.
    ///
    /// A zero dimension suspends the surface and returns
    /// [`GpuError::ZeroExtent`]; the back buffers are left untouched. The
    /// current size resumes a suspended surface without recreating anything,
    /// unless the surface was invalidated.
    pub fn request_resize(&mut self, width: u32, height: u32) -> Result<ResizeOutcome> {
        if width == 0 || height == 0 {
            self.suspended = true;
            return Err(GpuError::ZeroExtent { width, height });
        }

        if width == self.width && height == self.height && !self.stale {
            self.suspended = false;
            return Ok(ResizeOutcome::Unchanged);
        }

        Ok(ResizeOutcome::Resized { width, height })
    }

    /// Record the extent and buffer count of a recreated swapchain.
    pub fn apply_resize(&mut self, width: u32, height: u32, buffer_count: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.buffer_count = buffer_count;
        self.viewport = Viewport::full(self.width, self.height);
        self.scissor = ScissorRect::full(self.width, self.height);
        self.suspended = false;
        self.stale = false;
    }

    /// Stop rendering to this surface until the next successful resize.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Suspend after the back buffers were lost; any non-zero resize,
    /// including one to the current size, must recreate them.
    pub fn invalidate(&mut self) {
        self.suspended = true;
        self.stale = true;
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub const fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    pub const fn vsync(&self) -> bool {
        self.vsync
    }

    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub const fn scissor(&self) -> ScissorRect {
        self.scissor
    }

    /// Build the public snapshot.
    #[must_use]
    pub const fn info(&self, id: SurfaceId) -> SurfaceInfo {
        SurfaceInfo {
            id,
            width: self.width,
            height: self.height,
            buffer_count: self.buffer_count,
            viewport: self.viewport,
            scissor: self.scissor,
            vsync: self.vsync,
            suspended: self.suspended,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_size_creation_is_clamped() {
        let state = SurfaceState::new(0, 0, 2, true);
        assert_eq!((state.width(), state.height()), (1, 1));
        assert_eq!(state.scissor().right, 1);
    }

    #[test]
    fn zero_resize_suspends_without_touching_buffers() {
        let mut state = SurfaceState::new(800, 600, 3, false);
        let err = state.request_resize(0, 600).unwrap_err();
        assert!(matches!(err, GpuError::ZeroExtent { width: 0, .. }));
        assert!(state.is_suspended());
        assert_eq!(state.buffer_count(), 3);
        assert_eq!(state.width(), 800);

        assert_eq!(
            state.request_resize(800, 600).unwrap(),
            ResizeOutcome::Unchanged
        );
        assert!(!state.is_suspended());
    }

    #[test]
    fn same_size_is_unchanged() {
        let mut state = SurfaceState::new(640, 480, 2, true);
        let before = state.info(SurfaceId::from_raw(0));
        assert_eq!(
            state.request_resize(640, 480).unwrap(),
            ResizeOutcome::Unchanged
        );
        assert_eq!(state.info(SurfaceId::from_raw(0)), before);
    }

    #[test]
    fn apply_resize_updates_viewport() {
        let mut state = SurfaceState::new(640, 480, 2, true);
        assert_eq!(
            state.request_resize(1024, 768).unwrap(),
            ResizeOutcome::Resized {
                width: 1024,
                height: 768
            }
        );
        state.apply_resize(1024, 768, 2);
        let viewport = state.viewport();
        assert_relative_eq!(viewport.width, 1024.0);
        assert_relative_eq!(viewport.height, 768.0);
        assert_relative_eq!(viewport.max_depth, 1.0);
        assert_eq!(state.scissor().bottom, 768);
    }

    #[test]
    fn invalidated_surface_rebuilds_at_same_size() {
        let mut state = SurfaceState::new(640, 480, 2, true);
        state.invalidate();
        assert!(state.is_suspended());

        assert_eq!(
            state.request_resize(640, 480).unwrap(),
            ResizeOutcome::Resized {
                width: 640,
                height: 480
            }
        );
        assert!(state.is_suspended());

        state.apply_resize(640, 480, 2);
        assert!(!state.is_suspended());
        assert_eq!(
            state.request_resize(640, 480).unwrap(),
            ResizeOutcome::Unchanged
        );
    }

    #[test]
    fn present_path_selection() {
        assert_eq!(present_request(true, true), PresentRequest::Vsync);
        assert_eq!(
            present_request(false, true),
            PresentRequest::Immediate {
                allow_tearing: true
            }
        );
        assert_eq!(
            present_request(false, false),
            PresentRequest::Immediate {
                allow_tearing: false
            }
        );
    }
}
