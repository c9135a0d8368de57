//! Frame submission pipeline and graphics backends for the Cadence engine.
//!
//! This crate provides:
//! - A backend-agnostic [`RenderContext`] that rotates command allocators
//!   behind a timeline fence
//! - The [`GraphicsBackend`] facade with Vulkan, Direct3D 12 and headless
//!   implementations
//! - Surface, mesh and deferred-release bookkeeping shared by every backend

pub mod backend;
pub mod context;
pub mod deferred;
pub mod draw;
pub mod error;
pub mod hal;
pub mod headless;
pub mod mesh;
pub mod surface;
pub mod vulkan;

#[cfg(windows)]
pub mod d3d12;

pub use backend::{
    create_backend, AdapterInfo, DescriptorSizes, FrameStats, GraphicsBackend, GraphicsConfig,
    ShaderSet,
};
pub use context::{RenderContext, RenderContextState};
pub use deferred::DeferredReleaseQueue;
pub use draw::{record_draw_list, DrawRecorder, DrawStats};
pub use error::{GpuError, Result};
pub use hal::{CommandDevice, GpuFence, QueueType};
pub use headless::{
    BufferState, GpuTimeline, HeadlessBackend, HeadlessCommand, HeadlessDevice, HeadlessFence,
    HeadlessProbe,
};
pub use mesh::{MeshData, MeshHandle, MeshInfo, RenderData, Vertex};
pub use surface::{
    ResizeOutcome, ScissorRect, SurfaceDesc, SurfaceId, SurfaceInfo, SurfaceTarget, Viewport,
    WindowHandleSource,
};
