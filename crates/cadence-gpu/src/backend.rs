//! Graphics facade.
//!
//! The rest of the engine only sees `Box<dyn GraphicsBackend>`. The concrete
//! backend is picked once at startup by [`create_backend`] and never changes.

use std::path::Path;

use cadence_core::{BackendKind, GraphicsSection};
use glam::Mat4;
use raw_window_handle::RawDisplayHandle;

use crate::draw::DrawStats;
use crate::error::Result;
use crate::headless::{GpuTimeline, HeadlessBackend};
use crate::mesh::{MeshData, MeshHandle, MeshInfo, RenderData};
use crate::surface::{ResizeOutcome, SurfaceDesc, SurfaceId, SurfaceInfo};

/// Precompiled bytecode for the mesh pipeline.
///
/// SPIR-V for Vulkan, DXIL or DXBC for D3D12.
#[derive(Clone, PartialEq, Eq)]
pub struct ShaderSet {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

impl std::fmt::Debug for ShaderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderSet")
            .field("vertex", &format_args!("{} bytes", self.vertex.len()))
            .field("fragment", &format_args!("{} bytes", self.fragment.len()))
            .finish()
    }
}

impl ShaderSet {
    /// Read both stages from disk.
    pub fn load(vertex: &Path, fragment: &Path) -> cadence_core::Result<Self> {
        Ok(Self {
            vertex: std::fs::read(vertex)?,
            fragment: std::fs::read(fragment)?,
        })
    }
}

/// Backend construction parameters.
#[derive(Debug, Clone)]
pub struct GraphicsConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Frames the CPU may record ahead of the GPU; also the back-buffer count.
    pub frames_in_flight: usize,
    /// Prefer a software adapter.
    pub use_software_adapter: bool,
    /// Enable API validation layers.
    pub validation: bool,
    /// Back-buffer clear color.
    pub clear_color: [f32; 4],
    /// Mesh pipeline bytecode. Without it frames only clear and present.
    pub mesh_shaders: Option<ShaderSet>,
    /// Simulated GPU behaviour for the headless backend.
    pub headless_timeline: GpuTimeline,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            app_name: "Cadence".to_string(),
            frames_in_flight: 2,
            use_software_adapter: false,
            validation: cfg!(debug_assertions),
            clear_color: [0.05, 0.05, 0.08, 1.0],
            mesh_shaders: None,
            headless_timeline: GpuTimeline::Immediate,
        }
    }
}

impl GraphicsConfig {
    /// Build from the `[graphics]` config section, loading shader files.
    pub fn from_section(
        app_name: impl Into<String>,
        section: &GraphicsSection,
    ) -> cadence_core::Result<Self> {
        let mesh_shaders = match (&section.vertex_shader, &section.fragment_shader) {
            (Some(vertex), Some(fragment)) => Some(ShaderSet::load(vertex, fragment)?),
            _ => None,
        };

        Ok(Self {
            app_name: app_name.into(),
            frames_in_flight: section.frames_in_flight,
            use_software_adapter: section.use_software_adapter,
            validation: section.validation,
            clear_color: section.clear_color,
            mesh_shaders,
            headless_timeline: GpuTimeline::Immediate,
        })
    }

    #[must_use]
    pub const fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    #[must_use]
    pub const fn with_software_adapter(mut self, software: bool) -> Self {
        self.use_software_adapter = software;
        self
    }

    #[must_use]
    pub fn with_mesh_shaders(mut self, shaders: ShaderSet) -> Self {
        self.mesh_shaders = Some(shaders);
        self
    }

    #[must_use]
    pub const fn with_headless_timeline(mut self, timeline: GpuTimeline) -> Self {
        self.headless_timeline = timeline;
        self
    }
}

/// Descriptor handle increment sizes (D3D12 only).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorSizes {
    pub cbv_srv_uav: u32,
    pub rtv: u32,
    pub dsv: u32,
    pub sampler: u32,
}

/// The adapter a backend runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    /// Software rasterizer (WARP, lavapipe, headless).
    pub software: bool,
    /// API version or feature level, for logs.
    pub api_version: String,
    /// `None` on APIs without fixed descriptor strides.
    pub descriptor_sizes: Option<DescriptorSizes>,
}

/// Running counters since the backend was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Successful `begin_frame` calls.
    pub frames_begun: u64,
    /// Frames submitted by `end_frame`.
    pub frames_submitted: u64,
    /// Frames begun but never submitted.
    pub frames_abandoned: u64,
    /// Individual surface presents.
    pub presents: u64,
    /// Times `begin_frame` blocked on the fence.
    pub stalls: u64,
    /// Draws recorded.
    pub draws: u64,
    /// Draws skipped.
    pub skipped_draws: u64,
    /// Last fence value handed to the GPU.
    pub submitted_value: u64,
    /// Last fence value the GPU completed.
    pub completed_value: u64,
    /// Meshes waiting on the fence before release.
    pub pending_releases: usize,
}

impl FrameStats {
    pub(crate) fn record_draws(&mut self, stats: DrawStats) {
        self.draws += u64::from(stats.draws);
        self.skipped_draws += u64::from(stats.skipped);
    }
}

/// Backend-agnostic rendering interface.
///
/// A frame is `begin_frame`, any number of `render` calls, then `end_frame`.
/// When `begin_frame` returns `Ok` the caller must call `end_frame`, even if
/// a `render` call in between failed. When `begin_frame` fails the backend
/// has already abandoned the frame.
pub trait GraphicsBackend {
    /// Which API this backend drives.
    fn kind(&self) -> BackendKind;

    /// The selected adapter.
    fn adapter_info(&self) -> &AdapterInfo;

    /// Frames in flight fixed at creation.
    fn frames_in_flight(&self) -> usize;

    /// Create a swapchain for a window (or an offscreen target on headless).
    fn create_surface(&mut self, desc: &SurfaceDesc<'_>) -> Result<SurfaceId>;

    /// Flush and release a surface.
    fn destroy_surface(&mut self, surface: SurfaceId) -> Result<()>;

    /// Resize a surface's back buffers.
    ///
    /// Zero sizes suspend the surface and fail with [`GpuError::ZeroExtent`](crate::GpuError::ZeroExtent).
    /// The current size is a no-op.
    fn resize_surface(&mut self, surface: SurfaceId, width: u32, height: u32)
        -> Result<ResizeOutcome>;

    /// Snapshot of a surface.
    fn surface_info(&self, surface: SurfaceId) -> Result<SurfaceInfo>;

    /// Upload meshes. Fails without uploading anything if any mesh is invalid.
    fn load_meshes(&mut self, meshes: &[MeshData]) -> Result<Vec<MeshHandle>>;

    /// Release a mesh once the GPU is done with every frame that used it.
    fn free_mesh(&mut self, mesh: MeshHandle) -> Result<()>;

    /// Counts for a live mesh.
    fn mesh_info(&self, mesh: MeshHandle) -> Result<MeshInfo>;

    /// Wait for the next frame slot, acquire back buffers and clear them.
    fn begin_frame(&mut self) -> Result<()>;

    /// Record `draws` into each of `surfaces`.
    fn render(
        &mut self,
        surfaces: &[SurfaceId],
        draws: &[RenderData<'_>],
        view_projection: &Mat4,
    ) -> Result<DrawStats>;

    /// Submit the frame and present every acquired surface.
    fn end_frame(&mut self) -> Result<()>;

    /// Block until the GPU has finished all submitted work.
    fn flush(&mut self) -> Result<()>;

    /// Flush and release everything. Safe to call more than once.
    fn shutdown(&mut self) -> Result<()>;

    /// Running counters.
    fn frame_stats(&self) -> FrameStats;
}

/// Construct the backend for `kind`.
///
/// `display` is needed by Vulkan to enable the platform surface extensions;
/// without it the device can only render offscreen.
pub fn create_backend(
    kind: BackendKind,
    config: &GraphicsConfig,
    display: Option<RawDisplayHandle>,
) -> Result<Box<dyn GraphicsBackend>> {
    tracing::info!(
        "Creating {} backend ({} frames in flight{})",
        kind,
        config.frames_in_flight,
        if config.use_software_adapter {
            ", software adapter"
        } else {
            ""
        }
    );

    match kind {
        BackendKind::Headless => Ok(Box::new(HeadlessBackend::new(config)?)),
        BackendKind::Vulkan => Ok(Box::new(crate::vulkan::VulkanBackend::new(config, display)?)),
        #[cfg(windows)]
        BackendKind::D3d12 => Ok(Box::new(crate::d3d12::D3d12Backend::new(config)?)),
        #[cfg(not(windows))]
        BackendKind::D3d12 => Err(crate::error::GpuError::BackendUnavailable(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;

    #[test]
    fn section_without_shaders_has_no_pipeline() {
        let section = GraphicsSection {
            frames_in_flight: 3,
            ..GraphicsSection::default()
        };
        let config = GraphicsConfig::from_section("test", &section).unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert!(config.mesh_shaders.is_none());
        assert_eq!(config.app_name, "test");
    }

    #[test]
    fn missing_shader_file_is_an_io_error() {
        let section = GraphicsSection {
            vertex_shader: Some("does/not/exist.vert.spv".into()),
            fragment_shader: Some("does/not/exist.frag.spv".into()),
            ..GraphicsSection::default()
        };
        assert!(matches!(
            GraphicsConfig::from_section("test", &section),
            Err(cadence_core::Error::Io(_))
        ));
    }

    #[test]
    fn factory_builds_headless() {
        let backend = create_backend(BackendKind::Headless, &GraphicsConfig::default(), None)
            .unwrap();
        assert_eq!(backend.kind(), BackendKind::Headless);
        assert_eq!(backend.frames_in_flight(), 2);
        assert!(backend.adapter_info().software);
    }

    #[cfg(not(windows))]
    #[test]
    fn d3d12_is_unavailable_off_windows() {
        let result = create_backend(BackendKind::D3d12, &GraphicsConfig::default(), None);
        assert!(matches!(
            result,
            Err(GpuError::BackendUnavailable(BackendKind::D3d12))
        ));
    }
}
