//! [`GraphicsBackend`] over Vulkan 1.3.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ash::vk;
use cadence_core::BackendKind;
use glam::Mat4;
use gpu_allocator::MemoryLocation;
use raw_window_handle::RawDisplayHandle;

use super::device::VulkanDevice;
use super::memory::GpuBuffer;
use super::pipeline::{MeshPipeline, VIEW_PROJECTION_OFFSET, WORLD_OFFSET};
use super::swapchain::{color_range, depth_range, AcquiredImage, VulkanSurface};
use super::sync::SubmitSync;
use crate::backend::{AdapterInfo, FrameStats, GraphicsBackend, GraphicsConfig, ShaderSet};
use crate::context::RenderContext;
use crate::deferred::DeferredReleaseQueue;
use crate::draw::{record_draw_list, DrawRecorder, DrawStats};
use crate::error::{GpuError, Result};
use crate::hal::QueueType;
use crate::mesh::{GpuMesh, MeshData, MeshHandle, MeshInfo, MeshStore, RenderData};
use crate::surface::{ResizeOutcome, SurfaceDesc, SurfaceId, SurfaceInfo, SurfaceTarget};

struct VulkanMesh {
    vertices: GpuBuffer,
    indices: GpuBuffer,
    info: MeshInfo,
}

impl GpuMesh for VulkanMesh {
    fn info(&self) -> MeshInfo {
        self.info
    }
}

/// A surface taking part in the open frame.
struct FrameTarget {
    id: SurfaceId,
    image: AcquiredImage,
    extent: vk::Extent2D,
    format: vk::Format,
    depth_image: vk::Image,
    depth_view: vk::ImageView,
}

struct ActiveFrame {
    targets: Vec<FrameTarget>,
}

struct VulkanRecorder<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
    layout: vk::PipelineLayout,
    meshes: &'a MeshStore<VulkanMesh>,
}

impl DrawRecorder for VulkanRecorder<'_> {
    fn set_view_projection(&mut self, view_projection: &Mat4) {
        unsafe {
            self.device.cmd_push_constants(
                self.cmd,
                self.layout,
                vk::ShaderStageFlags::VERTEX,
                VIEW_PROJECTION_OFFSET,
                bytemuck::bytes_of(view_projection),
            );
        }
    }

    fn draw_mesh(&mut self, mesh: MeshHandle, world: &Mat4) -> Option<u32> {
        let mesh = self.meshes.get(mesh)?;
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.cmd, 0, &[mesh.vertices.handle()], &[0]);
            self.device.cmd_bind_index_buffer(
                self.cmd,
                mesh.indices.handle(),
                0,
                vk::IndexType::UINT32,
            );
            self.device.cmd_push_constants(
                self.cmd,
                self.layout,
                vk::ShaderStageFlags::VERTEX,
                WORLD_OFFSET,
                bytemuck::bytes_of(world),
            );
            self.device
                .cmd_draw_indexed(self.cmd, mesh.info.index_count, 1, 0, 0, 0);
        }
        Some(mesh.info.index_count)
    }
}

/// Vulkan implementation of the graphics facade.
///
/// Field order matters: every GPU object is dropped before the render
/// context and the device that created it.
pub struct VulkanBackend {
    surfaces: BTreeMap<SurfaceId, VulkanSurface>,
    meshes: MeshStore<VulkanMesh>,
    releases: DeferredReleaseQueue<VulkanMesh>,
    pipelines: HashMap<vk::Format, MeshPipeline>,
    shaders: Option<ShaderSet>,
    warned_no_pipeline: bool,
    clear_color: [f32; 4],
    next_surface: u32,
    frame: Option<ActiveFrame>,
    frame_index: u64,
    stats: FrameStats,
    shut_down: bool,
    context: RenderContext<VulkanDevice>,
    device: Arc<VulkanDevice>,
}

impl VulkanBackend {
    /// Create the device and render context.
    ///
    /// Without `display` no window surfaces can be created.
    pub fn new(config: &GraphicsConfig, display: Option<RawDisplayHandle>) -> Result<Self> {
        let device = Arc::new(VulkanDevice::new(
            &config.app_name,
            display,
            config.use_software_adapter,
            config.validation,
        )?);
        let context = RenderContext::new(
            Arc::clone(&device),
            config.frames_in_flight,
            QueueType::Graphics,
        )?;

        if config.mesh_shaders.is_none() {
            tracing::info!("No mesh shaders configured, frames will only clear");
        }

        Ok(Self {
            surfaces: BTreeMap::new(),
            meshes: MeshStore::new(),
            releases: DeferredReleaseQueue::new(),
            pipelines: HashMap::new(),
            shaders: config.mesh_shaders.clone(),
            warned_no_pipeline: false,
            clear_color: config.clear_color,
            next_surface: 0,
            frame: None,
            frame_index: 0,
            stats: FrameStats::default(),
            shut_down: false,
            context,
            device,
        })
    }

    fn ensure_live(&self) -> Result<()> {
        if self.shut_down {
            Err(GpuError::InvalidState("backend is shut down".into()))
        } else {
            Ok(())
        }
    }

    fn release_completed(&mut self) -> Result<()> {
        let completed = self.context.completed_value()?;
        let released = self.releases.collect(completed);
        if !released.is_empty() {
            tracing::debug!("Released {} meshes at fence {}", released.len(), completed);
        }
        Ok(())
    }

    /// Recreate swapchains flagged by acquire or present.
    fn rebuild_flagged(&mut self) -> Result<()> {
        let flagged: Vec<SurfaceId> = self
            .surfaces
            .iter()
            .filter(|(_, s)| s.needs_rebuild() && !s.state.is_suspended())
            .map(|(&id, _)| id)
            .collect();
        if flagged.is_empty() {
            return Ok(());
        }

        self.context.flush()?;
        self.device.wait_idle()?;

        for id in flagged {
            let Some(surface) = self.surfaces.get_mut(&id) else {
                continue;
            };
            let (width, height) = (surface.state.width(), surface.state.height());
            match surface.rebuild(&self.device, width, height) {
                Ok(()) => {
                    if let Some(format) = surface.format() {
                        ensure_pipeline(
                            &mut self.pipelines,
                            self.shaders.as_ref(),
                            &self.device,
                            format,
                        )?;
                    }
                }
                Err(GpuError::ZeroExtent { .. }) => {
                    tracing::debug!("Surface {:?} has no area, suspended", id);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn open_frame(&mut self, slot: usize) -> Result<ActiveFrame> {
        self.release_completed()?;

        let mut targets = Vec::with_capacity(self.surfaces.len());
        for (&id, surface) in &mut self.surfaces {
            if surface.state.is_suspended() {
                continue;
            }
            let (Some(extent), Some(format), Some(depth)) =
                (surface.extent(), surface.format(), surface.depth())
            else {
                continue;
            };
            let (depth_image, depth_view) = (depth.image(), depth.view());
            if let Some(image) = surface.acquire(slot)? {
                targets.push(FrameTarget {
                    id,
                    image,
                    extent,
                    format,
                    depth_image,
                    depth_view,
                });
            }
        }

        let device = self.device.device();
        let cmd = self.context.commands()?.raw();
        let clear_color = self.clear_color;
        for target in &targets {
            unsafe { record_clear(device, cmd, target, clear_color) };
        }
        Ok(ActiveFrame { targets })
    }
}

impl GraphicsBackend for VulkanBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn adapter_info(&self) -> &AdapterInfo {
        self.device.adapter()
    }

    fn frames_in_flight(&self) -> usize {
        self.context.frames_in_flight()
    }

    fn create_surface(&mut self, desc: &SurfaceDesc<'_>) -> Result<SurfaceId> {
        self.ensure_live()?;
        let SurfaceTarget::Window(window) = desc.target else {
            return Err(GpuError::SurfaceCreation(
                "Vulkan surfaces need a window".to_string(),
            ));
        };

        let surface = VulkanSurface::new(
            &self.device,
            window,
            desc.width,
            desc.height,
            desc.vsync,
            self.context.frames_in_flight(),
        )?;
        if let Some(format) = surface.format() {
            ensure_pipeline(
                &mut self.pipelines,
                self.shaders.as_ref(),
                &self.device,
                format,
            )?;
        }

        let id = SurfaceId::from_raw(self.next_surface);
        self.next_surface += 1;
        tracing::debug!(
            "Created Vulkan surface {:?} ({}x{})",
            id,
            surface.state.width(),
            surface.state.height()
        );
        self.surfaces.insert(id, surface);
        Ok(id)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) -> Result<()> {
        self.ensure_live()?;
        if self
            .frame
            .as_ref()
            .is_some_and(|frame| frame.targets.iter().any(|t| t.id == surface))
        {
            return Err(GpuError::InvalidState(format!(
                "surface {surface:?} is part of the open frame"
            )));
        }
        if !self.surfaces.contains_key(&surface) {
            return Err(GpuError::SurfaceNotFound(surface));
        }
        self.context.flush()?;
        self.device.wait_idle()?;
        self.surfaces.remove(&surface);
        Ok(())
    }

    fn resize_surface(
        &mut self,
        surface: SurfaceId,
        width: u32,
        height: u32,
    ) -> Result<ResizeOutcome> {
        self.ensure_live()?;
        let in_frame = self.frame.is_some();
        let entry = self
            .surfaces
            .get_mut(&surface)
            .ok_or(GpuError::SurfaceNotFound(surface))?;
        let outcome = entry.state.request_resize(width, height)?;
        if outcome == ResizeOutcome::Unchanged {
            return Ok(outcome);
        }
        if in_frame {
            return Err(GpuError::InvalidState(
                "cannot resize during a frame".into(),
            ));
        }

        self.context.flush()?;
        self.device.wait_idle()?;
        entry.rebuild(&self.device, width, height)?;
        if let Some(format) = entry.format() {
            ensure_pipeline(
                &mut self.pipelines,
                self.shaders.as_ref(),
                &self.device,
                format,
            )?;
        }

        tracing::debug!(
            "Resized Vulkan surface {:?} to {}x{}",
            surface,
            entry.state.width(),
            entry.state.height()
        );
        Ok(ResizeOutcome::Resized {
            width: entry.state.width(),
            height: entry.state.height(),
        })
    }

    fn surface_info(&self, surface: SurfaceId) -> Result<SurfaceInfo> {
        self.surfaces
            .get(&surface)
            .map(|s| s.state.info(surface))
            .ok_or(GpuError::SurfaceNotFound(surface))
    }

    fn load_meshes(&mut self, meshes: &[MeshData]) -> Result<Vec<MeshHandle>> {
        self.ensure_live()?;
        for mesh in meshes {
            mesh.validate()?;
        }

        let allocator = self.device.allocator();
        let mut uploaded = Vec::with_capacity(meshes.len());
        for mesh in meshes {
            let vertex_bytes = mesh.vertex_bytes();
            let index_bytes = mesh.index_bytes();

            let mut vertices = allocator.create_buffer(
                vertex_bytes.len() as u64,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                MemoryLocation::CpuToGpu,
                "mesh vertices",
            )?;
            vertices.write_bytes(vertex_bytes)?;

            let mut indices = allocator.create_buffer(
                index_bytes.len() as u64,
                vk::BufferUsageFlags::INDEX_BUFFER,
                MemoryLocation::CpuToGpu,
                "mesh indices",
            )?;
            indices.write_bytes(index_bytes)?;

            uploaded.push(VulkanMesh {
                vertices,
                indices,
                info: MeshInfo {
                    vertex_count: mesh.vertices.len() as u32,
                    index_count: mesh.indices.len() as u32,
                },
            });
        }

        Ok(uploaded
            .into_iter()
            .map(|mesh| self.meshes.insert(mesh))
            .collect())
    }

    fn free_mesh(&mut self, mesh: MeshHandle) -> Result<()> {
        self.ensure_live()?;
        let resource = self
            .meshes
            .remove(mesh)
            .ok_or(GpuError::MeshNotFound(mesh))?;
        self.releases
            .queue(resource, self.context.submitted_value());
        Ok(())
    }

    fn mesh_info(&self, mesh: MeshHandle) -> Result<MeshInfo> {
        self.meshes
            .get(mesh)
            .map(GpuMesh::info)
            .ok_or(GpuError::MeshNotFound(mesh))
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn begin_frame(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.frame.is_some() {
            return Err(GpuError::InvalidState("frame already begun".into()));
        }

        self.rebuild_flagged()?;

        let slot = (self.frame_index % self.context.frames_in_flight() as u64) as usize;
        self.context.begin_recording(slot)?;

        match self.open_frame(slot) {
            Ok(frame) => {
                self.frame = Some(frame);
                self.stats.frames_begun += 1;
                Ok(())
            }
            Err(err) => {
                if let Err(abandon_err) = self.context.abandon() {
                    tracing::warn!("Failed to abandon frame: {}", abandon_err);
                }
                // Acquired images were never presented.
                for surface in self.surfaces.values_mut() {
                    surface.mark_for_rebuild();
                }
                self.stats.frames_abandoned += 1;
                Err(err)
            }
        }
    }

    fn render(
        &mut self,
        surfaces: &[SurfaceId],
        draws: &[RenderData<'_>],
        view_projection: &Mat4,
    ) -> Result<DrawStats> {
        let Some(frame) = self.frame.as_ref() else {
            return Err(GpuError::InvalidState("render outside a frame".into()));
        };

        let device = self.device.device();
        let cmd = self.context.commands()?.raw();

        let mut total = DrawStats::default();
        for &id in surfaces {
            let surface = self
                .surfaces
                .get(&id)
                .ok_or(GpuError::SurfaceNotFound(id))?;
            let Some(target) = frame.targets.iter().find(|t| t.id == id) else {
                total.merge(DrawStats::all_skipped(draws.len()));
                continue;
            };
            let Some(pipeline) = self.pipelines.get(&target.format) else {
                if !self.warned_no_pipeline && !draws.is_empty() {
                    tracing::warn!("No mesh pipeline, skipping draws");
                    self.warned_no_pipeline = true;
                }
                total.merge(DrawStats::all_skipped(draws.len()));
                continue;
            };

            let viewport = surface.state.viewport();
            let scissor = surface.state.scissor();
            unsafe {
                begin_rendering(device, cmd, target, vk::AttachmentLoadOp::LOAD, [0.0; 4]);
                device.cmd_set_viewport(
                    cmd,
                    0,
                    &[vk::Viewport {
                        x: viewport.x,
                        y: viewport.y,
                        width: viewport.width,
                        height: viewport.height,
                        min_depth: viewport.min_depth,
                        max_depth: viewport.max_depth,
                    }],
                );
                device.cmd_set_scissor(
                    cmd,
                    0,
                    &[vk::Rect2D {
                        offset: vk::Offset2D {
                            x: scissor.left,
                            y: scissor.top,
                        },
                        extent: vk::Extent2D {
                            width: (scissor.right - scissor.left).max(0) as u32,
                            height: (scissor.bottom - scissor.top).max(0) as u32,
                        },
                    }],
                );
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.raw());
            }

            let mut recorder = VulkanRecorder {
                device,
                cmd,
                layout: pipeline.layout(),
                meshes: &self.meshes,
            };
            total.merge(record_draw_list(&mut recorder, draws, view_projection));

            unsafe { device.cmd_end_rendering(cmd) };
        }

        self.stats.record_draws(total);
        Ok(total)
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn end_frame(&mut self) -> Result<()> {
        let Some(frame) = self.frame.take() else {
            return Err(GpuError::InvalidState("end_frame without begin_frame".into()));
        };

        let device = Arc::clone(&self.device);
        let cmd = self.context.commands()?.raw();
        let barriers: Vec<_> = frame
            .targets
            .iter()
            .map(|target| {
                vk::ImageMemoryBarrier2::default()
                    .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                    .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                    .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE)
                    .dst_access_mask(vk::AccessFlags2::NONE)
                    .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                    .image(target.image.image)
                    .subresource_range(color_range())
            })
            .collect();
        if !barriers.is_empty() {
            let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
            unsafe { device.device().cmd_pipeline_barrier2(cmd, &dependency) };
        }

        let sync = SubmitSync {
            wait: frame.targets.iter().map(|t| t.image.wait).collect(),
            signal: frame.targets.iter().map(|t| t.image.signal).collect(),
        };
        if let Err(err) = self.context.submit(&sync) {
            self.stats.frames_abandoned += 1;
            for target in &frame.targets {
                if let Some(surface) = self.surfaces.get_mut(&target.id) {
                    surface.mark_for_rebuild();
                }
            }
            return Err(err);
        }
        self.frame_index += 1;
        self.stats.frames_submitted += 1;

        let (_, queue) = device.queue(QueueType::Graphics);
        let mut result = Ok(());
        for target in &frame.targets {
            let Some(surface) = self.surfaces.get_mut(&target.id) else {
                continue;
            };
            match surface.present(queue, &target.image) {
                Ok(()) => self.stats.presents += 1,
                Err(err) => {
                    tracing::warn!("Present to {:?} failed: {}", target.id, err);
                    result = Err(err);
                }
            }
        }
        result
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.context.flush()?;
        self.release_completed()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        if self.frame.take().is_some() {
            self.context.abandon()?;
            self.stats.frames_abandoned += 1;
        }
        self.context.flush()?;
        self.device.wait_idle()?;

        let released = self.releases.drain().len() + self.meshes.drain().len();
        self.surfaces.clear();
        self.pipelines.clear();
        self.shut_down = true;

        tracing::info!("Vulkan backend shut down ({} meshes released)", released);
        Ok(())
    }

    fn frame_stats(&self) -> FrameStats {
        FrameStats {
            stalls: self.context.stall_count(),
            submitted_value: self.context.submitted_value(),
            completed_value: self.context.completed_value().unwrap_or_default(),
            pending_releases: self.releases.pending_count(),
            ..self.stats
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!("Vulkan backend shutdown failed: {}", err);
        }
    }
}

/// Build the pipeline for `format` if shaders are configured and it is missing.
fn ensure_pipeline(
    pipelines: &mut HashMap<vk::Format, MeshPipeline>,
    shaders: Option<&ShaderSet>,
    device: &VulkanDevice,
    format: vk::Format,
) -> Result<()> {
    let Some(shaders) = shaders else {
        return Ok(());
    };
    if !pipelines.contains_key(&format) {
        let pipeline = MeshPipeline::new(Arc::clone(device.device()), shaders, format)?;
        tracing::debug!("Created mesh pipeline for {:?}", format);
        pipelines.insert(format, pipeline);
    }
    Ok(())
}

/// Move the back buffer and depth image to attachment layouts and clear them.
///
/// # Safety
/// `cmd` must be recording and the target images must be acquired.
unsafe fn record_clear(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    target: &FrameTarget,
    clear_color: [f32; 4],
) {
    let barriers = [
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .image(target.image.image)
            .subresource_range(color_range()),
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS)
            .src_access_mask(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS)
            .dst_access_mask(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .image(target.depth_image)
            .subresource_range(depth_range()),
    ];
    let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
    device.cmd_pipeline_barrier2(cmd, &dependency);

    begin_rendering(device, cmd, target, vk::AttachmentLoadOp::CLEAR, clear_color);
    device.cmd_end_rendering(cmd);
}

/// # Safety
/// `cmd` must be recording and the target images must be in attachment layouts.
unsafe fn begin_rendering(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    target: &FrameTarget,
    load_op: vk::AttachmentLoadOp,
    clear_color: [f32; 4],
) {
    let color_attachments = [vk::RenderingAttachmentInfo::default()
        .image_view(target.image.view)
        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .load_op(load_op)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        })];
    let depth_attachment = vk::RenderingAttachmentInfo::default()
        .image_view(target.depth_view)
        .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
        .load_op(load_op)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        });

    let rendering_info = vk::RenderingInfo::default()
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        })
        .layer_count(1)
        .color_attachments(&color_attachments)
        .depth_attachment(&depth_attachment);
    device.cmd_begin_rendering(cmd, &rendering_info);
}
