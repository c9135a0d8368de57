//! [`GraphicsBackend`] over Direct3D 12.

use std::collections::BTreeMap;
use std::sync::Arc;

use cadence_core::BackendKind;
use glam::Mat4;
use windows::Win32::Foundation::RECT;
use windows::Win32::Graphics::Direct3D::D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST;
use windows::Win32::Graphics::Direct3D12::{
    ID3D12GraphicsCommandList, ID3D12Resource, D3D12_CLEAR_FLAG_DEPTH, D3D12_INDEX_BUFFER_VIEW,
    D3D12_RESOURCE_STATE_PRESENT, D3D12_RESOURCE_STATE_RENDER_TARGET, D3D12_VERTEX_BUFFER_VIEW,
};
use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_R32_UINT;

use super::device::D3d12Device;
use super::pipeline::{MeshPipeline, VIEW_PROJECTION_OFFSET, WORLD_OFFSET};
use super::resource::{transition, upload_buffer};
use super::swapchain::D3d12Surface;
use crate::backend::{AdapterInfo, FrameStats, GraphicsBackend, GraphicsConfig};
use crate::context::RenderContext;
use crate::deferred::DeferredReleaseQueue;
use crate::draw::{record_draw_list, DrawRecorder, DrawStats};
use crate::error::{GpuError, Result};
use crate::hal::QueueType;
use crate::mesh::{GpuMesh, MeshData, MeshHandle, MeshInfo, MeshStore, RenderData, Vertex};
use crate::surface::{ResizeOutcome, SurfaceDesc, SurfaceId, SurfaceInfo, SurfaceTarget};

struct D3d12Mesh {
    // Views point into these; they must live as long as the mesh.
    _vertices: ID3D12Resource,
    _indices: ID3D12Resource,
    vertex_view: D3D12_VERTEX_BUFFER_VIEW,
    index_view: D3D12_INDEX_BUFFER_VIEW,
    info: MeshInfo,
}

impl GpuMesh for D3d12Mesh {
    fn info(&self) -> MeshInfo {
        self.info
    }
}

struct FrameTarget {
    id: SurfaceId,
    back_buffer: u32,
}

struct ActiveFrame {
    targets: Vec<FrameTarget>,
}

struct D3d12Recorder<'a> {
    list: &'a ID3D12GraphicsCommandList,
    meshes: &'a MeshStore<D3d12Mesh>,
}

impl DrawRecorder for D3d12Recorder<'_> {
    fn set_view_projection(&mut self, view_projection: &Mat4) {
        let values = view_projection.to_cols_array();
        unsafe {
            self.list.SetGraphicsRoot32BitConstants(
                0,
                16,
                values.as_ptr().cast(),
                VIEW_PROJECTION_OFFSET,
            );
        }
    }

    fn draw_mesh(&mut self, mesh: MeshHandle, world: &Mat4) -> Option<u32> {
        let mesh = self.meshes.get(mesh)?;
        let values = world.to_cols_array();
        unsafe {
            self.list.IASetVertexBuffers(0, Some(&[mesh.vertex_view]));
            self.list.IASetIndexBuffer(Some(&mesh.index_view));
            self.list
                .SetGraphicsRoot32BitConstants(0, 16, values.as_ptr().cast(), WORLD_OFFSET);
            self.list
                .DrawIndexedInstanced(mesh.info.index_count, 1, 0, 0, 0);
        }
        Some(mesh.info.index_count)
    }
}

/// Direct3D 12 implementation of the graphics facade.
///
/// GPU objects are declared before the context and device so they are
/// released first.
pub struct D3d12Backend {
    surfaces: BTreeMap<SurfaceId, D3d12Surface>,
    meshes: MeshStore<D3d12Mesh>,
    releases: DeferredReleaseQueue<D3d12Mesh>,
    pipeline: Option<MeshPipeline>,
    warned_no_pipeline: bool,
    clear_color: [f32; 4],
    next_surface: u32,
    frame: Option<ActiveFrame>,
    frame_index: u64,
    stats: FrameStats,
    shut_down: bool,
    context: RenderContext<D3d12Device>,
    device: Arc<D3d12Device>,
}

impl D3d12Backend {
    pub fn new(config: &GraphicsConfig) -> Result<Self> {
        let device = Arc::new(D3d12Device::new(
            config.use_software_adapter,
            config.validation,
        )?);
        let context = RenderContext::new(
            Arc::clone(&device),
            config.frames_in_flight,
            QueueType::Graphics,
        )?;

        let pipeline = match &config.mesh_shaders {
            Some(shaders) => Some(MeshPipeline::new(device.raw(), shaders)?),
            None => {
                tracing::info!("No mesh shaders configured, frames will only clear");
                None
            }
        };

        Ok(Self {
            surfaces: BTreeMap::new(),
            meshes: MeshStore::new(),
            releases: DeferredReleaseQueue::new(),
            pipeline,
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

    fn open_frame(&mut self) -> Result<ActiveFrame> {
        self.release_completed()?;

        let list = self.context.commands()?.raw();
        let mut targets = Vec::with_capacity(self.surfaces.len());
        for (&id, surface) in &self.surfaces {
            if surface.state.is_suspended() {
                continue;
            }
            let index = surface.current_index();
            let Some(buffer) = surface.back_buffer(index) else {
                continue;
            };
            let rtv = surface.rtv(index);
            let dsv = surface.dsv();
            unsafe {
                list.ResourceBarrier(&[transition(
                    buffer,
                    D3D12_RESOURCE_STATE_PRESENT,
                    D3D12_RESOURCE_STATE_RENDER_TARGET,
                )]);
                list.OMSetRenderTargets(1, Some(&rtv), false, Some(&dsv));
                list.ClearRenderTargetView(rtv, &self.clear_color, None);
                list.ClearDepthStencilView(dsv, D3D12_CLEAR_FLAG_DEPTH, 1.0, 0, None);
            }
            targets.push(FrameTarget {
                id,
                back_buffer: index,
            });
        }
        Ok(ActiveFrame { targets })
    }
}

impl GraphicsBackend for D3d12Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::D3d12
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
                "D3D12 surfaces need a window".to_string(),
            ));
        };

        let surface = D3d12Surface::new(
            &self.device,
            window,
            desc.width,
            desc.height,
            desc.vsync,
            self.context.frames_in_flight() as u32,
        )?;
        let id = SurfaceId::from_raw(self.next_surface);
        self.next_surface += 1;
        tracing::debug!(
            "Created D3D12 surface {:?} ({}x{})",
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
        entry.resize(&self.device, width, height)?;
        tracing::debug!("Resized D3D12 surface {:?} to {}x{}", surface, width, height);
        Ok(outcome)
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

        let mut uploaded = Vec::with_capacity(meshes.len());
        for mesh in meshes {
            let vertex_bytes = mesh.vertex_bytes();
            let index_bytes = mesh.index_bytes();
            let vertices = upload_buffer(self.device.raw(), vertex_bytes)?;
            let indices = upload_buffer(self.device.raw(), index_bytes)?;

            let vertex_view = D3D12_VERTEX_BUFFER_VIEW {
                BufferLocation: unsafe { vertices.GetGPUVirtualAddress() },
                SizeInBytes: vertex_bytes.len() as u32,
                StrideInBytes: Vertex::STRIDE,
            };
            let index_view = D3D12_INDEX_BUFFER_VIEW {
                BufferLocation: unsafe { indices.GetGPUVirtualAddress() },
                SizeInBytes: index_bytes.len() as u32,
                Format: DXGI_FORMAT_R32_UINT,
            };

            uploaded.push(D3d12Mesh {
                _vertices: vertices,
                _indices: indices,
                vertex_view,
                index_view,
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

        let slot = (self.frame_index % self.context.frames_in_flight() as u64) as usize;
        self.context.begin_recording(slot)?;

        match self.open_frame() {
            Ok(frame) => {
                self.frame = Some(frame);
                self.stats.frames_begun += 1;
                Ok(())
            }
            Err(err) => {
                if let Err(abandon_err) = self.context.abandon() {
                    tracing::warn!("Failed to abandon frame: {}", abandon_err);
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
        let list = self.context.commands()?.raw();

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
            let Some(pipeline) = self.pipeline.as_ref() else {
                if !self.warned_no_pipeline && !draws.is_empty() {
                    tracing::warn!("No mesh pipeline, skipping draws");
                    self.warned_no_pipeline = true;
                }
                total.merge(DrawStats::all_skipped(draws.len()));
                continue;
            };

            let rtv = surface.rtv(target.back_buffer);
            let dsv = surface.dsv();
            let scissor = surface.state.scissor();
            unsafe {
                list.OMSetRenderTargets(1, Some(&rtv), false, Some(&dsv));
                list.RSSetViewports(&[surface.viewport()]);
                list.RSSetScissorRects(&[RECT {
                    left: scissor.left,
                    top: scissor.top,
                    right: scissor.right,
                    bottom: scissor.bottom,
                }]);
                list.SetGraphicsRootSignature(pipeline.root_signature());
                list.SetPipelineState(pipeline.state());
                list.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            }

            let mut recorder = D3d12Recorder {
                list,
                meshes: &self.meshes,
            };
            total.merge(record_draw_list(&mut recorder, draws, view_projection));
        }

        self.stats.record_draws(total);
        Ok(total)
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn end_frame(&mut self) -> Result<()> {
        let Some(frame) = self.frame.take() else {
            return Err(GpuError::InvalidState("end_frame without begin_frame".into()));
        };

        let list = self.context.commands()?.raw();
        for target in &frame.targets {
            let Some(buffer) = self
                .surfaces
                .get(&target.id)
                .and_then(|s| s.back_buffer(target.back_buffer))
            else {
                continue;
            };
            unsafe {
                list.ResourceBarrier(&[transition(
                    buffer,
                    D3D12_RESOURCE_STATE_RENDER_TARGET,
                    D3D12_RESOURCE_STATE_PRESENT,
                )]);
            }
        }

        if let Err(err) = self.context.submit(&()) {
            self.stats.frames_abandoned += 1;
            return Err(err);
        }
        self.frame_index += 1;
        self.stats.frames_submitted += 1;

        let mut result = Ok(());
        for target in &frame.targets {
            let Some(surface) = self.surfaces.get(&target.id) else {
                continue;
            };
            match surface.present() {
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

        let released = self.releases.drain().len() + self.meshes.drain().len();
        self.surfaces.clear();
        self.pipeline = None;
        self.shut_down = true;

        tracing::info!("D3D12 backend shut down ({} meshes released)", released);
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

impl Drop for D3d12Backend {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!("D3D12 backend shutdown failed: {}", err);
        }
    }
}
