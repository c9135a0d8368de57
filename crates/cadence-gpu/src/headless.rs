//! Headless backend: a simulated GPU with no device behind it.
//!
//! Commands are recorded into plain vectors and "executed" by advancing a fence
//! timeline. How fast that timeline follows submissions is configurable with
//! [`GpuTimeline`], which lets tests reproduce a GPU that keeps up, one that lags
//! a fixed number of submissions behind, or one that only progresses when a
//! test signals it from another thread.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cadence_core::BackendKind;
use glam::Mat4;
use parking_lot::{Condvar, Mutex};

use crate::backend::{AdapterInfo, FrameStats, GraphicsBackend, GraphicsConfig};
use crate::context::RenderContext;
use crate::deferred::DeferredReleaseQueue;
use crate::draw::{record_draw_list, DrawRecorder, DrawStats};
use crate::error::{GpuError, Result};
use crate::hal::{CommandDevice, GpuFence, QueueType};
use crate::mesh::{GpuMesh, MeshData, MeshHandle, MeshInfo, MeshStore, RenderData};
use crate::surface::{
    ResizeOutcome, ScissorRect, SurfaceDesc, SurfaceId, SurfaceInfo, SurfaceState, Viewport,
};

/// How the simulated GPU retires submitted work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GpuTimeline {
    /// Every submission completes as soon as it is submitted.
    #[default]
    Immediate,
    /// The newest `n` submissions stay pending. Waiting on one of them
    /// completes it (the GPU catches up while the CPU blocks).
    Latency(u64),
    /// Nothing completes until [`HeadlessFence::complete`] is called.
    Manual,
}

#[derive(Debug, Default)]
struct FenceState {
    completed: u64,
    pending: VecDeque<u64>,
    last_enqueued: u64,
}

impl FenceState {
    fn retire_through(&mut self, value: u64) {
        while matches!(self.pending.front(), Some(&v) if v <= value) {
            self.pending.pop_front();
        }
        self.completed = self.completed.max(value);
    }
}

struct FenceShared {
    timeline: GpuTimeline,
    state: Mutex<FenceState>,
    signal: Condvar,
}

/// Simulated timeline fence. Clones share the same timeline.
#[derive(Clone)]
pub struct HeadlessFence {
    shared: Arc<FenceShared>,
}

impl std::fmt::Debug for HeadlessFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("HeadlessFence")
            .field("timeline", &self.shared.timeline)
            .field("completed", &state.completed)
            .field("last_enqueued", &state.last_enqueued)
            .finish()
    }
}

impl HeadlessFence {
    #[must_use]
    pub fn new(timeline: GpuTimeline) -> Self {
        Self {
            shared: Arc::new(FenceShared {
                timeline,
                state: Mutex::new(FenceState::default()),
                signal: Condvar::new(),
            }),
        }
    }

    /// Queue `value` as the signal of a new submission.
    fn enqueue(&self, value: u64) -> Result<()> {
        let mut state = self.shared.state.lock();
        if value <= state.last_enqueued {
            return Err(GpuError::InvalidState(format!(
                "fence value {value} does not increase past {}",
                state.last_enqueued
            )));
        }
        state.pending.push_back(value);
        state.last_enqueued = value;

        match self.shared.timeline {
            GpuTimeline::Immediate => state.retire_through(value),
            GpuTimeline::Latency(depth) => {
                let excess = state.pending.len().saturating_sub(depth as usize);
                if excess > 0 {
                    let through = state.pending[excess - 1];
                    state.retire_through(through);
                }
            }
            GpuTimeline::Manual => {}
        }
        drop(state);
        self.shared.signal.notify_all();
        Ok(())
    }

    /// Mark everything up to `value` complete (clamped to the last submission).
    pub fn complete(&self, value: u64) {
        let mut state = self.shared.state.lock();
        let value = value.min(state.last_enqueued);
        state.retire_through(value);
        drop(state);
        self.shared.signal.notify_all();
    }

    /// Mark every submission complete.
    pub fn complete_all(&self) {
        self.complete(u64::MAX);
    }

    /// Submissions not yet completed.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Last value handed to [`CommandDevice::submit`].
    #[must_use]
    pub fn last_submitted(&self) -> u64 {
        self.shared.state.lock().last_enqueued
    }

    #[must_use]
    pub fn timeline(&self) -> GpuTimeline {
        self.shared.timeline
    }
}

impl GpuFence for HeadlessFence {
    fn completed_value(&self) -> Result<u64> {
        Ok(self.shared.state.lock().completed)
    }

    fn wait(&self, value: u64) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.completed >= value {
            return Ok(());
        }
        if value > state.last_enqueued {
            return Err(GpuError::FenceWait(format!(
                "value {value} was never submitted (last {})",
                state.last_enqueued
            )));
        }

        match self.shared.timeline {
            GpuTimeline::Immediate | GpuTimeline::Latency(_) => state.retire_through(value),
            GpuTimeline::Manual => {
                while state.completed < value {
                    self.shared.signal.wait(&mut state);
                }
            }
        }
        Ok(())
    }
}

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessCommand {
    /// Back buffer state transition.
    Transition {
        surface: SurfaceId,
        back_buffer: u32,
        to: BufferState,
    },
    ClearColor {
        surface: SurfaceId,
        color: [f32; 4],
    },
    ClearDepth {
        surface: SurfaceId,
        depth: f32,
    },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetViewProjection(Mat4),
    BindMesh(MeshHandle),
    SetWorld(Mat4),
    DrawIndexed {
        index_count: u32,
    },
}

/// Back buffer usage, mirroring resource barrier states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Present,
    RenderTarget,
}

/// Simulated command allocator.
#[derive(Debug)]
pub struct HeadlessAllocator {
    id: u64,
    resets: u64,
}

impl HeadlessAllocator {
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Times this allocator has been reset.
    pub const fn resets(&self) -> u64 {
        self.resets
    }
}

/// Simulated command list.
#[derive(Debug, Default)]
pub struct HeadlessCommandList {
    commands: Vec<HeadlessCommand>,
    open: bool,
    allocator: Option<u64>,
}

impl HeadlessCommandList {
    /// Append a command. Ignored unless the list is open.
    pub fn record(&mut self, command: HeadlessCommand) {
        if self.open {
            self.commands.push(command);
        }
    }

    pub fn commands(&self) -> &[HeadlessCommand] {
        &self.commands
    }

    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Allocator the list was last opened against.
    pub const fn allocator(&self) -> Option<u64> {
        self.allocator
    }
}

/// Simulated device.
#[derive(Debug)]
pub struct HeadlessDevice {
    timeline: GpuTimeline,
    next_allocator: AtomicU64,
    submissions: AtomicU64,
}

impl HeadlessDevice {
    #[must_use]
    pub const fn new(timeline: GpuTimeline) -> Self {
        Self {
            timeline,
            next_allocator: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
        }
    }

    /// Number of lists submitted across all queues.
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }
}

impl CommandDevice for HeadlessDevice {
    type Allocator = HeadlessAllocator;
    type CommandList = HeadlessCommandList;
    type Fence = HeadlessFence;
    type SubmitSync = ();

    fn create_allocator(&self, _queue: QueueType) -> Result<HeadlessAllocator> {
        Ok(HeadlessAllocator {
            id: self.next_allocator.fetch_add(1, Ordering::Relaxed),
            resets: 0,
        })
    }

    fn create_command_list(
        &self,
        _queue: QueueType,
        allocator: &HeadlessAllocator,
    ) -> Result<HeadlessCommandList> {
        Ok(HeadlessCommandList {
            commands: Vec::new(),
            open: false,
            allocator: Some(allocator.id),
        })
    }

    fn create_fence(&self) -> Result<HeadlessFence> {
        Ok(HeadlessFence::new(self.timeline))
    }

    fn reset_allocator(&self, allocator: &mut HeadlessAllocator) -> Result<()> {
        allocator.resets += 1;
        Ok(())
    }

    fn begin_list(
        &self,
        list: &mut HeadlessCommandList,
        allocator: &HeadlessAllocator,
    ) -> Result<()> {
        if list.open {
            return Err(GpuError::InvalidState("command list already open".into()));
        }
        list.commands.clear();
        list.open = true;
        list.allocator = Some(allocator.id);
        Ok(())
    }

    fn close_list(&self, list: &mut HeadlessCommandList) -> Result<()> {
        if !list.open {
            return Err(GpuError::InvalidState("command list not open".into()));
        }
        list.open = false;
        Ok(())
    }

    fn submit(
        &self,
        _queue: QueueType,
        list: &HeadlessCommandList,
        fence: &HeadlessFence,
        value: u64,
        _sync: &(),
    ) -> Result<()> {
        if list.open {
            return Err(GpuError::InvalidState(
                "cannot submit an open command list".into(),
            ));
        }
        fence.enqueue(value)?;
        self.submissions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    presents: u64,
    swapchain_rebuilds: u64,
    meshes_released: u64,
    last_frame: Vec<HeadlessCommand>,
    fail_presents: u32,
    shut_down: bool,
}

/// Shared view into a [`HeadlessBackend`] that outlives boxing it.
#[derive(Debug, Clone, Default)]
pub struct HeadlessProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl HeadlessProbe {
    /// Surface presents so far.
    pub fn presents(&self) -> u64 {
        self.state.lock().presents
    }

    /// Back buffer recreations caused by resizes.
    pub fn swapchain_rebuilds(&self) -> u64 {
        self.state.lock().swapchain_rebuilds
    }

    /// Meshes whose storage has actually been released.
    pub fn meshes_released(&self) -> u64 {
        self.state.lock().meshes_released
    }

    /// Commands of the last submitted frame.
    pub fn last_frame(&self) -> Vec<HeadlessCommand> {
        self.state.lock().last_frame.clone()
    }

    /// Make the next `count` presents fail with [`GpuError::OutOfDate`].
    pub fn fail_next_presents(&self, count: u32) {
        self.state.lock().fail_presents = count;
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    fn take_present_failure(&self) -> bool {
        let mut state = self.state.lock();
        if state.fail_presents > 0 {
            state.fail_presents -= 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct HeadlessMesh {
    info: MeshInfo,
}

impl GpuMesh for HeadlessMesh {
    fn info(&self) -> MeshInfo {
        self.info
    }
}

#[derive(Debug)]
struct HeadlessSurface {
    state: SurfaceState,
    back_buffer: u32,
}

struct ActiveFrame {
    targets: Vec<SurfaceId>,
}

struct HeadlessRecorder<'a> {
    list: &'a mut HeadlessCommandList,
    meshes: &'a MeshStore<HeadlessMesh>,
}

impl DrawRecorder for HeadlessRecorder<'_> {
    fn set_view_projection(&mut self, view_projection: &Mat4) {
        self.list
            .record(HeadlessCommand::SetViewProjection(*view_projection));
    }

    fn draw_mesh(&mut self, mesh: MeshHandle, world: &Mat4) -> Option<u32> {
        let index_count = self.meshes.get(mesh)?.info.index_count;
        self.list.record(HeadlessCommand::BindMesh(mesh));
        self.list.record(HeadlessCommand::SetWorld(*world));
        self.list.record(HeadlessCommand::DrawIndexed { index_count });
        Some(index_count)
    }
}

/// Graphics backend over [`HeadlessDevice`].
pub struct HeadlessBackend {
    adapter: AdapterInfo,
    clear_color: [f32; 4],
    context: RenderContext<HeadlessDevice>,
    surfaces: BTreeMap<SurfaceId, HeadlessSurface>,
    next_surface: u32,
    meshes: MeshStore<HeadlessMesh>,
    releases: DeferredReleaseQueue<HeadlessMesh>,
    frame: Option<ActiveFrame>,
    frame_index: u64,
    stats: FrameStats,
    probe: HeadlessProbe,
    shut_down: bool,
}

impl HeadlessBackend {
    pub fn new(config: &GraphicsConfig) -> Result<Self> {
        let device = Arc::new(HeadlessDevice::new(config.headless_timeline));
        let context =
            RenderContext::new(device, config.frames_in_flight, QueueType::Graphics)?;

        tracing::info!(
            "Headless backend ready ({:?} timeline)",
            config.headless_timeline
        );

        Ok(Self {
            adapter: AdapterInfo {
                name: "Headless".to_string(),
                vendor_id: 0,
                device_id: 0,
                software: true,
                api_version: "simulated".to_string(),
                descriptor_sizes: None,
            },
            clear_color: config.clear_color,
            context,
            surfaces: BTreeMap::new(),
            next_surface: 0,
            meshes: MeshStore::new(),
            releases: DeferredReleaseQueue::new(),
            frame: None,
            frame_index: 0,
            stats: FrameStats::default(),
            probe: HeadlessProbe::default(),
            shut_down: false,
        })
    }

    /// Inspection handle; stays valid after the backend is boxed.
    pub fn probe(&self) -> HeadlessProbe {
        self.probe.clone()
    }

    /// The simulated fence, for completing work in [`GpuTimeline::Manual`].
    pub fn fence(&self) -> HeadlessFence {
        self.context.fence().clone()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.shut_down {
            Err(GpuError::InvalidState("backend is shut down".into()))
        } else {
            Ok(())
        }
    }

    fn surface_mut(&mut self, id: SurfaceId) -> Result<&mut HeadlessSurface> {
        self.surfaces
            .get_mut(&id)
            .ok_or(GpuError::SurfaceNotFound(id))
    }

    fn release_completed(&mut self) -> Result<()> {
        let completed = self.context.completed_value()?;
        let released = self.releases.collect(completed).len() as u64;
        if released > 0 {
            tracing::debug!("Released {} meshes at fence {}", released, completed);
            self.probe.state.lock().meshes_released += released;
        }
        Ok(())
    }

    fn open_frame(&mut self) -> Result<ActiveFrame> {
        self.release_completed()?;

        let list = self.context.commands()?;
        let mut targets = Vec::with_capacity(self.surfaces.len());
        for (&id, surface) in &self.surfaces {
            if surface.state.is_suspended() {
                continue;
            }
            list.record(HeadlessCommand::Transition {
                surface: id,
                back_buffer: surface.back_buffer,
                to: BufferState::RenderTarget,
            });
            list.record(HeadlessCommand::ClearColor {
                surface: id,
                color: self.clear_color,
            });
            list.record(HeadlessCommand::ClearDepth {
                surface: id,
                depth: 1.0,
            });
            targets.push(id);
        }
        Ok(ActiveFrame { targets })
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Headless
    }

    fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn frames_in_flight(&self) -> usize {
        self.context.frames_in_flight()
    }

    fn create_surface(&mut self, desc: &SurfaceDesc<'_>) -> Result<SurfaceId> {
        self.ensure_live()?;
        let id = SurfaceId::from_raw(self.next_surface);
        self.next_surface += 1;

        let buffer_count = self.context.frames_in_flight() as u32;
        let state = SurfaceState::new(desc.width, desc.height, buffer_count, desc.vsync);
        tracing::debug!(
            "Created headless surface {:?} ({}x{}, {:?})",
            id,
            state.width(),
            state.height(),
            desc.target
        );
        self.surfaces.insert(
            id,
            HeadlessSurface {
                state,
                back_buffer: 0,
            },
        );
        Ok(id)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) -> Result<()> {
        self.ensure_live()?;
        if self
            .frame
            .as_ref()
            .is_some_and(|frame| frame.targets.contains(&surface))
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
        let outcome = self.surface_mut(surface)?.state.request_resize(width, height)?;
        if outcome == ResizeOutcome::Unchanged {
            return Ok(outcome);
        }
        if in_frame {
            return Err(GpuError::InvalidState(
                "cannot resize during a frame".into(),
            ));
        }

        self.context.flush()?;
        let entry = self.surface_mut(surface)?;
        let buffer_count = entry.state.buffer_count();
        entry.state.apply_resize(width, height, buffer_count);
        entry.back_buffer = 0;
        self.probe.state.lock().swapchain_rebuilds += 1;
        tracing::debug!("Resized headless surface {:?} to {}x{}", surface, width, height);
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
        Ok(meshes
            .iter()
            .map(|mesh| {
                self.meshes.insert(HeadlessMesh {
                    info: MeshInfo {
                        vertex_count: mesh.vertices.len() as u32,
                        index_count: mesh.indices.len() as u32,
                    },
                })
            })
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

        let mut total = DrawStats::default();
        for &id in surfaces {
            let surface = self
                .surfaces
                .get(&id)
                .ok_or(GpuError::SurfaceNotFound(id))?;
            if !frame.targets.contains(&id) {
                total.merge(DrawStats::all_skipped(draws.len()));
                continue;
            }

            let list = self.context.commands()?;
            list.record(HeadlessCommand::SetViewport(surface.state.viewport()));
            list.record(HeadlessCommand::SetScissor(surface.state.scissor()));
            let mut recorder = HeadlessRecorder {
                list,
                meshes: &self.meshes,
            };
            total.merge(record_draw_list(&mut recorder, draws, view_projection));
        }

        self.stats.record_draws(total);
        Ok(total)
    }

    fn end_frame(&mut self) -> Result<()> {
        let Some(frame) = self.frame.take() else {
            return Err(GpuError::InvalidState("end_frame without begin_frame".into()));
        };

        let list = self.context.commands()?;
        for &id in &frame.targets {
            if let Some(surface) = self.surfaces.get(&id) {
                list.record(HeadlessCommand::Transition {
                    surface: id,
                    back_buffer: surface.back_buffer,
                    to: BufferState::Present,
                });
            }
        }
        let commands = list.commands().to_vec();

        if let Err(err) = self.context.submit(&()) {
            self.stats.frames_abandoned += 1;
            return Err(err);
        }
        self.frame_index += 1;
        self.stats.frames_submitted += 1;
        self.probe.state.lock().last_frame = commands;

        let mut result = Ok(());
        for id in frame.targets {
            if self.probe.take_present_failure() {
                if let Some(surface) = self.surfaces.get_mut(&id) {
                    surface.state.suspend();
                }
                result = Err(GpuError::OutOfDate);
                continue;
            }
            if let Some(surface) = self.surfaces.get_mut(&id) {
                surface.back_buffer = (surface.back_buffer + 1) % surface.state.buffer_count();
                self.stats.presents += 1;
                self.probe.state.lock().presents += 1;
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

        let released = (self.releases.drain().len() + self.meshes.drain().len()) as u64;
        self.surfaces.clear();
        self.shut_down = true;

        let mut probe = self.probe.state.lock();
        probe.meshes_released += released;
        probe.shut_down = true;
        drop(probe);

        tracing::info!("Headless backend shut down");
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn backend(timeline: GpuTimeline, frames: usize) -> HeadlessBackend {
        let config = GraphicsConfig::default()
            .with_frames_in_flight(frames)
            .with_headless_timeline(timeline);
        HeadlessBackend::new(&config).unwrap()
    }

    #[test]
    fn latency_fence_retires_oldest() {
        let fence = HeadlessFence::new(GpuTimeline::Latency(2));
        for value in 1..=4 {
            fence.enqueue(value).unwrap();
        }
        assert_eq!(fence.completed_value().unwrap(), 2);
        assert_eq!(fence.pending_count(), 2);

        fence.wait(3).unwrap();
        assert_eq!(fence.completed_value().unwrap(), 3);
        assert!(fence.wait(9).is_err());
    }

    #[test]
    fn fence_values_must_increase() {
        let fence = HeadlessFence::new(GpuTimeline::Manual);
        fence.enqueue(2).unwrap();
        assert!(fence.enqueue(2).is_err());
        fence.complete(10);
        assert_eq!(fence.completed_value().unwrap(), 2);
    }

    #[test]
    fn manual_fence_blocks_until_completed() {
        let fence = HeadlessFence::new(GpuTimeline::Manual);
        fence.enqueue(1).unwrap();

        let signaller = fence.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            signaller.complete(1);
        });
        fence.wait(1).unwrap();
        assert_eq!(fence.completed_value().unwrap(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn device_rejects_open_list_submission() {
        let device = HeadlessDevice::new(GpuTimeline::Immediate);
        let alloc = device.create_allocator(QueueType::Graphics).unwrap();
        let mut list = device
            .create_command_list(QueueType::Graphics, &alloc)
            .unwrap();
        let fence = device.create_fence().unwrap();

        device.begin_list(&mut list, &alloc).unwrap();
        assert!(device.submit(QueueType::Graphics, &list, &fence, 1, &()).is_err());
        device.close_list(&mut list).unwrap();
        device.submit(QueueType::Graphics, &list, &fence, 1, &()).unwrap();
        assert_eq!(device.submission_count(), 1);
    }

    #[test]
    fn frame_records_clear_draw_and_present() {
        let mut gpu = backend(GpuTimeline::Immediate, 2);
        let probe = gpu.probe();
        let surface = gpu.create_surface(&SurfaceDesc::offscreen(320, 240)).unwrap();
        let mesh = gpu.load_meshes(&[MeshData::cube(1.0)]).unwrap()[0];

        gpu.begin_frame().unwrap();
        let world = Mat4::IDENTITY;
        let stats = gpu
            .render(&[surface], &[RenderData::new(mesh, &world)], &Mat4::IDENTITY)
            .unwrap();
        gpu.end_frame().unwrap();

        assert_eq!(stats.draws, 1);
        assert_eq!(stats.indices, 36);
        assert_eq!(probe.presents(), 1);

        let commands = probe.last_frame();
        assert!(matches!(
            commands.first(),
            Some(HeadlessCommand::Transition {
                to: BufferState::RenderTarget,
                ..
            })
        ));
        assert!(commands.contains(&HeadlessCommand::DrawIndexed { index_count: 36 }));
        assert!(matches!(
            commands.last(),
            Some(HeadlessCommand::Transition {
                to: BufferState::Present,
                ..
            })
        ));
    }

    #[test]
    fn back_buffers_rotate() {
        let mut gpu = backend(GpuTimeline::Immediate, 3);
        let probe = gpu.probe();
        let surface = gpu.create_surface(&SurfaceDesc::offscreen(64, 64)).unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            gpu.begin_frame().unwrap();
            gpu.end_frame().unwrap();
            if let Some(HeadlessCommand::Transition { back_buffer, .. }) =
                probe.last_frame().first()
            {
                seen.push(*back_buffer);
            }
        }
        assert_eq!(seen, vec![0, 1, 2, 0]);
        assert_eq!(gpu.surface_info(surface).unwrap().buffer_count, 3);
    }

    #[test]
    fn frame_calls_out_of_order_are_rejected() {
        let mut gpu = backend(GpuTimeline::Immediate, 2);
        assert!(gpu.end_frame().is_err());
        assert!(gpu.render(&[], &[], &Mat4::IDENTITY).is_err());
        gpu.begin_frame().unwrap();
        assert!(gpu.begin_frame().is_err());
        gpu.end_frame().unwrap();
    }

    #[test]
    fn failed_present_suspends_surface_until_resize() {
        let mut gpu = backend(GpuTimeline::Immediate, 2);
        let probe = gpu.probe();
        let surface = gpu.create_surface(&SurfaceDesc::offscreen(100, 100)).unwrap();

        probe.fail_next_presents(1);
        gpu.begin_frame().unwrap();
        assert!(matches!(gpu.end_frame(), Err(GpuError::OutOfDate)));
        assert!(gpu.surface_info(surface).unwrap().suspended);

        gpu.resize_surface(surface, 100, 100).unwrap();
        gpu.begin_frame().unwrap();
        gpu.end_frame().unwrap();
        assert_eq!(probe.presents(), 1);
    }

    #[test]
    fn resize_during_frame_is_rejected() {
        let mut gpu = backend(GpuTimeline::Immediate, 2);
        let surface = gpu.create_surface(&SurfaceDesc::offscreen(100, 100)).unwrap();
        gpu.begin_frame().unwrap();
        assert!(matches!(
            gpu.resize_surface(surface, 200, 100),
            Err(GpuError::InvalidState(_))
        ));
        gpu.end_frame().unwrap();
        gpu.resize_surface(surface, 200, 100).unwrap();
        assert_eq!(gpu.surface_info(surface).unwrap().width, 200);
    }

    #[test]
    fn invalid_batch_uploads_nothing() {
        let mut gpu = backend(GpuTimeline::Immediate, 2);
        let result = gpu.load_meshes(&[MeshData::cube(1.0), MeshData::default()]);
        assert!(matches!(result, Err(GpuError::InvalidMesh(_))));
        assert!(gpu.meshes.is_empty());
    }

    #[test]
    fn operations_after_shutdown_fail() {
        let mut gpu = backend(GpuTimeline::Immediate, 2);
        gpu.shutdown().unwrap();
        gpu.shutdown().unwrap();
        assert!(gpu.begin_frame().is_err());
        assert!(gpu.create_surface(&SurfaceDesc::offscreen(1, 1)).is_err());
    }
}
