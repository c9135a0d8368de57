//! Render context: the command allocator ring and fence protocol of one queue.
//!
//! A context owns one allocator per in-flight frame, a single command list and
//! a timeline fence. Every submission signals the next fence value and stores
//! it against the slot it was recorded in. Before a slot's allocator is reused
//! the CPU blocks until the fence has passed that value, which bounds the CPU
//! to `frames_in_flight` frames ahead of the GPU.

use std::sync::Arc;

use cadence_core::constants::{MAX_FRAMES_IN_FLIGHT, MIN_FRAMES_IN_FLIGHT};

use crate::error::{GpuError, Result};
use crate::hal::{CommandDevice, GpuFence, QueueType};

/// Where a context is in its record/submit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderContextState {
    /// Nothing recorded since the last submit.
    Ready,
    /// The command list is open against `slot`'s allocator.
    Recording { slot: usize },
    /// The list recorded for `slot` has been handed to the queue.
    Submitted { slot: usize },
}

/// Allocator ring + command list + fence for one queue.
pub struct RenderContext<D: CommandDevice> {
    device: Arc<D>,
    queue: QueueType,
    allocators: Vec<D::Allocator>,
    list: D::CommandList,
    fence: D::Fence,
    submitted_value: u64,
    slot_values: Vec<u64>,
    state: RenderContextState,
    stalls: u64,
}

impl<D: CommandDevice> RenderContext<D> {
    /// Create the allocator ring, the command list and a fence at `0`.
    pub fn new(device: Arc<D>, frames_in_flight: usize, queue: QueueType) -> Result<Self> {
        if !(MIN_FRAMES_IN_FLIGHT..=MAX_FRAMES_IN_FLIGHT).contains(&frames_in_flight) {
            return Err(GpuError::InvalidState(format!(
                "frames in flight must be {MIN_FRAMES_IN_FLIGHT} or {MAX_FRAMES_IN_FLIGHT}, got {frames_in_flight}"
            )));
        }

        let allocators = (0..frames_in_flight)
            .map(|_| device.create_allocator(queue))
            .collect::<Result<Vec<_>>>()?;
        let list = device.create_command_list(queue, &allocators[0])?;
        let fence = device.create_fence()?;

        tracing::debug!(
            "Created {:?} render context with {} frames in flight",
            queue,
            frames_in_flight
        );

        Ok(Self {
            device,
            queue,
            allocators,
            list,
            fence,
            submitted_value: 0,
            slot_values: vec![0; frames_in_flight],
            state: RenderContextState::Ready,
            stalls: 0,
        })
    }

    /// Open the command list against `slot`'s allocator.
    ///
    /// Blocks until the GPU has finished the work last submitted from `slot`.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn begin_recording(&mut self, slot: usize) -> Result<()> {
        if let RenderContextState::Recording { slot: open } = self.state {
            return Err(GpuError::InvalidState(format!(
                "slot {open} is still recording"
            )));
        }
        if slot >= self.allocators.len() {
            return Err(GpuError::InvalidState(format!(
                "slot {slot} out of range for {} frames in flight",
                self.allocators.len()
            )));
        }

        let wait_value = self.slot_values[slot];
        if wait_value > 0 {
            let completed = self.fence.completed_value()?;
            if completed < wait_value {
                tracing::trace!(
                    "{:?} slot {} waiting for fence {} (completed {})",
                    self.queue,
                    slot,
                    wait_value,
                    completed
                );
                self.stalls += 1;
                self.fence.wait(wait_value)?;
            }
        }

        self.device.reset_allocator(&mut self.allocators[slot])?;
        self.device.begin_list(&mut self.list, &self.allocators[slot])?;
        self.state = RenderContextState::Recording { slot };
        Ok(())
    }

    /// The open command list.
    pub fn commands(&mut self) -> Result<&mut D::CommandList> {
        match self.state {
            RenderContextState::Recording { .. } => Ok(&mut self.list),
            state => Err(GpuError::InvalidState(format!(
                "no open command list ({state:?})"
            ))),
        }
    }

    /// Close and execute the recorded list, then signal the next fence value.
    ///
    /// Returns the signalled value. On failure the context is back in
    /// [`RenderContextState::Ready`] and the slot keeps its previous value.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn submit(&mut self, sync: &D::SubmitSync) -> Result<u64> {
        let RenderContextState::Recording { slot } = self.state else {
            return Err(GpuError::InvalidState(format!(
                "submit without recording ({:?})",
                self.state
            )));
        };

        self.state = RenderContextState::Ready;
        self.device.close_list(&mut self.list)?;

        let value = self.submitted_value + 1;
        self.device
            .submit(self.queue, &self.list, &self.fence, value, sync)?;

        self.submitted_value = value;
        self.slot_values[slot] = value;
        self.state = RenderContextState::Submitted { slot };
        Ok(value)
    }

    /// Close an open recording without submitting it.
    pub fn abandon(&mut self) -> Result<()> {
        if let RenderContextState::Recording { slot } = self.state {
            tracing::debug!("{:?} slot {} abandoned", self.queue, slot);
            self.state = RenderContextState::Ready;
            self.device.close_list(&mut self.list)?;
        }
        Ok(())
    }

    /// Block until every submitted list has completed.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn flush(&mut self) -> Result<()> {
        let target = self.slot_values.iter().copied().max().unwrap_or(0);
        if target > 0 && self.fence.completed_value()? < target {
            self.fence.wait(target)?;
        }
        Ok(())
    }

    /// Whether `slot` can be recorded without blocking.
    pub fn is_slot_ready(&self, slot: usize) -> Result<bool> {
        let value = self.slot_value(slot)?;
        Ok(value == 0 || self.fence.completed_value()? >= value)
    }

    /// Last fence value the GPU has signalled.
    pub fn completed_value(&self) -> Result<u64> {
        self.fence.completed_value()
    }

    /// Last fence value handed to the queue.
    pub const fn submitted_value(&self) -> u64 {
        self.submitted_value
    }

    /// Fence value the next recording of `slot` waits for.
    pub fn slot_value(&self, slot: usize) -> Result<u64> {
        self.slot_values.get(slot).copied().ok_or_else(|| {
            GpuError::InvalidState(format!("slot {slot} out of range"))
        })
    }

    /// Number of `begin_recording` calls that had to block.
    pub const fn stall_count(&self) -> u64 {
        self.stalls
    }

    pub const fn state(&self) -> RenderContextState {
        self.state
    }

    pub fn frames_in_flight(&self) -> usize {
        self.allocators.len()
    }

    pub const fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn allocator(&self, slot: usize) -> Option<&D::Allocator> {
        self.allocators.get(slot)
    }

    pub const fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub const fn fence(&self) -> &D::Fence {
        &self.fence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GpuTimeline, HeadlessDevice};

    fn context(timeline: GpuTimeline, frames: usize) -> RenderContext<HeadlessDevice> {
        let device = Arc::new(HeadlessDevice::new(timeline));
        RenderContext::new(device, frames, QueueType::Graphics).unwrap()
    }

    #[test]
    fn rejects_unsupported_frame_counts() {
        let device = Arc::new(HeadlessDevice::new(GpuTimeline::Immediate));
        for frames in [0, 1, 4] {
            assert!(RenderContext::new(Arc::clone(&device), frames, QueueType::Graphics).is_err());
        }
    }

    #[test]
    fn compute_and_copy_queues_run_the_same_protocol() {
        let device = Arc::new(HeadlessDevice::new(GpuTimeline::Latency(1)));
        for queue in [QueueType::Compute, QueueType::Copy] {
            let mut ctx = RenderContext::new(Arc::clone(&device), 2, queue).unwrap();
            assert_eq!(ctx.queue(), queue);
            assert_eq!(ctx.frames_in_flight(), 2);

            ctx.begin_recording(0).unwrap();
            assert!(ctx.commands().is_ok());
            assert_eq!(ctx.submit(&()).unwrap(), 1);
            ctx.begin_recording(1).unwrap();
            assert_eq!(ctx.submit(&()).unwrap(), 2);
            assert_eq!(ctx.slot_value(0).unwrap(), 1);

            ctx.flush().unwrap();
            assert_eq!(ctx.completed_value().unwrap(), 2);
            assert!(ctx.is_slot_ready(1).unwrap());
        }
    }

    #[test]
    fn submit_signals_increasing_values() {
        let mut ctx = context(GpuTimeline::Immediate, 2);
        for frame in 0..5u64 {
            let slot = (frame % 2) as usize;
            ctx.begin_recording(slot).unwrap();
            let value = ctx.submit(&()).unwrap();
            assert_eq!(value, frame + 1);
            assert_eq!(ctx.slot_value(slot).unwrap(), value);
            assert_eq!(ctx.state(), RenderContextState::Submitted { slot });
        }
        assert_eq!(ctx.submitted_value(), 5);
        assert_eq!(ctx.stall_count(), 0);
    }

    #[test]
    fn commands_require_recording() {
        let mut ctx = context(GpuTimeline::Immediate, 2);
        assert!(ctx.commands().is_err());
        ctx.begin_recording(0).unwrap();
        assert!(ctx.commands().is_ok());
        assert!(ctx.begin_recording(1).is_err());
        ctx.abandon().unwrap();
        assert_eq!(ctx.state(), RenderContextState::Ready);
        assert!(ctx.submit(&()).is_err());
        assert_eq!(ctx.submitted_value(), 0);
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut ctx = context(GpuTimeline::Immediate, 3);
        assert!(ctx.begin_recording(3).is_err());
        assert_eq!(ctx.state(), RenderContextState::Ready);
    }

    #[test]
    fn lagging_gpu_stalls_reused_slots() {
        let mut ctx = context(GpuTimeline::Latency(3), 3);
        for frame in 0..10usize {
            let before = ctx.stall_count();
            ctx.begin_recording(frame % 3).unwrap();
            ctx.submit(&()).unwrap();
            let stalled = ctx.stall_count() > before;
            assert_eq!(stalled, frame >= 3, "frame {frame}");
        }
    }

    #[test]
    fn flush_waits_for_everything() {
        let mut ctx = context(GpuTimeline::Latency(2), 2);
        ctx.begin_recording(0).unwrap();
        ctx.submit(&()).unwrap();
        ctx.begin_recording(1).unwrap();
        ctx.submit(&()).unwrap();
        assert_eq!(ctx.completed_value().unwrap(), 0);
        assert!(!ctx.is_slot_ready(0).unwrap());

        ctx.flush().unwrap();
        assert_eq!(ctx.completed_value().unwrap(), 2);
        assert!(ctx.is_slot_ready(0).unwrap());
        assert!(ctx.is_slot_ready(1).unwrap());

        ctx.flush().unwrap();
        assert_eq!(ctx.completed_value().unwrap(), 2);
    }

    #[test]
    fn flush_without_work_returns() {
        let mut ctx = context(GpuTimeline::Manual, 2);
        ctx.flush().unwrap();
        assert_eq!(ctx.completed_value().unwrap(), 0);
    }
}
