//! Device seam between the frame pipeline and a concrete graphics API.
//!
//! [`RenderContext`](crate::RenderContext) only talks to the GPU through
//! these traits, so the allocator ring and fence protocol are written once and
//! shared by the Vulkan, D3D12 and headless devices.

use crate::error::Result;

/// Hardware queue a render context submits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// Graphics + compute + copy.
    Graphics,
    /// Async compute.
    Compute,
    /// Copy/transfer only.
    Copy,
}

impl QueueType {
    /// All queue types, in creation order.
    pub const ALL: [Self; 3] = [Self::Graphics, Self::Compute, Self::Copy];
}

/// A monotonically increasing GPU timeline value.
pub trait GpuFence {
    /// Highest value the GPU has signalled so far.
    fn completed_value(&self) -> Result<u64>;

    /// Block the calling thread until the GPU has signalled `value`.
    fn wait(&self, value: u64) -> Result<()>;
}

/// Command recording and submission primitives of one device.
///
/// An allocator owns the memory a command list records into; the list is
/// reset against a different allocator every frame. Submitting a list also
/// signals a fence value on the same queue.
pub trait CommandDevice {
    /// Per-frame command memory (D3D12 allocator, Vulkan command pool).
    type Allocator;
    /// Recording target reused across frames.
    type CommandList;
    /// Timeline fence.
    type Fence: GpuFence;
    /// Extra synchronization a submission carries (swapchain semaphores).
    type SubmitSync;

    /// Create one allocator for `queue`.
    fn create_allocator(&self, queue: QueueType) -> Result<Self::Allocator>;

    /// Create the command list, initially closed.
    fn create_command_list(
        &self,
        queue: QueueType,
        allocator: &Self::Allocator,
    ) -> Result<Self::CommandList>;

    /// Create a fence starting at `0`.
    fn create_fence(&self) -> Result<Self::Fence>;

    /// Reclaim all memory of `allocator`. The GPU must be done with it.
    fn reset_allocator(&self, allocator: &mut Self::Allocator) -> Result<()>;

    /// Open `list` for recording into `allocator`.
    fn begin_list(&self, list: &mut Self::CommandList, allocator: &Self::Allocator) -> Result<()>;

    /// Close `list` so it can be submitted.
    fn close_list(&self, list: &mut Self::CommandList) -> Result<()>;

    /// Execute `list` on `queue`, then signal `fence` with `value`.
    fn submit(
        &self,
        queue: QueueType,
        list: &Self::CommandList,
        fence: &Self::Fence,
        value: u64,
        sync: &Self::SubmitSync,
    ) -> Result<()>;
}
