//! Command pools and buffers.

use std::sync::Arc;

use ash::vk;

use crate::error::Result;

/// One frame slot's command memory: a transient pool and its primary buffer.
pub struct CommandAllocator {
    device: Arc<ash::Device>,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
}

impl CommandAllocator {
    /// Create a pool on `queue_family` with one primary command buffer.
    pub fn new(device: Arc<ash::Device>, queue_family: u32) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(err) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(err.into());
            }
        };

        Ok(Self {
            device,
            pool,
            buffer,
        })
    }

    /// Reset the pool, returning its buffer to the initial state.
    ///
    /// The GPU must have finished executing the buffer.
    pub fn reset(&mut self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }

    pub const fn buffer(&self) -> vk::CommandBuffer {
        self.buffer
    }
}

impl Drop for CommandAllocator {
    fn drop(&mut self) {
        // Destroying the pool frees its buffers.
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

/// The command buffer currently being recorded.
///
/// Vulkan buffers belong to their pool, so the "list" is just a view of the
/// buffer of whichever allocator it was last opened against.
#[derive(Debug)]
pub struct CommandList {
    buffer: vk::CommandBuffer,
    recording: bool,
}

impl CommandList {
    pub(crate) const fn new(buffer: vk::CommandBuffer) -> Self {
        Self {
            buffer,
            recording: false,
        }
    }

    /// Open against `allocator`'s buffer.
    pub(crate) fn begin(&mut self, device: &ash::Device, allocator: &CommandAllocator) -> Result<()> {
        self.buffer = allocator.buffer();
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(self.buffer, &begin_info)? };
        self.recording = true;
        Ok(())
    }

    pub(crate) fn end(&mut self, device: &ash::Device) -> Result<()> {
        self.recording = false;
        unsafe { device.end_command_buffer(self.buffer)? };
        Ok(())
    }

    pub const fn raw(&self) -> vk::CommandBuffer {
        self.buffer
    }

    pub const fn is_recording(&self) -> bool {
        self.recording
    }
}
