//! Synchronization primitives.

use std::sync::Arc;

use ash::vk;

use crate::error::{GpuError, Result};
use crate::hal::GpuFence;

/// Binary semaphore, destroyed on drop.
pub struct Semaphore {
    device: Arc<ash::Device>,
    raw: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let raw = unsafe { device.create_semaphore(&create_info, None)? };
        Ok(Self { device, raw })
    }

    pub const fn raw(&self) -> vk::Semaphore {
        self.raw
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.raw, None) };
    }
}

/// Timeline semaphore used as the render context fence.
pub struct TimelineFence {
    device: Arc<ash::Device>,
    raw: vk::Semaphore,
}

impl TimelineFence {
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let raw = unsafe { device.create_semaphore(&create_info, None) }
            .map_err(|e| GpuError::DeviceCreation(format!("timeline semaphore: {e}")))?;
        Ok(Self { device, raw })
    }

    pub const fn raw(&self) -> vk::Semaphore {
        self.raw
    }
}

impl GpuFence for TimelineFence {
    fn completed_value(&self) -> Result<u64> {
        Ok(unsafe { self.device.get_semaphore_counter_value(self.raw)? })
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn wait(&self, value: u64) -> Result<()> {
        let semaphores = [self.raw];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.device.wait_semaphores(&wait_info, u64::MAX) }.map_err(|e| match e {
            vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost,
            other => GpuError::FenceWait(other.to_string()),
        })
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.raw, None) };
    }
}

/// Binary semaphores a frame submission waits on and signals.
#[derive(Debug, Clone, Default)]
pub struct SubmitSync {
    /// Swapchain acquire semaphores, waited at color attachment output.
    pub wait: Vec<vk::Semaphore>,
    /// Semaphores presentation waits on.
    pub signal: Vec<vk::Semaphore>,
}
