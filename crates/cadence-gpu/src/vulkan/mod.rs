//! Vulkan 1.3 backend.
//!
//! Uses timeline semaphores for the frame fence, `vkQueueSubmit2` and
//! dynamic rendering, so there are no render pass or framebuffer objects.

mod backend;
pub mod command;
pub mod device;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod swapchain;
pub mod sync;

pub use backend::VulkanBackend;
pub use device::VulkanDevice;
