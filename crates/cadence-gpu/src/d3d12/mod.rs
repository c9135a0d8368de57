//! Direct3D 12 backend (Windows only).

mod backend;
pub mod command;
pub mod device;
pub mod fence;
pub mod pipeline;
pub mod resource;
pub mod swapchain;

pub use backend::D3d12Backend;
pub use device::D3d12Device;
