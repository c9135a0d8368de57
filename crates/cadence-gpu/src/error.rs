//! GPU error types.

use ash::vk;
use cadence_core::{BackendKind, Classify, Severity};
use thiserror::Error;

use crate::mesh::MeshHandle;
use crate::surface::SurfaceId;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Direct3D 12 / DXGI error.
    #[cfg(windows)]
    #[error("D3D12 error: {0}")]
    D3d12(#[from] windows::core::Error),

    /// The requested backend is not compiled in or not supported here.
    #[error("Backend {0} is not available on this platform")]
    BackendUnavailable(BackendKind),

    /// No adapter meets the minimum feature floor.
    #[error("No suitable GPU found: {0}")]
    NoSuitableDevice(String),

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Device or queue creation failed.
    #[error("Device creation failed: {0}")]
    DeviceCreation(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// The swapchain no longer matches the surface and must be recreated.
    #[error("Swapchain out of date")]
    OutOfDate,

    /// The device was removed or lost.
    #[error("GPU device lost")]
    DeviceLost,

    /// Waiting on a fence failed.
    #[error("Fence wait failed: {0}")]
    FenceWait(String),

    /// A surface was resized to a zero-sized client area.
    #[error("Surface resized to {width}x{height}, skipping until restored")]
    ZeroExtent { width: u32, height: u32 },

    /// Surface not found.
    #[error("Unknown surface {0:?}")]
    SurfaceNotFound(SurfaceId),

    /// Mesh not found.
    #[error("Unknown mesh {0:?}")]
    MeshNotFound(MeshHandle),

    /// Invalid mesh data.
    #[error("Invalid mesh data: {0}")]
    InvalidMesh(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Classify for GpuError {
    fn severity(&self) -> Severity {
        match self {
            Self::Vulkan(result) => match *result {
                vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR => {
                    Severity::Retryable
                }
                vk::Result::ERROR_DEVICE_LOST
                | vk::Result::ERROR_INITIALIZATION_FAILED
                | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
                | vk::Result::ERROR_SURFACE_LOST_KHR => Severity::Fatal,
                _ => Severity::Retryable,
            },
            #[cfg(windows)]
            Self::D3d12(err) => {
                use windows::Win32::Graphics::Dxgi::{
                    DXGI_ERROR_DEVICE_HUNG, DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_DEVICE_RESET,
                };
                let code = err.code();
                if code == DXGI_ERROR_DEVICE_REMOVED
                    || code == DXGI_ERROR_DEVICE_RESET
                    || code == DXGI_ERROR_DEVICE_HUNG
                {
                    Severity::Fatal
                } else {
                    Severity::Retryable
                }
            }
            Self::BackendUnavailable(_)
            | Self::NoSuitableDevice(_)
            | Self::ExtensionNotSupported(_)
            | Self::DeviceCreation(_)
            | Self::AllocationFailed(_)
            | Self::SurfaceCreation(_)
            | Self::SwapchainCreation(_)
            | Self::PipelineCreation(_)
            | Self::DeviceLost => Severity::Fatal,
            Self::OutOfDate | Self::FenceWait(_) | Self::InvalidState(_) | Self::Other(_) => {
                Severity::Retryable
            }
            Self::ZeroExtent { .. }
            | Self::SurfaceNotFound(_)
            | Self::MeshNotFound(_)
            | Self::InvalidMesh(_) => Severity::Ignorable,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_failures_are_fatal() {
        assert!(GpuError::NoSuitableDevice("none".into()).severity().is_fatal());
        assert!(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST)
            .severity()
            .is_fatal());
    }

    #[test]
    fn frame_failures_are_retryable() {
        assert_eq!(
            GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR).severity(),
            Severity::Retryable
        );
        assert_eq!(GpuError::OutOfDate.severity(), Severity::Retryable);
    }

    #[test]
    fn late_resize_is_ignorable() {
        let err = GpuError::ZeroExtent {
            width: 0,
            height: 600,
        };
        assert_eq!(err.severity(), Severity::Ignorable);
    }
}
