//! `ID3D12Fence` with an event for blocking waits.

use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::Graphics::Direct3D12::{ID3D12Device, ID3D12Fence, D3D12_FENCE_FLAG_NONE};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};

use crate::error::{GpuError, Result};
use crate::hal::GpuFence;

pub struct D3d12Fence {
    raw: ID3D12Fence,
    event: HANDLE,
}

impl D3d12Fence {
    pub fn new(device: &ID3D12Device) -> Result<Self> {
        let raw: ID3D12Fence = unsafe { device.CreateFence(0, D3D12_FENCE_FLAG_NONE) }
            .map_err(|e| GpuError::DeviceCreation(format!("CreateFence: {e}")))?;
        let event = unsafe { CreateEventW(None, false, false, None) }
            .map_err(|e| GpuError::DeviceCreation(format!("CreateEventW: {e}")))?;
        Ok(Self { raw, event })
    }

    pub const fn raw(&self) -> &ID3D12Fence {
        &self.raw
    }
}

impl GpuFence for D3d12Fence {
    fn completed_value(&self) -> Result<u64> {
        let value = unsafe { self.raw.GetCompletedValue() };
        // A removed device reports UINT64_MAX.
        if value == u64::MAX {
            return Err(GpuError::DeviceLost);
        }
        Ok(value)
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn wait(&self, value: u64) -> Result<()> {
        if self.completed_value()? >= value {
            return Ok(());
        }
        unsafe {
            self.raw
                .SetEventOnCompletion(value, self.event)
                .map_err(|e| GpuError::FenceWait(e.to_string()))?;
            if WaitForSingleObject(self.event, INFINITE) != WAIT_OBJECT_0 {
                return Err(GpuError::FenceWait(format!("wait for fence value {value} failed")));
            }
        }
        self.completed_value().map(|_| ())
    }
}

impl Drop for D3d12Fence {
    fn drop(&mut self) {
        if let Err(err) = unsafe { CloseHandle(self.event) } {
            tracing::warn!("Failed to close fence event: {}", err);
        }
    }
}
