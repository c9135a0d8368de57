//! Command allocators and the graphics command list.

use windows::Win32::Graphics::Direct3D12::{
    ID3D12CommandAllocator, ID3D12Device, ID3D12GraphicsCommandList, D3D12_COMMAND_LIST_TYPE,
};

use crate::error::Result;

/// One frame slot's command memory.
pub struct CommandAllocator {
    raw: ID3D12CommandAllocator,
}

impl CommandAllocator {
    pub fn new(device: &ID3D12Device, kind: D3D12_COMMAND_LIST_TYPE) -> Result<Self> {
        let raw = unsafe { device.CreateCommandAllocator(kind)? };
        Ok(Self { raw })
    }

    /// The GPU must have finished every list recorded into this allocator.
    pub fn reset(&mut self) -> Result<()> {
        unsafe { self.raw.Reset()? };
        Ok(())
    }

    pub const fn raw(&self) -> &ID3D12CommandAllocator {
        &self.raw
    }
}

/// The graphics command list, reset against a different allocator each frame.
pub struct CommandList {
    raw: ID3D12GraphicsCommandList,
    open: bool,
}

impl CommandList {
    /// Create the list and close it immediately.
    pub fn new(
        device: &ID3D12Device,
        kind: D3D12_COMMAND_LIST_TYPE,
        allocator: &CommandAllocator,
    ) -> Result<Self> {
        let raw: ID3D12GraphicsCommandList =
            unsafe { device.CreateCommandList(0, kind, allocator.raw(), None)? };
        unsafe { raw.Close()? };
        Ok(Self { raw, open: false })
    }

    pub(crate) fn reset(&mut self, allocator: &CommandAllocator) -> Result<()> {
        unsafe { self.raw.Reset(allocator.raw(), None)? };
        self.open = true;
        Ok(())
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.open = false;
        unsafe { self.raw.Close()? };
        Ok(())
    }

    pub const fn raw(&self) -> &ID3D12GraphicsCommandList {
        &self.raw
    }

    pub const fn is_open(&self) -> bool {
        self.open
    }
}
