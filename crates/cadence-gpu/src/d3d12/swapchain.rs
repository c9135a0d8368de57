//! DXGI flip-model swapchains with RTV and DSV heaps.

use raw_window_handle::RawWindowHandle;
use windows::core::Interface;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D12::{
    ID3D12DescriptorHeap, ID3D12Device, ID3D12Resource, D3D12_CPU_DESCRIPTOR_HANDLE,
    D3D12_DESCRIPTOR_HEAP_TYPE_DSV, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, D3D12_VIEWPORT,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_ALPHA_MODE_UNSPECIFIED, DXGI_FORMAT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_FORMAT_UNKNOWN,
    DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGISwapChain3, DXGI_MWA_NO_ALT_ENTER, DXGI_PRESENT, DXGI_PRESENT_ALLOW_TEARING,
    DXGI_SCALING_STRETCH, DXGI_SWAP_CHAIN_DESC1, DXGI_SWAP_CHAIN_FLAG,
    DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING, DXGI_SWAP_EFFECT_FLIP_DISCARD,
    DXGI_USAGE_RENDER_TARGET_OUTPUT,
};

use super::device::D3d12Device;
use super::resource::{depth_buffer, descriptor_heap};
use crate::error::{GpuError, Result};
use crate::hal::QueueType;
use crate::surface::{present_request, PresentRequest, SurfaceState, WindowHandleSource};

/// Back-buffer format.
pub const COLOR_FORMAT: DXGI_FORMAT = DXGI_FORMAT_R8G8B8A8_UNORM;

/// A window swapchain plus its render targets and depth buffer.
pub struct D3d12Surface {
    swapchain: IDXGISwapChain3,
    back_buffers: Vec<ID3D12Resource>,
    rtv_heap: ID3D12DescriptorHeap,
    rtv_size: u32,
    dsv_heap: ID3D12DescriptorHeap,
    depth: Option<ID3D12Resource>,
    flags: DXGI_SWAP_CHAIN_FLAG,
    tearing_supported: bool,
    pub state: SurfaceState,
}

impl D3d12Surface {
    pub fn new(
        device: &D3d12Device,
        window: &dyn WindowHandleSource,
        width: u32,
        height: u32,
        vsync: bool,
        buffer_count: u32,
    ) -> Result<Self> {
        let hwnd = hwnd(window)?;
        let state = SurfaceState::new(width, height, buffer_count, vsync);
        let tearing_supported = device.tearing_supported();
        let flags = if tearing_supported {
            DXGI_SWAP_CHAIN_FLAG_ALLOW_TEARING
        } else {
            DXGI_SWAP_CHAIN_FLAG(0)
        };

        let desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: state.width(),
            Height: state.height(),
            Format: COLOR_FORMAT,
            Stereo: false.into(),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: buffer_count,
            Scaling: DXGI_SCALING_STRETCH,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            AlphaMode: DXGI_ALPHA_MODE_UNSPECIFIED,
            Flags: flags.0 as u32,
        };

        let swapchain = unsafe {
            device
                .factory()
                .CreateSwapChainForHwnd(device.queue(QueueType::Graphics), hwnd, &desc, None, None)
        }
        .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;
        let swapchain: IDXGISwapChain3 = swapchain
            .cast()
            .map_err(|e| GpuError::SwapchainCreation(format!("IDXGISwapChain3: {e}")))?;
        unsafe { device.factory().MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER)? };

        let raw = device.raw();
        let rtv_heap = descriptor_heap(raw, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, buffer_count)?;
        let rtv_size = unsafe { raw.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) };
        let dsv_heap = descriptor_heap(raw, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, 1)?;

        let mut surface = Self {
            swapchain,
            back_buffers: Vec::new(),
            rtv_heap,
            rtv_size,
            dsv_heap,
            depth: None,
            flags,
            tearing_supported,
            state,
        };
        surface.create_views(raw)?;
        Ok(surface)
    }

    /// Resize the back buffers in place.
    ///
    /// Every command list referencing the old buffers must have completed.
    pub fn resize(&mut self, device: &D3d12Device, width: u32, height: u32) -> Result<()> {
        self.back_buffers.clear();
        self.depth = None;

        let buffer_count = self.state.buffer_count();
        let resized = unsafe {
            self.swapchain
                .ResizeBuffers(buffer_count, width, height, DXGI_FORMAT_UNKNOWN, self.flags)
        };
        if let Err(e) = resized {
            self.state.invalidate();
            return Err(GpuError::SwapchainCreation(format!("ResizeBuffers: {e}")));
        }

        self.state.apply_resize(width, height, buffer_count);
        if let Err(err) = self.create_views(device.raw()) {
            self.back_buffers.clear();
            self.depth = None;
            self.state.invalidate();
            return Err(err);
        }
        Ok(())
    }

    fn create_views(&mut self, device: &ID3D12Device) -> Result<()> {
        let mut handle = unsafe { self.rtv_heap.GetCPUDescriptorHandleForHeapStart() };
        for i in 0..self.state.buffer_count() {
            let buffer: ID3D12Resource = unsafe { self.swapchain.GetBuffer(i)? };
            unsafe { device.CreateRenderTargetView(&buffer, None, handle) };
            self.back_buffers.push(buffer);
            handle.ptr += self.rtv_size as usize;
        }

        let depth = depth_buffer(device, self.state.width(), self.state.height())?;
        unsafe {
            device.CreateDepthStencilView(
                &depth,
                None,
                self.dsv_heap.GetCPUDescriptorHandleForHeapStart(),
            );
        }
        self.depth = Some(depth);
        Ok(())
    }

    pub fn current_index(&self) -> u32 {
        unsafe { self.swapchain.GetCurrentBackBufferIndex() }
    }

    pub fn back_buffer(&self, index: u32) -> Option<&ID3D12Resource> {
        self.back_buffers.get(index as usize)
    }

    pub fn rtv(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        let mut handle = unsafe { self.rtv_heap.GetCPUDescriptorHandleForHeapStart() };
        handle.ptr += (index * self.rtv_size) as usize;
        handle
    }

    pub fn dsv(&self) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        unsafe { self.dsv_heap.GetCPUDescriptorHandleForHeapStart() }
    }

    pub fn viewport(&self) -> D3D12_VIEWPORT {
        let viewport = self.state.viewport();
        D3D12_VIEWPORT {
            TopLeftX: viewport.x,
            TopLeftY: viewport.y,
            Width: viewport.width,
            Height: viewport.height,
            MinDepth: viewport.min_depth,
            MaxDepth: viewport.max_depth,
        }
    }

    /// Present with the interval and flags the vsync preference calls for.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn present(&self) -> Result<()> {
        let (interval, flags) = match present_request(self.state.vsync(), self.tearing_supported) {
            PresentRequest::Vsync => (1, DXGI_PRESENT(0)),
            PresentRequest::Immediate {
                allow_tearing: true,
            } => (0, DXGI_PRESENT_ALLOW_TEARING),
            PresentRequest::Immediate {
                allow_tearing: false,
            } => (0, DXGI_PRESENT(0)),
        };
        unsafe { self.swapchain.Present(interval, flags).ok()? };
        Ok(())
    }
}

fn hwnd(window: &dyn WindowHandleSource) -> Result<HWND> {
    let handle = window
        .window_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("window handle: {e}")))?;
    match handle.as_raw() {
        RawWindowHandle::Win32(handle) => Ok(HWND(handle.hwnd.get() as *mut std::ffi::c_void)),
        other => Err(GpuError::SurfaceCreation(format!(
            "D3D12 needs a Win32 window, got {other:?}"
        ))),
    }
}
