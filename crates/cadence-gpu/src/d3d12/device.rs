//! DXGI factory, adapter selection, D3D12 device and queues.

use windows::core::Interface;
use windows::Win32::Foundation::BOOL;
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_11_0;
use windows::Win32::Graphics::Direct3D12::{
    D3D12CreateDevice, D3D12GetDebugInterface, ID3D12CommandQueue, ID3D12Debug, ID3D12Device,
    D3D12_COMMAND_LIST_TYPE, D3D12_COMMAND_LIST_TYPE_COMPUTE, D3D12_COMMAND_LIST_TYPE_COPY,
    D3D12_COMMAND_LIST_TYPE_DIRECT, D3D12_COMMAND_QUEUE_DESC, D3D12_COMMAND_QUEUE_FLAG_NONE,
    D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV, D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
    D3D12_DESCRIPTOR_HEAP_TYPE_RTV, D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory2, IDXGIAdapter1, IDXGIFactory5, IDXGIFactory6, DXGI_ADAPTER_FLAG_SOFTWARE,
    DXGI_CREATE_FACTORY_DEBUG, DXGI_CREATE_FACTORY_FLAGS, DXGI_FEATURE_PRESENT_ALLOW_TEARING,
    DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
};

use super::command::{CommandAllocator, CommandList};
use super::fence::D3d12Fence;
use crate::backend::{AdapterInfo, DescriptorSizes};
use crate::error::{GpuError, Result};
use crate::hal::{CommandDevice, QueueType};

/// Owns the factory, adapter, device and one queue per [`QueueType`].
pub struct D3d12Device {
    factory: IDXGIFactory6,
    device: ID3D12Device,
    graphics_queue: ID3D12CommandQueue,
    compute_queue: ID3D12CommandQueue,
    copy_queue: ID3D12CommandQueue,
    adapter: AdapterInfo,
    tearing_supported: bool,
}

impl D3d12Device {
    /// Pick an adapter and create the device at feature level 11.0.
    pub fn new(use_software_adapter: bool, validation: bool) -> Result<Self> {
        if validation {
            enable_debug_layer();
        }

        let flags = if validation {
            DXGI_CREATE_FACTORY_DEBUG
        } else {
            DXGI_CREATE_FACTORY_FLAGS(0)
        };
        let factory: IDXGIFactory6 = unsafe { CreateDXGIFactory2(flags) }
            .map_err(|e| GpuError::DeviceCreation(format!("CreateDXGIFactory2: {e}")))?;

        let (adapter, device) = if use_software_adapter {
            let adapter: IDXGIAdapter1 = unsafe { factory.EnumWarpAdapter() }
                .map_err(|e| GpuError::NoSuitableDevice(format!("no WARP adapter: {e}")))?;
            let device = create_device(&adapter)?
                .ok_or_else(|| GpuError::NoSuitableDevice("WARP rejected feature level 11.0".into()))?;
            (adapter, device)
        } else {
            select_hardware_adapter(&factory)?
        };

        let adapter = adapter_info(&adapter, &device)?;
        tracing::info!("Selected GPU: {} ({})", adapter.name, adapter.api_version);

        let graphics_queue = create_queue(&device, D3D12_COMMAND_LIST_TYPE_DIRECT)?;
        let compute_queue = create_queue(&device, D3D12_COMMAND_LIST_TYPE_COMPUTE)?;
        let copy_queue = create_queue(&device, D3D12_COMMAND_LIST_TYPE_COPY)?;

        let tearing_supported = tearing_supported(&factory);
        tracing::debug!("Tearing present supported: {}", tearing_supported);

        Ok(Self {
            factory,
            device,
            graphics_queue,
            compute_queue,
            copy_queue,
            adapter,
            tearing_supported,
        })
    }

    pub const fn raw(&self) -> &ID3D12Device {
        &self.device
    }

    pub const fn factory(&self) -> &IDXGIFactory6 {
        &self.factory
    }

    pub const fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    pub const fn tearing_supported(&self) -> bool {
        self.tearing_supported
    }

    pub const fn queue(&self, queue: QueueType) -> &ID3D12CommandQueue {
        match queue {
            QueueType::Graphics => &self.graphics_queue,
            QueueType::Compute => &self.compute_queue,
            QueueType::Copy => &self.copy_queue,
        }
    }
}

impl CommandDevice for D3d12Device {
    type Allocator = CommandAllocator;
    type CommandList = CommandList;
    type Fence = D3d12Fence;
    type SubmitSync = ();

    fn create_allocator(&self, queue: QueueType) -> Result<CommandAllocator> {
        CommandAllocator::new(&self.device, list_type(queue))
    }

    fn create_command_list(
        &self,
        queue: QueueType,
        allocator: &CommandAllocator,
    ) -> Result<CommandList> {
        CommandList::new(&self.device, list_type(queue), allocator)
    }

    fn create_fence(&self) -> Result<D3d12Fence> {
        D3d12Fence::new(&self.device)
    }

    fn reset_allocator(&self, allocator: &mut CommandAllocator) -> Result<()> {
        allocator.reset()
    }

    fn begin_list(&self, list: &mut CommandList, allocator: &CommandAllocator) -> Result<()> {
        list.reset(allocator)
    }

    fn close_list(&self, list: &mut CommandList) -> Result<()> {
        list.close()
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn submit(
        &self,
        queue: QueueType,
        list: &CommandList,
        fence: &D3d12Fence,
        value: u64,
        _sync: &(),
    ) -> Result<()> {
        let queue = self.queue(queue);
        unsafe {
            queue.ExecuteCommandLists(&[Some(list.raw().cast()?)]);
            queue.Signal(fence.raw(), value)?;
        }
        Ok(())
    }
}

const fn list_type(queue: QueueType) -> D3D12_COMMAND_LIST_TYPE {
    match queue {
        QueueType::Graphics => D3D12_COMMAND_LIST_TYPE_DIRECT,
        QueueType::Compute => D3D12_COMMAND_LIST_TYPE_COMPUTE,
        QueueType::Copy => D3D12_COMMAND_LIST_TYPE_COPY,
    }
}

fn enable_debug_layer() {
    let mut debug: Option<ID3D12Debug> = None;
    match unsafe { D3D12GetDebugInterface(&mut debug) } {
        Ok(()) => {
            if let Some(debug) = debug {
                unsafe { debug.EnableDebugLayer() };
                tracing::warn!("D3D12 debug layer enabled");
            }
        }
        Err(err) => tracing::warn!("D3D12 debug layer not available: {}", err),
    }
}

/// Create a device on `adapter`, `None` if it is below feature level 11.0.
fn create_device(adapter: &IDXGIAdapter1) -> Result<Option<ID3D12Device>> {
    let mut device: Option<ID3D12Device> = None;
    match unsafe { D3D12CreateDevice(adapter, D3D_FEATURE_LEVEL_11_0, &mut device) } {
        Ok(()) => Ok(device),
        Err(err) => {
            tracing::debug!("D3D12CreateDevice failed: {}", err);
            Ok(None)
        }
    }
}

/// First hardware adapter, in high-performance order, that accepts 11.0.
fn select_hardware_adapter(factory: &IDXGIFactory6) -> Result<(IDXGIAdapter1, ID3D12Device)> {
    for index in 0.. {
        let Ok(adapter) = (unsafe {
            factory.EnumAdapterByGpuPreference::<IDXGIAdapter1>(
                index,
                DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
            )
        }) else {
            break;
        };

        let desc = unsafe { adapter.GetDesc1()? };
        if desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0 {
            continue;
        }
        if let Some(device) = create_device(&adapter)? {
            return Ok((adapter, device));
        }
    }

    Err(GpuError::NoSuitableDevice(
        "no hardware adapter supports feature level 11.0".to_string(),
    ))
}

fn adapter_info(adapter: &IDXGIAdapter1, device: &ID3D12Device) -> Result<AdapterInfo> {
    let desc = unsafe { adapter.GetDesc1()? };
    let name = String::from_utf16_lossy(&desc.Description);
    let name = name.trim_matches(char::from(0)).to_string();

    let descriptor_sizes = unsafe {
        DescriptorSizes {
            cbv_srv_uav: device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV),
            rtv: device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV),
            dsv: device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_DSV),
            sampler: device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER),
        }
    };

    Ok(AdapterInfo {
        name,
        vendor_id: desc.VendorId,
        device_id: desc.DeviceId,
        software: desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0,
        api_version: "D3D12 feature level 11_0".to_string(),
        descriptor_sizes: Some(descriptor_sizes),
    })
}

fn create_queue(device: &ID3D12Device, kind: D3D12_COMMAND_LIST_TYPE) -> Result<ID3D12CommandQueue> {
    let desc = D3D12_COMMAND_QUEUE_DESC {
        Type: kind,
        Priority: 0,
        Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
        NodeMask: 0,
    };
    unsafe { device.CreateCommandQueue(&desc) }
        .map_err(|e| GpuError::DeviceCreation(format!("CreateCommandQueue: {e}")))
}

fn tearing_supported(factory: &IDXGIFactory6) -> bool {
    let Ok(factory5) = factory.cast::<IDXGIFactory5>() else {
        return false;
    };
    let mut allow = BOOL(0);
    let result = unsafe {
        factory5.CheckFeatureSupport(
            DXGI_FEATURE_PRESENT_ALLOW_TEARING,
            std::ptr::addr_of_mut!(allow).cast(),
            std::mem::size_of::<BOOL>() as u32,
        )
    };
    result.is_ok() && allow.as_bool()
}
