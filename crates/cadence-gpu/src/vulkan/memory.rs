//! GPU memory management via gpu-allocator.
//!
//! Buffers and images keep an `Arc` to the allocator that produced them and
//! free their allocation on drop. The allocator itself is shut down by the
//! device before `vkDestroyDevice`.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::error::{GpuError, Result};

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Mutex<Option<Allocator>>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Mutex::new(Some(allocator)),
            device,
        })
    }

    fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> Result<Allocation> {
        self.allocator
            .lock()
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("allocator is shut down".to_string()))?
            .allocate(desc)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    fn free(&self, allocation: Allocation) {
        if let Some(allocator) = self.allocator.lock().as_mut() {
            if let Err(err) = allocator.free(allocation) {
                tracing::warn!("Failed to free GPU allocation: {}", err);
            }
        }
    }

    /// Allocate a buffer.
    pub fn create_buffer(
        self: &Arc<Self>,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        let gpu_buffer = GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
            owner: Arc::clone(self),
        };
        unsafe {
            self.device
                .bind_buffer_memory(buffer, gpu_buffer.memory(), gpu_buffer.offset())?;
        }
        Ok(gpu_buffer)
    }

    /// Allocate an image.
    pub fn create_image(
        self: &Arc<Self>,
        create_info: &vk::ImageCreateInfo<'_>,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        let image = unsafe { self.device.create_image(create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(err);
            }
        };

        let gpu_image = GpuImage {
            image,
            allocation: Some(allocation),
            format: create_info.format,
            owner: Arc::clone(self),
        };
        unsafe {
            let allocation = gpu_image.allocation.as_ref();
            self.device.bind_image_memory(
                image,
                allocation.map_or(vk::DeviceMemory::null(), |a| a.memory()),
                allocation.map_or(0, Allocation::offset),
            )?;
        }
        Ok(gpu_image)
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// Must run before the Vulkan device is destroyed. Anything still
    /// allocated is logged as a leak.
    pub fn shutdown(&self) {
        if let Some(allocator) = self.allocator.lock().take() {
            drop(allocator);
        }
    }
}

/// A GPU buffer with its allocation.
pub struct GpuBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    owner: Arc<GpuAllocator>,
}

impl GpuBuffer {
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub const fn size(&self) -> u64 {
        self.size
    }

    fn memory(&self) -> vk::DeviceMemory {
        self.allocation
            .as_ref()
            .map_or(vk::DeviceMemory::null(), |a| unsafe { a.memory() })
    }

    fn offset(&self) -> u64 {
        self.allocation.as_ref().map_or(0, Allocation::offset)
    }

    /// Copy `data` to the start of the buffer (must be host-visible).
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if data.len() as u64 > self.size {
            return Err(GpuError::InvalidState(format!(
                "{} bytes do not fit a {} byte buffer",
                data.len(),
                self.size
            )));
        }
        let mapped = self
            .allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
            .ok_or_else(|| GpuError::InvalidState("buffer is not host-visible".to_string()))?;
        mapped[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.owner.free(allocation);
        }
        unsafe { self.owner.device.destroy_buffer(self.buffer, None) };
    }
}

/// A GPU image with its allocation.
pub struct GpuImage {
    image: vk::Image,
    allocation: Option<Allocation>,
    format: vk::Format,
    owner: Arc<GpuAllocator>,
}

impl GpuImage {
    pub const fn handle(&self) -> vk::Image {
        self.image
    }

    pub const fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.owner.free(allocation);
        }
        unsafe { self.owner.device.destroy_image(self.image, None) };
    }
}
