//! Vulkan device: instance, adapter, logical device, queues and allocator.

use std::collections::BTreeSet;
use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use super::command::{CommandAllocator, CommandList};
use super::instance::{create_instance, select_physical_device};
use super::memory::GpuAllocator;
use super::sync::{SubmitSync, TimelineFence};
use crate::backend::AdapterInfo;
use crate::error::{GpuError, Result};
use crate::hal::{CommandDevice, QueueType};

/// Queue family indices.
#[derive(Debug, Clone, Copy)]
struct QueueFamilyIndices {
    graphics: u32,
    compute: u32,
    transfer: u32,
}

/// Owns the Vulkan instance and logical device.
///
/// Everything created from the device holds an `Arc<ash::Device>` and must
/// be dropped before this value.
pub struct VulkanDevice {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    allocator: Arc<GpuAllocator>,
    families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    compute_queue: vk::Queue,
    transfer_queue: vk::Queue,
    adapter: AdapterInfo,
    presentable: bool,
}

impl VulkanDevice {
    /// Load Vulkan, pick an adapter and create the logical device.
    pub fn new(
        app_name: &str,
        display: Option<RawDisplayHandle>,
        use_software_adapter: bool,
        validation: bool,
    ) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::DeviceCreation(format!("failed to load Vulkan: {e}")))?;

        let instance = unsafe { create_instance(&entry, app_name, display, validation)? };

        match unsafe { Self::with_instance(entry, instance.clone(), display, use_software_adapter) } {
            Ok(device) => Ok(device),
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                Err(err)
            }
        }
    }

    unsafe fn with_instance(
        entry: ash::Entry,
        instance: ash::Instance,
        display: Option<RawDisplayHandle>,
        use_software_adapter: bool,
    ) -> Result<Self> {
        let physical_device = select_physical_device(&instance, use_software_adapter)?;
        let adapter = adapter_info(&instance, physical_device);
        if use_software_adapter && !adapter.software {
            tracing::warn!("No software Vulkan device found, using {}", adapter.name);
        }
        tracing::info!("Selected GPU: {} ({})", adapter.name, adapter.api_version);

        let families = find_queue_families(&instance, physical_device)?;
        let presentable = display.is_some();
        let device = create_device(&instance, physical_device, &families, presentable)?;
        let device = Arc::new(device);

        let allocator =
            match GpuAllocator::new(&instance, Arc::clone(&device), physical_device) {
                Ok(allocator) => Arc::new(allocator),
                Err(err) => {
                    device.destroy_device(None);
                    return Err(err);
                }
            };

        Ok(Self {
            graphics_queue: device.get_device_queue(families.graphics, 0),
            compute_queue: device.get_device_queue(families.compute, 0),
            transfer_queue: device.get_device_queue(families.transfer, 0),
            entry,
            instance,
            physical_device,
            device,
            allocator,
            families,
            adapter,
            presentable,
        })
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub const fn allocator(&self) -> &Arc<GpuAllocator> {
        &self.allocator
    }

    pub const fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// Whether the instance was created with surface extensions.
    pub const fn presentable(&self) -> bool {
        self.presentable
    }

    /// Queue family and queue for `queue`.
    pub const fn queue(&self, queue: QueueType) -> (u32, vk::Queue) {
        match queue {
            QueueType::Graphics => (self.families.graphics, self.graphics_queue),
            QueueType::Compute => (self.families.compute, self.compute_queue),
            QueueType::Copy => (self.families.transfer, self.transfer_queue),
        }
    }

    /// Wait for device to be idle.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                tracing::warn!("device_wait_idle failed during teardown: {}", err);
            }

            // Frees all VkDeviceMemory; must precede vkDestroyDevice.
            self.allocator.shutdown();

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
        tracing::debug!("Vulkan device destroyed");
    }
}

impl CommandDevice for VulkanDevice {
    type Allocator = CommandAllocator;
    type CommandList = CommandList;
    type Fence = TimelineFence;
    type SubmitSync = SubmitSync;

    fn create_allocator(&self, queue: QueueType) -> Result<CommandAllocator> {
        let (family, _) = self.queue(queue);
        CommandAllocator::new(Arc::clone(&self.device), family)
    }

    fn create_command_list(
        &self,
        _queue: QueueType,
        allocator: &CommandAllocator,
    ) -> Result<CommandList> {
        Ok(CommandList::new(allocator.buffer()))
    }

    fn create_fence(&self) -> Result<TimelineFence> {
        TimelineFence::new(Arc::clone(&self.device))
    }

    fn reset_allocator(&self, allocator: &mut CommandAllocator) -> Result<()> {
        allocator.reset()
    }

    fn begin_list(&self, list: &mut CommandList, allocator: &CommandAllocator) -> Result<()> {
        list.begin(&self.device, allocator)
    }

    fn close_list(&self, list: &mut CommandList) -> Result<()> {
        list.end(&self.device)
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn submit(
        &self,
        queue: QueueType,
        list: &CommandList,
        fence: &TimelineFence,
        value: u64,
        sync: &SubmitSync,
    ) -> Result<()> {
        let waits: Vec<vk::SemaphoreSubmitInfo<'_>> = sync
            .wait
            .iter()
            .map(|&semaphore| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(semaphore)
                    .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            })
            .collect();

        let mut signals: Vec<vk::SemaphoreSubmitInfo<'_>> = sync
            .signal
            .iter()
            .map(|&semaphore| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(semaphore)
                    .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            })
            .collect();
        signals.push(
            vk::SemaphoreSubmitInfo::default()
                .semaphore(fence.raw())
                .value(value)
                .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS),
        );

        let command_buffers = [vk::CommandBufferSubmitInfo::default().command_buffer(list.raw())];
        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&waits)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signals);

        let (_, raw_queue) = self.queue(queue);
        unsafe {
            self.device
                .queue_submit2(raw_queue, &[submit_info], vk::Fence::null())
                .map_err(|e| match e {
                    vk::Result::ERROR_DEVICE_LOST => GpuError::DeviceLost,
                    other => GpuError::Vulkan(other),
                })?;
        }
        Ok(())
    }
}

unsafe fn adapter_info(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> AdapterInfo {
    let properties = instance.get_physical_device_properties(physical_device);
    let name = properties
        .device_name_as_c_str()
        .map_or_else(|_| "unknown".to_string(), |n| n.to_string_lossy().into_owned());
    let version = properties.api_version;

    AdapterInfo {
        name,
        vendor_id: properties.vendor_id,
        device_id: properties.device_id,
        software: properties.device_type == vk::PhysicalDeviceType::CPU,
        api_version: format!(
            "Vulkan {}.{}.{}",
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version)
        ),
        descriptor_sizes: None,
    }
}

/// Find queue families for graphics, compute, and transfer.
///
/// Dedicated compute and transfer families are preferred; both fall back to
/// the graphics family.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<QueueFamilyIndices> {
    let queue_families = instance.get_physical_device_queue_family_properties(physical_device);

    let mut graphics_family = None;
    let mut compute_family = None;
    let mut transfer_family = None;

    for (i, family) in queue_families.iter().enumerate() {
        let i = i as u32;
        let flags = family.queue_flags;

        if flags.contains(vk::QueueFlags::COMPUTE)
            && !flags.contains(vk::QueueFlags::GRAPHICS)
            && compute_family.is_none()
        {
            compute_family = Some(i);
        }

        if flags.contains(vk::QueueFlags::TRANSFER)
            && !flags.contains(vk::QueueFlags::GRAPHICS)
            && !flags.contains(vk::QueueFlags::COMPUTE)
            && transfer_family.is_none()
        {
            transfer_family = Some(i);
        }

        if flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
            graphics_family = Some(i);
        }
    }

    let graphics = graphics_family
        .ok_or_else(|| GpuError::NoSuitableDevice("no graphics queue family".to_string()))?;

    Ok(QueueFamilyIndices {
        graphics,
        compute: compute_family.unwrap_or(graphics),
        transfer: transfer_family.unwrap_or(graphics),
    })
}

fn required_device_extensions(presentable: bool) -> Vec<&'static CStr> {
    if presentable {
        vec![ash::khr::swapchain::NAME]
    } else {
        Vec::new()
    }
}

/// Create the logical device.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: &QueueFamilyIndices,
    presentable: bool,
) -> Result<ash::Device> {
    let unique_families: BTreeSet<u32> = [families.graphics, families.compute, families.transfer]
        .into_iter()
        .collect();

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo<'_>> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const std::ffi::c_char> = required_device_extensions(presentable)
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);
    let mut vulkan_1_2_features =
        vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut vulkan_1_3_features)
        .push_next(&mut vulkan_1_2_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(|e| GpuError::DeviceCreation(format!("vkCreateDevice: {e}")))
}
