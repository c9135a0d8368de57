//! Vulkan instance creation and physical device selection.

use std::ffi::{c_char, CStr, CString};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::error::{GpuError, Result};

/// Validation layers to enable when requested.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan 1.3 instance.
///
/// With a display handle the platform surface extensions are enabled;
/// without one the instance can only drive offscreen work.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    display: Option<RawDisplayHandle>,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::DeviceCreation(format!("invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Cadence")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let mut extension_names: Vec<*const c_char> = match display {
        Some(display) => ash_window::enumerate_required_extensions(display)
            .map_err(|e| GpuError::ExtensionNotSupported(e.to_string()))?
            .to_vec(),
        None => Vec::new(),
    };
    if cfg!(target_os = "macos") {
        extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());
    }

    let layers = if enable_validation {
        validation_layers()
    } else {
        vec![]
    };

    let available_layers = entry.enumerate_instance_layer_properties()?;
    let layers: Vec<&CStr> = layers
        .into_iter()
        .filter(|layer| {
            let found = available_layers
                .iter()
                .any(|props| props.layer_name_as_c_str().is_ok_and(|name| name == *layer));
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect();
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = entry
        .create_instance(&create_info, None)
        .map_err(|e| GpuError::DeviceCreation(format!("vkCreateInstance: {e}")))?;

    Ok(instance)
}

/// What a physical device offers beyond the 1.0 core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFeatures {
    pub api_version: u32,
    pub timeline_semaphore: bool,
    pub dynamic_rendering: bool,
    pub synchronization2: bool,
}

impl DeviceFeatures {
    /// Query a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(device);

        let mut vk12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut vk13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut vk12)
            .push_next(&mut vk13);
        instance.get_physical_device_features2(device, &mut features2);

        Self {
            api_version: properties.api_version,
            timeline_semaphore: vk12.timeline_semaphore == vk::TRUE,
            dynamic_rendering: vk13.dynamic_rendering == vk::TRUE,
            synchronization2: vk13.synchronization2 == vk::TRUE,
        }
    }

    /// Vulkan 1.3 with timeline semaphores, dynamic rendering and sync2.
    pub fn meets_floor(&self) -> bool {
        let major = vk::api_version_major(self.api_version);
        let minor = vk::api_version_minor(self.api_version);
        (major, minor) >= (1, 3)
            && self.timeline_semaphore
            && self.dynamic_rendering
            && self.synchronization2
    }
}

/// Select a physical device.
///
/// Hardware adapters are ranked by device type and VRAM; CPU devices are only
/// chosen when `prefer_software` is set or nothing else meets the floor.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    prefer_software: bool,
) -> Result<vk::PhysicalDevice> {
    let devices = instance.enumerate_physical_devices()?;
    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice(
            "no Vulkan physical devices".to_string(),
        ));
    }

    devices
        .into_iter()
        .filter_map(|device| {
            score_physical_device(instance, device, prefer_software).map(|score| (score, device))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, device)| device)
        .ok_or_else(|| {
            GpuError::NoSuitableDevice(
                "no device supports Vulkan 1.3 with timeline semaphores".to_string(),
            )
        })
}

/// Score a physical device, `None` if it is below the feature floor.
unsafe fn score_physical_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    prefer_software: bool,
) -> Option<i64> {
    if !DeviceFeatures::query(instance, device).meets_floor() {
        return None;
    }

    let properties = instance.get_physical_device_properties(device);
    let mut score: i64 = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    };
    if prefer_software && properties.device_type == vk::PhysicalDeviceType::CPU {
        score += 1_000_000;
    }

    let memory = instance.get_physical_device_memory_properties(device);
    let vram_gb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size / (1024 * 1024 * 1024))
        .sum();
    score += vram_gb as i64;

    Some(score)
}
