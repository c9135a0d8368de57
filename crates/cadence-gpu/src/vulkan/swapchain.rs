//! Window surfaces, swapchains and depth buffers.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;

use super::device::VulkanDevice;
use super::memory::GpuImage;
use super::sync::Semaphore;
use crate::error::{GpuError, Result};
use crate::hal::QueueType;
use crate::surface::{present_request, PresentRequest, SurfaceState, WindowHandleSource};

/// Depth attachment format.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Swapchain handle with its images and views.
pub struct Swapchain {
    device: Arc<ash::Device>,
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain, retiring `old_swapchain` if given.
    ///
    /// # Safety
    /// All handles must be valid.
    #[allow(clippy::too_many_arguments)]
    unsafe fn new(
        device: Arc<ash::Device>,
        loader: ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
        desired_images: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        let mut image_count = desired_images.max(capabilities.min_image_count);
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let handle = loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let mut swapchain = Self {
            device,
            loader,
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
        };

        swapchain.images = swapchain.loader.get_swapchain_images(handle)?;
        for &image in &swapchain.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(color_range());
            let view = swapchain.device.create_image_view(&view_info, None)?;
            swapchain.image_views.push(view);
        }

        Ok(swapchain)
    }

    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub const fn format(&self) -> vk::Format {
        self.format
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// Depth image sized to a swapchain.
pub struct DepthBuffer {
    device: Arc<ash::Device>,
    view: vk::ImageView,
    image: GpuImage,
}

impl DepthBuffer {
    fn new(vulkan: &VulkanDevice, extent: vk::Extent2D) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = vulkan
            .allocator()
            .create_image(&create_info, MemoryLocation::GpuOnly, "depth")?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.handle())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(depth_range());
        let view = unsafe { vulkan.device().create_image_view(&view_info, None)? };

        Ok(Self {
            device: Arc::clone(vulkan.device()),
            view,
            image,
        })
    }

    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    pub const fn image(&self) -> vk::Image {
        self.image.handle()
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe { self.device.destroy_image_view(self.view, None) };
    }
}

/// A back buffer acquired for the current frame.
#[derive(Debug, Clone, Copy)]
pub struct AcquiredImage {
    pub index: u32,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub wait: vk::Semaphore,
    pub signal: vk::Semaphore,
}

/// Window surface plus everything needed to present to it.
pub struct VulkanSurface {
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    swapchain: Option<Swapchain>,
    depth: Option<DepthBuffer>,
    /// One per frame slot, signalled by acquire.
    image_available: Vec<Semaphore>,
    /// One per swapchain image, waited by present.
    render_finished: Vec<Semaphore>,
    frames_in_flight: usize,
    pub state: SurfaceState,
    needs_rebuild: bool,
}

impl VulkanSurface {
    /// Create a surface and swapchain for `window`.
    pub fn new(
        vulkan: &VulkanDevice,
        window: &dyn WindowHandleSource,
        width: u32,
        height: u32,
        vsync: bool,
        frames_in_flight: usize,
    ) -> Result<Self> {
        if !vulkan.presentable() {
            return Err(GpuError::SurfaceCreation(
                "backend was created without a display handle".to_string(),
            ));
        }

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("window handle: {e}")))?;

        let surface = unsafe {
            ash_window::create_surface(
                vulkan.entry(),
                vulkan.instance(),
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(vulkan.entry(), vulkan.instance());
        let swapchain_loader = ash::khr::swapchain::Device::new(vulkan.instance(), vulkan.device());

        let mut this = Self {
            surface_loader,
            swapchain_loader,
            physical_device: vulkan.physical_device(),
            surface,
            swapchain: None,
            depth: None,
            image_available: Vec::new(),
            render_finished: Vec::new(),
            frames_in_flight,
            state: SurfaceState::new(width, height, frames_in_flight as u32, vsync),
            needs_rebuild: true,
        };

        let (family, _) = vulkan.queue(QueueType::Graphics);
        let supported = unsafe {
            this.surface_loader.get_physical_device_surface_support(
                this.physical_device,
                family,
                this.surface,
            )?
        };
        if !supported {
            return Err(GpuError::SurfaceCreation(
                "graphics queue cannot present to this surface".to_string(),
            ));
        }

        let (w, h) = (this.state.width(), this.state.height());
        match this.rebuild(vulkan, w, h) {
            // Minimized at creation: stays suspended until the next resize.
            Ok(()) | Err(GpuError::ZeroExtent { .. }) => Ok(this),
            Err(err) => Err(err),
        }
    }

    /// Recreate the swapchain and depth buffer at `width`x`height`.
    ///
    /// The caller must have waited for the GPU to stop using the old images.
    pub fn rebuild(&mut self, vulkan: &VulkanDevice, width: u32, height: u32) -> Result<()> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                self.surface_loader
                    .get_physical_device_surface_capabilities(self.physical_device, self.surface)?,
                self.surface_loader
                    .get_physical_device_surface_formats(self.physical_device, self.surface)?,
                self.surface_loader
                    .get_physical_device_surface_present_modes(self.physical_device, self.surface)?,
            )
        };

        let extent = calculate_extent(&capabilities, width, height);
        if extent.width == 0 || extent.height == 0 {
            self.state.suspend();
            return Err(GpuError::ZeroExtent {
                width: extent.width,
                height: extent.height,
            });
        }

        let surface_format = select_surface_format(&formats).ok_or_else(|| {
            GpuError::SwapchainCreation("surface reports no formats".to_string())
        })?;
        let present_mode = select_present_mode(&present_modes, self.state.vsync());

        let old = self
            .swapchain
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |s| s.handle);
        let swapchain = unsafe {
            Swapchain::new(
                Arc::clone(vulkan.device()),
                self.swapchain_loader.clone(),
                self.surface,
                &capabilities,
                surface_format,
                present_mode,
                extent,
                self.state.buffer_count().max(2),
                old,
            )?
        };
        // Retire the old chain only after its replacement exists.
        self.swapchain = Some(swapchain);
        self.depth = None;
        self.depth = Some(DepthBuffer::new(vulkan, extent)?);

        let image_count = self.swapchain.as_ref().map_or(0, Swapchain::image_count);
        // Fresh acquire semaphores: an abandoned frame can leave one signalled.
        self.image_available = (0..self.frames_in_flight)
            .map(|_| Semaphore::new(Arc::clone(vulkan.device())))
            .collect::<Result<Vec<_>>>()?;
        self.render_finished = (0..image_count)
            .map(|_| Semaphore::new(Arc::clone(vulkan.device())))
            .collect::<Result<Vec<_>>>()?;

        self.state
            .apply_resize(extent.width, extent.height, image_count);
        self.needs_rebuild = false;

        tracing::debug!(
            "Swapchain {}x{} with {} images ({:?}, {:?})",
            extent.width,
            extent.height,
            image_count,
            surface_format.format,
            present_mode
        );
        Ok(())
    }

    /// Acquire the next back buffer for frame `slot`.
    ///
    /// Returns `None` when the swapchain is out of date; it is rebuilt before
    /// the next frame.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn acquire(&mut self, slot: usize) -> Result<Option<AcquiredImage>> {
        let Some(swapchain) = self.swapchain.as_ref() else {
            return Ok(None);
        };
        let wait = self
            .image_available
            .get(slot)
            .map(Semaphore::raw)
            .ok_or_else(|| GpuError::InvalidState(format!("no acquire semaphore for slot {slot}")))?;

        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain.handle, u64::MAX, wait, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.needs_rebuild = true;
                }
                let i = index as usize;
                let signal = self
                    .render_finished
                    .get(i)
                    .map(Semaphore::raw)
                    .ok_or_else(|| GpuError::InvalidState(format!("image {index} out of range")))?;
                Ok(Some(AcquiredImage {
                    index,
                    image: swapchain.images[i],
                    view: swapchain.image_views[i],
                    wait,
                    signal,
                }))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_rebuild = true;
                Ok(None)
            }
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Present `image` once its `signal` semaphore fires.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn present(&mut self, queue: vk::Queue, image: &AcquiredImage) -> Result<()> {
        let Some(swapchain) = self.swapchain.as_ref() else {
            return Ok(());
        };

        let wait_semaphores = [image.signal];
        let swapchains = [swapchain.handle];
        let image_indices = [image.index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.needs_rebuild = true;
                Ok(())
            }
            Err(e) => Err(GpuError::from(e)),
        }
    }

    pub const fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Force a rebuild before the next frame.
    pub fn mark_for_rebuild(&mut self) {
        self.needs_rebuild = true;
    }

    pub fn format(&self) -> Option<vk::Format> {
        self.swapchain.as_ref().map(Swapchain::format)
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(Swapchain::extent)
    }

    pub fn depth(&self) -> Option<&DepthBuffer> {
        self.depth.as_ref()
    }
}

impl Drop for VulkanSurface {
    fn drop(&mut self) {
        self.depth = None;
        self.swapchain = None;
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

pub(crate) const fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub(crate) const fn depth_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::DEPTH,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Select the best surface format, preferring sRGB BGRA.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Map the vsync preference to a present mode.
///
/// Vsync uses FIFO. Otherwise MAILBOX is preferred, then IMMEDIATE (tearing),
/// then FIFO, which is always supported.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    let tearing = available.contains(&vk::PresentModeKHR::IMMEDIATE);
    match present_request(vsync, tearing) {
        PresentRequest::Vsync => vk::PresentModeKHR::FIFO,
        PresentRequest::Immediate { .. } if available.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        PresentRequest::Immediate {
            allow_tearing: true,
        } => vk::PresentModeKHR::IMMEDIATE,
        PresentRequest::Immediate {
            allow_tearing: false,
        } => vk::PresentModeKHR::FIFO,
    }
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    } else {
        capabilities.current_extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_mode_follows_vsync() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);

        let tearing = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            select_present_mode(&tearing, false),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(select_surface_format(&[unorm, srgb]), Some(srgb));
        assert_eq!(select_surface_format(&[unorm]), Some(unorm));
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn extent_clamps_when_surface_defers() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };
        let extent = calculate_extent(&caps, 8000, 600);
        assert_eq!((extent.width, extent.height), (4096, 600));
    }
}
