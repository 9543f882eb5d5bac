//! Vulkan swapchain management
//!
//! A swapchain is either valid or stale. It goes stale when acquisition or
//! presentation reports the surface out of date or suboptimal, or when the
//! window reports a resize; a stale swapchain makes [`Swapchain::present`]
//! return `false` and must be rebuilt together with its render pass.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use crate::core::config::PresentModePreference;
use crate::render::vulkan::framebuffer::Framebuffer;
use crate::render::vulkan::surface::{choose_extent, choose_image_count, choose_present_mode, choose_surface_format};
use crate::render::vulkan::sync::FrameSync;
use crate::render::vulkan::{Device, RenderPass, VulkanError, VulkanResult};

/// Parameters a swapchain is built with, chosen from what the surface supports
#[derive(Debug, Clone, Copy)]
pub struct SwapchainParameters {
    /// Image format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Image size
    pub extent: vk::Extent2D,
    /// Minimum number of images requested
    pub image_count: u32,
    /// Surface transform at query time
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainParameters {
    /// Query the device's surface and pick format, mode, extent and image count
    pub fn query(device: &Device, window_size: (u32, u32), preference: PresentModePreference) -> VulkanResult<Self> {
        let surface = device.surface().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Device was created without a surface".to_string(),
        })?;
        let support = surface.support(device.physical().device)?;

        Ok(Self {
            format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes, preference),
            extent: choose_extent(&support.capabilities, window_size),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }

    /// Whether the surface currently has no area, as when the window is minimized
    pub fn is_zero_sized(&self) -> bool {
        self.extent.width == 0 || self.extent.height == 0
    }
}

/// Result of an image acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; `suboptimal` asks for a rebuild after this frame
    Acquired {
        /// Index of the acquired image
        index: u32,
        /// The surface no longer matches exactly
        suboptimal: bool,
    },
    /// The swapchain can no longer present
    OutOfDate,
}

/// Result of a presentation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented and the swapchain is still a match for the surface
    Presented,
    /// Presented or dropped, and the swapchain must be rebuilt
    Stale,
}

/// Map an acquisition result onto valid / stale, keeping real failures as errors
pub fn classify_acquire(result: VkResult<(u32, bool)>) -> VulkanResult<AcquireOutcome> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// Map a presentation result onto valid / stale, keeping real failures as errors
pub fn classify_present(result: VkResult<bool>) -> VulkanResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Stale),
        Err(e) => Err(VulkanError::PresentFailed(e)),
    }
}

/// Presentable images with their views, framebuffers and per-slot sync objects
pub struct Swapchain {
    device: Arc<Device>,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<Framebuffer>,
    frame_sync: Vec<FrameSync>,
    images_in_flight: Vec<Option<usize>>,
    acquired: Option<u32>,
    stale: bool,
    parameters: SwapchainParameters,
}

impl Swapchain {
    /// Create the swapchain, one view and framebuffer per image, and the sync objects
    pub fn new(device: Arc<Device>, render_pass: &RenderPass, parameters: SwapchainParameters) -> VulkanResult<Self> {
        let surface = device.surface().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Device was created without a surface".to_string(),
        })?;
        if parameters.extent != render_pass.extent() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Swapchain extent {:?} does not match render pass extent {:?}",
                    parameters.extent,
                    render_pass.extent()
                ),
            });
        }

        let loader = SwapchainLoader::new(device.instance(), device.raw());
        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(parameters.image_count)
            .image_format(parameters.format.format)
            .image_color_space(parameters.format.color_space)
            .image_extent(parameters.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(parameters.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(parameters.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe {
            loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        // From here on partial state is released by Drop
        let mut this = Self {
            device: Arc::clone(&device),
            loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            frame_sync: Vec::new(),
            images_in_flight: Vec::new(),
            acquired: None,
            stale: false,
            parameters,
        };

        this.images = unsafe {
            this.loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        for &image in &this.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(parameters.format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe {
                device
                    .raw()
                    .create_image_view(&create_info, None)
                    .map_err(VulkanError::Api)?
            };
            this.image_views.push(view);
        }

        for &view in &this.image_views {
            this.framebuffers
                .push(Framebuffer::new(Arc::clone(&device), render_pass, view)?);
        }

        for _ in 0..device.frames_in_flight() {
            this.frame_sync.push(FrameSync::new(device.raw())?);
        }
        this.images_in_flight = vec![None; this.images.len()];

        log::debug!(
            "Created swapchain {}x{} with {} images, {:?}, {:?}",
            parameters.extent.width,
            parameters.extent.height,
            this.images.len(),
            parameters.format.format,
            parameters.present_mode
        );

        Ok(this)
    }

    fn sync(&self, frame_index: usize) -> VulkanResult<&FrameSync> {
        self.frame_sync
            .get(frame_index)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("Frame index {frame_index} out of range"),
            })
    }

    /// Block until the slot's previous submission has finished executing
    pub fn wait_for_fence(&self, frame_index: usize) -> VulkanResult<()> {
        self.sync(frame_index)?
            .in_flight
            .wait(self.device.wait_timeout())
    }

    /// Acquire the next image for `frame_index` unless one is already held
    ///
    /// Returns `false` when the swapchain is stale. An image acquired as
    /// suboptimal is still held and presented before the rebuild.
    pub fn acquire(&mut self, frame_index: usize) -> VulkanResult<bool> {
        if self.acquired.is_some() {
            return Ok(true);
        }
        if self.stale {
            return Ok(false);
        }

        let semaphore = self.sync(frame_index)?.image_available.handle();
        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };

        match classify_acquire(result)? {
            AcquireOutcome::Acquired { index, suboptimal } => {
                self.acquired = Some(index);
                if suboptimal {
                    // finish this frame, rebuild before the next one
                    self.stale = true;
                }
                Ok(true)
            }
            AcquireOutcome::OutOfDate => {
                log::warn!("Swapchain out of date on acquire");
                self.stale = true;
                Ok(false)
            }
        }
    }

    /// Submit `command_buffer` for `frame_index` and present the acquired image
    ///
    /// Returns `false` without submitting when the swapchain is stale or
    /// `resize_pending` is set. A presentation that reports the surface out of
    /// date still returns `true`; the following acquisition reports the
    /// staleness.
    pub fn present(&mut self, command_buffer: vk::CommandBuffer, frame_index: usize, resize_pending: bool) -> VulkanResult<bool> {
        if resize_pending {
            log::warn!("Window resized, swapchain is stale");
            self.stale = true;
            return Ok(false);
        }
        if !self.acquire(frame_index)? {
            return Ok(false);
        }
        let image_index = self.acquired.ok_or(VulkanError::InvalidOperation {
            reason: "No swapchain image acquired".to_string(),
        })?;
        let image_slot = image_index as usize;

        let timeout = self.device.wait_timeout();
        if let Some(owner) = self.images_in_flight[image_slot] {
            if owner != frame_index {
                self.sync(owner)?.in_flight.wait(timeout)?;
            }
        }
        let sync = self.sync(frame_index)?;
        sync.in_flight.wait(timeout)?;
        sync.in_flight.reset()?;

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished.handle()];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .raw()
                .queue_submit(self.device.graphics_queue(), &[submit_info], sync.in_flight.handle())
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let result = unsafe {
            self.loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        self.images_in_flight[image_slot] = Some(frame_index);
        self.acquired = None;

        if classify_present(result)? == PresentOutcome::Stale {
            log::warn!("Swapchain out of date on present");
            self.stale = true;
        }
        Ok(true)
    }

    /// Framebuffer of the currently acquired image
    pub fn current_framebuffer(&self) -> Option<&Framebuffer> {
        self.acquired
            .and_then(|index| self.framebuffers.get(index as usize))
    }

    /// Framebuffer of swapchain image `index`
    pub fn framebuffer(&self, index: usize) -> Option<&Framebuffer> {
        self.framebuffers.get(index)
    }

    /// Index of the currently acquired image
    pub fn acquired_image(&self) -> Option<u32> {
        self.acquired
    }

    /// Whether the swapchain must be rebuilt
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.parameters.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.parameters.format
    }

    /// Present mode in use
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.parameters.present_mode
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Number of framebuffers, always equal to the image count
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of per-slot sync bundles, always equal to frames in flight
    pub fn sync_count(&self) -> usize {
        self.frame_sync.len()
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        log::debug!("Destroying swapchain");
        self.framebuffers.clear();
        unsafe {
            for &image_view in &self.image_views {
                self.device.raw().destroy_image_view(image_view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        // before the `device` field, which may hold the last reference
        self.frame_sync.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_success() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Acquired {
                index: 2,
                suboptimal: false
            }
        );
    }

    #[test]
    fn test_acquire_out_of_date_is_not_an_error() {
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
    }

    #[test]
    fn test_acquire_device_lost_is_fatal() {
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_present_results() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Stale);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::Stale
        );
    }

    #[test]
    fn test_present_surface_lost_is_fatal() {
        assert!(matches!(
            classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(VulkanError::PresentFailed(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }
}
