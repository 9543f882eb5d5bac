//! Swapchain framebuffers

use ash::vk;
use std::sync::Arc;

use crate::render::vulkan::{Device, RenderPass, VulkanError, VulkanResult};

/// Framebuffer binding one swapchain image view to a render pass's attachments
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Create a framebuffer for `swapchain_view` at the render pass's size
    pub fn new(device: Arc<Device>, render_pass: &RenderPass, swapchain_view: vk::ImageView) -> VulkanResult<Self> {
        let attachments = render_pass.framebuffer_attachments(swapchain_view);
        let extent = render_pass.extent();
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.handle())
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .raw()
                .create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Size shared with the render pass attachments
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_framebuffer(self.framebuffer, None);
        }
    }
}
