//! Render pass with its multisampled color and depth attachments
//!
//! The attachments are sized once at construction; a resize destroys the
//! render pass and builds a new one. Framebuffers referencing the pass must be
//! dropped first, which the frame manager guarantees by dropping the swapchain
//! before the render pass.

use ash::vk;
use std::sync::Arc;

use crate::render::vulkan::resources::image::{Image, ImageInfo, ImageLayout};
use crate::render::vulkan::{Device, VulkanError, VulkanResult};

const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Requested MSAA count rounded up to a power of two and capped at what the device supports
pub fn clamp_sample_count(requested: u32, max_usable: vk::SampleCountFlags) -> vk::SampleCountFlags {
    let requested = requested.max(1).next_power_of_two().min(64);
    let max_usable = max_usable.as_raw().max(1);
    vk::SampleCountFlags::from_raw(requested.min(max_usable))
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    color: Option<Image>,
    depth: Image,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    color_format: vk::Format,
}

impl RenderPass {
    /// Create the attachments at `width` x `height` and the render pass that uses them
    ///
    /// With more than one sample the subpass renders into a multisampled color
    /// attachment and resolves into the presentable image. With one sample it
    /// renders into the presentable image directly.
    pub fn new(
        device: Arc<Device>,
        width: u32,
        height: u32,
        color_format: vk::Format,
        msaa_samples: u32,
    ) -> VulkanResult<Self> {
        let samples = clamp_sample_count(msaa_samples, device.max_usable_sample_count());
        let depth_format = device.find_supported_format(
            &DEPTH_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;
        let multisampled = samples != vk::SampleCountFlags::TYPE_1;

        let mut color = if multisampled {
            Some(Image::new(
                Arc::clone(&device),
                ImageInfo::color_attachment(width, height, color_format, samples),
            )?)
        } else {
            None
        };
        let mut depth = Image::new(
            Arc::clone(&device),
            ImageInfo::depth_attachment(width, height, depth_format, samples),
        )?;

        device.run_single_use(|command_buffer| {
            if let Some(color) = color.as_mut() {
                color.transition(command_buffer, ImageLayout::ColorAttachmentOptimal)?;
            }
            depth.transition(command_buffer, ImageLayout::DepthStencilAttachmentOptimal)
        })?;

        let render_pass = Self::create_native(&device, color_format, depth_format, samples)?;
        log::debug!("Created render pass {width}x{height} with {samples:?}, depth {depth_format:?}");

        Ok(Self {
            device,
            render_pass,
            color,
            depth,
            extent: vk::Extent2D { width, height },
            samples,
            color_format,
        })
    }

    fn create_native(
        device: &Device,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<vk::RenderPass> {
        let multisampled = samples != vk::SampleCountFlags::TYPE_1;

        let color_attachment = if multisampled {
            vk::AttachmentDescription::builder()
                .format(color_format)
                .samples(samples)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .build()
        } else {
            vk::AttachmentDescription::builder()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .build()
        };

        let depth_attachment = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        let resolve_attachment = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let resolve_refs = [vk::AttachmentReference {
            attachment: 2,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref);
        if multisampled {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }
        let subpasses = [subpass.build()];

        let attachments: Vec<vk::AttachmentDescription> = if multisampled {
            vec![color_attachment, depth_attachment, resolve_attachment]
        } else {
            vec![color_attachment, depth_attachment]
        };

        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .src_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build();
        let dependencies = [dependency];

        let render_pass_create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        unsafe {
            device
                .raw()
                .create_render_pass(&render_pass_create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Attachment list of the framebuffer for one swapchain image
    ///
    /// `[color, depth, swapchain_view]` when multisampled, otherwise
    /// `[swapchain_view, depth]`.
    pub fn framebuffer_attachments(&self, swapchain_view: vk::ImageView) -> Vec<vk::ImageView> {
        match &self.color {
            Some(color) => vec![color.view(), self.depth.view(), swapchain_view],
            None => vec![swapchain_view, self.depth.view()],
        }
    }

    /// Clear values for the color and depth attachments
    pub fn clear_values(&self, color: [f32; 4]) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ]
    }

    /// Area covering the whole attachment size
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.extent,
        }
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Attachment size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Sample count after clamping to the device limit
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Format of the presentable color attachment
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    /// Multisampled color attachment, absent when rendering with one sample
    pub fn color_attachment(&self) -> Option<&Image> {
        self.color.as_ref()
    }

    /// Depth-stencil attachment
    pub fn depth_attachment(&self) -> &Image {
        &self.depth
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        log::debug!("Destroying render pass {}x{}", self.extent.width, self.extent.height);
        unsafe {
            self.device.raw().destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_count_clamped_to_device() {
        assert_eq!(
            clamp_sample_count(8, vk::SampleCountFlags::TYPE_4),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            clamp_sample_count(4, vk::SampleCountFlags::TYPE_8),
            vk::SampleCountFlags::TYPE_4
        );
    }

    #[test]
    fn test_sample_count_rounds_up_to_power_of_two() {
        assert_eq!(
            clamp_sample_count(3, vk::SampleCountFlags::TYPE_64),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            clamp_sample_count(0, vk::SampleCountFlags::TYPE_64),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_single_sample_device() {
        assert_eq!(
            clamp_sample_count(4, vk::SampleCountFlags::TYPE_1),
            vk::SampleCountFlags::TYPE_1
        );
    }
}
