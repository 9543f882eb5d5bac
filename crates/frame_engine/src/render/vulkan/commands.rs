//! Command pool and per-frame command recording
//!
//! [`CommandRecorder`] owns the recording of one frame slot's primary command
//! buffer from `begin` to `end`; [`ActiveRenderPass`] scopes a render pass
//! inside it and ends the pass when dropped.

use ash::vk;
use std::sync::Arc;

use crate::render::vulkan::{Device, RenderPass, VulkanError, VulkanResult};

/// Command pool whose buffers can be reset individually
pub(crate) struct CommandPool {
    device: ash::Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    pub(crate) fn new(device: ash::Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(|result| VulkanError::AllocationFailed {
                    what: "command pool",
                    result,
                })?
        };

        Ok(Self { device, command_pool })
    }

    pub(crate) fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(|result| VulkanError::AllocationFailed {
                    what: "command buffers",
                    result,
                })
        }
    }

    pub(crate) fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, command_buffers);
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            // frees every buffer allocated from it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Viewport covering `extent` with the full depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Recording of one frame slot's primary command buffer
///
/// Recording starts when the recorder is created and finishes with
/// [`end`](Self::end). A recorder dropped without `end` still closes the
/// buffer so the slot can be begun again next frame.
pub struct CommandRecorder {
    device: Arc<Device>,
    command_buffer: vk::CommandBuffer,
    frame_index: usize,
    ended: bool,
}

impl CommandRecorder {
    /// Begin the command buffer of `frame_index` for a single submission
    ///
    /// The pool allows individual resets, so beginning discards whatever the
    /// buffer held from its previous submission. The caller must have waited
    /// for that submission first.
    pub fn begin(device: Arc<Device>, frame_index: usize) -> VulkanResult<Self> {
        let command_buffer = device.command_buffer(frame_index)?;
        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device
                .raw()
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self {
            device,
            command_buffer,
            frame_index,
            ended: false,
        })
    }

    /// Begin `render_pass` on `framebuffer`, clearing color to `clear_color` and depth to 1
    pub fn begin_render_pass(
        &mut self,
        render_pass: &RenderPass,
        framebuffer: vk::Framebuffer,
        clear_color: [f32; 4],
    ) -> ActiveRenderPass<'_> {
        let clear_values = render_pass.clear_values(clear_color);
        let render_area = render_pass.render_area();
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass.handle())
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            self.device.raw().cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }

        ActiveRenderPass {
            recorder: self,
            render_area,
        }
    }

    /// Finish recording; the buffer is ready for [`FrameManager::draw_image`](super::FrameManager::draw_image)
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        self.ended = true;
        unsafe {
            self.device
                .raw()
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }
        Ok(self.command_buffer)
    }

    /// Raw handle, for recording transfers into this buffer
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Frame slot this buffer belongs to
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        if !self.ended {
            log::warn!("Command buffer of frame {} dropped while recording", self.frame_index);
            unsafe {
                let _ = self.device.raw().end_command_buffer(self.command_buffer);
            }
        }
    }
}

/// Render pass being recorded, ended when dropped
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
    render_area: vk::Rect2D,
}

impl ActiveRenderPass<'_> {
    /// Set the dynamic viewport and scissor to the whole render area
    pub fn cover_render_area(&mut self) {
        let viewport = full_viewport(self.render_area.extent);
        let raw = self.recorder.device.raw();
        unsafe {
            raw.cmd_set_viewport(self.recorder.command_buffer, 0, &[viewport]);
            raw.cmd_set_scissor(self.recorder.command_buffer, 0, &[self.render_area]);
        }
    }

    /// Area the pass renders to
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }

    /// Command buffer the pass is recorded into, for bind and draw commands
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.recorder.command_buffer
    }
}

impl Drop for ActiveRenderPass<'_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder
                .device
                .raw()
                .cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_viewport_covers_extent() {
        let viewport = full_viewport(vk::Extent2D {
            width: 1280,
            height: 800,
        });
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (1280.0, 800.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }
}
