//! GPU images with a tracked layout state machine
//!
//! An [`Image`] records every layout change as exactly one pipeline barrier and
//! only accepts the transitions listed in [`layout_transition`]. Anything else
//! is an [`VulkanError::InvalidTransferRequest`]; there is no implicit
//! multi-hop path.

use ash::vk;
use std::sync::Arc;
use vk_mem::Alloc;

use crate::render::vulkan::transfer::Transferable;
use crate::render::vulkan::{Device, VulkanError, VulkanResult};

/// Layouts an [`Image`] can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// Contents undefined, the state after creation or before a re-upload
    Undefined,
    /// Destination of buffer copies and blits
    TransferDstOptimal,
    /// Color attachment of a render pass
    ColorAttachmentOptimal,
    /// Depth-stencil attachment of a render pass
    DepthStencilAttachmentOptimal,
    /// Sampled from shaders
    ShaderReadOnlyOptimal,
}

impl ImageLayout {
    /// Native layout value
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::TransferDstOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::ColorAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthStencilAttachmentOptimal => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

/// Access masks and pipeline stages of one layout transition barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage the barrier waits on
    pub src_stage: vk::PipelineStageFlags,
    /// Stage that waits for the barrier
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for `from -> to`, or an error if the pair is not supported
pub fn layout_transition(from: ImageLayout, to: ImageLayout) -> VulkanResult<LayoutTransition> {
    use ImageLayout::{
        ColorAttachmentOptimal, DepthStencilAttachmentOptimal, ShaderReadOnlyOptimal, TransferDstOptimal,
        Undefined,
    };

    let transition = match (from, to) {
        (Undefined, TransferDstOptimal) => LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (Undefined, ColorAttachmentOptimal) => LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        },
        (Undefined, DepthStencilAttachmentOptimal) => LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        },
        (TransferDstOptimal, ShaderReadOnlyOptimal) => LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        _ => return Err(VulkanError::InvalidTransferRequest { from, to }),
    };
    Ok(transition)
}

/// `floor(log2(max(width, height)))`, never less than 1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    (u32::BITS - 1 - largest.leading_zeros()).max(1)
}

/// Bytes per texel for the formats images can be uploaded in
pub fn texel_size(format: vk::Format) -> VulkanResult<vk::DeviceSize> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB => 1,
        vk::Format::R8G8_UNORM | vk::Format::R8G8_SRGB => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R32_SFLOAT => 4,
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R32G32_SFLOAT => 8,
        vk::Format::R32G32B32A32_SFLOAT => 16,
        _ => {
            return Err(VulkanError::UnsupportedFormat {
                format,
                reason: "no texel size known for uploads".to_string(),
            })
        }
    };
    Ok(size)
}

/// Bytes needed to stage mip 0 of a `width` x `height` image
pub fn image_staging_size(width: u32, height: u32, format: vk::Format) -> VulkanResult<vk::DeviceSize> {
    Ok(vk::DeviceSize::from(width) * vk::DeviceSize::from(height) * texel_size(format)?)
}

/// One step of a mipmap blit chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipBlit {
    /// Level read from
    pub src_level: u32,
    /// Level written to, always `src_level + 1`
    pub dst_level: u32,
    /// Size of the source level
    pub src_extent: (u32, u32),
    /// Size of the destination level
    pub dst_extent: (u32, u32),
}

/// Blits that fill levels `1..mip_levels` from their predecessor
pub fn mip_blit_chain(width: u32, height: u32, mip_levels: u32) -> Vec<MipBlit> {
    let level_extent = |level: u32| ((width >> level).max(1), (height >> level).max(1));
    (1..mip_levels)
        .map(|level| MipBlit {
            src_level: level - 1,
            dst_level: level,
            src_extent: level_extent(level - 1),
            dst_extent: level_extent(level),
        })
        .collect()
}

fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Check that an image of `format` with `mip_levels` levels can be filled from a staging buffer
///
/// Uploads copy into the color aspect only, so depth formats are rejected.
pub fn check_uploadable(format: vk::Format, mip_levels: u32, supports_linear_blit: bool) -> VulkanResult<()> {
    if is_depth_format(format) {
        return Err(VulkanError::UnsupportedFormat {
            format,
            reason: "depth images cannot be uploaded from a staging buffer".to_string(),
        });
    }
    texel_size(format)?;
    if mip_levels > 1 && !supports_linear_blit {
        return Err(VulkanError::UnsupportedFormat {
            format,
            reason: "linear blits are required to generate mip maps".to_string(),
        });
    }
    Ok(())
}

fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Aspect covered by barriers on images of `format`
pub fn barrier_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if is_depth_format(format) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

fn view_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if is_depth_format(format) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Creation parameters of an [`Image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Width of mip 0
    pub width: u32,
    /// Height of mip 0
    pub height: u32,
    /// Texel format
    pub format: vk::Format,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Samples per texel
    pub samples: vk::SampleCountFlags,
    /// Allocate a full mip chain and fill it after each upload
    pub generate_mip_maps: bool,
}

impl ImageInfo {
    /// Texture sampled from shaders, filled by buffer uploads
    pub fn sampled(width: u32, height: u32, format: vk::Format, generate_mip_maps: bool) -> Self {
        Self {
            width,
            height,
            format,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            samples: vk::SampleCountFlags::TYPE_1,
            generate_mip_maps,
        }
    }

    /// Transient multisampled color attachment
    pub fn color_attachment(width: u32, height: u32, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        Self {
            width,
            height,
            format,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            samples,
            generate_mip_maps: false,
        }
    }

    /// Depth-stencil attachment
    pub fn depth_attachment(width: u32, height: u32, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        Self {
            width,
            height,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            samples,
            generate_mip_maps: false,
        }
    }
}

/// GPU-local image with its view and tracked layout
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: vk_mem::Allocation,
    info: ImageInfo,
    mip_levels: u32,
    layout: ImageLayout,
}

impl Image {
    /// Allocate an image in the `Undefined` layout
    pub fn new(device: Arc<Device>, info: ImageInfo) -> VulkanResult<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Cannot create a {}x{} image", info.width, info.height),
            });
        }

        let mip_levels = if info.generate_mip_maps {
            mip_level_count(info.width, info.height)
        } else {
            1
        };
        let mut usage = info.usage;
        if mip_levels > 1 {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
        }

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: info.width,
                height: info.height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .format(info.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(info.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, mut allocation) = unsafe {
            device
                .allocator()
                .create_image(&image_info, &allocation_info)
                .map_err(|result| VulkanError::AllocationFailed { what: "image", result })?
        };

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(info.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: view_aspect(info.format),
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { device.raw().create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.allocator().destroy_image(image, &mut allocation) };
                return Err(VulkanError::Api(e));
            }
        };

        log::debug!(
            "Created {}x{} image {:?} with {} mip level(s)",
            info.width,
            info.height,
            info.format,
            mip_levels
        );

        Ok(Self {
            device,
            image,
            view,
            allocation,
            info,
            mip_levels,
            layout: ImageLayout::Undefined,
        })
    }

    /// Record one barrier moving every mip level to `new_layout`
    ///
    /// The tracked layout changes only once the barrier has been recorded.
    pub fn transition(&mut self, command_buffer: vk::CommandBuffer, new_layout: ImageLayout) -> VulkanResult<()> {
        let transition = layout_transition(self.layout, new_layout)?;
        self.record_barrier(
            command_buffer,
            (self.layout.to_vk(), new_layout.to_vk()),
            (transition.src_access, transition.dst_access),
            (transition.src_stage, transition.dst_stage),
            0,
            self.mip_levels,
        );
        self.layout = new_layout;
        Ok(())
    }

    fn record_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        (old_layout, new_layout): (vk::ImageLayout, vk::ImageLayout),
        (src_access, dst_access): (vk::AccessFlags, vk::AccessFlags),
        (src_stage, dst_stage): (vk::PipelineStageFlags, vk::PipelineStageFlags),
        base_mip_level: u32,
        level_count: u32,
    ) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: barrier_aspect(self.info.format),
                base_mip_level,
                level_count,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build();

        unsafe {
            self.device.raw().cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Fill levels `1..mip_levels` from mip 0, leaving every level shader-readable
    ///
    /// Expects the whole image in `TransferDstOptimal`.
    fn generate_mip_maps(&mut self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        // validates the final tracked transition before anything is recorded
        layout_transition(self.layout, ImageLayout::ShaderReadOnlyOptimal)?;

        let raw = self.device.raw();
        let color = vk::ImageAspectFlags::COLOR;
        let subresource = |mip_level| vk::ImageSubresourceLayers {
            aspect_mask: color,
            mip_level,
            base_array_layer: 0,
            layer_count: 1,
        };
        let corner = |(w, h): (u32, u32)| vk::Offset3D {
            x: w as i32,
            y: h as i32,
            z: 1,
        };

        for blit in mip_blit_chain(self.info.width, self.info.height, self.mip_levels) {
            self.record_barrier(
                command_buffer,
                (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
                (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_READ),
                (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER),
                blit.src_level,
                1,
            );

            let region = vk::ImageBlit::builder()
                .src_subresource(subresource(blit.src_level))
                .src_offsets([vk::Offset3D::default(), corner(blit.src_extent)])
                .dst_subresource(subresource(blit.dst_level))
                .dst_offsets([vk::Offset3D::default(), corner(blit.dst_extent)])
                .build();
            unsafe {
                raw.cmd_blit_image(
                    command_buffer,
                    self.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                    vk::Filter::LINEAR,
                );
            }

            self.record_barrier(
                command_buffer,
                (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (vk::AccessFlags::TRANSFER_READ, vk::AccessFlags::SHADER_READ),
                (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER),
                blit.src_level,
                1,
            );
        }

        // the last level was only ever written
        self.record_barrier(
            command_buffer,
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ),
            (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER),
            self.mip_levels - 1,
            1,
        );
        self.layout = ImageLayout::ShaderReadOnlyOptimal;
        Ok(())
    }

    /// Get the image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// View over every mip level
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Layout after the last recorded transition
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Size of mip 0
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.info.width,
            height: self.info.height,
        }
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.info.format
    }

    /// Samples per texel
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.info.samples
    }
}

impl Transferable for Image {
    fn staging_buffer_size(&self) -> vk::DeviceSize {
        // zero for formats without a texel size, which the staging buffer rejects
        image_staging_size(self.info.width, self.info.height, self.info.format).unwrap_or(0)
    }

    fn insert_transfer_command(&mut self, command_buffer: vk::CommandBuffer, source: vk::Buffer) -> VulkanResult<()> {
        let linear_blit = self.mip_levels > 1 && self.device.supports_linear_blit(self.info.format);
        check_uploadable(self.info.format, self.mip_levels, linear_blit)?;

        // previous contents are discarded on every upload
        self.layout = ImageLayout::Undefined;
        self.transition(command_buffer, ImageLayout::TransferDstOptimal)?;

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: self.info.width,
                height: self.info.height,
                depth: 1,
            })
            .build();
        unsafe {
            self.device.raw().cmd_copy_buffer_to_image(
                command_buffer,
                source,
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }

        if self.mip_levels > 1 {
            self.generate_mip_maps(command_buffer)
        } else {
            self.transition(command_buffer, ImageLayout::ShaderReadOnlyOptimal)
        }
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_image_view(self.view, None);
            self.device
                .allocator()
                .destroy_image(self.image, &mut self.allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ImageLayout::*;

    const ALL: [ImageLayout; 5] = [
        Undefined,
        TransferDstOptimal,
        ColorAttachmentOptimal,
        DepthStencilAttachmentOptimal,
        ShaderReadOnlyOptimal,
    ];

    #[test]
    fn test_legal_transitions() {
        let upload = layout_transition(Undefined, TransferDstOptimal).unwrap();
        assert_eq!(upload.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(upload.dst_access, vk::AccessFlags::TRANSFER_WRITE);

        let color = layout_transition(Undefined, ColorAttachmentOptimal).unwrap();
        assert_eq!(color.dst_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);

        let depth = layout_transition(Undefined, DepthStencilAttachmentOptimal).unwrap();
        assert_eq!(depth.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);

        let sampled = layout_transition(TransferDstOptimal, ShaderReadOnlyOptimal).unwrap();
        assert_eq!(sampled.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(sampled.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(sampled.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_exactly_four_transitions_are_legal() {
        let legal = ALL
            .iter()
            .flat_map(|&from| ALL.iter().map(move |&to| (from, to)))
            .filter(|&(from, to)| layout_transition(from, to).is_ok())
            .count();
        assert_eq!(legal, 4);
    }

    #[test]
    fn test_shader_read_to_transfer_dst_is_rejected() {
        match layout_transition(ShaderReadOnlyOptimal, TransferDstOptimal) {
            Err(VulkanError::InvalidTransferRequest { from, to }) => {
                assert_eq!(from, ShaderReadOnlyOptimal);
                assert_eq!(to, TransferDstOptimal);
            }
            other => panic!("expected InvalidTransferRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_no_implicit_multi_hop() {
        // Undefined -> ShaderReadOnly would need TransferDst in between
        assert!(layout_transition(Undefined, ShaderReadOnlyOptimal).is_err());
        assert!(layout_transition(Undefined, Undefined).is_err());
    }

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(512, 512), 9);
        assert_eq!(mip_level_count(1024, 16), 10);
        assert_eq!(mip_level_count(300, 200), 8);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 1);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_mip_blit_chain_covers_every_level() {
        let chain = mip_blit_chain(256, 64, mip_level_count(256, 64));
        assert_eq!(chain.len(), 7);
        for (i, blit) in chain.iter().enumerate() {
            assert_eq!(blit.src_level, i as u32);
            assert_eq!(blit.dst_level, i as u32 + 1);
        }
        assert_eq!(chain[0].src_extent, (256, 64));
        assert_eq!(chain[0].dst_extent, (128, 32));
        // height bottoms out at one texel
        assert_eq!(chain[6].dst_extent, (2, 1));
    }

    #[test]
    fn test_single_level_has_no_blits() {
        assert!(mip_blit_chain(64, 64, 1).is_empty());
    }

    #[test]
    fn test_texel_sizes() {
        assert_eq!(texel_size(vk::Format::R8G8B8A8_SRGB).unwrap(), 4);
        assert_eq!(texel_size(vk::Format::R8_UNORM).unwrap(), 1);
        assert_eq!(texel_size(vk::Format::R32G32B32A32_SFLOAT).unwrap(), 16);
        assert!(matches!(
            texel_size(vk::Format::BC7_SRGB_BLOCK),
            Err(VulkanError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_depth_formats_have_no_upload_size() {
        for format in [vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT] {
            assert!(matches!(texel_size(format), Err(VulkanError::UnsupportedFormat { .. })));
        }
    }

    #[test]
    fn test_check_uploadable() {
        check_uploadable(vk::Format::R8G8B8A8_SRGB, 1, false).unwrap();
        check_uploadable(vk::Format::R8G8B8A8_SRGB, 9, true).unwrap();

        assert!(matches!(
            check_uploadable(vk::Format::R8G8B8A8_SRGB, 9, false),
            Err(VulkanError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            check_uploadable(vk::Format::BC7_SRGB_BLOCK, 1, true),
            Err(VulkanError::UnsupportedFormat { .. })
        ));
        for format in [vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT, vk::Format::D16_UNORM] {
            match check_uploadable(format, 1, true) {
                Err(VulkanError::UnsupportedFormat { format: rejected, reason }) => {
                    assert_eq!(rejected, format);
                    assert!(reason.contains("depth"));
                }
                other => panic!("expected depth rejection, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_image_staging_size() {
        assert_eq!(image_staging_size(1280, 800, vk::Format::B8G8R8A8_UNORM).unwrap(), 1280 * 800 * 4);
    }

    #[test]
    fn test_barrier_aspect() {
        assert_eq!(barrier_aspect(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
        assert_eq!(barrier_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            barrier_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
