//! Sampled textures

use ash::vk;
use std::path::Path;
use std::sync::Arc;

use crate::render::vulkan::resources::image::{Image, ImageInfo};
use crate::render::vulkan::transfer::{DescriptorInfo, Describable, StagedTransfer};
use crate::render::vulkan::{Device, VulkanError, VulkanResult};

/// Texture sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Trilinear repeating sampler covering `mip_levels` levels
    pub fn new(device: Arc<Device>, mip_levels: u32) -> VulkanResult<Self> {
        let physical = device.physical();
        let anisotropy = physical.features.sampler_anisotropy == vk::TRUE;
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(physical.properties.limits.max_sampler_anisotropy.min(16.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);

        let sampler = unsafe {
            device
                .raw()
                .create_sampler(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, sampler })
    }

    /// Get the sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_sampler(self.sampler, None);
        }
    }
}

/// RGBA8 image uploaded through its own staging buffer, plus a sampler
pub struct Texture {
    image: StagedTransfer<Image>,
    sampler: Sampler,
}

impl Texture {
    /// Upload `pixels` (tightly packed sRGB RGBA8 rows) into a new texture
    pub fn from_rgba8(
        device: Arc<Device>,
        width: u32,
        height: u32,
        pixels: &[u8],
        generate_mip_maps: bool,
    ) -> VulkanResult<Self> {
        let info = ImageInfo::sampled(width, height, vk::Format::R8G8B8A8_SRGB, generate_mip_maps);
        let image = Image::new(Arc::clone(&device), info)?;
        let mut image = StagedTransfer::new(Arc::clone(&device), image)?;
        image.upload(pixels)?;

        let sampler = Sampler::new(device, image.destination().mip_levels())?;
        Ok(Self { image, sampler })
    }

    /// Decode an image file and upload it
    pub fn from_file(device: Arc<Device>, path: impl AsRef<Path>, generate_mip_maps: bool) -> VulkanResult<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)?.to_rgba8();
        log::debug!(
            "Loaded texture {} ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height()
        );
        Self::from_rgba8(device, decoded.width(), decoded.height(), decoded.as_raw(), generate_mip_maps)
    }

    /// Replace the texture contents; the previous contents are discarded
    pub fn reupload(&mut self, pixels: &[u8]) -> VulkanResult<()> {
        self.image.upload(pixels)
    }

    /// The underlying image
    pub fn image(&self) -> &Image {
        self.image.destination()
    }

    /// The sampler
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }
}

impl Describable for Texture {
    fn descriptor_type(&self) -> vk::DescriptorType {
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER
    }

    fn descriptor_info(&self) -> DescriptorInfo {
        DescriptorInfo::Image(vk::DescriptorImageInfo {
            sampler: self.sampler.handle(),
            image_view: self.image().view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
    }
}
