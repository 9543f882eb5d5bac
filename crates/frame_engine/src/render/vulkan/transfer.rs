//! Staged CPU to GPU transfers
//!
//! A [`StagedTransfer`] pairs a fixed-size host-visible staging buffer with the
//! GPU resource it fills. The destination decides what the copy looks like
//! through the [`Transferable`] capability, so buffers and images share one
//! upload protocol.

use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;

use crate::render::vulkan::resources::buffer::HostBuffer;
use crate::render::vulkan::{Device, VulkanResult};

/// A GPU resource that can be filled from a staging buffer
pub trait Transferable {
    /// Bytes the staging buffer must hold for one full upload
    fn staging_buffer_size(&self) -> vk::DeviceSize;

    /// Record the commands copying `source` into this resource
    fn insert_transfer_command(&mut self, command_buffer: vk::CommandBuffer, source: vk::Buffer) -> VulkanResult<()>;
}

/// What a resource contributes to a descriptor set write
#[derive(Debug, Clone, Copy)]
pub enum DescriptorInfo {
    /// Uniform or storage buffer range
    Buffer(vk::DescriptorBufferInfo),
    /// Sampled image with its sampler
    Image(vk::DescriptorImageInfo),
}

/// Descriptor type and info of one resource, taken together from that resource
#[derive(Debug, Clone, Copy)]
pub struct DescriptorBinding {
    /// Type the resource binds as
    pub descriptor_type: vk::DescriptorType,
    /// Buffer or image info
    pub info: DescriptorInfo,
}

impl DescriptorBinding {
    /// Single-descriptor write for `binding` of `set`
    ///
    /// The write points into `self`, which must stay in place until the
    /// descriptor update has been issued.
    pub fn write(&self, set: vk::DescriptorSet, binding: u32) -> vk::WriteDescriptorSet {
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(self.descriptor_type);
        match &self.info {
            DescriptorInfo::Buffer(info) => write.buffer_info(std::slice::from_ref(info)).build(),
            DescriptorInfo::Image(info) => write.image_info(std::slice::from_ref(info)).build(),
        }
    }
}

/// A resource that can be bound through a descriptor set
pub trait Describable {
    /// Descriptor type the resource binds as
    fn descriptor_type(&self) -> vk::DescriptorType;

    /// Buffer or image info for the descriptor write
    fn descriptor_info(&self) -> DescriptorInfo;

    /// Type and info of this resource, ready to be written into a set
    fn describe(&self) -> DescriptorBinding {
        DescriptorBinding {
            descriptor_type: self.descriptor_type(),
            info: self.descriptor_info(),
        }
    }
}

/// Staging buffer paired with the GPU resource it uploads into
pub struct StagedTransfer<D: Transferable> {
    device: Arc<Device>,
    staging: HostBuffer,
    destination: D,
}

impl<D: Transferable> StagedTransfer<D> {
    /// Build a staging buffer sized for `destination` and take ownership of it
    pub fn new(device: Arc<Device>, destination: D) -> VulkanResult<Self> {
        let staging = HostBuffer::staging(Arc::clone(&device), destination.staging_buffer_size())?;
        Ok(Self {
            device,
            staging,
            destination,
        })
    }

    /// Copy `data` into the staging buffer
    ///
    /// Fails with `StagingOverflow` when `data` is larger than the staging buffer.
    pub fn update_buffer(&mut self, data: &[u8]) -> VulkanResult<()> {
        self.staging.write(data)
    }

    /// Typed variant of [`update_buffer`](Self::update_buffer)
    pub fn update<T: Pod>(&mut self, data: &[T]) -> VulkanResult<()> {
        self.update_buffer(bytemuck::cast_slice(data))
    }

    /// Copy the staging contents into the destination
    ///
    /// With `Some(command_buffer)` the copy is only recorded and the caller
    /// submits it. With `None` the copy runs on a single-use command buffer and
    /// this call returns once the GPU has finished it.
    pub fn transfer_buffer(&mut self, command_buffer: Option<vk::CommandBuffer>) -> VulkanResult<()> {
        let source = self.staging.handle();
        match command_buffer {
            Some(command_buffer) => self.destination.insert_transfer_command(command_buffer, source),
            None => {
                let single_use = self.device.begin_single_use_command_buffer()?;
                self.destination
                    .insert_transfer_command(single_use.handle(), source)?;
                single_use.end()
            }
        }
    }

    /// Stage `data` and transfer it synchronously
    pub fn upload(&mut self, data: &[u8]) -> VulkanResult<()> {
        self.update_buffer(data)?;
        self.transfer_buffer(None)
    }

    /// The GPU resource
    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// The GPU resource, mutably
    pub fn destination_mut(&mut self) -> &mut D {
        &mut self.destination
    }

    /// Fixed staging capacity in bytes
    pub fn staging_size(&self) -> vk::DeviceSize {
        self.staging.size()
    }

    /// Release the staging buffer and keep only the GPU resource
    pub fn into_destination(self) -> D {
        self.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    struct UniformRange {
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    }

    impl Describable for UniformRange {
        fn descriptor_type(&self) -> vk::DescriptorType {
            vk::DescriptorType::UNIFORM_BUFFER
        }

        fn descriptor_info(&self) -> DescriptorInfo {
            DescriptorInfo::Buffer(vk::DescriptorBufferInfo {
                buffer: self.buffer,
                offset: 0,
                range: self.range,
            })
        }
    }

    #[test]
    fn test_buffer_binding_write() {
        let resource = UniformRange {
            buffer: vk::Buffer::from_raw(0x10),
            range: 128,
        };
        let binding = resource.describe();
        let set = vk::DescriptorSet::from_raw(0x20);
        let write = binding.write(set, 3);

        assert_eq!(write.dst_set, set);
        assert_eq!(write.dst_binding, 3);
        assert_eq!(write.dst_array_element, 0);
        assert_eq!(write.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(write.descriptor_count, 1);
        assert!(write.p_image_info.is_null());
        match &binding.info {
            DescriptorInfo::Buffer(info) => {
                assert_eq!(write.p_buffer_info, info as *const vk::DescriptorBufferInfo);
                assert_eq!(info.buffer, resource.buffer);
                assert_eq!(info.range, 128);
            }
            DescriptorInfo::Image(_) => panic!("expected buffer info"),
        }
    }

    #[test]
    fn test_image_binding_write() {
        let binding = DescriptorBinding {
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            info: DescriptorInfo::Image(vk::DescriptorImageInfo {
                sampler: vk::Sampler::from_raw(0x30),
                image_view: vk::ImageView::from_raw(0x40),
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }),
        };
        let write = binding.write(vk::DescriptorSet::null(), 0);

        assert_eq!(write.dst_binding, 0);
        assert_eq!(write.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(write.descriptor_count, 1);
        assert!(write.p_buffer_info.is_null());
        match &binding.info {
            DescriptorInfo::Image(info) => {
                assert_eq!(write.p_image_info, info as *const vk::DescriptorImageInfo);
                assert_eq!(info.image_view, vk::ImageView::from_raw(0x40));
            }
            DescriptorInfo::Buffer(_) => panic!("expected image info"),
        }
    }
}
