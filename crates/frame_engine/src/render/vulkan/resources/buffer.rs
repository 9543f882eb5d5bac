//! Buffers backed by the device allocator
//!
//! [`HostBuffer`] is host-visible and coherent, used for staging and read-back.
//! [`DeviceBuffer`] lives in GPU-local memory and is filled through a
//! [`StagedTransfer`](crate::render::vulkan::StagedTransfer).

use ash::vk;
use std::sync::Arc;
use vk_mem::Alloc;

use crate::render::vulkan::transfer::{DescriptorInfo, Describable, Transferable};
use crate::render::vulkan::{Device, VulkanError, VulkanResult};

fn create_buffer(
    device: &Device,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    allocation_info: &vk_mem::AllocationCreateInfo,
    what: &'static str,
) -> VulkanResult<(vk::Buffer, vk_mem::Allocation)> {
    if size == 0 {
        return Err(VulkanError::InvalidOperation {
            reason: format!("Cannot create a zero-sized {what}"),
        });
    }

    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    unsafe {
        device
            .allocator()
            .create_buffer(&buffer_info, allocation_info)
            .map_err(|result| VulkanError::AllocationFailed { what, result })
    }
}

/// Host-visible, host-coherent buffer
pub struct HostBuffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
}

impl HostBuffer {
    /// Buffer the CPU writes sequentially and the GPU copies from
    pub fn staging(device: Arc<Device>, size: vk::DeviceSize) -> VulkanResult<Self> {
        Self::new(
            device,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            "staging buffer",
        )
    }

    /// Buffer the GPU copies into and the CPU reads back
    pub fn readback(device: Arc<Device>, size: vk::DeviceSize) -> VulkanResult<Self> {
        Self::new(
            device,
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
            "read-back buffer",
        )
    }

    fn new(
        device: Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        host_access: vk_mem::AllocationCreateFlags,
        what: &'static str,
    ) -> VulkanResult<Self> {
        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::Auto,
            flags: host_access,
            required_flags: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ..Default::default()
        };
        let (buffer, allocation) = create_buffer(&device, size, usage, &allocation_info, what)?;

        Ok(Self {
            device,
            buffer,
            allocation,
            size,
        })
    }

    /// Copy `data` to the start of the buffer
    ///
    /// Writing more than the buffer holds fails with
    /// [`VulkanError::StagingOverflow`]; the buffer never grows.
    pub fn write(&mut self, data: &[u8]) -> VulkanResult<()> {
        let requested = data.len() as vk::DeviceSize;
        if requested > self.size {
            return Err(VulkanError::StagingOverflow {
                requested,
                capacity: self.size,
            });
        }

        unsafe {
            let mapped = self
                .device
                .allocator()
                .map_memory(&mut self.allocation)
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
            self.device.allocator().unmap_memory(&mut self.allocation);
        }
        Ok(())
    }

    /// Copy the whole buffer out to host memory
    pub fn read(&mut self) -> VulkanResult<Vec<u8>> {
        let mut out = vec![0u8; self.size as usize];
        unsafe {
            let mapped = self
                .device
                .allocator()
                .map_memory(&mut self.allocation)
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(mapped, out.as_mut_ptr(), out.len());
            self.device.allocator().unmap_memory(&mut self.allocation);
        }
        Ok(out)
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Fixed capacity in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .allocator()
                .destroy_buffer(self.buffer, &mut self.allocation);
        }
    }
}

/// GPU-local buffer with a fixed byte size
pub struct DeviceBuffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
}

impl DeviceBuffer {
    /// Create a buffer for `usage`; transfer source and destination are always added
    pub fn new(device: Arc<Device>, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<Self> {
        let usage = usage | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC;
        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (buffer, allocation) = create_buffer(&device, size, usage, &allocation_info, "device buffer")?;
        log::debug!("Created device buffer of {size} bytes ({usage:?})");

        Ok(Self {
            device,
            buffer,
            allocation,
            size,
            usage,
        })
    }

    /// Vertex buffer
    pub fn vertex(device: Arc<Device>, size: vk::DeviceSize) -> VulkanResult<Self> {
        Self::new(device, size, vk::BufferUsageFlags::VERTEX_BUFFER)
    }

    /// Index buffer
    pub fn index(device: Arc<Device>, size: vk::DeviceSize) -> VulkanResult<Self> {
        Self::new(device, size, vk::BufferUsageFlags::INDEX_BUFFER)
    }

    /// Uniform buffer
    pub fn uniform(device: Arc<Device>, size: vk::DeviceSize) -> VulkanResult<Self> {
        Self::new(device, size, vk::BufferUsageFlags::UNIFORM_BUFFER)
    }

    /// Bind as vertex buffer at `binding`
    pub fn bind_as_vertex_buffer(&self, command_buffer: vk::CommandBuffer, binding: u32) {
        unsafe {
            self.device
                .raw()
                .cmd_bind_vertex_buffers(command_buffer, binding, &[self.buffer], &[0]);
        }
    }

    /// Bind as index buffer
    pub fn bind_as_index_buffer(&self, command_buffer: vk::CommandBuffer, index_type: vk::IndexType) {
        unsafe {
            self.device
                .raw()
                .cmd_bind_index_buffer(command_buffer, self.buffer, 0, index_type);
        }
    }

    /// Copy the GPU contents back to the host, waiting for the copy to finish
    pub fn read_back(&self) -> VulkanResult<Vec<u8>> {
        let mut host = HostBuffer::readback(Arc::clone(&self.device), self.size)?;
        let raw = self.device.raw();

        self.device.run_single_use(|command_buffer| {
            let before = vk::MemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
                .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
                .build();
            let after = vk::MemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::HOST_READ)
                .build();
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: self.size,
            };
            unsafe {
                raw.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[before],
                    &[],
                    &[],
                );
                raw.cmd_copy_buffer(command_buffer, self.buffer, host.handle(), &[region]);
                raw.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::HOST,
                    vk::DependencyFlags::empty(),
                    &[after],
                    &[],
                    &[],
                );
            }
            Ok(())
        })?;

        host.read()
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Byte size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage flags, including the implicit transfer bits
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }
}

/// Access mask of the stages that consume a buffer with `usage`
pub(crate) fn consumer_access(usage: vk::BufferUsageFlags) -> vk::AccessFlags {
    let mut access = vk::AccessFlags::empty();
    if usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER) {
        access |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if usage.contains(vk::BufferUsageFlags::INDEX_BUFFER) {
        access |= vk::AccessFlags::INDEX_READ;
    }
    if usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
        access |= vk::AccessFlags::UNIFORM_READ;
    }
    if usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER) {
        access |= vk::AccessFlags::SHADER_READ;
    }
    if access.is_empty() {
        access = vk::AccessFlags::MEMORY_READ;
    }
    access
}

impl Transferable for DeviceBuffer {
    fn staging_buffer_size(&self) -> vk::DeviceSize {
        self.size
    }

    fn insert_transfer_command(&mut self, command_buffer: vk::CommandBuffer, source: vk::Buffer) -> VulkanResult<()> {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: self.size,
        };
        let barrier = vk::BufferMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(consumer_access(self.usage))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(self.buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE)
            .build();

        let raw = self.device.raw();
        unsafe {
            raw.cmd_copy_buffer(command_buffer, source, self.buffer, &[region]);
            raw.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::VERTEX_INPUT
                    | vk::PipelineStageFlags::VERTEX_SHADER
                    | vk::PipelineStageFlags::FRAGMENT_SHADER
                    | vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            );
        }
        Ok(())
    }
}

impl Describable for DeviceBuffer {
    fn descriptor_type(&self) -> vk::DescriptorType {
        if self.usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
            vk::DescriptorType::UNIFORM_BUFFER
        } else {
            vk::DescriptorType::STORAGE_BUFFER
        }
    }

    fn descriptor_info(&self) -> DescriptorInfo {
        DescriptorInfo::Buffer(vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        })
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .allocator()
                .destroy_buffer(self.buffer, &mut self.allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_access_per_usage() {
        assert_eq!(
            consumer_access(vk::BufferUsageFlags::VERTEX_BUFFER),
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ
        );
        assert_eq!(
            consumer_access(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST),
            vk::AccessFlags::INDEX_READ
        );
        assert_eq!(
            consumer_access(vk::BufferUsageFlags::UNIFORM_BUFFER),
            vk::AccessFlags::UNIFORM_READ
        );
    }

    #[test]
    fn test_consumer_access_defaults_to_memory_read() {
        assert_eq!(
            consumer_access(vk::BufferUsageFlags::TRANSFER_SRC),
            vk::AccessFlags::MEMORY_READ
        );
    }
}
