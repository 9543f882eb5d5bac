//! GPU device: logical device, allocator, command pool and queues
//!
//! One [`Device`] is created per run and shared through `Arc<Device>` with every
//! resource that allocates from it. Field order matters: the allocator and
//! command pool are torn down before the logical device, which goes before the
//! surface and the instance.

use ash::extensions::khr::Surface as SurfaceLoader;
use ash::{vk, Instance};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::core::config::RendererConfig;
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::{LogicalDevice, PhysicalDeviceInfo, VulkanInstance};
use crate::render::vulkan::surface::Surface;
use crate::render::vulkan::sync::Fence;
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::render::window::RenderWindow;

/// Logical GPU handle with its allocator, command pool and per-frame command buffers
pub struct Device {
    allocator: vk_mem::Allocator,
    command_pool: CommandPool,
    frame_command_buffers: Vec<vk::CommandBuffer>,
    single_use_lock: Mutex<()>,
    wait_timeout_ns: u64,
    logical: LogicalDevice,
    surface: Option<Surface>,
    physical: PhysicalDeviceInfo,
    instance: VulkanInstance,
}

impl Device {
    /// Create a device with no presentation support, for offscreen work and uploads
    pub fn headless(config: &RendererConfig) -> VulkanResult<Arc<Self>> {
        validate_config(config)?;
        let instance = VulkanInstance::new(config, &[])?;
        let physical = PhysicalDeviceInfo::select_suitable_device(&instance.instance, None)?;
        Self::assemble(config, instance, None, physical).map(Arc::new)
    }

    /// Create a device able to present to `window`
    ///
    /// The surface is created from the window and owned by the returned device.
    pub fn with_surface(config: &RendererConfig, window: &mut dyn RenderWindow) -> VulkanResult<Arc<Self>> {
        validate_config(config)?;
        let extensions = window.required_instance_extensions()?;
        let instance = VulkanInstance::new(config, &extensions)?;

        let loader = SurfaceLoader::new(&instance.entry, &instance.instance);
        let raw_surface = window.create_surface(instance.instance.handle())?;
        let surface = Surface::new(loader, raw_surface);

        let physical = PhysicalDeviceInfo::select_suitable_device(
            &instance.instance,
            Some((surface.handle(), surface.loader())),
        )?;
        Self::assemble(config, instance, Some(surface), physical).map(Arc::new)
    }

    fn assemble(
        config: &RendererConfig,
        instance: VulkanInstance,
        surface: Option<Surface>,
        physical: PhysicalDeviceInfo,
    ) -> VulkanResult<Self> {
        let logical = LogicalDevice::new(&instance.instance, &physical, surface.is_some())?;

        #[allow(unused_unsafe)]
        let allocator = unsafe {
            vk_mem::Allocator::new(vk_mem::AllocatorCreateInfo::new(
                &instance.instance,
                &logical.device,
                physical.device,
            ))
        }
        .map_err(|result| VulkanError::AllocationFailed {
            what: "memory allocator",
            result,
        })?;

        let command_pool = CommandPool::new(logical.device.clone(), physical.graphics_family)?;
        let frame_command_buffers = command_pool.allocate_command_buffers(config.frames_in_flight as u32)?;

        log::debug!(
            "Device ready: {} frame command buffers, presentation {}",
            frame_command_buffers.len(),
            if surface.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            allocator,
            command_pool,
            frame_command_buffers,
            single_use_lock: Mutex::new(()),
            wait_timeout_ns: config.wait_timeout.as_nanos(),
            logical,
            surface,
            physical,
            instance,
        })
    }

    /// The `index`-th pre-allocated primary command buffer
    ///
    /// Callers bracket it with begin/end and never record the same index twice
    /// in one frame.
    pub fn command_buffer(&self, index: usize) -> VulkanResult<vk::CommandBuffer> {
        self.frame_command_buffers
            .get(index)
            .copied()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!(
                    "Command buffer index {index} out of range ({} frames in flight)",
                    self.frame_command_buffers.len()
                ),
            })
    }

    /// Number of pre-allocated per-frame command buffers
    pub fn frames_in_flight(&self) -> usize {
        self.frame_command_buffers.len()
    }

    /// Allocate and begin a one-time-submit command buffer
    ///
    /// Only one single-use command buffer may be open at a time; beginning a
    /// second one before the first has ended fails with `InvalidOperation`.
    pub fn begin_single_use_command_buffer(&self) -> VulkanResult<SingleUseCommandBuffer<'_>> {
        let guard = match self.single_use_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(VulkanError::InvalidOperation {
                    reason: "single-use command buffer already open".to_string(),
                })
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(VulkanError::InvalidOperation {
                    reason: "single-use command buffer lock poisoned".to_string(),
                })
            }
        };

        let command_buffer = self
            .command_pool
            .allocate_command_buffers(1)?
            .pop()
            .ok_or(VulkanError::AllocationFailed {
                what: "single-use command buffer",
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            })?;

        let single_use = SingleUseCommandBuffer {
            device: self,
            command_buffer,
            _guard: guard,
        };

        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.logical
                .device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        Ok(single_use)
    }

    /// Record into a single-use command buffer and wait for it to finish executing
    pub fn run_single_use<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(vk::CommandBuffer) -> VulkanResult<()>,
    {
        let command_buffer = self.begin_single_use_command_buffer()?;
        record(command_buffer.handle())?;
        command_buffer.end()
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.logical.device.device_wait_idle().map_err(VulkanError::Api) }
    }

    /// First format of `candidates` whose `tiling` supports `features`
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> VulkanResult<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&format| {
                let props = self.format_properties(format);
                match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                    _ => props.optimal_tiling_features.contains(features),
                }
            })
            .ok_or_else(|| VulkanError::UnsupportedFormat {
                format: candidates.first().copied().unwrap_or(vk::Format::UNDEFINED),
                reason: format!("none of {candidates:?} support {features:?}"),
            })
    }

    /// Whether optimally tiled images of `format` can be blitted with linear filtering
    pub fn supports_linear_blit(&self, format: vk::Format) -> bool {
        self.format_properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical.device, format)
        }
    }

    /// Logical device function table
    pub fn raw(&self) -> &ash::Device {
        &self.logical.device
    }

    /// Instance function table
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Selected physical device and its properties
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Memory allocator
    pub fn allocator(&self) -> &vk_mem::Allocator {
        &self.allocator
    }

    /// Presentation surface, absent on headless devices
    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    /// Queue used for rendering and transfers
    pub fn graphics_queue(&self) -> vk::Queue {
        self.logical.graphics_queue
    }

    /// Queue used for presentation
    pub fn present_queue(&self) -> vk::Queue {
        self.logical.present_queue
    }

    /// Queue family of the graphics queue and command pool
    pub fn graphics_family(&self) -> u32 {
        self.physical.graphics_family
    }

    /// Highest MSAA sample count usable for color and depth together
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        self.physical.max_usable_sample_count()
    }

    /// Timeout applied to every fence wait, `u64::MAX` when unbounded
    pub fn wait_timeout(&self) -> u64 {
        self.wait_timeout_ns
    }
}

fn validate_config(config: &RendererConfig) -> VulkanResult<()> {
    config
        .validate()
        .map_err(|e| VulkanError::InitializationFailed(e.to_string()))
}

impl Drop for Device {
    fn drop(&mut self) {
        log::debug!("Destroying device");
        if let Err(e) = self.wait_idle() {
            log::error!("Device wait idle failed during shutdown: {e}");
        }
    }
}

/// Command buffer that is submitted and waited on exactly once
///
/// Holds the device's single-use slot for its whole lifetime. Dropping it
/// without [`end`](Self::end) discards the recording.
pub struct SingleUseCommandBuffer<'a> {
    device: &'a Device,
    command_buffer: vk::CommandBuffer,
    _guard: MutexGuard<'a, ()>,
}

impl SingleUseCommandBuffer<'_> {
    /// Raw handle to record commands into
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// End recording, submit to the graphics queue and block until execution completes
    pub fn end(self) -> VulkanResult<()> {
        let raw = self.device.raw();
        unsafe {
            raw.end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }

        let fence = Fence::new(raw.clone(), false)?;
        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        unsafe {
            raw.queue_submit(self.device.graphics_queue(), &[submit_info], fence.handle())
                .map_err(VulkanError::Api)?;
        }

        let waited = fence.wait(self.device.wait_timeout());
        if waited.is_err() {
            // The buffer and fence may still be in use; drain before both are released
            let _ = self.device.wait_idle();
        }
        waited
    }
}

impl Drop for SingleUseCommandBuffer<'_> {
    fn drop(&mut self) {
        self.device
            .command_pool
            .free_command_buffers(&[self.command_buffer]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_rejects_zero_frames_in_flight() {
        let config = RendererConfig::new("frame_engine tests").with_frames_in_flight(0);
        assert!(matches!(
            Device::headless(&config),
            Err(VulkanError::InitializationFailed(_))
        ));
    }

    #[test]
    fn test_headless_rejects_invalid_msaa() {
        let config = RendererConfig::new("frame_engine tests").with_msaa_samples(3);
        assert!(matches!(
            Device::headless(&config),
            Err(VulkanError::InitializationFailed(_))
        ));
    }
}
