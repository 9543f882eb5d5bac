//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences plus the per-slot [`FrameSync`]
//! bundle used by the swapchain. Fence waits honour the device's configured
//! timeout; an expired bounded wait surfaces as [`VulkanError::FenceTimeout`].

use ash::prelude::VkResult;
use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic resource management
///
/// Signaled by one queue operation and waited on by another: image
/// acquisition signals and rendering waits, rendering signals and
/// presentation waits.
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    /// Block until the fence is signaled or `timeout_ns` expires
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<()> {
        let result = unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns) };
        classify_wait(result, timeout_ns)
    }

    /// Reset fence
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Map the raw result of a fence wait onto the engine's error kinds
pub(crate) fn classify_wait(result: VkResult<()>, timeout_ns: u64) -> VulkanResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(VulkanError::FenceTimeout { timeout_ns }),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// Frame synchronization objects for one frame-in-flight slot
pub struct FrameSync {
    /// Semaphore signaled when swapchain image becomes available
    pub image_available: Semaphore,
    /// Semaphore signaled when frame rendering is complete
    pub render_finished: Semaphore,
    /// Fence for CPU-GPU synchronization of frame, created signaled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device.clone(), true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_wait_success() {
        assert!(classify_wait(Ok(()), u64::MAX).is_ok());
    }

    #[test]
    fn test_classify_wait_timeout_is_distinct() {
        match classify_wait(Err(vk::Result::TIMEOUT), 5_000_000) {
            Err(VulkanError::FenceTimeout { timeout_ns }) => assert_eq!(timeout_ns, 5_000_000),
            other => panic!("expected FenceTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_wait_device_lost() {
        assert!(matches!(
            classify_wait(Err(vk::Result::ERROR_DEVICE_LOST), u64::MAX),
            Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))
        ));
    }
}
