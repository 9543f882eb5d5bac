//! Vulkan backend: device, staged transfers, render pass, swapchain and frame lifecycle

pub mod commands;
pub mod context;
pub mod device;
pub mod frame_manager;
pub mod framebuffer;
pub mod render_pass;
pub mod resources;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod transfer;

pub use commands::{full_viewport, ActiveRenderPass, CommandRecorder};
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult};
pub use device::{Device, SingleUseCommandBuffer};
pub use frame_manager::{FrameCadence, FrameManager, FrameStatus};
pub use framebuffer::Framebuffer;
pub use render_pass::RenderPass;
pub use resources::{DeviceBuffer, HostBuffer, Image, ImageInfo, ImageLayout, Sampler, Texture};
pub use surface::Surface;
pub use swapchain::{Swapchain, SwapchainParameters};
pub use sync::{Fence, FrameSync, Semaphore};
pub use transfer::{DescriptorBinding, DescriptorInfo, Describable, StagedTransfer, Transferable};
