//! # Frame Engine
//!
//! Vulkan engine core for the frame lifecycle and staged resource transfer.
//!
//! ## Features
//!
//! - **Frame lifecycle**: swapchain acquisition, submission and presentation
//!   with per-slot fences and semaphores, rebuilt automatically on resize
//! - **Staged transfers**: host-visible staging buffers feeding GPU-local
//!   buffers and images, synchronously or batched into a caller's command buffer
//! - **Images**: tracked layout state machine and mipmap generation
//! - **Render pass**: multisampled color and depth attachments resolving into
//!   the presentable image
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut window = GlfwWindow::new(&WindowConfig::default())?;
//!     let mut frames = FrameManager::new(RendererConfig::default());
//!     frames.try_initialize(&mut window)?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         if !frames.begin_frame(&mut window)? {
//!             continue;
//!         }
//!         let mut recorder = frames.begin_recording()?;
//!         if let Some(render_pass) = frames.render_pass() {
//!             let framebuffer = frames.current_swapchain_framebuffer()?;
//!             let mut pass = recorder.begin_render_pass(render_pass, framebuffer, [0.1, 0.1, 0.1, 1.0]);
//!             pass.cover_render_area();
//!         }
//!         recorder.end()?;
//!         frames.draw_image(&mut window)?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        core::{PresentModePreference, RendererConfig, WaitTimeout, WindowConfig},
        render::{
            vulkan::{
                CommandRecorder, DescriptorBinding, Describable, Device, DeviceBuffer, FrameManager, FrameStatus, Image,
                ImageInfo, ImageLayout, RenderPass, StagedTransfer, Swapchain, Texture, Transferable, VulkanError,
                VulkanResult,
            },
            GlfwWindow, RenderWindow, WindowError,
        },
    };
}
