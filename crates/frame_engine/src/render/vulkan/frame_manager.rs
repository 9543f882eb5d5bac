//! Frame lifecycle coordinator
//!
//! [`FrameManager`] owns the device, render pass and swapchain, drives the
//! frame-in-flight index and rebuilds the render pass and swapchain whenever
//! presentation reports them stale.
//!
//! States: uninitialized, then ready, then rebuilding and back to ready. A
//! window with no area (minimized) keeps the manager suspended until it has a
//! size again.

use ash::vk;
use std::sync::Arc;

use crate::core::config::RendererConfig;
use crate::render::vulkan::commands::CommandRecorder;
use crate::render::vulkan::swapchain::SwapchainParameters;
use crate::render::vulkan::{Device, RenderPass, Swapchain, VulkanError, VulkanResult};
use crate::render::window::RenderWindow;

/// Wrapping frame-in-flight index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCadence {
    index: usize,
    frames_in_flight: usize,
}

impl FrameCadence {
    /// Start at slot 0 of `frames_in_flight` slots (at least one)
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            index: 0,
            frames_in_flight: frames_in_flight.max(1),
        }
    }

    /// Current slot
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of slots
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Move to the next slot after a successful present
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.frames_in_flight;
    }

    /// Back to slot 0 after a rebuild
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

/// Outcome of [`FrameManager::draw_image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and presented; the frame index advanced
    Presented,
    /// The swapchain was stale and has been rebuilt; the frame was dropped
    Rebuilt,
    /// The window has no area; nothing can be presented until it does
    Suspended,
}

struct FrameState {
    swapchain: Option<Swapchain>,
    render_pass: Option<RenderPass>,
    device: Arc<Device>,
}

impl FrameState {
    /// Build render pass and swapchain at `window_size`; `false` when the surface has no area
    fn build(&mut self, config: &RendererConfig, window_size: (u32, u32)) -> VulkanResult<bool> {
        let parameters = SwapchainParameters::query(&self.device, window_size, config.present_mode)?;
        if parameters.is_zero_sized() {
            return Ok(false);
        }

        let render_pass = RenderPass::new(
            Arc::clone(&self.device),
            parameters.extent.width,
            parameters.extent.height,
            parameters.format.format,
            config.msaa_samples,
        )?;
        let swapchain = Swapchain::new(Arc::clone(&self.device), &render_pass, parameters)?;

        self.render_pass = Some(render_pass);
        self.swapchain = Some(swapchain);
        Ok(true)
    }

    /// Drop framebuffers before the render pass they reference
    fn tear_down(&mut self) {
        self.swapchain = None;
        self.render_pass = None;
    }
}

impl Drop for FrameState {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Wait idle before frame teardown failed: {e}");
        }
        self.tear_down();
    }
}

/// Explicitly constructed owner of the per-frame GPU state
pub struct FrameManager {
    config: RendererConfig,
    state: Option<FrameState>,
    cadence: FrameCadence,
}

impl FrameManager {
    /// Create an uninitialized manager
    pub fn new(config: RendererConfig) -> Self {
        let cadence = FrameCadence::new(config.frames_in_flight);
        Self {
            config,
            state: None,
            cadence,
        }
    }

    /// Initialize against `window`, logging and swallowing any failure
    ///
    /// Returns `false` on failure, leaving the manager uninitialized.
    pub fn initialize(&mut self, window: &mut dyn RenderWindow) -> bool {
        match self.try_initialize(window) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Frame manager initialization failed: {e}");
                false
            }
        }
    }

    /// Validate the configuration, create the device, then the render pass at the window size, then the swapchain
    pub fn try_initialize(&mut self, window: &mut dyn RenderWindow) -> VulkanResult<()> {
        self.state = None;
        let device = Device::with_surface(&self.config, window)?;
        let mut state = FrameState {
            swapchain: None,
            render_pass: None,
            device,
        };

        let (width, height) = window.framebuffer_size();
        if !state.build(&self.config, (width, height))? {
            return Err(VulkanError::InitializationFailed(format!(
                "Window framebuffer has no area ({width}x{height})"
            )));
        }
        window.acknowledge_resize();

        self.cadence = FrameCadence::new(self.config.frames_in_flight);
        self.state = Some(state);
        log::info!("Frame manager ready at {width}x{height}");
        Ok(())
    }

    fn state(&self) -> VulkanResult<&FrameState> {
        self.state.as_ref().ok_or(VulkanError::NotInitialized)
    }

    fn swapchain_mut(&mut self) -> VulkanResult<Option<&mut Swapchain>> {
        Ok(self
            .state
            .as_mut()
            .ok_or(VulkanError::NotInitialized)?
            .swapchain
            .as_mut())
    }

    /// Tear down and rebuild the render pass and swapchain at the window's current size
    fn rebuild(&mut self, window: &mut dyn RenderWindow) -> VulkanResult<FrameStatus> {
        let state = self.state.as_mut().ok_or(VulkanError::NotInitialized)?;

        state.device.wait_idle()?;
        state.tear_down();
        self.cadence.reset();

        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 || !state.build(&self.config, (width, height))? {
            log::debug!("Window has no area, frame resources suspended");
            return Ok(FrameStatus::Suspended);
        }
        window.acknowledge_resize();

        log::info!("Rebuilt render pass and swapchain at {width}x{height}");
        Ok(FrameStatus::Rebuilt)
    }

    /// Wait for the current slot and acquire an image to render into
    ///
    /// Returns `false` when the swapchain was stale (or the window has no area);
    /// the resources have then been rebuilt and the caller skips this frame.
    pub fn begin_frame(&mut self, window: &mut dyn RenderWindow) -> VulkanResult<bool> {
        let index = self.cadence.index();
        let resize_pending = window.resize_pending();

        let acquired = match self.swapchain_mut()? {
            Some(swapchain) if !resize_pending => {
                swapchain.wait_for_fence(index)?;
                swapchain.acquire(index)?
            }
            _ => false,
        };

        if !acquired {
            self.rebuild(window)?;
        }
        Ok(acquired)
    }

    /// Begin recording the current slot's command buffer
    ///
    /// Call after [`begin_frame`](Self::begin_frame) returned `true`, which
    /// guarantees the slot's previous submission has finished.
    pub fn begin_recording(&self) -> VulkanResult<CommandRecorder> {
        let state = self.state()?;
        CommandRecorder::begin(Arc::clone(&state.device), self.cadence.index())
    }

    /// Submit and present the current slot's command buffer
    ///
    /// On a stale swapchain the frame is dropped, everything is rebuilt at the
    /// window's current size and the frame index goes back to 0.
    pub fn draw_image(&mut self, window: &mut dyn RenderWindow) -> VulkanResult<FrameStatus> {
        let index = self.cadence.index();
        let command_buffer = self.state()?.device.command_buffer(index)?;
        let resize_pending = window.resize_pending();

        let presented = match self.swapchain_mut()? {
            Some(swapchain) => swapchain.present(command_buffer, index, resize_pending)?,
            None => false,
        };

        if presented {
            self.cadence.advance();
            Ok(FrameStatus::Presented)
        } else {
            self.rebuild(window)
        }
    }

    /// Command buffer of the current frame slot
    pub fn current_command_buffer(&self) -> VulkanResult<vk::CommandBuffer> {
        self.state()?.device.command_buffer(self.cadence.index())
    }

    /// Framebuffer of the image acquired by [`begin_frame`](Self::begin_frame)
    pub fn current_swapchain_framebuffer(&self) -> VulkanResult<vk::Framebuffer> {
        self.state()?
            .swapchain
            .as_ref()
            .and_then(Swapchain::current_framebuffer)
            .map(|framebuffer| framebuffer.handle())
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "No swapchain image acquired, call begin_frame first".to_string(),
            })
    }

    /// Current frame slot
    pub fn frame_index(&self) -> usize {
        self.cadence.index()
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.cadence.frames_in_flight()
    }

    /// Shared device, once initialized
    pub fn device(&self) -> Option<&Arc<Device>> {
        self.state.as_ref().map(|state| &state.device)
    }

    /// Current render pass, absent while uninitialized or suspended
    pub fn render_pass(&self) -> Option<&RenderPass> {
        self.state.as_ref().and_then(|state| state.render_pass.as_ref())
    }

    /// Current swapchain, absent while uninitialized or suspended
    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.state.as_ref().and_then(|state| state.swapchain.as_ref())
    }

    /// Size of the current attachments
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.render_pass().map(RenderPass::extent)
    }

    /// Whether initialization succeeded
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Configuration the manager was created with
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_wraps_after_frames_in_flight() {
        let mut cadence = FrameCadence::new(3);
        let indices: Vec<usize> = (0..10)
            .map(|_| {
                let index = cadence.index();
                cadence.advance();
                index
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_cadence_reset_returns_to_zero() {
        let mut cadence = FrameCadence::new(3);
        cadence.advance();
        cadence.advance();
        assert_eq!(cadence.index(), 2);
        cadence.reset();
        assert_eq!(cadence.index(), 0);
    }

    #[test]
    fn test_cadence_single_frame() {
        let mut cadence = FrameCadence::new(1);
        cadence.advance();
        assert_eq!(cadence.index(), 0);
        assert_eq!(FrameCadence::new(0).frames_in_flight(), 1);
    }

    #[test]
    fn test_uninitialized_manager() {
        let manager = FrameManager::new(RendererConfig::default());
        assert!(!manager.is_initialized());
        assert_eq!(manager.frame_index(), 0);
        assert_eq!(manager.frames_in_flight(), 3);
        assert!(manager.render_pass().is_none());
        assert!(matches!(
            manager.current_command_buffer(),
            Err(VulkanError::NotInitialized)
        ));
        assert!(matches!(
            manager.begin_recording(),
            Err(VulkanError::NotInitialized)
        ));
    }
}
