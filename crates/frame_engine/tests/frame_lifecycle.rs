//! End-to-end frame lifecycle tests
//!
//! These open a hidden window and need a Vulkan driver plus a display, so they
//! are ignored by default: `cargo test -p frame_engine -- --ignored`

use frame_engine::prelude::*;
use frame_engine::render::vulkan::SwapchainParameters;
use std::sync::Arc;

fn open(width: u32, height: u32) -> (GlfwWindow, FrameManager) {
    let window = GlfwWindow::new(&WindowConfig::new("frame_engine test", width, height).hidden()).expect("window");
    let frames = FrameManager::new(RendererConfig::new("frame_engine tests").with_frames_in_flight(3));
    (window, frames)
}

/// Record a clear pass into the current slot and present it
fn draw_clear_frame(window: &mut GlfwWindow, frames: &mut FrameManager) -> VulkanResult<Option<FrameStatus>> {
    window.poll_events();
    if !frames.begin_frame(window)? {
        return Ok(None);
    }

    let mut recorder = frames.begin_recording()?;
    {
        let render_pass = frames.render_pass().ok_or(VulkanError::NotInitialized)?;
        let framebuffer = frames.current_swapchain_framebuffer()?;
        let mut pass = recorder.begin_render_pass(render_pass, framebuffer, [0.0, 0.0, 0.0, 1.0]);
        pass.cover_render_area();
    }
    recorder.end()?;

    frames.draw_image(window).map(Some)
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_ten_frames_cycle_frame_index() {
    let (mut window, mut frames) = open(1280, 800);
    assert!(frames.initialize(&mut window));
    assert_eq!(frames.frames_in_flight(), 3);

    let swapchain = frames.swapchain().unwrap();
    assert_eq!(swapchain.framebuffer_count(), swapchain.image_count());
    assert_eq!(swapchain.sync_count(), 3);

    // an unchanged window must present every frame without a rebuild
    let mut observed = Vec::new();
    for _ in 0..10 {
        let index = frames.frame_index();
        let status = draw_clear_frame(&mut window, &mut frames).unwrap();
        assert_eq!(status, Some(FrameStatus::Presented), "frame {}", observed.len());
        observed.push(index);
    }

    assert_eq!(observed, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(frames.frame_index(), 1);
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_resize_rebuilds_and_resets_index() {
    let (mut window, mut frames) = open(1280, 800);
    frames.try_initialize(&mut window).unwrap();

    for _ in 0..2 {
        draw_clear_frame(&mut window, &mut frames).unwrap();
    }
    assert_ne!(frames.frame_index(), 0);

    window.set_size(640, 480);
    window.poll_events();
    let status = frames.draw_image(&mut window).unwrap();

    assert_eq!(status, FrameStatus::Rebuilt);
    assert_eq!(frames.frame_index(), 0);
    let extent = frames.extent().unwrap();
    assert_eq!((extent.width, extent.height), window.framebuffer_size());
    assert_eq!(frames.swapchain().unwrap().extent(), extent);

    // rendering continues at the new size
    let mut presented = 0;
    for _ in 0..6 {
        if draw_clear_frame(&mut window, &mut frames).unwrap() == Some(FrameStatus::Presented) {
            presented += 1;
        }
    }
    assert!(presented > 0);
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_accessors_before_initialize() {
    let (_window, frames) = open(320, 240);
    assert!(!frames.is_initialized());
    assert!(frames.device().is_none());
    assert!(matches!(
        frames.current_swapchain_framebuffer(),
        Err(VulkanError::NotInitialized)
    ));
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_swapchain_outlives_caller_device_handle() {
    let mut window = GlfwWindow::new(&WindowConfig::new("frame_engine test", 320, 240).hidden()).expect("window");
    let config = RendererConfig::new("frame_engine tests").with_frames_in_flight(3);
    let device = Device::with_surface(&config, &mut window).unwrap();

    let parameters = SwapchainParameters::query(&device, window.framebuffer_size(), config.present_mode).unwrap();
    let render_pass = RenderPass::new(
        Arc::clone(&device),
        parameters.extent.width,
        parameters.extent.height,
        parameters.format.format,
        config.msaa_samples,
    )
    .unwrap();
    let swapchain = Swapchain::new(Arc::clone(&device), &render_pass, parameters).unwrap();

    // the swapchain now holds the last device reference
    drop(render_pass);
    drop(device);
    assert_eq!(swapchain.sync_count(), 3);
    drop(swapchain);
}
