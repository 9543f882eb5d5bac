//! Viewer demo application
//!
//! Opens a window, uploads a vertex buffer and per-frame uniforms through staged
//! transfers, and clears the screen every frame until the window is closed.
//! An optional `.toml` or `.ron` renderer configuration path may be passed as
//! the first argument.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use frame_engine::foundation::logging;
use frame_engine::prelude::*;
use nalgebra::{Matrix4, Perspective3, Point3, Vector3};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FrameUniforms {
    view_projection: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
}

const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.5, 0.0],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [0.5, 0.5, 0.0],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [-0.5, 0.5, 0.0],
        color: [0.0, 0.0, 1.0],
    },
];

#[derive(Error, Debug)]
enum ViewerError {
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Frame manager failed to initialize")]
    InitializationFailed,
}

// GPU resources drop before the frame manager, which drops before the window
struct Viewer {
    vertices: DeviceBuffer,
    uniforms: Vec<StagedTransfer<DeviceBuffer>>,
    frames: FrameManager,
    window: GlfwWindow,
    start_time: Instant,
}

impl Viewer {
    fn new(config: RendererConfig) -> Result<Self, ViewerError> {
        let mut window = GlfwWindow::new(&WindowConfig::new("Frame Engine Viewer", 1280, 800))?;
        let mut frames = FrameManager::new(config);
        if !frames.initialize(&mut window) {
            return Err(ViewerError::InitializationFailed);
        }
        let device = Arc::clone(frames.device().ok_or(VulkanError::NotInitialized)?);

        let vertex_bytes = bytemuck::cast_slice::<Vertex, u8>(&TRIANGLE);
        let mut vertices = StagedTransfer::new(
            Arc::clone(&device),
            DeviceBuffer::vertex(Arc::clone(&device), vertex_bytes.len() as vk::DeviceSize)?,
        )?;
        vertices.upload(vertex_bytes)?;
        log::info!("Uploaded {} vertices", TRIANGLE.len());

        let uniform_size = std::mem::size_of::<FrameUniforms>() as vk::DeviceSize;
        let uniforms = (0..frames.frames_in_flight())
            .map(|_| {
                let buffer = DeviceBuffer::uniform(Arc::clone(&device), uniform_size)?;
                StagedTransfer::new(Arc::clone(&device), buffer)
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self {
            vertices: vertices.into_destination(),
            uniforms,
            frames,
            window,
            start_time: Instant::now(),
        })
    }

    fn run(&mut self) -> Result<(), ViewerError> {
        let mut presented = 0u64;
        while !self.window.should_close() {
            for event in self.window.poll_events() {
                if let glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) = event {
                    self.window.set_should_close(true);
                }
            }

            let (width, height) = self.window.framebuffer_size();
            if width == 0 || height == 0 {
                self.window.wait_events();
                continue;
            }

            if !self.frames.begin_frame(&mut self.window)? {
                continue;
            }
            self.record_frame()?;

            match self.frames.draw_image(&mut self.window)? {
                FrameStatus::Presented => presented += 1,
                FrameStatus::Rebuilt => log::info!("Swapchain rebuilt at {:?}", self.frames.extent()),
                FrameStatus::Suspended => log::debug!("Rendering suspended"),
            }
        }

        log::info!("Presented {presented} frames");
        Ok(())
    }

    fn frame_uniforms(&self, extent: vk::Extent2D) -> FrameUniforms {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let projection = Perspective3::new(aspect, std::f32::consts::FRAC_PI_4, 0.1, 100.0);
        let view = Matrix4::look_at_rh(
            &Point3::new(0.0, 0.0, 2.5),
            &Point3::origin(),
            &Vector3::y(),
        );
        let angle = self.start_time.elapsed().as_secs_f32();
        let model = Matrix4::from_axis_angle(&Vector3::y_axis(), angle);

        FrameUniforms {
            view_projection: (projection.to_homogeneous() * view).into(),
            model: model.into(),
        }
    }

    fn record_frame(&mut self) -> Result<(), ViewerError> {
        let extent = self.frames.extent().ok_or(VulkanError::NotInitialized)?;
        let uniforms = self.frame_uniforms(extent);
        let slot = self.frames.frame_index();

        let mut recorder = self.frames.begin_recording()?;
        let uniform = &mut self.uniforms[slot];
        uniform.update(std::slice::from_ref(&uniforms))?;
        uniform.transfer_buffer(Some(recorder.handle()))?;

        {
            let render_pass = self.frames.render_pass().ok_or(VulkanError::NotInitialized)?;
            let framebuffer = self.frames.current_swapchain_framebuffer()?;
            let mut pass = recorder.begin_render_pass(render_pass, framebuffer, [0.02, 0.02, 0.05, 1.0]);
            pass.cover_render_area();
            // The engine core stops at the clear. A pipeline layer binds its
            // pipeline and issues the draw after this vertex bind.
            self.vertices.bind_as_vertex_buffer(pass.command_buffer(), 0);
        }

        recorder.end()?;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_with_level(log::LevelFilter::Info);

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading renderer configuration from {path}");
            RendererConfig::load_from_file(&path)?
        }
        None => RendererConfig::new("Frame Engine Viewer"),
    };

    let mut viewer = Viewer::new(config)?;
    viewer.run()?;
    Ok(())
}
