//! Window collaborator of the frame manager
//!
//! The core only needs a narrow view of the window: its framebuffer size, the
//! instance extensions and surface it requires, and whether it was resized.
//! [`GlfwWindow`] provides that view on top of GLFW.

use ash::vk;
use thiserror::Error;

use crate::core::config::WindowConfig;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// The window system has no Vulkan support
    #[error("Vulkan is not supported by the window system")]
    VulkanUnsupported,

    /// The window system refused to create a surface
    #[error("Surface creation failed: {0:?}")]
    SurfaceCreationFailed(vk::Result),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// What the frame lifecycle needs from a window
pub trait RenderWindow {
    /// Current framebuffer size in pixels; zero while minimized
    fn framebuffer_size(&self) -> (u32, u32);

    /// Instance extensions the window system needs for presentation
    fn required_instance_extensions(&self) -> WindowResult<Vec<String>>;

    /// Create a presentation surface for `instance`
    fn create_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR>;

    /// Whether the size changed since the last acknowledgement
    fn resize_pending(&self) -> bool;

    /// Clear the resize flag once the swapchain matches the window again
    fn acknowledge_resize(&mut self);
}

/// GLFW window without a client API, for Vulkan presentation
pub struct GlfwWindow {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    resized: bool,
}

impl GlfwWindow {
    /// Open a window as described by `config`
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;
        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));
        glfw.window_hint(glfw::WindowHint::Visible(config.visible));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::debug!("Opened window '{}' {}x{}", config.title, config.width, config.height);

        Ok(Self {
            glfw,
            window,
            events,
            resized: false,
        })
    }

    /// Process pending events and return them; framebuffer resizes set the resize flag
    pub fn poll_events(&mut self) -> Vec<glfw::WindowEvent> {
        self.glfw.poll_events();
        let mut events = Vec::new();
        for (_, event) in glfw::flush_messages(&self.events) {
            if let glfw::WindowEvent::FramebufferSize(..) = event {
                self.resized = true;
            }
            events.push(event);
        }
        events
    }

    /// Block until the window has events, used while minimized
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request or cancel closing
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Resize the window's client area
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.window.set_size(width as i32, height as i32);
        self.resized = true;
    }
}

impl RenderWindow for GlfwWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or(WindowError::VulkanUnsupported)
    }

    fn create_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::SurfaceCreationFailed(result))
        }
    }

    fn resize_pending(&self) -> bool {
        self.resized
    }

    fn acknowledge_resize(&mut self) {
        self.resized = false;
    }
}
