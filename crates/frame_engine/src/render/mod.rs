//! Rendering: the Vulkan backend and the window it presents to

pub mod vulkan;
pub mod window;

pub use window::{GlfwWindow, RenderWindow, WindowError, WindowResult};
