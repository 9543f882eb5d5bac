//! Core engine types

pub mod config;

pub use config::{PresentModePreference, RendererConfig, WaitTimeout, WindowConfig};
