//! Renderer and window configuration
//!
//! Both types are serde-serializable and load from `.toml` or `.ron` files
//! through the [`Config`] trait. Missing fields fall back to their defaults.

use ash::vk;
use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Largest supported number of frames in flight
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// How long fence waits may block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitTimeout {
    /// Wait until the fence signals
    Unbounded,
    /// Fail with a fence timeout after this many milliseconds
    Bounded(u64),
}

impl WaitTimeout {
    /// Timeout in the nanoseconds Vulkan expects, `u64::MAX` when unbounded
    pub fn as_nanos(self) -> u64 {
        match self {
            Self::Unbounded => u64::MAX,
            Self::Bounded(millis) => millis.saturating_mul(1_000_000),
        }
    }
}

impl Default for WaitTimeout {
    fn default() -> Self {
        Self::Unbounded
    }
}

/// Present mode to ask for; FIFO is used when the preference is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentModePreference {
    /// Vsync, always available
    Fifo,
    /// Low-latency triple buffering
    Mailbox,
    /// No vsync, may tear
    Immediate,
}

impl PresentModePreference {
    /// Native present mode
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

impl Default for PresentModePreference {
    fn default() -> Self {
        Self::Mailbox
    }
}

/// # Renderer Configuration
///
/// Application metadata passed to the Vulkan instance, frame pacing, MSAA,
/// validation and wait policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Number of frames the CPU may record ahead of the GPU
    pub frames_in_flight: usize,
    /// Requested MSAA samples, clamped to what the device supports
    pub msaa_samples: u32,
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Preferred present mode
    pub present_mode: PresentModePreference,
    /// Fence wait policy
    pub wait_timeout: WaitTimeout,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            frames_in_flight: 3,
            msaa_samples: 4,
            enable_validation: None,
            present_mode: PresentModePreference::default(),
            wait_timeout: WaitTimeout::default(),
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set requested MSAA samples
    pub fn with_msaa_samples(mut self, samples: u32) -> Self {
        self.msaa_samples = samples;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the preferred present mode
    pub fn with_present_mode(mut self, present_mode: PresentModePreference) -> Self {
        self.present_mode = present_mode;
        self
    }

    /// Set the fence wait policy
    pub fn with_wait_timeout(mut self, wait_timeout: WaitTimeout) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid("Frames in flight must be at least 1".to_string()));
        }

        if self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(ConfigError::Invalid(format!(
                "Frames in flight should not exceed {MAX_FRAMES_IN_FLIGHT}"
            )));
        }

        if !self.msaa_samples.is_power_of_two() || self.msaa_samples > 64 {
            return Err(ConfigError::Invalid(format!(
                "MSAA samples must be a power of two up to 64, got {}",
                self.msaa_samples
            )));
        }

        if self.wait_timeout == WaitTimeout::Bounded(0) {
            return Err(ConfigError::Invalid("Bounded wait timeout must be positive".to_string()));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Frame Engine Application")
    }
}

impl Config for RendererConfig {}

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Client area width
    pub width: u32,
    /// Client area height
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
    /// Hidden windows still present, for offscreen runs
    pub visible: bool,
}

impl WindowConfig {
    /// Visible resizable window of the given size
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            resizable: true,
            visible: true,
        }
    }

    /// Hide the window
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new("Frame Engine", 1280, 800)
    }
}

impl Config for WindowConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.msaa_samples, 4);
        assert_eq!(config.wait_timeout, WaitTimeout::Unbounded);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = RendererConfig::new("Viewer")
            .with_version(0, 2, 1)
            .with_frames_in_flight(2)
            .with_msaa_samples(8)
            .with_validation(false)
            .with_present_mode(PresentModePreference::Fifo)
            .with_wait_timeout(WaitTimeout::Bounded(250));

        assert_eq!(config.application_version, (0, 2, 1));
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.msaa_samples, 8);
        assert!(!config.validation_enabled());
        assert_eq!(config.present_mode.to_vk(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.wait_timeout.as_nanos(), 250_000_000);
    }

    #[test]
    fn test_validation_rejects_frame_counts() {
        assert!(RendererConfig::default().with_frames_in_flight(0).validate().is_err());
        assert!(RendererConfig::default().with_frames_in_flight(9).validate().is_err());
        assert!(RendererConfig::default().with_frames_in_flight(8).validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_msaa() {
        assert!(RendererConfig::default().with_msaa_samples(3).validate().is_err());
        assert!(RendererConfig::default().with_msaa_samples(128).validate().is_err());
        assert!(RendererConfig::default().with_msaa_samples(1).validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_name_and_zero_timeout() {
        assert!(RendererConfig::new("").validate().is_err());
        assert!(RendererConfig::default()
            .with_wait_timeout(WaitTimeout::Bounded(0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_unbounded_timeout_is_max() {
        assert_eq!(WaitTimeout::Unbounded.as_nanos(), u64::MAX);
        assert_eq!(WaitTimeout::Bounded(u64::MAX).as_nanos(), u64::MAX);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: RendererConfig = toml::from_str(
            r#"
            application_name = "Viewer"
            frames_in_flight = 2
            present_mode = "Fifo"
            wait_timeout = { Bounded = 500 }
            "#,
        )
        .unwrap();

        assert_eq!(config.application_name, "Viewer");
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.msaa_samples, 4);
        assert_eq!(config.present_mode, PresentModePreference::Fifo);
        assert_eq!(config.wait_timeout, WaitTimeout::Bounded(500));
    }

    #[test]
    fn test_parse_ron() {
        let config: RendererConfig =
            ron::from_str("(application_name: \"Viewer\", msaa_samples: 1, wait_timeout: Unbounded)").unwrap();
        assert_eq!(config.msaa_samples, 1);
        assert_eq!(config.frames_in_flight, 3);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("frame_engine_config_{}.toml", std::process::id()));
        let config = RendererConfig::new("Saved").with_frames_in_flight(2);

        config.save_to_file(&path).unwrap();
        let loaded = RendererConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_window_config() {
        let config = WindowConfig::new("Test", 1280, 800).hidden();
        assert!(!config.visible);
        assert!(config.resizable);
    }
}
