//! Vulkan context management
//!
//! Instance creation, physical device selection and logical device creation.
//! Everything here is owned by [`Device`](super::Device), which controls the
//! destruction order of the objects created in this module.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface as SurfaceLoader, Swapchain as SwapchainLoader};
use ash::{vk, Device as AshDevice, Entry, Instance};
use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};
use thiserror::Error;

use crate::core::config::RendererConfig;
use crate::render::vulkan::resources::image::ImageLayout;
use crate::render::window::WindowError;

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A memory allocation or pool allocation was refused by the driver
    #[error("Allocation failed for {what}: {result:?}")]
    AllocationFailed {
        /// What was being allocated
        what: &'static str,
        /// Result code returned by the driver or allocator
        result: vk::Result,
    },

    /// A bounded fence wait expired
    #[error("Fence wait timed out after {timeout_ns} ns")]
    FenceTimeout {
        /// The timeout that expired, in nanoseconds
        timeout_ns: u64,
    },

    /// An image layout transition outside the supported set was requested
    #[error("Invalid transfer request: {from:?} -> {to:?}")]
    InvalidTransferRequest {
        /// Layout the image was in
        from: ImageLayout,
        /// Layout that was requested
        to: ImageLayout,
    },

    /// Presentation failed with something other than an out-of-date surface
    #[error("Present failed: {0:?}")]
    PresentFailed(vk::Result),

    /// More bytes were written than the staging buffer can hold
    #[error("Staging overflow: {requested} bytes written into a {capacity} byte staging buffer")]
    StagingOverflow {
        /// Number of bytes the caller tried to write
        requested: u64,
        /// Fixed capacity of the staging buffer
        capacity: u64,
    },

    /// The format cannot be used for the requested operation
    #[error("Unsupported format {format:?}: {reason}")]
    UnsupportedFormat {
        /// Offending format
        format: vk::Format,
        /// Why it cannot be used
        reason: String,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// The frame manager was used before a successful initialization
    #[error("Frame manager is not initialized")]
    NotInitialized,

    /// Error reported by the window collaborator
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Image file could not be decoded
    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance
    ///
    /// `extensions` are the instance extensions the window system needs; pass an
    /// empty slice for a headless instance. Validation is enabled only when the
    /// configuration asks for it and the layer is actually installed.
    pub fn new(config: &RendererConfig, extensions: &[String]) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {e}")))?;
        let engine_name = CString::new("FrameEngine")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let enable_validation = config.validation_enabled() && Self::validation_layer_available(&entry);
        if config.validation_enabled() && !enable_validation {
            log::warn!("{VALIDATION_LAYER} requested but not installed, continuing without validation");
        }

        let cstr_extensions = extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid extension name: {e}")))?;
        let mut extension_ptrs: Vec<*const c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();
        if enable_validation {
            extension_ptrs.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if enable_validation {
            vec![CString::new(VALIDATION_LAYER).map_err(|e| VulkanError::InitializationFailed(e.to_string()))?]
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let debug_utils = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::debug!(
            "Vulkan instance created ({} extensions, validation {})",
            extension_ptrs.len(),
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    fn validation_layer_available(entry: &Entry) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers.iter().any(|layer| {
                    let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                    name.to_str() == Ok(VALIDATION_LAYER)
                })
            })
            .unwrap_or(false)
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family (equals `graphics_family` when headless)
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select a suitable physical device for rendering
    ///
    /// With a surface, the device must be able to present to it and must
    /// support the swapchain extension. Discrete GPUs are preferred.
    pub fn select_suitable_device(
        instance: &Instance,
        surface: Option<(vk::SurfaceKHR, &SurfaceLoader)>,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        let mut candidates: Vec<Self> = devices
            .into_iter()
            .filter_map(|device| Self::evaluate_device(instance, device, surface).ok())
            .collect();
        candidates.sort_by_key(|info| match info.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 0,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
            _ => 3,
        });

        let selected = candidates
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("No suitable GPU found".to_string()))?;
        log::info!("Selected GPU: {}", selected.name());
        Ok(selected)
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: Option<(vk::SurfaceKHR, &SurfaceLoader)>,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = match surface {
                Some((surface, loader)) => unsafe {
                    loader
                        .get_physical_device_surface_support(device, index, surface)
                        .map_err(VulkanError::Api)?
                },
                None => false,
            };
            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && (present_family.is_some() || surface.is_none()) {
                break;
            }
        }

        let graphics_family = graphics_family
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics queue family found".to_string()))?;

        let present_family = match surface {
            Some(_) => present_family
                .ok_or_else(|| VulkanError::InitializationFailed("No present queue family found".to_string()))?,
            None => graphics_family,
        };

        if surface.is_some() && !Self::supports_swapchain(instance, device)? {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            features,
            graphics_family,
            present_family,
        })
    }

    fn supports_swapchain(instance: &Instance, device: vk::PhysicalDevice) -> VulkanResult<bool> {
        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        Ok(extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        }))
    }

    /// Human readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Highest sample count usable for both color and depth attachments
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        let limits = &self.properties.limits;
        let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
        [
            vk::SampleCountFlags::TYPE_64,
            vk::SampleCountFlags::TYPE_32,
            vk::SampleCountFlags::TYPE_16,
            vk::SampleCountFlags::TYPE_8,
            vk::SampleCountFlags::TYPE_4,
            vk::SampleCountFlags::TYPE_2,
        ]
        .into_iter()
        .find(|&count| counts.contains(count))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: AshDevice,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
}

impl LogicalDevice {
    /// Create a new logical device with required queues
    ///
    /// The swapchain extension is enabled only when `presentable` is set.
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo, presentable: bool) -> VulkanResult<Self> {
        let unique_families: HashSet<u32> = [
            physical_device_info.graphics_family,
            physical_device_info.present_family,
        ]
        .into_iter()
        .collect();

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = if presentable {
            vec![SwapchainLoader::name().as_ptr()]
        } else {
            Vec::new()
        };

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(physical_device_info.features.sampler_anisotropy == vk::TRUE)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue = unsafe { device.get_device_queue(physical_device_info.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device_info.present_family, 0) };

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}
