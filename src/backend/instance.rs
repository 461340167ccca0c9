// Vulkan Instance - Context initialization
//
// Responsibilities:
// - Load the Vulkan library and create the instance
// - Check requested validation layers before enabling them
// - Route validation messages into the log
// - Enumerate and select the physical device

use super::error::{RenderError, Result};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_void, CStr, CString};

const APP_NAME: &CStr = c"Vulkan Shader Toy";
const ENGINE_NAME: &CStr = c"No Engine";

/// Instance wrapper with automatic cleanup.
///
/// Owns the debug messenger; surfaces and devices keep an `Arc` to this so
/// it is always destroyed last.
pub struct Instance {
    pub handle: ash::Instance,
    pub entry: Entry,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Create the Vulkan instance.
    ///
    /// # Arguments
    /// * `display` - Native display handle, decides the platform surface extensions
    /// * `layers` - Layer names to enable when `enable_validation` is set
    /// * `enable_validation` - Enable layers and the debug messenger
    pub fn new(display: RawDisplayHandle, layers: &[String], enable_validation: bool) -> Result<Self> {
        log::info!("Creating Vulkan instance");

        let entry = unsafe { Entry::load() }?;

        let layer_names = if enable_validation {
            let requested = layers
                .iter()
                .map(|name| {
                    CString::new(name.as_str())
                        .map_err(|_| RenderError::UnsupportedLayer(name.clone()))
                })
                .collect::<Result<Vec<_>>>()?;
            let available = unsafe { entry.enumerate_instance_layer_properties() }
                .map_err(RenderError::InstanceCreation)?;
            check_layer_support(&available, &requested)?;
            requested
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<_> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .map_err(RenderError::InstanceCreation)?
            .to_vec();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(APP_NAME)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);

        let handle = unsafe { entry.create_instance(&create_info, None) }
            .map_err(RenderError::InstanceCreation)?;

        // Wrap first so a messenger failure still destroys the instance
        let mut instance = Self {
            handle,
            entry,
            debug_utils: None,
        };

        if enable_validation {
            instance.debug_utils = Some(instance.setup_debug_messenger()?);
            log::info!("Validation layers enabled: {:?}", layers);
        }

        Ok(instance)
    }

    fn setup_debug_messenger(
        &self,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(&self.entry, &self.handle);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(RenderError::DebugMessengerCreation)?;

        Ok((debug_utils, messenger))
    }

    /// Pick the first enumerated GPU. No scoring.
    pub fn pick_physical_device(&self) -> Result<vk::PhysicalDevice> {
        let devices = unsafe { self.handle.enumerate_physical_devices() }
            .map_err(RenderError::DeviceEnumeration)?;
        let physical_device = select_physical_device(&devices)?;

        let properties = unsafe { self.handle.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        Ok(physical_device)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.handle.destroy_instance(None);
        }
    }
}

/// Fails with the first requested layer missing from `available`.
pub fn check_layer_support(available: &[vk::LayerProperties], requested: &[CString]) -> Result<()> {
    for name in requested {
        let found = available
            .iter()
            .any(|props| unsafe { CStr::from_ptr(props.layer_name.as_ptr()) } == name.as_c_str());
        if !found {
            return Err(RenderError::UnsupportedLayer(name.to_string_lossy().into_owned()));
        }
    }
    Ok(())
}

pub fn select_physical_device(devices: &[vk::PhysicalDevice]) -> Result<vk::PhysicalDevice> {
    devices.first().copied().ok_or(RenderError::NoDeviceFound)
}

fn format_validation_message(severity: vk::DebugUtilsMessageSeverityFlagsEXT, message: &str) -> String {
    let label = match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => "Info",
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => "Verbose",
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => "Warning",
        _ => "Error",
    };
    format!("[validation layer] {}: {}", label, message)
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();
    let line = format_validation_message(message_severity, &message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("{}", line),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("{}", line),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("{}", line),
        _ => log::debug!("{}", line),
    }

    vk::FALSE
}
