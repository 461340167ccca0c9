// Vulkan Device - Logical device and queue
//
// Responsibilities:
// - Queue family selection (graphics + present to our surface)
// - Logical device creation with the swapchain extension
// - Graphics/present queue retrieval

use super::error::{RenderError, Result};
use super::instance::Instance;
use super::surface::SurfaceQuery;
use ash::vk;
use std::sync::Arc;

/// Logical device wrapper with automatic cleanup
pub struct Device {
    pub handle: ash::Device,

    // Queue handles
    pub queue: vk::Queue,
    pub queue_family: u32,

    instance: Arc<Instance>,
}

impl Device {
    /// Create the logical device on `physical_device`.
    ///
    /// The queue family is picked against `surface`, so the surface must
    /// exist before the device.
    pub fn new(
        instance: Arc<Instance>,
        physical_device: vk::PhysicalDevice,
        surface: &impl SurfaceQuery,
    ) -> Result<Arc<Self>> {
        let queue_families = unsafe {
            instance
                .handle
                .get_physical_device_queue_family_properties(physical_device)
        };
        let queue_family = select_queue_family(&queue_families, surface)?;
        log::info!("Using queue family {} for graphics and present", queue_family);

        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities);

        let extensions = [ash::khr::swapchain::NAME.as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default().geometry_shader(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let handle = unsafe {
            instance
                .handle
                .create_device(physical_device, &create_info, None)
        }
        .map_err(RenderError::DeviceCreation)?;

        let queue = unsafe { handle.get_device_queue(queue_family, 0) };

        Ok(Arc::new(Self {
            handle,
            queue,
            queue_family,
            instance,
        }))
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        unsafe { self.handle.device_wait_idle() }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::warn!("device_wait_idle failed during teardown: {}", e);
        }
        unsafe { self.handle.destroy_device(None) };
    }
}

/// Lowest queue family index with graphics support that can also present
/// to the surface.
pub fn select_queue_family(
    families: &[vk::QueueFamilyProperties],
    surface: &impl SurfaceQuery,
) -> Result<u32> {
    for (index, props) in families.iter().enumerate() {
        let index = index as u32;
        if !props.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }
        let present = surface
            .supports_present(index)
            .map_err(|e| RenderError::SurfaceQuery(format!("present support: {}", e)))?;
        if present {
            return Ok(index);
        }
    }
    Err(RenderError::NoSuitableQueueFamily)
}
