// Renderer error taxonomy
//
// Every failure is fatal for the run: stages return these and `?` carries
// them to the top-level boundary in main.rs.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to load Vulkan library. Is Vulkan installed? ({0})")]
    Loader(#[from] ash::LoadingError),

    #[error("Requested layer {0} is not supported")]
    UnsupportedLayer(String),

    #[error("Failed to create Vulkan instance: {0}")]
    InstanceCreation(vk::Result),

    #[error("Failed to create debug utils messenger: {0}")]
    DebugMessengerCreation(vk::Result),

    #[error("Failed to get native window handle: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("Failed to create window surface: {0}")]
    SurfaceCreation(vk::Result),

    #[error("Failed to enumerate physical devices: {0}")]
    DeviceEnumeration(vk::Result),

    #[error("No Vulkan physical device found")]
    NoDeviceFound,

    #[error("No queue family supports both graphics and presentation")]
    NoSuitableQueueFamily,

    #[error("Failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("Surface query failed: {0}")]
    SurfaceQuery(String),

    #[error("Failed to create swapchain: {0}")]
    SwapchainCreation(vk::Result),

    #[error("Failed to create swapchain image view: {0}")]
    ImageViewCreation(vk::Result),

    #[error("Failed to open shader file {path:?}: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Shader file {path:?} is not valid SPIR-V: {source}")]
    MalformedShader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create shader module: {0}")]
    ShaderModuleCreation(vk::Result),

    #[error("Failed to create render pass: {0}")]
    RenderPassCreation(vk::Result),

    #[error("Invalid push constant size {0}: must be a multiple of 4 between 12 and 128")]
    InvalidPushConstantRange(u32),

    #[error("Failed to create graphics pipeline: {0}")]
    PipelineCreation(vk::Result),

    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreation(vk::Result),

    #[error("Failed to create per-frame resources: {0}")]
    FrameResourceCreation(vk::Result),

    #[error("Failed to acquire swapchain image: {0}")]
    AcquireImage(vk::Result),

    #[error("Failed to submit frame: {0}")]
    Submit(vk::Result),

    #[error("Failed to present frame: {0}")]
    Present(vk::Result),
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_failure_is_not_reported_as_device_creation() {
        let message = RenderError::DeviceEnumeration(vk::Result::ERROR_INITIALIZATION_FAILED).to_string();
        assert!(message.starts_with("Failed to enumerate physical devices"), "{}", message);
        assert!(!message.contains("logical device"));
    }
}
