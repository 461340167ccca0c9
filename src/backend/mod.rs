// Backend module - Vulkan abstraction layer
//
// One owning wrapper per handle kind. Children hold an `Arc` of their
// parent, so destruction always runs in reverse creation order.

pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::Device;
pub use error::RenderError;
pub use instance::Instance;
pub use pipeline::Pipeline;
pub use render_pass::{Framebuffers, RenderPass};
pub use surface::{Surface, SurfaceSupport};
pub use swapchain::Swapchain;
pub use sync::{CommandPool, FrameSchedule, FrameSync, ImageSemaphores};
