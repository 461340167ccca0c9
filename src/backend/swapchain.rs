// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Image count starts at the surface minimum; the driver may hand back more.

use super::device::Device;
use super::error::{RenderError, Result};
use super::surface::{Surface, SurfaceSupport};
use ash::vk;
use std::sync::Arc;

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<Device>,
    _surface: Arc<Surface>,
}

impl Swapchain {
    pub fn new(
        device: Arc<Device>,
        surface: Arc<Surface>,
        support: &SurfaceSupport,
        window_extent: vk::Extent2D,
        requested_present_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        let caps = &support.capabilities;
        let surface_format = support.format();
        let present_mode = support.present_mode(requested_present_mode);
        let extent = choose_extent(caps, window_extent);

        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode
        );

        let loader = ash::khr::swapchain::Device::new(&device.instance().handle, &device.handle);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(caps.min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(RenderError::SwapchainCreation)?;

        let mut swapchain = Self {
            handle,
            loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            device,
            _surface: surface,
        };

        // The returned image list is the frame count, not the requested minimum
        swapchain.images = unsafe { swapchain.loader.get_swapchain_images(handle) }
            .map_err(RenderError::SwapchainCreation)?;

        log::info!(
            "Created swapchain with {} images (requested at least {})",
            swapchain.images.len(),
            caps.min_image_count
        );

        let device = swapchain.device.clone();
        let format = swapchain.format;
        create_image_views(&swapchain.images, &mut swapchain.image_views, |image| {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            unsafe { device.handle.create_image_view(&create_info, None) }
                .map_err(RenderError::ImageViewCreation)
        })?;

        Ok(swapchain)
    }

    pub fn frame_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire next image for rendering, signalling `semaphore` when ready
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool)> {
        unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null())
        }
        .map_err(RenderError::AcquireImage)
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.loader.queue_present(queue, &present_info) }.map_err(RenderError::Present)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.handle.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// Surface's current extent if it has one, otherwise the window size
/// clamped to what the surface allows.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: window
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One view per image. Views land in `views` as they are created so a
/// failure part-way still leaves them with their owner for cleanup.
fn create_image_views<F>(images: &[vk::Image], views: &mut Vec<vk::ImageView>, mut create: F) -> Result<()>
where
    F: FnMut(vk::Image) -> Result<vk::ImageView>,
{
    views.reserve(images.len());
    for &image in images {
        views.push(create(image)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn images(count: u64) -> Vec<vk::Image> {
        (1..=count).map(vk::Image::from_raw).collect()
    }

    #[test]
    fn one_view_per_returned_image() {
        // Surface asked for 2, driver returned 3
        let images = images(3);
        let mut views = Vec::new();
        create_image_views(&images, &mut views, |image| {
            Ok(vk::ImageView::from_raw(image.as_raw() + 100))
        })
        .unwrap();

        assert_eq!(views.len(), images.len());
        assert_eq!(views[2].as_raw(), 103);
    }

    #[test]
    fn failed_view_keeps_earlier_views() {
        let images = images(3);
        let mut views = Vec::new();
        let result = create_image_views(&images, &mut views, |image| {
            if image.as_raw() == 2 {
                Err(RenderError::ImageViewCreation(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
            } else {
                Ok(vk::ImageView::from_raw(image.as_raw()))
            }
        });

        assert!(matches!(result, Err(RenderError::ImageViewCreation(_))));
        assert_eq!(views.len(), 1);
    }

    #[test]
    fn defined_current_extent_wins() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 1024, height: 768 },
            ..Default::default()
        };
        let extent = choose_extent(&caps, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn undefined_extent_clamps_window_size() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 640, height: 4096 },
            ..Default::default()
        };
        let extent = choose_extent(&caps, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (640, 600));
    }
}
