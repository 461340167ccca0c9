// Surface - the presentable target bound to the native window
//
// Also home of the surface capability queries. They go through the
// `SurfaceQuery` trait so validation of the results does not need a GPU.

use super::error::{RenderError, Result};
use super::instance::Instance;
use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
    _instance: Arc<Instance>,
}

impl Surface {
    pub fn new<W>(instance: Arc<Instance>, window: &W) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let display = window.display_handle()?.as_raw();
        let window = window.window_handle()?.as_raw();

        let handle = unsafe {
            ash_window::create_surface(&instance.entry, &instance.handle, display, window, None)
        }
        .map_err(RenderError::SurfaceCreation)?;
        let loader = ash::khr::surface::Instance::new(&instance.entry, &instance.handle);

        Ok(Self {
            handle,
            loader,
            _instance: instance,
        })
    }

    /// Surface queries bound to one physical device
    pub fn on(&self, physical_device: vk::PhysicalDevice) -> PhysicalSurface<'_> {
        PhysicalSurface {
            surface: self,
            physical_device,
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

/// Capability queries of a surface as seen by one physical device
pub trait SurfaceQuery {
    fn supports_present(&self, queue_family: u32) -> VkResult<bool>;
    fn formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    fn present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>>;
    fn capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR>;
}

pub struct PhysicalSurface<'a> {
    surface: &'a Surface,
    physical_device: vk::PhysicalDevice,
}

impl SurfaceQuery for PhysicalSurface<'_> {
    fn supports_present(&self, queue_family: u32) -> VkResult<bool> {
        unsafe {
            self.surface.loader.get_physical_device_surface_support(
                self.physical_device,
                queue_family,
                self.surface.handle,
            )
        }
    }

    fn formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_formats(self.physical_device, self.surface.handle)
        }
    }

    fn present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_present_modes(self.physical_device, self.surface.handle)
        }
    }

    fn capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface.handle)
        }
    }
}

/// Validated results of the surface queries.
///
/// `formats` and `present_modes` are never empty.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
}

impl SurfaceSupport {
    pub fn query(surface: &impl SurfaceQuery) -> Result<Self> {
        let formats = surface
            .formats()
            .map_err(|e| RenderError::SurfaceQuery(format!("surface formats: {}", e)))?;
        if formats.is_empty() {
            return Err(RenderError::SurfaceQuery("surface reports no formats".into()));
        }

        let present_modes = surface
            .present_modes()
            .map_err(|e| RenderError::SurfaceQuery(format!("present modes: {}", e)))?;
        if present_modes.is_empty() {
            return Err(RenderError::SurfaceQuery("surface reports no present modes".into()));
        }

        let capabilities = surface
            .capabilities()
            .map_err(|e| RenderError::SurfaceQuery(format!("surface capabilities: {}", e)))?;

        Ok(Self {
            formats,
            present_modes,
            capabilities,
        })
    }

    /// First reported format, no preference ranking
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.formats[0]
    }

    /// `requested` if supported, otherwise FIFO (always available)
    pub fn present_mode(&self, requested: vk::PresentModeKHR) -> vk::PresentModeKHR {
        if self.present_modes.contains(&requested) {
            requested
        } else {
            vk::PresentModeKHR::FIFO
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;

    /// Canned query results; counts how often formats are asked for
    pub(crate) struct FakeSurface {
        pub formats: Vec<vk::SurfaceFormatKHR>,
        pub present_modes: Vec<vk::PresentModeKHR>,
        pub capabilities: vk::SurfaceCapabilitiesKHR,
        pub present_families: Vec<u32>,
        pub format_queries: Cell<u32>,
    }

    impl FakeSurface {
        pub fn typical() -> Self {
            Self {
                formats: vec![
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_UNORM,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_SRGB,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                ],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                capabilities: vk::SurfaceCapabilitiesKHR {
                    min_image_count: 2,
                    max_image_count: 8,
                    current_extent: vk::Extent2D {
                        width: 800,
                        height: 600,
                    },
                    ..Default::default()
                },
                present_families: vec![0],
                format_queries: Cell::new(0),
            }
        }
    }

    impl SurfaceQuery for FakeSurface {
        fn supports_present(&self, queue_family: u32) -> VkResult<bool> {
            Ok(self.present_families.contains(&queue_family))
        }

        fn formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
            self.format_queries.set(self.format_queries.get() + 1);
            Ok(self.formats.clone())
        }

        fn present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
            Ok(self.present_modes.clone())
        }

        fn capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
            Ok(self.capabilities)
        }
    }

    #[test]
    fn empty_formats_is_a_surface_query_error() {
        let mut surface = FakeSurface::typical();
        surface.formats.clear();
        assert!(matches!(
            SurfaceSupport::query(&surface),
            Err(RenderError::SurfaceQuery(_))
        ));
    }

    #[test]
    fn empty_present_modes_is_a_surface_query_error() {
        let mut surface = FakeSurface::typical();
        surface.present_modes.clear();
        assert!(matches!(
            SurfaceSupport::query(&surface),
            Err(RenderError::SurfaceQuery(_))
        ));
    }

    #[test]
    fn repeated_queries_agree() {
        let surface = FakeSurface::typical();
        let first = SurfaceSupport::query(&surface).unwrap();
        let second = SurfaceSupport::query(&surface).unwrap();

        assert_eq!(surface.format_queries.get(), 2);
        assert_eq!(first.formats.len(), second.formats.len());
        for (a, b) in first.formats.iter().zip(&second.formats) {
            assert_eq!(a.format, b.format);
            assert_eq!(a.color_space, b.color_space);
        }
        assert_eq!(first.present_modes, second.present_modes);
        assert_eq!(
            first.capabilities.min_image_count,
            second.capabilities.min_image_count
        );
        assert_eq!(
            first.capabilities.current_extent.width,
            second.capabilities.current_extent.width
        );
    }

    #[test]
    fn first_format_wins() {
        let support = SurfaceSupport::query(&FakeSurface::typical()).unwrap();
        assert_eq!(support.format().format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_fifo() {
        let support = SurfaceSupport::query(&FakeSurface::typical()).unwrap();
        assert_eq!(
            support.present_mode(vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            support.present_mode(vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }
}
