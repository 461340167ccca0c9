// Synchronization primitives and command buffers
//
// Per frame in flight: a fence, an image-available semaphore and a command
// buffer. Per swapchain image: a render-finished semaphore. A signaled fence
// only proves the submit finished; the present that waited on the semaphore
// may still hold it until that image is acquired again.

use super::device::Device;
use super::error::{RenderError, Result};
use ash::vk;
use std::sync::Arc;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<Device>,
}

impl FrameSync {
    pub fn new(device: Arc<Device>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Start signaled so the first wait returns immediately
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            device,
        };

        unsafe {
            let device = &sync.device.handle;
            sync.image_available = device
                .create_semaphore(&semaphore_info, None)
                .map_err(RenderError::FrameResourceCreation)?;
            sync.in_flight_fence = device
                .create_fence(&fence_info, None)
                .map_err(RenderError::FrameResourceCreation)?;
        }

        Ok(sync)
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            let device = &self.device.handle;
            device.destroy_semaphore(self.image_available, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Render-finished semaphores, indexed by swapchain image
pub struct ImageSemaphores {
    pub handles: Vec<vk::Semaphore>,
    device: Arc<Device>,
}

impl ImageSemaphores {
    pub fn new(device: Arc<Device>, image_count: usize) -> Result<Self> {
        let mut semaphores = Self {
            handles: Vec::with_capacity(image_count),
            device,
        };

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        for _ in 0..image_count {
            let handle = unsafe { semaphores.device.handle.create_semaphore(&semaphore_info, None) }
                .map_err(RenderError::FrameResourceCreation)?;
            semaphores.handles.push(handle);
        }

        Ok(semaphores)
    }
}

impl Drop for ImageSemaphores {
    fn drop(&mut self) {
        for &semaphore in &self.handles {
            unsafe { self.device.handle.destroy_semaphore(semaphore, None) };
        }
    }
}

/// Sync objects one frame uses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlot {
    /// Index into the per-frame fences, image-available semaphores and
    /// command buffers
    pub frame: usize,
    /// Index into the per-image render-finished semaphores
    pub image: usize,
}

/// Round-robin over the frames in flight
#[derive(Debug)]
pub struct FrameSchedule {
    frames_in_flight: usize,
    current: usize,
}

impl FrameSchedule {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            current: 0,
        }
    }

    /// Frame slot to wait on and acquire with
    pub fn current(&self) -> usize {
        self.current
    }

    /// Full slot once `image_index` has been acquired
    pub fn slot(&self, image_index: u32) -> FrameSlot {
        FrameSlot {
            frame: self.current,
            image: image_index as usize,
        }
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames_in_flight;
    }
}

/// Command pool on the graphics queue family with resettable buffers
pub struct CommandPool {
    pub handle: vk::CommandPool,
    pub buffers: Vec<vk::CommandBuffer>,
    device: Arc<Device>,
}

impl CommandPool {
    pub fn new(device: Arc<Device>, buffer_count: u32) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let handle = unsafe { device.handle.create_command_pool(&pool_info, None) }
            .map_err(RenderError::FrameResourceCreation)?;

        let mut pool = Self {
            handle,
            buffers: Vec::new(),
            device,
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(buffer_count);

        // Freed together with the pool
        pool.buffers = unsafe { pool.device.handle.allocate_command_buffers(&alloc_info) }
            .map_err(RenderError::FrameResourceCreation)?;

        Ok(pool)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.handle.destroy_command_pool(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cycle_through_the_slots() {
        let mut schedule = FrameSchedule::new(2);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(schedule.current());
            schedule.advance();
        }
        assert_eq!(seen, [0, 1, 0, 1, 0]);
    }

    #[test]
    fn zero_frames_in_flight_still_runs() {
        let mut schedule = FrameSchedule::new(0);
        schedule.advance();
        assert_eq!(schedule.current(), 0);
    }

    #[test]
    fn render_finished_follows_the_image_not_the_frame() {
        // Two frames in flight over three images: frames 0 and 2 share a
        // fence slot but present different images
        let mut schedule = FrameSchedule::new(2);
        let acquired = [0u32, 1, 2, 0, 1, 2];
        let slots: Vec<FrameSlot> = acquired
            .iter()
            .map(|&image| {
                let slot = schedule.slot(image);
                schedule.advance();
                slot
            })
            .collect();

        assert_eq!(slots[0].frame, slots[2].frame);
        assert_ne!(slots[0].image, slots[2].image);

        // Every image gets its own semaphore, more than there are frame slots
        let images: Vec<usize> = slots.iter().map(|s| s.image).collect();
        assert_eq!(images, [0, 1, 2, 0, 1, 2]);
        let frames: Vec<usize> = slots.iter().map(|s| s.frame).collect();
        assert_eq!(frames, [0, 1, 0, 1, 0, 1]);
    }
}
