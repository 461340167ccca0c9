// =============================================================================
// RENDERER - Owns every GPU resource and draws one frame per tick
// =============================================================================
//
// INITIALIZATION (strict order, any failure aborts):
//   instance -> surface -> physical device -> device + queue
//   -> surface support -> swapchain + views -> render pass -> pipeline
//   -> framebuffers -> command buffers + sync objects
//
// FRAME FLOW:
//   wait fence -> acquire image -> reset fence -> record -> submit -> present
//   Fences and image-available semaphores rotate per frame in flight;
//   render-finished semaphores belong to the acquired image.

use crate::backend::error::Result;
use crate::backend::pipeline;
use crate::backend::{
    CommandPool, Device, FrameSchedule, FrameSync, Framebuffers, ImageSemaphores, Instance,
    Pipeline, RenderError, RenderPass, Surface, SurfaceSupport, Swapchain,
};
use crate::config::Config;
use crate::frame_loop::FrameSink;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use std::time::Instant;

/// Push-constant block shared with `shaders/shader.frag`
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameConstants {
    pub resolution: Vec2,
    pub time: f32,
    pub _pad: f32,
}

impl FrameConstants {
    pub fn new(extent: vk::Extent2D, time: f32) -> Self {
        Self {
            resolution: Vec2::new(extent.width as f32, extent.height as f32),
            time,
            _pad: 0.0,
        }
    }
}

/// The leading bytes of `constants` that fit in a range of `range_size`
pub fn push_constant_bytes(constants: &FrameConstants, range_size: u32) -> &[u8] {
    let bytes = bytemuck::bytes_of(constants);
    &bytes[..bytes.len().min(range_size as usize)]
}

/// Main renderer struct holding all Vulkan resources.
///
/// Fields drop top to bottom; children also hold an `Arc` of their parent,
/// so the instance always goes last.
pub struct Renderer {
    frame_sync: Vec<FrameSync>,
    render_finished: ImageSemaphores,
    command_pool: CommandPool,
    framebuffers: Framebuffers,
    pipeline: Pipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<Device>,
    _surface: Arc<Surface>,
    _instance: Arc<Instance>,

    clear_color: [f32; 4],
    blend_constants: [f32; 4],
    schedule: FrameSchedule,
    started: Instant,

    // FPS tracking
    show_fps: bool,
    frame_count: u32,
    last_fps_update: Instant,
}

impl Renderer {
    /// Run every initialization stage against `window`.
    ///
    /// `extent` is the window's client size in pixels.
    pub fn new<W>(window: &W, extent: vk::Extent2D, config: &Config) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        log::info!("Initializing Vulkan...");

        // Reject a bad push-constant size before any GPU object exists
        let push_constants = pipeline::push_constant_range(config.pipeline.push_constant_size)?;
        log::debug!("Push constants: {} bytes", push_constants.size);

        let display = window.display_handle()?.as_raw();
        let instance = Arc::new(Instance::new(
            display,
            &config.debug.layers,
            config.validation_enabled(),
        )?);

        let surface = Arc::new(Surface::new(instance.clone(), window)?);
        let physical_device = instance.pick_physical_device()?;
        let device = Device::new(instance.clone(), physical_device, &surface.on(physical_device))?;
        let support = SurfaceSupport::query(&surface.on(physical_device))?;

        let swapchain = Swapchain::new(
            device.clone(),
            surface.clone(),
            &support,
            extent,
            config.present_mode(),
        )?;
        let render_pass = RenderPass::new(device.clone(), swapchain.format)?;
        let pipeline = Pipeline::new(device.clone(), &render_pass, &config.pipeline, extent)?;
        let framebuffers = Framebuffers::new(
            device.clone(),
            &render_pass,
            &swapchain.image_views,
            swapchain.extent,
        )?;

        let frames_in_flight = config.graphics.max_frames_in_flight.max(1);
        let command_pool = CommandPool::new(device.clone(), frames_in_flight as u32)?;
        let frame_sync = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<Result<Vec<_>>>()?;
        let render_finished = ImageSemaphores::new(device.clone(), swapchain.frame_count())?;

        log::info!(
            "Vulkan initialized: {} swapchain images, {} frames in flight",
            swapchain.frame_count(),
            frames_in_flight
        );

        let now = Instant::now();
        Ok(Self {
            frame_sync,
            render_finished,
            command_pool,
            framebuffers,
            pipeline,
            render_pass,
            swapchain,
            device,
            _surface: surface,
            _instance: instance,
            clear_color: config.graphics.clear_color,
            blend_constants: config.pipeline.blend_constants,
            schedule: FrameSchedule::new(frames_in_flight),
            started: now,
            show_fps: config.graphics.show_fps,
            frame_count: 0,
            last_fps_update: now,
        })
    }

    fn record(&self, cmd: vk::CommandBuffer, image_index: u32) -> Result<()> {
        let device = &self.device.handle;
        let extent = self.swapchain.extent;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let constants = FrameConstants::new(extent, self.started.elapsed().as_secs_f32());

        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.handle)
            .framebuffer(self.framebuffers.handles[image_index as usize])
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(RenderError::Submit)?;
            device
                .begin_command_buffer(cmd, &begin_info)
                .map_err(RenderError::Submit)?;

            device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
            device.cmd_set_blend_constants(cmd, &self.blend_constants);
            device.cmd_push_constants(
                cmd,
                self.pipeline.layout,
                self.pipeline.push_constant_range.stage_flags,
                0,
                push_constant_bytes(&constants, self.pipeline.push_constant_range.size),
            );
            // Full-screen triangle
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device.end_command_buffer(cmd).map_err(RenderError::Submit)?;
        }

        Ok(())
    }

    fn track_fps(&mut self) {
        self.frame_count += 1;
        let elapsed = self.last_fps_update.elapsed();
        if elapsed.as_secs_f32() >= 1.0 {
            if self.show_fps {
                let fps = self.frame_count as f32 / elapsed.as_secs_f32();
                log::info!("FPS: {:.1}", fps);
            }
            self.frame_count = 0;
            self.last_fps_update = Instant::now();
        }
    }
}

impl FrameSink for Renderer {
    fn draw_frame(&mut self) -> Result<()> {
        let frame = self.schedule.current();
        let (image_available, in_flight_fence) = {
            let sync = &self.frame_sync[frame];
            (sync.image_available, sync.in_flight_fence)
        };
        let cmd = self.command_pool.buffers[frame];
        let device = &self.device.handle;

        // Wait until this slot's previous submission is done
        unsafe { device.wait_for_fences(&[in_flight_fence], true, u64::MAX) }
            .map_err(RenderError::Submit)?;

        let (image_index, suboptimal) = self.swapchain.acquire_next_image(image_available)?;
        if suboptimal {
            log::debug!("Swapchain suboptimal on acquire");
        }
        let slot = self.schedule.slot(image_index);
        // Re-acquiring the image means its previous present is done with this
        let render_finished = self.render_finished.handles[slot.image];

        unsafe { device.reset_fences(&[in_flight_fence]) }.map_err(RenderError::Submit)?;

        self.record(cmd, image_index)?;

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let signal_semaphores = [render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { device.queue_submit(self.device.queue, &[submit_info], in_flight_fence) }
            .map_err(RenderError::Submit)?;

        self.swapchain
            .present(self.device.queue, image_index, &signal_semaphores)?;

        self.schedule.advance();
        self.track_fps();
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // In-flight frames still reference the sync objects and command buffers
        if let Err(e) = self.device.wait_idle() {
            log::warn!("device_wait_idle failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_constants_fit_the_default_range() {
        let default_size = crate::config::PipelineConfig::default().push_constant_size;
        assert_eq!(std::mem::size_of::<FrameConstants>() as u32, default_size);
    }

    #[test]
    fn smallest_accepted_range_still_holds_time() {
        let read_by_shader = std::mem::offset_of!(FrameConstants, time) + std::mem::size_of::<f32>();
        assert_eq!(read_by_shader as u32, pipeline::MIN_PUSH_CONSTANT_SIZE);
    }

    #[test]
    fn resolution_comes_first() {
        let constants = FrameConstants::new(vk::Extent2D { width: 800, height: 600 }, 2.5);
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&constants));
        assert_eq!(floats, &[800.0, 600.0, 2.5, 0.0]);
    }

    #[test]
    fn pushed_bytes_never_exceed_the_range() {
        let constants = FrameConstants::new(vk::Extent2D { width: 1, height: 1 }, 0.0);
        assert_eq!(push_constant_bytes(&constants, 8).len(), 8);
        assert_eq!(push_constant_bytes(&constants, 16).len(), 16);
        assert_eq!(push_constant_bytes(&constants, 128).len(), 16);
    }
}
