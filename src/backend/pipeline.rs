// Graphics pipeline creation
//
// The graphics pipeline defines how vertices are processed and rasterized.
// It includes: vertex input, shaders, rasterization, depth/stencil, blending.
// All fixed-function state is decided here; viewport, scissor and blend
// constants are also dynamic and set again while recording each frame.

use super::device::Device;
use super::error::{RenderError, Result};
use super::render_pass::RenderPass;
use super::shader::{load_spirv, ShaderModule};
use crate::config::PipelineConfig;
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

pub const SHADER_ENTRY_POINT: &CStr = c"main";

/// Bytes the fragment shader reads: `vec2 resolution` then `float time`
pub const MIN_PUSH_CONSTANT_SIZE: u32 = 12;

/// Guaranteed minimum of `maxPushConstantsSize` on every implementation
pub const MAX_PUSH_CONSTANT_SIZE: u32 = 128;

pub const DYNAMIC_STATES: [vk::DynamicState; 3] = [
    vk::DynamicState::SCISSOR,
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::BLEND_CONSTANTS,
];

/// Push-constant range visible to every stage, starting at offset 0
pub fn push_constant_range(size: u32) -> Result<vk::PushConstantRange> {
    if size % 4 != 0 || !(MIN_PUSH_CONSTANT_SIZE..=MAX_PUSH_CONSTANT_SIZE).contains(&size) {
        return Err(RenderError::InvalidPushConstantRange(size));
    }
    Ok(vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::ALL)
        .offset(0)
        .size(size))
}

/// Vertex input description. The full-screen triangle is generated from
/// `gl_VertexIndex`, so there are no bindings or attributes.
pub fn vertex_input_info() -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    (Vec::new(), Vec::new())
}

/// Straight alpha "over":
/// color = src * SRC_ALPHA + dst * (1 - SRC_ALPHA),
/// alpha = src * 1 + dst * (1 - SRC_ALPHA).
pub fn alpha_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
}

/// Fixed-function state, owned so it can be inspected before it is linked
pub struct FixedFunctionState {
    pub input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
    pub rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
    pub multisample: vk::PipelineMultisampleStateCreateInfo<'static>,
    pub depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    pub push_constant_range: vk::PushConstantRange,
}

impl FixedFunctionState {
    pub fn new(config: &PipelineConfig, extent: vk::Extent2D) -> Result<Self> {
        let push_constant_range = push_constant_range(config.push_constant_size)?;

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Static values; the dynamic state overrides them per frame
        let viewport = vk::Viewport::default()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);

        let scissor = vk::Rect2D::default()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(extent);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false)
            .alpha_to_coverage_enable(config.alpha_to_coverage)
            .alpha_to_one_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        Ok(Self {
            input_assembly,
            viewport,
            scissor,
            rasterization,
            multisample,
            depth_stencil,
            color_blend_attachment: alpha_blend_attachment(),
            push_constant_range,
        })
    }
}

/// Read both shader binaries before any GPU object is made from them
pub fn load_shader_pair(config: &PipelineConfig) -> Result<(Vec<u32>, Vec<u32>)> {
    let vertex = load_spirv(&config.vertex_shader)?;
    let fragment = load_spirv(&config.fragment_shader)?;
    Ok((vertex, fragment))
}

/// Pipeline and its layout
pub struct Pipeline {
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub push_constant_range: vk::PushConstantRange,
    device: Arc<Device>,
}

impl Pipeline {
    /// Build the graphics pipeline for subpass 0 of `render_pass`
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        config: &PipelineConfig,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let state = FixedFunctionState::new(config, extent)?;
        let (vertex_code, fragment_code) = load_shader_pair(config)?;

        // Dropped at the end of this function, after the pipeline exists
        let vertex_shader = ShaderModule::new(device.clone(), &vertex_code)?;
        let fragment_shader = ShaderModule::new(device.clone(), &fragment_code)?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader.handle)
                .name(SHADER_ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader.handle)
                .name(SHADER_ENTRY_POINT),
        ];

        let (bindings, attributes) = vertex_input_info();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let viewports = [state.viewport];
        let scissors = [state.scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let color_blend_attachments = [state.color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::NO_OP)
            .attachments(&color_blend_attachments);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let push_constant_ranges = [state.push_constant_range];
        let layout_info = vk::PipelineLayoutCreateInfo::default().push_constant_ranges(&push_constant_ranges);

        let layout = unsafe { device.handle.create_pipeline_layout(&layout_info, None) }
            .map_err(RenderError::PipelineCreation)?;

        // Owns the layout from here on, so a failed link still frees it
        let mut pipeline = Self {
            handle: vk::Pipeline::null(),
            layout,
            push_constant_range: state.push_constant_range,
            device,
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&state.input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&state.rasterization)
            .multisample_state(&state.multisample)
            .depth_stencil_state(&state.depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.handle)
            .subpass(0);

        let pipelines = unsafe {
            pipeline.device.handle.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_info),
                None,
            )
        }
        .map_err(|(_, e)| RenderError::PipelineCreation(e))?;
        pipeline.handle = pipelines[0];

        log::info!(
            "Graphics pipeline ready ({:?}, push constants {} bytes)",
            render_pass.format,
            state.push_constant_range.size
        );

        Ok(pipeline)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle.destroy_pipeline(self.handle, None);
            self.device.handle.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn push_constant_size_must_be_explicit_and_aligned() {
        for size in [0, 6, 130, 256] {
            assert!(
                matches!(push_constant_range(size), Err(RenderError::InvalidPushConstantRange(s)) if s == size),
                "size {} accepted",
                size
            );
        }

        let range = push_constant_range(16).unwrap();
        assert_eq!(range.size, 16);
        assert_eq!(range.offset, 0);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::ALL);
        assert!(push_constant_range(MAX_PUSH_CONSTANT_SIZE).is_ok());
    }

    #[test]
    fn range_must_cover_the_shader_block() {
        for size in [4, 8] {
            assert!(matches!(
                push_constant_range(size),
                Err(RenderError::InvalidPushConstantRange(s)) if s == size
            ));
        }
        assert_eq!(push_constant_range(MIN_PUSH_CONSTANT_SIZE).unwrap().size, 12);
    }

    #[test]
    fn fixed_state_matches_the_pipeline_contract() {
        let state = FixedFunctionState::new(&PipelineConfig::default(), EXTENT).unwrap();

        assert_eq!(state.rasterization.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(state.rasterization.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(state.rasterization.polygon_mode, vk::PolygonMode::FILL);

        assert_eq!(state.depth_stencil.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_stencil.depth_write_enable, vk::TRUE);
        assert_eq!(state.depth_stencil.depth_compare_op, vk::CompareOp::LESS);

        assert_eq!(state.multisample.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(state.multisample.alpha_to_coverage_enable, vk::FALSE);

        assert_eq!(state.viewport.width, 800.0);
        assert_eq!(state.viewport.height, 600.0);
        assert_eq!(state.scissor.extent.width, 800);
        assert_eq!(state.scissor.extent.height, 600);
    }

    #[test]
    fn blend_equation_is_straight_alpha() {
        let blend = alpha_blend_attachment();
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(blend.dst_alpha_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn alpha_to_coverage_follows_config() {
        let config = PipelineConfig {
            alpha_to_coverage: true,
            ..PipelineConfig::default()
        };
        let state = FixedFunctionState::new(&config, EXTENT).unwrap();
        assert_eq!(state.multisample.alpha_to_coverage_enable, vk::TRUE);
    }

    #[test]
    fn bad_push_constant_size_stops_before_shaders_are_read() {
        let config = PipelineConfig {
            push_constant_size: 0,
            vertex_shader: PathBuf::from("missing/vertex.spv"),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            FixedFunctionState::new(&config, EXTENT),
            Err(RenderError::InvalidPushConstantRange(0))
        ));
    }

    #[test]
    fn missing_shader_fails_before_module_creation() {
        let config = PipelineConfig {
            vertex_shader: PathBuf::from("missing/vertex.spv"),
            ..PipelineConfig::default()
        };
        match load_shader_pair(&config) {
            Err(RenderError::ShaderLoad { path, .. }) => {
                assert_eq!(path, PathBuf::from("missing/vertex.spv"))
            }
            other => panic!("expected ShaderLoad, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn dynamic_states_cover_viewport_scissor_and_blend_constants() {
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::VIEWPORT));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::SCISSOR));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::BLEND_CONSTANTS));
    }

    #[test]
    fn no_vertex_buffers() {
        let (bindings, attributes) = vertex_input_info();
        assert!(bindings.is_empty());
        assert!(attributes.is_empty());
    }
}
