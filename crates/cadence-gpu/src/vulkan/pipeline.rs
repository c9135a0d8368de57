//! Mesh pipeline.

use std::io::Cursor;
use std::sync::Arc;

use ash::vk;

use super::swapchain::DEPTH_FORMAT;
use crate::backend::ShaderSet;
use crate::error::{GpuError, Result};
use crate::mesh::Vertex;

/// Push constant layout: world matrix, then view-projection.
pub const WORLD_OFFSET: u32 = 0;
pub const VIEW_PROJECTION_OFFSET: u32 = 64;
pub const PUSH_CONSTANT_SIZE: u32 = 128;

/// Graphics pipeline for [`Vertex`] meshes, built for dynamic rendering.
pub struct MeshPipeline {
    device: Arc<ash::Device>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    color_format: vk::Format,
}

impl MeshPipeline {
    /// Create the pipeline for one color attachment format.
    pub fn new(
        device: Arc<ash::Device>,
        shaders: &ShaderSet,
        color_format: vk::Format,
    ) -> Result<Self> {
        let vertex_code = read_spirv(&shaders.vertex, "vertex")?;
        let fragment_code = read_spirv(&shaders.fragment, "fragment")?;

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(PUSH_CONSTANT_SIZE)];
        let layout_info =
            vk::PipelineLayoutCreateInfo::default().push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        match unsafe { create_pipeline(&device, layout, &vertex_code, &fragment_code, color_format) } {
            Ok(pipeline) => Ok(Self {
                device,
                pipeline,
                layout,
                color_format,
            }),
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                Err(err)
            }
        }
    }

    pub const fn raw(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub const fn color_format(&self) -> vk::Format {
        self.color_format
    }
}

impl Drop for MeshPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

fn read_spirv(bytes: &[u8], stage: &str) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| GpuError::PipelineCreation(format!("{stage} shader is not SPIR-V: {e}")))
}

fn vertex_bindings() -> [vk::VertexInputBindingDescription; 1] {
    [vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(Vertex::STRIDE)
        .input_rate(vk::VertexInputRate::VERTEX)]
}

fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 3] {
    [
        vk::VertexInputAttributeDescription::default()
            .location(0)
            .binding(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(0),
        vk::VertexInputAttributeDescription::default()
            .location(1)
            .binding(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(Vertex::NORMAL_OFFSET),
        vk::VertexInputAttributeDescription::default()
            .location(2)
            .binding(0)
            .format(vk::Format::R32G32B32A32_SFLOAT)
            .offset(Vertex::COLOR_OFFSET),
    ]
}

/// # Safety
/// The device and layout must be valid.
unsafe fn create_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    vertex_code: &[u32],
    fragment_code: &[u32],
    color_format: vk::Format,
) -> Result<vk::Pipeline> {
    let vert_info = vk::ShaderModuleCreateInfo::default().code(vertex_code);
    let vert_module = device
        .create_shader_module(&vert_info, None)
        .map_err(|e| GpuError::PipelineCreation(format!("vertex module: {e}")))?;

    let frag_info = vk::ShaderModuleCreateInfo::default().code(fragment_code);
    let frag_module = match device.create_shader_module(&frag_info, None) {
        Ok(module) => module,
        Err(e) => {
            device.destroy_shader_module(vert_module, None);
            return Err(GpuError::PipelineCreation(format!("fragment module: {e}")));
        }
    };

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(c"main"),
    ];

    let bindings = vertex_bindings();
    let attributes = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS);

    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)];
    let color_blending =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats = [color_format];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(DEPTH_FORMAT);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .push_next(&mut rendering_info);

    let result =
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);

    device.destroy_shader_module(vert_module, None);
    device.destroy_shader_module(frag_module, None);

    let pipelines = result.map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::PipelineCreation("driver returned no pipeline".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_match_vertex_layout() {
        let attributes = vertex_attributes();
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(vertex_bindings()[0].stride, 40);
    }

    #[test]
    fn push_constants_hold_two_matrices() {
        assert_eq!(VIEW_PROJECTION_OFFSET, std::mem::size_of::<glam::Mat4>() as u32);
        assert_eq!(PUSH_CONSTANT_SIZE, 2 * VIEW_PROJECTION_OFFSET);
    }

    #[test]
    fn non_spirv_bytes_are_rejected() {
        assert!(matches!(
            read_spirv(&[1, 2, 3], "vertex"),
            Err(GpuError::PipelineCreation(_))
        ));
    }
}
