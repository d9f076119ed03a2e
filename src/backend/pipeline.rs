// Graphics pipeline creation
//
// One render pass with a single colour attachment, and one fixed-function
// pipeline drawing vertices generated in the vertex shader.

use super::gpu::Gpu;
use super::shader::ShaderModule;
use crate::error::BootstrapError;
use ash::vk;
use std::sync::Arc;

pub struct RenderPass<G: Gpu> {
    pub handle: vk::RenderPass,
    gpu: Arc<G>,
}

impl<G: Gpu> RenderPass<G> {
    /// Clear on load, store on store, handed to the presentation engine.
    pub fn new(gpu: Arc<G>, format: vk::Format) -> Result<Self, BootstrapError> {
        // Color attachment (the swapchain image)
        let color_attachment = vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachments = &[color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(color_attachments)
            .build();

        // Image writes wait until the acquire semaphore has released the image
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build();

        let attachments = &[color_attachment];
        let subpasses = &[subpass];
        let dependencies = &[dependency];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(attachments)
            .subpasses(subpasses)
            .dependencies(dependencies);

        let handle = gpu
            .create_render_pass(&render_pass_info)
            .map_err(failed_at("render pass"))?;

        Ok(Self { handle, gpu })
    }
}

impl<G: Gpu> Drop for RenderPass<G> {
    fn drop(&mut self) {
        self.gpu.destroy_render_pass(self.handle);
    }
}

/// Pipeline layout plus the graphics pipeline built against one render pass.
pub struct Pipeline<G: Gpu> {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    gpu: Arc<G>,
}

impl<G: Gpu> Pipeline<G> {
    /// Build the triangle pipeline from vertex and fragment SPIR-V.
    ///
    /// Shader modules are destroyed before this returns, whether or not
    /// the pipeline was created.
    pub fn new(
        gpu: Arc<G>,
        render_pass: vk::RenderPass,
        vertex_code: &[u32],
        fragment_code: &[u32],
    ) -> Result<Self, BootstrapError> {
        let (pipeline, layout) = {
            let vertex = ShaderModule::new(&*gpu, vertex_code)
                .map_err(failed_at("vertex shader module"))?;
            let fragment = ShaderModule::new(&*gpu, fragment_code)
                .map_err(failed_at("fragment shader module"))?;

            Self::assemble(&*gpu, render_pass, vertex.handle, fragment.handle)?
        };

        log::info!("Graphics pipeline created");

        Ok(Self {
            pipeline,
            layout,
            gpu,
        })
    }

    fn assemble(
        gpu: &G,
        render_pass: vk::RenderPass,
        vert_shader: vk::ShaderModule,
        frag_shader: vk::ShaderModule,
    ) -> Result<(vk::Pipeline, vk::PipelineLayout), BootstrapError> {
        let entry_point = c"main";

        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_shader)
            .name(entry_point)
            .build();

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_shader)
            .name(entry_point)
            .build();

        let shader_stages = &[vert_stage, frag_stage];

        // Viewport and scissor are set per frame
        let dynamic_states = &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(dynamic_states);

        // No vertex buffers: positions come from gl_VertexIndex
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        // Premultiplied-alpha blending
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build();

        let color_blend_attachments = &[color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let pipeline_layout = gpu
            .create_pipeline_layout(&layout_info)
            .map_err(failed_at("pipeline layout"))?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(pipeline_layout)
            .render_pass(render_pass)
            .subpass(0)
            .base_pipeline_index(-1);

        match gpu.create_graphics_pipeline(&pipeline_info) {
            Ok(pipeline) => Ok((pipeline, pipeline_layout)),
            Err(e) => {
                gpu.destroy_pipeline_layout(pipeline_layout);
                Err(failed_at("graphics pipeline")(e))
            }
        }
    }
}

impl<G: Gpu> Drop for Pipeline<G> {
    fn drop(&mut self) {
        self.gpu.destroy_pipeline(self.pipeline);
        self.gpu.destroy_pipeline_layout(self.layout);
    }
}

fn failed_at(stage: &'static str) -> impl Fn(vk::Result) -> BootstrapError {
    move |result| BootstrapError::PipelineCreation { stage, result }
}
