//! Graphics pipeline construction
//!
//! `PipelineBuilder` collects shader stages, the vertex layout and descriptor
//! set layouts; everything else is fixed: triangle lists, one viewport and
//! scissor over the swapchain extent, back-face culling with counter-clockwise
//! front faces, depth test and write with `LESS`, no blending.

use std::ffi::CStr;

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};
use super::shader::{ShaderModule, ShaderStage};
use super::tracker::{ResourceKind, ResourceTracker, TrackedResource};
use super::vertex_layout::VertexLayout;

const ENTRY_POINT: &[u8] = b"main\0";

/// Builder for the engine's single graphics pipeline
pub struct PipelineBuilder {
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    stages: Vec<(ShaderStage, vk::ShaderModule)>,
    vertex_binding: Option<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
}

impl PipelineBuilder {
    /// Start a pipeline for subpass 0 of `render_pass`
    pub fn new(render_pass: vk::RenderPass, extent: vk::Extent2D) -> Self {
        Self {
            render_pass,
            extent,
            stages: Vec::new(),
            vertex_binding: None,
            vertex_attributes: Vec::new(),
            set_layouts: Vec::new(),
        }
    }

    /// Add a shader stage; a later module for the same stage replaces it
    pub fn shader(mut self, stage: ShaderStage, module: &ShaderModule) -> Self {
        self.stages.retain(|(existing, _)| *existing != stage);
        self.stages.push((stage, module.handle()));
        self
    }

    /// Take vertex input from `V`
    pub fn vertex_layout<V: VertexLayout>(mut self) -> Self {
        self.vertex_binding = Some(V::binding_description());
        self.vertex_attributes = V::attribute_descriptions();
        self
    }

    /// Append a descriptor set layout; sets are numbered in call order
    pub fn descriptor_set_layout(mut self, layout: vk::DescriptorSetLayout) -> Self {
        self.set_layouts.push(layout);
        self
    }

    fn validate(&self) -> VulkanResult<()> {
        for required in [ShaderStage::Vertex, ShaderStage::Fragment] {
            if !self.stages.iter().any(|(stage, _)| *stage == required) {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("pipeline has no {:?} shader", required),
                });
            }
        }
        if self.vertex_binding.is_none() {
            return Err(VulkanError::InvalidOperation {
                reason: "pipeline has no vertex layout".to_string(),
            });
        }
        Ok(())
    }

    /// Create the pipeline layout and pipeline
    pub fn build(self, device: &Device, tracker: &ResourceTracker) -> VulkanResult<GraphicsPipeline> {
        self.validate()?;

        let entry = CStr::from_bytes_with_nul(ENTRY_POINT)
            .map_err(|e| VulkanError::Shader(format!("invalid entry point name: {}", e)))?;

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = self
            .stages
            .iter()
            .map(|(stage, module)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.flags())
                    .module(*module)
                    .name(entry)
                    .build()
            })
            .collect();

        let bindings: Vec<vk::VertexInputBindingDescription> = self.vertex_binding.into_iter().collect();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(self.extent.width as f32)
            .height(self.extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)
            .build()];

        let scissors = [vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(self.extent)
            .build()];

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];

        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&self.set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None).map_err(VulkanError::Api)? };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(self.render_pass)
            .subpass(0);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };
        let pipeline = match created {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };
        let Some(pipeline) = pipeline else {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(VulkanError::InvalidOperation {
                reason: "driver returned no pipeline".to_string(),
            });
        };

        log::debug!(
            "Graphics pipeline created: {} stages, {}x{}",
            shader_stages.len(),
            self.extent.width,
            self.extent.height
        );

        Ok(GraphicsPipeline {
            device: device.clone(),
            pipeline,
            layout,
            _tracked: tracker.track(ResourceKind::Pipeline),
        })
    }
}

/// Graphics pipeline and its layout
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    _tracked: TrackedResource,
}

impl GraphicsPipeline {
    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::primitives::Vertex;

    fn builder() -> PipelineBuilder {
        PipelineBuilder::new(vk::RenderPass::null(), vk::Extent2D { width: 800, height: 600 })
    }

    fn with_stage(mut builder: PipelineBuilder, stage: ShaderStage) -> PipelineBuilder {
        builder.stages.push((stage, vk::ShaderModule::null()));
        builder
    }

    #[test]
    fn test_missing_stages_are_rejected() {
        let only_vertex = with_stage(builder(), ShaderStage::Vertex).vertex_layout::<Vertex>();
        assert!(matches!(only_vertex.validate(), Err(VulkanError::InvalidOperation { .. })));

        let only_fragment = with_stage(builder(), ShaderStage::Fragment).vertex_layout::<Vertex>();
        assert!(matches!(only_fragment.validate(), Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_missing_vertex_layout_is_rejected() {
        let builder = with_stage(with_stage(builder(), ShaderStage::Vertex), ShaderStage::Fragment);
        assert!(builder.validate().is_err());
    }

    #[test]
    fn test_complete_builder_validates() {
        let builder = with_stage(with_stage(builder(), ShaderStage::Vertex), ShaderStage::Fragment)
            .vertex_layout::<Vertex>()
            .descriptor_set_layout(vk::DescriptorSetLayout::null());
        assert!(builder.validate().is_ok());
        assert_eq!(builder.vertex_attributes.len(), 3);
        assert_eq!(builder.set_layouts.len(), 1);
    }

    #[test]
    fn test_entry_point_is_nul_terminated() {
        assert!(CStr::from_bytes_with_nul(ENTRY_POINT).is_ok());
    }
}
