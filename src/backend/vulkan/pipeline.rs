//! Graphics pipeline creation for draw ops.
//!
//! Every pipeline shares one descriptor layout: a single uniform buffer at
//! set 0, binding 0, visible to both stages.

use std::ffi::CString;

use ash::vk;

use crate::backend::{GpuPipeline, PipelineDescriptor};
use crate::error::GraphicsError;
use crate::types::VertexAttribute;

use super::conversion::{
    convert_primitive_type, convert_sample_count, convert_texture_format, convert_vertex_format,
};

/// Compile `desc` into a pipeline targeting one color attachment through
/// dynamic rendering.
pub fn create_pipeline(
    device: &ash::Device,
    desc: &PipelineDescriptor<'_>,
) -> Result<GpuPipeline, GraphicsError> {
    let vertex_spv = desc
        .shader
        .to_spirv(naga::ShaderStage::Vertex, desc.vertex_entry)?;
    let fragment_spv = desc
        .shader
        .to_spirv(naga::ShaderStage::Fragment, desc.fragment_entry)?;

    let vertex_module = create_shader_module(device, &vertex_spv)?;
    let fragment_module = match create_shader_module(device, &fragment_spv) {
        Ok(module) => module,
        Err(err) => {
            unsafe { device.destroy_shader_module(vertex_module, None) };
            return Err(err);
        }
    };

    let result = create_layouts(device).and_then(|(set_layout, layout)| {
        build_pipeline(device, desc, vertex_module, fragment_module, layout)
            .map(|pipeline| GpuPipeline::Vulkan {
                pipeline,
                layout,
                set_layout,
                primitive_type: desc.primitive_type,
            })
            .inspect_err(|_| unsafe {
                device.destroy_pipeline_layout(layout, None);
                device.destroy_descriptor_set_layout(set_layout, None);
            })
    });

    // Modules are only needed while the pipeline is built
    unsafe {
        device.destroy_shader_module(vertex_module, None);
        device.destroy_shader_module(fragment_module, None);
    }

    result
}

fn create_shader_module(device: &ash::Device, spv: &[u32]) -> Result<vk::ShaderModule, GraphicsError> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(spv);
    unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
        GraphicsError::ShaderCompilationFailed(format!("Failed to create shader module: {:?}", e))
    })
}

fn create_layouts(
    device: &ash::Device,
) -> Result<(vk::DescriptorSetLayout, vk::PipelineLayout), GraphicsError> {
    let bindings = [vk::DescriptorSetLayoutBinding::default()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)];

    let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    let set_layout = unsafe { device.create_descriptor_set_layout(&set_layout_info, None) }
        .map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!(
                "Failed to create descriptor set layout: {:?}",
                e
            ))
        })?;

    let set_layouts = [set_layout];
    let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    match unsafe { device.create_pipeline_layout(&layout_info, None) } {
        Ok(layout) => Ok((set_layout, layout)),
        Err(e) => {
            unsafe { device.destroy_descriptor_set_layout(set_layout, None) };
            Err(GraphicsError::ResourceCreationFailed(format!(
                "Failed to create pipeline layout: {:?}",
                e
            )))
        }
    }
}

fn attribute_descriptions(
    binding: u32,
    attributes: &[VertexAttribute],
) -> impl Iterator<Item = vk::VertexInputAttributeDescription> + '_ {
    attributes.iter().map(move |attr| {
        vk::VertexInputAttributeDescription::default()
            .location(attr.location)
            .binding(binding)
            .format(convert_vertex_format(attr.format))
            .offset(attr.offset)
    })
}

fn build_pipeline(
    device: &ash::Device,
    desc: &PipelineDescriptor<'_>,
    vertex_module: vk::ShaderModule,
    fragment_module: vk::ShaderModule,
    layout: vk::PipelineLayout,
) -> Result<vk::Pipeline, GraphicsError> {
    let vertex_entry = CString::new(desc.vertex_entry).map_err(|e| {
        GraphicsError::InvalidParameter(format!("Invalid vertex entry point name: {}", e))
    })?;
    let fragment_entry = CString::new(desc.fragment_entry).map_err(|e| {
        GraphicsError::InvalidParameter(format!("Invalid fragment entry point name: {}", e))
    })?;

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(&vertex_entry),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_module)
            .name(&fragment_entry),
    ];

    // Binding 0 is per-vertex, binding 1 per-instance
    let mut binding_descriptions = Vec::with_capacity(2);
    if !desc.vertex_attributes.is_empty() {
        binding_descriptions.push(
            vk::VertexInputBindingDescription::default()
                .binding(0)
                .stride(desc.vertex_stride)
                .input_rate(vk::VertexInputRate::VERTEX),
        );
    }
    if !desc.instance_attributes.is_empty() {
        binding_descriptions.push(
            vk::VertexInputBindingDescription::default()
                .binding(1)
                .stride(desc.instance_stride)
                .input_rate(vk::VertexInputRate::INSTANCE),
        );
    }
    let attribute_descriptions: Vec<_> = attribute_descriptions(0, desc.vertex_attributes)
        .chain(attribute_descriptions(1, desc.instance_attributes))
        .collect();

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(convert_primitive_type(desc.primitive_type))
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(convert_sample_count(desc.sample_count));

    // Premultiplied src-over
    let color_blend_attachments = [if desc.blend {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    } else {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    }];
    let color_blend_state =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default();

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats = [convert_texture_format(desc.color_format)];
    let stencil_format = desc
        .stencil_format
        .map_or(vk::Format::UNDEFINED, convert_texture_format);
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .stencil_attachment_format(stencil_format);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .push_next(&mut rendering_info);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| {
        GraphicsError::ResourceCreationFailed(format!(
            "Failed to create graphics pipeline '{}': {:?}",
            desc.label, e
        ))
    })?;

    pipelines.into_iter().next().ok_or_else(|| {
        GraphicsError::Internal("vkCreateGraphicsPipelines returned no pipeline".to_string())
    })
}
