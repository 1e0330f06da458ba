//! Program and vertex array creation for draw ops.
//!
//! Vertex formats are described once on the pipeline's vertex array through
//! separate attribute bindings (GL 4.3), so binding buffers at draw time only
//! needs a buffer, an offset and the stride.

use glow::HasContext;

use crate::backend::{GpuPipeline, PipelineDescriptor};
use crate::error::GraphicsError;
use crate::types::VertexAttribute;

use super::conversion::convert_vertex_format;

pub fn create_pipeline(
    gl: &glow::Context,
    desc: &PipelineDescriptor<'_>,
) -> Result<GpuPipeline, GraphicsError> {
    let vertex_source = desc
        .shader
        .to_glsl(naga::ShaderStage::Vertex, desc.vertex_entry)?;
    let fragment_source = desc
        .shader
        .to_glsl(naga::ShaderStage::Fragment, desc.fragment_entry)?;

    let program = link_program(gl, desc.label, &vertex_source, &fragment_source)?;

    let vertex_array = match unsafe { gl.create_vertex_array() } {
        Ok(vertex_array) => vertex_array,
        Err(e) => {
            unsafe { gl.delete_program(program) };
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "Failed to create vertex array: {}",
                e
            )));
        }
    };

    unsafe {
        gl.bind_vertex_array(Some(vertex_array));
        describe_attributes(gl, 0, desc.vertex_attributes);
        describe_attributes(gl, 1, desc.instance_attributes);
        gl.vertex_binding_divisor(1, 1);
        gl.bind_vertex_array(None);
    }

    log::debug!(
        "GL pipeline '{}': program {:?}, {} vertex + {} instance attributes",
        desc.label,
        program,
        desc.vertex_attributes.len(),
        desc.instance_attributes.len()
    );

    Ok(GpuPipeline::Gl {
        program,
        vertex_array,
        primitive_type: desc.primitive_type,
        vertex_stride: desc.vertex_stride,
        instance_stride: desc.instance_stride,
        blend: desc.blend,
    })
}

unsafe fn describe_attributes(gl: &glow::Context, binding: u32, attributes: &[VertexAttribute]) {
    for attr in attributes {
        let (size, data_type, normalized) = convert_vertex_format(attr.format);
        unsafe {
            gl.enable_vertex_attrib_array(attr.location);
            gl.vertex_attrib_format_f32(attr.location, size, data_type, normalized, attr.offset);
            gl.vertex_attrib_binding(attr.location, binding);
        }
    }
}

fn compile_shader(
    gl: &glow::Context,
    stage: u32,
    source: &str,
) -> Result<glow::Shader, GraphicsError> {
    unsafe {
        let shader = gl.create_shader(stage).map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create shader: {}", e))
        })?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let info_log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(GraphicsError::ShaderCompilationFailed(info_log));
        }
        Ok(shader)
    }
}

fn link_program(
    gl: &glow::Context,
    label: &str,
    vertex_source: &str,
    fragment_source: &str,
) -> Result<glow::Program, GraphicsError> {
    let vertex_shader = compile_shader(gl, glow::VERTEX_SHADER, vertex_source)?;
    let fragment_shader = match compile_shader(gl, glow::FRAGMENT_SHADER, fragment_source) {
        Ok(shader) => shader,
        Err(err) => {
            unsafe { gl.delete_shader(vertex_shader) };
            return Err(err);
        }
    };

    unsafe {
        let result = gl
            .create_program()
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!("Failed to create program: {}", e))
            })
            .and_then(|program| {
                gl.attach_shader(program, vertex_shader);
                gl.attach_shader(program, fragment_shader);
                gl.link_program(program);
                gl.detach_shader(program, vertex_shader);
                gl.detach_shader(program, fragment_shader);
                if gl.get_program_link_status(program) {
                    Ok(program)
                } else {
                    let info_log = gl.get_program_info_log(program);
                    gl.delete_program(program);
                    Err(GraphicsError::ShaderCompilationFailed(format!(
                        "Failed to link program '{}': {}",
                        label, info_log
                    )))
                }
            });

        gl.delete_shader(vertex_shader);
        gl.delete_shader(fragment_shader);
        result
    }
}
