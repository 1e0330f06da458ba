use bytemuck::{Pod, Zeroable};

use super::{GeometryProcessor, UNIFORMS_WGSL, class_id};
use crate::types::{VertexAttribute, VertexFormat};

/// Vertex of a solid rect: position in local pixels and premultiplied color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RectVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

const VERTEX_ATTRIBUTES: [VertexAttribute; 2] = [
    VertexAttribute::new("position", 0, VertexFormat::Float32x2, 0),
    VertexAttribute::new("color", 1, VertexFormat::Float32x4, 8),
];

const SHADER_BODY: &str = r#"
struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
}

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) color: vec4<f32>) -> VertexOut {
    var out: VertexOut;
    out.position = to_device(position);
    out.color = color;
    return out;
}

@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    return v.color;
}
"#;

/// Solid colored triangles, non-antialiased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RectProcessor;

impl RectProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl GeometryProcessor for RectProcessor {
    fn name(&self) -> &'static str {
        "RectProcessor"
    }

    fn class_id(&self) -> u32 {
        class_id::RECT
    }

    fn vertex_attributes(&self) -> &[VertexAttribute] {
        &VERTEX_ATTRIBUTES
    }

    fn shader_source(&self) -> String {
        format!("{UNIFORMS_WGSL}{SHADER_BODY}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ShaderModule;

    #[test]
    fn test_layout() {
        let geom = RectProcessor::new();
        assert_eq!(geom.vertex_stride() as usize, std::mem::size_of::<RectVertex>());
        assert_eq!(geom.instance_stride(), 0);
    }

    #[test]
    fn test_shader_compiles() {
        let geom = RectProcessor::new();
        assert!(ShaderModule::from_wgsl(geom.name(), &geom.shader_source()).is_ok());
    }
}
