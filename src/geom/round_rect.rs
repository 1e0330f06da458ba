use bytemuck::{Pod, Zeroable};

use super::{GeometryProcessor, UNIFORMS_WGSL, class_id};
use crate::key::KeyBuilder;
use crate::types::{VertexAttribute, VertexFormat};

/// Per-instance data of a round rect draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RoundRectInstance {
    /// Center x, center y, half width, half height.
    pub bounds: [f32; 4],
    /// Premultiplied color.
    pub color: [f32; 4],
    /// Corner radius, half stroke width.
    pub radii: [f32; 2],
}

/// Unit quad corners, drawn as a 4 vertex triangle strip.
pub(crate) const QUAD_CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

const VERTEX_ATTRIBUTES: [VertexAttribute; 1] =
    [VertexAttribute::new("corner", 0, VertexFormat::Float32x2, 0)];

const INSTANCE_ATTRIBUTES: [VertexAttribute; 3] = [
    VertexAttribute::new("bounds", 1, VertexFormat::Float32x4, 0),
    VertexAttribute::new("color", 2, VertexFormat::Float32x4, 16),
    VertexAttribute::new("radii", 3, VertexFormat::Float32x2, 32),
];

const SHADER_BODY: &str = r#"
struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) local: vec2<f32>,
    @location(1) color: vec4<f32>,
    @location(2) @interpolate(flat) shape: vec4<f32>,
}

@vertex
fn vs_main(
    @location(0) corner: vec2<f32>,
    @location(1) bounds: vec4<f32>,
    @location(2) color: vec4<f32>,
    @location(3) radii: vec2<f32>,
) -> VertexOut {
    // one pixel of padding for the analytic edge
    let pad = radii.y + 1.0;
    let local = corner * (bounds.zw + vec2<f32>(pad, pad));
    var out: VertexOut;
    out.position = to_device(bounds.xy + local);
    out.local = local;
    out.color = color;
    out.shape = vec4<f32>(bounds.zw, radii.x, radii.y);
    return out;
}

@fragment
fn fs_main(v: VertexOut) -> @location(0) vec4<f32> {
    let radius = v.shape.z;
    let q = abs(v.local) - v.shape.xy + vec2<f32>(radius, radius);
    var dist = length(max(q, vec2<f32>(0.0, 0.0))) + min(max(q.x, q.y), 0.0) - radius;
    if STROKE {
        dist = abs(dist) - v.shape.w;
    }
    let coverage = clamp(0.5 - dist, 0.0, 1.0);
    return v.color * coverage;
}
"#;

/// Analytic round rect, filled or stroked, one instance per shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRectProcessor {
    stroke: bool,
}

impl RoundRectProcessor {
    pub fn new(stroke: bool) -> Self {
        Self { stroke }
    }

    pub fn is_stroke(&self) -> bool {
        self.stroke
    }
}

impl GeometryProcessor for RoundRectProcessor {
    fn name(&self) -> &'static str {
        "RoundRectProcessor"
    }

    fn class_id(&self) -> u32 {
        class_id::ROUND_RECT
    }

    fn add_to_key(&self, b: &mut KeyBuilder) {
        b.add_bool(self.stroke, "stroke");
    }

    fn vertex_attributes(&self) -> &[VertexAttribute] {
        &VERTEX_ATTRIBUTES
    }

    fn instance_attributes(&self) -> &[VertexAttribute] {
        &INSTANCE_ATTRIBUTES
    }

    fn shader_source(&self) -> String {
        format!(
            "const STROKE: bool = {};\n{}{}",
            self.stroke, UNIFORMS_WGSL, SHADER_BODY
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ShaderModule;

    #[test]
    fn test_instance_layout_matches_struct() {
        let geom = RoundRectProcessor::new(false);
        assert_eq!(geom.vertex_stride(), 8);
        assert_eq!(
            geom.instance_stride() as usize,
            std::mem::size_of::<RoundRectInstance>()
        );
    }

    #[test]
    fn test_both_variants_compile() {
        for stroke in [false, true] {
            let geom = RoundRectProcessor::new(stroke);
            let module = ShaderModule::from_wgsl(geom.name(), &geom.shader_source()).unwrap();
            assert!(module.has_entry_point(naga::ShaderStage::Vertex, "vs_main"));
            assert!(module.has_entry_point(naga::ShaderStage::Fragment, "fs_main"));
        }
    }
}
