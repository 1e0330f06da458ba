//! Geometry processors.
//!
//! A [`GeometryProcessor`] describes the vertex program half of a pipeline:
//! its vertex and instance layouts, its WGSL source and the key bits that
//! select between its variants. Processors are immutable and shared between
//! ops through `Arc`.
//!
//! Every processor here uses the same uniform block at group 0, binding 0:
//!
//! ```text
//! struct Uniforms {
//!     projection: vec4<f32>,   // (sx, tx, sy, ty): device = local * s + t
//!     view: mat3x3<f32>,       // local transform applied before projection
//! }
//! ```

mod rect;
mod round_rect;

pub use rect::{RectProcessor, RectVertex};
pub use round_rect::{RoundRectInstance, RoundRectProcessor};
pub(crate) use round_rect::QUAD_CORNERS;

use std::fmt;

use glam::{Mat3, Vec4};

use crate::key::KeyBuilder;
use crate::types::{VertexAttribute, attribute_stride};
use crate::uniform::{UniformDataGatherer, UniformLayout};

/// Class ids packed into pipeline keys.
pub mod class_id {
    pub const RECT: u32 = 1;
    pub const ROUND_RECT: u32 = 2;
}

/// Vertex program description for one family of draws.
pub trait GeometryProcessor: Send + Sync + fmt::Debug {
    /// Name used in logs and key descriptions.
    fn name(&self) -> &'static str;

    /// Unique id of the processor type, see [`class_id`].
    fn class_id(&self) -> u32;

    /// Append variant bits. Processors without variants add nothing.
    fn add_to_key(&self, _b: &mut KeyBuilder) {}

    /// Per-vertex attributes (vertex buffer slot 0).
    fn vertex_attributes(&self) -> &[VertexAttribute];

    /// Per-instance attributes (vertex buffer slot 1).
    fn instance_attributes(&self) -> &[VertexAttribute] {
        &[]
    }

    fn vertex_stride(&self) -> u32 {
        attribute_stride(self.vertex_attributes())
    }

    fn instance_stride(&self) -> u32 {
        attribute_stride(self.instance_attributes())
    }

    /// WGSL source with `vs_main` and `fs_main` entry points.
    fn shader_source(&self) -> String;

    fn uniform_layout(&self) -> UniformLayout {
        UniformLayout::Std140
    }

    /// Write the uniform block for one draw.
    fn write_uniforms(&self, gatherer: &mut UniformDataGatherer, projection: Vec4, view: &Mat3) {
        gatherer.write4f(projection.x, projection.y, projection.z, projection.w);
        gatherer.write_matrix3f(view);
    }
}

/// Projection mapping pixel coordinates of a `width` x `height` target to
/// normalized device coordinates, packed as `(sx, tx, sy, ty)`.
///
/// `flip_y` is set when surface rows grow in the opposite direction to clip
/// space Y.
pub fn projection(width: u32, height: u32, flip_y: bool) -> Vec4 {
    let sx = 2.0 / width.max(1) as f32;
    let sy = 2.0 / height.max(1) as f32;
    if flip_y {
        Vec4::new(sx, -1.0, -sy, 1.0)
    } else {
        Vec4::new(sx, -1.0, sy, -1.0)
    }
}

const UNIFORMS_WGSL: &str = r#"
struct Uniforms {
    projection: vec4<f32>,
    view: mat3x3<f32>,
}
@group(0) @binding(0) var<uniform> u: Uniforms;

fn to_device(local: vec2<f32>) -> vec4<f32> {
    let world = u.view * vec3<f32>(local, 1.0);
    return vec4<f32>(world.xy * u.projection.xz + u.projection.yw, 0.0, 1.0);
}
"#;
