//! Deferred draw operations.
//!
//! A [`DrawOp`] is recorded against a surface, queued in an
//! [`OpsTask`](crate::task::OpsTask), prepared once at flush time and then
//! executed once into an [`OpsRenderPass`].
//!
//! Mesh ops ([`MeshDrawOp`]) request their vertex and instance storage from a
//! [`MeshDrawTarget`] during prepare. The target hands back the bytes to fill
//! and tells the op where they will live on the GPU.
//!
//! # Example
//!
//! ```ignore
//! let op = RoundRectOp::new(rect, 8.0, [1.0, 0.0, 0.0, 1.0], None);
//! task.add_draw_op(Box::new(op));
//! ```

mod rect_op;
mod round_rect_op;

pub use rect_op::RectOp;
pub use round_rect_op::RoundRectOp;

use std::any::Any;
use std::fmt;

use glam::{Mat3, Vec2};

use crate::flush::{BufferSlice, OpFlushState, OpsRenderPass};
use crate::types::Rect2f;

/// One deferred draw.
pub trait DrawOp: Send + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Device-space bounds of everything the op touches.
    fn bounds(&self) -> Rect2f;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Absorb `other` into this op. On success `other` is left empty and
    /// must be discarded by the caller.
    fn combine_if_possible(&mut self, _other: &mut dyn DrawOp) -> bool {
        false
    }

    /// Allocate buffers and uniforms. Returns `false` if the op cannot draw.
    fn on_prepare(&mut self, state: &mut OpFlushState<'_>) -> bool;

    /// Record the op's commands. `chain_bounds` covers the op and every op
    /// combined into it.
    fn on_execute(&mut self, pass: &mut OpsRenderPass<'_>, chain_bounds: &Rect2f);
}

/// A draw op backed by vertex and, optionally, instance data.
pub trait MeshDrawOp: DrawOp {
    fn vertex_count(&self) -> u32;

    /// Vertex stride in bytes.
    fn vertex_size(&self) -> u32;

    fn instance_count(&self) -> u32 {
        0
    }

    /// Instance stride in bytes.
    fn instance_size(&self) -> u32 {
        0
    }

    fn set_vertex_buffer(&mut self, slice: BufferSlice);

    fn set_instance_buffer(&mut self, _slice: BufferSlice) {}

    /// Fill vertex and instance data through `target`.
    fn on_prepare_draws(&mut self, target: &mut dyn MeshDrawTarget) -> bool;
}

/// Storage provider for mesh ops.
pub trait MeshDrawTarget {
    /// Reserve `vertex_count * vertex_size` bytes for `op`, reporting the GPU
    /// location through [`MeshDrawOp::set_vertex_buffer`].
    fn make_vertex_space(&mut self, op: &mut dyn MeshDrawOp) -> Option<&mut [u8]>;

    /// Reserve `instance_count * instance_size` bytes for `op`, reporting the
    /// GPU location through [`MeshDrawOp::set_instance_buffer`].
    fn make_instance_space(&mut self, op: &mut dyn MeshDrawOp) -> Option<&mut [u8]>;
}

/// Bounds of `rect` after transforming it by `view`.
pub(crate) fn map_rect(view: &Mat3, rect: &Rect2f) -> Rect2f {
    let corners = [
        Vec2::new(rect.left, rect.top),
        Vec2::new(rect.right, rect.top),
        Vec2::new(rect.left, rect.bottom),
        Vec2::new(rect.right, rect.bottom),
    ]
    .map(|corner| view.transform_point2(corner));
    let min = corners.iter().fold(Vec2::splat(f32::INFINITY), |acc, p| acc.min(*p));
    let max = corners.iter().fold(Vec2::splat(f32::NEG_INFINITY), |acc, p| acc.max(*p));
    Rect2f::new(min.x, min.y, max.x, max.y)
}

/// Convert a straight-alpha color to premultiplied alpha.
pub fn premultiply(color: [f32; 4]) -> [f32; 4] {
    let a = color[3];
    [color[0] * a, color[1] * a, color[2] * a, a]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rect() {
        let rect = Rect2f::new(0.0, 0.0, 10.0, 20.0);
        assert_eq!(map_rect(&Mat3::IDENTITY, &rect), rect);

        let moved = map_rect(&Mat3::from_translation(Vec2::new(5.0, -5.0)), &rect);
        assert_eq!(moved, Rect2f::new(5.0, -5.0, 15.0, 15.0));

        let scaled = map_rect(&Mat3::from_scale(Vec2::new(-1.0, 2.0)), &rect);
        assert_eq!(scaled, Rect2f::new(-10.0, 0.0, 0.0, 40.0));
    }

    #[test]
    fn test_premultiply() {
        assert_eq!(premultiply([1.0, 0.5, 0.0, 0.5]), [0.5, 0.25, 0.0, 0.5]);
    }
}
