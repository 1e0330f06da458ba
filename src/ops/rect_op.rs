use std::any::Any;
use std::sync::Arc;

use glam::Mat3;

use crate::flush::{BufferSlice, OpFlushState, OpsRenderPass};
use crate::geom::{RectProcessor, RectVertex};
use crate::pipeline::{PipelineFlags, PipelineInfo};
use crate::resource::{MAX_QUADS, ResourceRef};
use crate::types::{PrimitiveType, Rect2f, Rect2i};

use super::{DrawOp, MeshDrawOp, MeshDrawTarget, map_rect};

/// Solid colored rects as plain triangles.
///
/// Non-indexed ops emit six vertices per rect. Indexed ops emit four and
/// share the context's quad index buffer, falling back to six vertices when
/// they hold more rects than the index buffer covers.
#[derive(Debug)]
pub struct RectOp {
    geom: Arc<RectProcessor>,
    rects: Vec<(Rect2f, [f32; 4])>,
    local_bounds: Rect2f,
    view: Mat3,
    scissor: Option<Rect2i>,
    indexed: bool,
    pipeline_info: Option<PipelineInfo>,
    uniforms: Option<BufferSlice>,
    vertex_buffer: Option<BufferSlice>,
    index_buffer: Option<ResourceRef>,
}

impl RectOp {
    /// `color` is premultiplied.
    pub fn new(rect: Rect2f, color: [f32; 4]) -> Self {
        Self {
            geom: Arc::new(RectProcessor::new()),
            rects: vec![(rect, color)],
            local_bounds: rect,
            view: Mat3::IDENTITY,
            scissor: None,
            indexed: false,
            pipeline_info: None,
            uniforms: None,
            vertex_buffer: None,
            index_buffer: None,
        }
    }

    pub fn with_indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    pub fn with_view(mut self, view: Mat3) -> Self {
        self.view = view;
        self
    }

    pub fn with_scissor(mut self, scissor: Option<Rect2i>) -> Self {
        self.scissor = scissor;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn rect_count(&self) -> usize {
        self.rects.len()
    }

    fn vertices_per_rect(&self) -> u32 {
        if self.indexed { 4 } else { 6 }
    }

    fn write_vertices(&self, out: &mut [RectVertex]) {
        let per_rect = self.vertices_per_rect() as usize;
        for ((rect, color), chunk) in self.rects.iter().zip(out.chunks_exact_mut(per_rect)) {
            let vertex = |x: f32, y: f32| RectVertex {
                position: [x, y],
                color: *color,
            };
            let top_left = vertex(rect.left, rect.top);
            let top_right = vertex(rect.right, rect.top);
            let bottom_left = vertex(rect.left, rect.bottom);
            let bottom_right = vertex(rect.right, rect.bottom);
            if self.indexed {
                chunk.copy_from_slice(&[top_left, top_right, bottom_left, bottom_right]);
            } else {
                chunk.copy_from_slice(&[top_left, top_right, bottom_left, bottom_left, top_right, bottom_right]);
            }
        }
    }
}

impl DrawOp for RectOp {
    fn name(&self) -> &'static str {
        "RectOp"
    }

    fn bounds(&self) -> Rect2f {
        map_rect(&self.view, &self.local_bounds)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn combine_if_possible(&mut self, other: &mut dyn DrawOp) -> bool {
        let Some(other) = other.as_any_mut().downcast_mut::<RectOp>() else {
            return false;
        };
        if other.indexed != self.indexed || other.view != self.view || other.scissor != self.scissor {
            return false;
        }
        self.rects.append(&mut other.rects);
        self.local_bounds.join(&other.local_bounds);
        true
    }

    fn on_prepare(&mut self, state: &mut OpFlushState<'_>) -> bool {
        let mut flags = PipelineFlags::ALPHA_BLEND;
        if self.scissor.is_some() {
            flags |= PipelineFlags::SCISSOR_TEST;
        }
        let Some(info) = state.pipeline_info(self.geom.clone(), PrimitiveType::Triangles, flags) else {
            return false;
        };
        self.pipeline_info = Some(info);

        if self.indexed && self.rects.len() > MAX_QUADS as usize {
            log::debug!("RectOp: {} rects exceed the quad index buffer", self.rects.len());
            self.indexed = false;
        }
        if self.indexed {
            self.index_buffer = state.quad_index_buffer();
            if self.index_buffer.is_none() {
                return false;
            }
        }

        self.uniforms = state.write_uniforms(self.geom.as_ref(), &self.view);
        self.uniforms.is_some() && self.on_prepare_draws(state)
    }

    fn on_execute(&mut self, pass: &mut OpsRenderPass<'_>, _chain_bounds: &Rect2f) {
        let Some(info) = &self.pipeline_info else {
            return;
        };
        if !pass.bind_pipeline(info) {
            return;
        }
        if let Some(scissor) = self.scissor {
            pass.set_scissor(scissor);
        }
        if let Some(uniforms) = &self.uniforms {
            if !pass.bind_uniforms(uniforms) {
                return;
            }
        }
        pass.bind_buffers(self.index_buffer.as_ref(), self.vertex_buffer.as_ref(), None);
        let rects = self.rects.len() as u32;
        if self.indexed {
            pass.draw_indexed(rects * 6, 0, 0);
        } else {
            pass.draw(rects * 6, 0);
        }
    }
}

impl MeshDrawOp for RectOp {
    fn vertex_count(&self) -> u32 {
        self.rects.len() as u32 * self.vertices_per_rect()
    }

    fn vertex_size(&self) -> u32 {
        std::mem::size_of::<RectVertex>() as u32
    }

    fn set_vertex_buffer(&mut self, slice: BufferSlice) {
        self.vertex_buffer = Some(slice);
    }

    fn on_prepare_draws(&mut self, target: &mut dyn MeshDrawTarget) -> bool {
        let mut vertices = vec![RectVertex { position: [0.0; 2], color: [0.0; 4] }; self.vertex_count() as usize];
        self.write_vertices(&mut vertices);
        let Some(bytes) = target.make_vertex_space(self) else {
            return false;
        };
        bytes.copy_from_slice(bytemuck::cast_slice(&vertices));
        true
    }
}
