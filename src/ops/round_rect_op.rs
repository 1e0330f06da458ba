use std::any::Any;
use std::sync::Arc;

use glam::Mat3;

use crate::flush::{BufferSlice, OpFlushState, OpsRenderPass};
use crate::geom::{QUAD_CORNERS, RoundRectInstance, RoundRectProcessor};
use crate::pipeline::{PipelineFlags, PipelineInfo};
use crate::types::{PrimitiveType, Rect2f, Rect2i};

use super::{DrawOp, MeshDrawOp, MeshDrawTarget, map_rect};

/// Filled or stroked round rects, drawn as one instanced triangle strip.
///
/// Every shape is one instance over a shared unit quad; adjacent ops with the
/// same style, view and scissor combine into a single draw.
#[derive(Debug)]
pub struct RoundRectOp {
    geom: Arc<RoundRectProcessor>,
    instances: Vec<RoundRectInstance>,
    local_bounds: Rect2f,
    view: Mat3,
    scissor: Option<Rect2i>,
    pipeline_info: Option<PipelineInfo>,
    uniforms: Option<BufferSlice>,
    vertex_buffer: Option<BufferSlice>,
    instance_buffer: Option<BufferSlice>,
}

impl RoundRectOp {
    /// `color` is premultiplied. A `stroke_width` makes a stroke centered
    /// on the rect's edge.
    pub fn new(rect: Rect2f, radius: f32, color: [f32; 4], stroke_width: Option<f32>) -> Self {
        let half_width = rect.width() * 0.5;
        let half_height = rect.height() * 0.5;
        let half_stroke = stroke_width.map_or(0.0, |width| width.max(0.0) * 0.5);
        let radius = radius.min(half_width.min(half_height)).max(0.0);
        let instance = RoundRectInstance {
            bounds: [rect.center_x(), rect.center_y(), half_width, half_height],
            color,
            radii: [radius, half_stroke],
        };
        Self {
            geom: Arc::new(RoundRectProcessor::new(stroke_width.is_some())),
            instances: vec![instance],
            // analytic edge spills one pixel past the shape
            local_bounds: rect.outset(half_stroke + 1.0, half_stroke + 1.0),
            view: Mat3::IDENTITY,
            scissor: None,
            pipeline_info: None,
            uniforms: None,
            vertex_buffer: None,
            instance_buffer: None,
        }
    }

    pub fn with_view(mut self, view: Mat3) -> Self {
        self.view = view;
        self
    }

    pub fn with_scissor(mut self, scissor: Option<Rect2i>) -> Self {
        self.scissor = scissor;
        self
    }

    pub fn is_stroke(&self) -> bool {
        self.geom.is_stroke()
    }

    pub fn instances(&self) -> &[RoundRectInstance] {
        &self.instances
    }

    fn pipeline_flags(&self) -> PipelineFlags {
        let mut flags = PipelineFlags::ALPHA_BLEND;
        if self.scissor.is_some() {
            flags |= PipelineFlags::SCISSOR_TEST;
        }
        flags
    }
}

impl DrawOp for RoundRectOp {
    fn name(&self) -> &'static str {
        "RoundRectOp"
    }

    fn bounds(&self) -> Rect2f {
        map_rect(&self.view, &self.local_bounds)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn combine_if_possible(&mut self, other: &mut dyn DrawOp) -> bool {
        let Some(other) = other.as_any_mut().downcast_mut::<RoundRectOp>() else {
            return false;
        };
        if other.is_stroke() != self.is_stroke() || other.view != self.view || other.scissor != self.scissor {
            return false;
        }
        self.instances.append(&mut other.instances);
        self.local_bounds.join(&other.local_bounds);
        true
    }

    fn on_prepare(&mut self, state: &mut OpFlushState<'_>) -> bool {
        let Some(info) = state.pipeline_info(self.geom.clone(), PrimitiveType::TriangleStrip, self.pipeline_flags())
        else {
            return false;
        };
        self.pipeline_info = Some(info);
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
        pass.bind_buffers(None, self.vertex_buffer.as_ref(), self.instance_buffer.as_ref());
        pass.draw_instanced(self.instance_count(), 0, self.vertex_count(), 0);
    }
}

impl MeshDrawOp for RoundRectOp {
    fn vertex_count(&self) -> u32 {
        QUAD_CORNERS.len() as u32
    }

    fn vertex_size(&self) -> u32 {
        std::mem::size_of::<[f32; 2]>() as u32
    }

    fn instance_count(&self) -> u32 {
        self.instances.len() as u32
    }

    fn instance_size(&self) -> u32 {
        std::mem::size_of::<RoundRectInstance>() as u32
    }

    fn set_vertex_buffer(&mut self, slice: BufferSlice) {
        self.vertex_buffer = Some(slice);
    }

    fn set_instance_buffer(&mut self, slice: BufferSlice) {
        self.instance_buffer = Some(slice);
    }

    fn on_prepare_draws(&mut self, target: &mut dyn MeshDrawTarget) -> bool {
        let Some(vertices) = target.make_vertex_space(self) else {
            return false;
        };
        vertices.copy_from_slice(bytemuck::cast_slice(&QUAD_CORNERS));
        let Some(instances) = target.make_instance_space(self) else {
            return false;
        };
        instances.copy_from_slice(bytemuck::cast_slice(&self.instances));
        true
    }
}
