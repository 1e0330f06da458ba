//! Command recording capabilities.
//!
//! A backend command buffer is split along two capabilities, [`Bindable`]
//! (state) and [`Drawable`] (draw calls), plus the render pass and
//! submission bracketing in [`CommandBuffer`].
//!
//! Vertex buffer slot 0 carries per-vertex data and slot 1 per-instance
//! data. Buffer offsets select where an op's data starts, so draws use base
//! vertex and base instance zero unless the op packs several draws into one
//! range.

use crate::error::GraphicsResult;
use crate::types::{IndexType, LoadOp, Rect2i, StoreOp};

use super::{GpuBuffer, GpuPipeline, GpuTexture};

/// Load and store behavior of one render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassInfo {
    pub color_load: LoadOp,
    pub color_store: StoreOp,
    pub stencil_load: LoadOp,
    pub stencil_store: StoreOp,
    /// Premultiplied RGBA used when `color_load` is [`LoadOp::Clear`].
    pub clear_color: [f32; 4],
    /// Used when `stencil_load` is [`LoadOp::Clear`].
    pub clear_stencil: u32,
}

impl Default for RenderPassInfo {
    fn default() -> Self {
        Self {
            color_load: LoadOp::Load,
            color_store: StoreOp::Store,
            stencil_load: LoadOp::DontCare,
            stencil_store: StoreOp::DontCare,
            clear_color: [0.0; 4],
            clear_stencil: 0,
        }
    }
}

impl RenderPassInfo {
    /// Clear the color attachment to `color` and store the result.
    pub fn clear(color: [f32; 4]) -> Self {
        Self {
            color_load: LoadOp::Clear,
            clear_color: color,
            ..Self::default()
        }
    }

    /// Same pass with the given stencil load and store ops.
    pub fn with_stencil(mut self, load: LoadOp, store: StoreOp, clear_value: u32) -> Self {
        self.stencil_load = load;
        self.stencil_store = store;
        self.clear_stencil = clear_value;
        self
    }

    /// True if the pass reads, clears or keeps a stencil attachment.
    pub fn uses_stencil(&self) -> bool {
        self.stencil_load != LoadOp::DontCare || self.stencil_store == StoreOp::Store
    }
}

/// State binding half of a command buffer.
pub trait Bindable {
    /// Bind a pipeline. Returns `false` if it cannot be used by this backend.
    fn bind_pipeline(&mut self, pipeline: &GpuPipeline) -> bool;

    fn bind_index_buffer(&mut self, index_type: IndexType, buffer: &GpuBuffer, offset: u64);

    /// Bind a vertex buffer to `binding` (0 = per-vertex, 1 = per-instance).
    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &GpuBuffer, offset: u64);

    /// Bind a uniform block range. Returns `false` if the binding could not
    /// be made; draws that read it must then be skipped.
    fn bind_uniform_buffer(&mut self, binding: u32, buffer: &GpuBuffer, offset: u64, size: u64) -> bool;

    /// Scissor in framebuffer coordinates.
    fn set_scissor(&mut self, rect: Rect2i);
}

/// Draw call half of a command buffer.
pub trait Drawable {
    fn draw(&mut self, vertex_count: u32, base_vertex: u32) {
        self.draw_instanced(1, 0, vertex_count, base_vertex);
    }

    fn draw_indexed(&mut self, index_count: u32, base_index: u32, base_vertex: u32) {
        self.draw_indexed_instanced(index_count, base_index, 1, 0, base_vertex);
    }

    fn draw_instanced(
        &mut self,
        instance_count: u32,
        base_instance: u32,
        vertex_count: u32,
        base_vertex: u32,
    );

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        base_index: u32,
        instance_count: u32,
        base_instance: u32,
        base_vertex: u32,
    );
}

/// A command buffer recording against one device.
///
/// Recording is single threaded: the buffer is owned by the render thread
/// and must be bracketed by [`begin`](Self::begin) and [`end`](Self::end).
pub trait CommandBuffer: Bindable + Drawable {
    fn begin(&mut self) -> GraphicsResult<()>;

    fn end(&mut self) -> GraphicsResult<()>;

    fn is_recording(&self) -> bool;

    /// Open a render pass on `target`, with `stencil` as its stencil
    /// attachment. Returns `false` if the target cannot be rendered to, or if
    /// `info` uses stencil and no attachment is given.
    fn begin_render_pass(
        &mut self,
        target: &GpuTexture,
        stencil: Option<&GpuTexture>,
        info: &RenderPassInfo,
    ) -> bool;

    fn end_render_pass(&mut self, target: &GpuTexture, stencil: Option<&GpuTexture>, info: &RenderPassInfo);

    /// Submit recorded work. Ends recording first if needed.
    fn submit(&mut self) -> GraphicsResult<()>;
}
