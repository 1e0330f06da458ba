use std::sync::Arc;

use crate::backend::{CommandBuffer, GpuPipeline, GpuTexture, RenderPassInfo};
use crate::pipeline::{PipelineInfo, PipelineStateCache};
use crate::resource::{ResourceProvider, ResourceRef};
use crate::types::{IndexType, Rect2i, SurfaceOrigin};

use super::buffer_pool::BufferSlice;
use super::stats::Stats;

/// An open render pass on one target.
///
/// Ops bind a pipeline, then their buffers, then draw. The pass keeps a
/// reference to every bound vertex, instance and index buffer until
/// [`end`](Self::end), so buffers cannot be recycled while commands that
/// read them are still being recorded. Dropping an open pass ends it.
pub struct OpsRenderPass<'a> {
    command_buffer: &'a mut dyn CommandBuffer,
    provider: ResourceProvider<'a>,
    pipeline_cache: &'a mut PipelineStateCache,
    stats: &'a mut Stats,
    target: Arc<GpuTexture>,
    stencil: Option<Arc<GpuTexture>>,
    origin: SurfaceOrigin,
    info: RenderPassInfo,
    active_pipeline: Option<Arc<GpuPipeline>>,
    active_index_buffer: Option<ResourceRef>,
    active_vertex_buffer: Option<ResourceRef>,
    active_instance_buffer: Option<ResourceRef>,
    open: bool,
}

impl<'a> OpsRenderPass<'a> {
    pub(crate) fn new(
        command_buffer: &'a mut dyn CommandBuffer,
        provider: ResourceProvider<'a>,
        pipeline_cache: &'a mut PipelineStateCache,
        stats: &'a mut Stats,
        target: Arc<GpuTexture>,
        stencil: Option<Arc<GpuTexture>>,
        origin: SurfaceOrigin,
        info: RenderPassInfo,
    ) -> Self {
        Self {
            command_buffer,
            provider,
            pipeline_cache,
            stats,
            target,
            stencil,
            origin,
            info,
            active_pipeline: None,
            active_index_buffer: None,
            active_vertex_buffer: None,
            active_instance_buffer: None,
            open: false,
        }
    }

    /// Open the pass with the configured load and store ops.
    pub fn begin(&mut self) -> bool {
        assert!(!self.open, "render pass is already open");
        if !self
            .command_buffer
            .begin_render_pass(&self.target, self.stencil.as_deref(), &self.info)
        {
            log::warn!(
                "OpsRenderPass: target {}x{} rejected the render pass",
                self.target.width(),
                self.target.height()
            );
            return false;
        }
        self.open = true;
        self.stats.render_passes += 1;
        true
    }

    /// Release the active buffers and close the pass.
    pub fn end(&mut self) {
        if !self.open {
            return;
        }
        self.active_pipeline = None;
        self.active_index_buffer = None;
        self.active_vertex_buffer = None;
        self.active_instance_buffer = None;
        self.command_buffer
            .end_render_pass(&self.target, self.stencil.as_deref(), &self.info);
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn origin(&self) -> SurfaceOrigin {
        self.origin
    }

    pub fn target(&self) -> &Arc<GpuTexture> {
        &self.target
    }

    pub fn stencil(&self) -> Option<&Arc<GpuTexture>> {
        self.stencil.as_ref()
    }

    pub fn info(&self) -> &RenderPassInfo {
        &self.info
    }

    /// True while any vertex, instance or index buffer is bound.
    pub fn has_active_buffers(&self) -> bool {
        self.active_index_buffer.is_some()
            || self.active_vertex_buffer.is_some()
            || self.active_instance_buffer.is_some()
    }

    /// Find or compile the pipeline for `info` and bind it.
    ///
    /// Returns `false` if no pipeline could be made; the caller must then
    /// skip its buffer binds and draws.
    pub fn bind_pipeline(&mut self, info: &PipelineInfo) -> bool {
        debug_assert!(self.open, "bind_pipeline outside of a render pass");
        let pipeline = self
            .pipeline_cache
            .find_or_create_pipeline_state(&self.provider, info);
        let bound = match pipeline {
            Some(pipeline) if self.command_buffer.bind_pipeline(&pipeline) => {
                self.active_pipeline = Some(pipeline);
                true
            }
            _ => false,
        };
        if bound {
            self.stats.pipeline_binds += 1;
        } else {
            log::warn!("OpsRenderPass: no pipeline for {}", info.geom_proc.name());
            self.active_pipeline = None;
            self.stats.failed_pipeline_binds += 1;
        }
        bound
    }

    /// Bind an optional `u16` index buffer plus vertex (slot 0) and instance
    /// (slot 1) data.
    pub fn bind_buffers(
        &mut self,
        index_buffer: Option<&ResourceRef>,
        vertex_buffer: Option<&BufferSlice>,
        instance_buffer: Option<&BufferSlice>,
    ) {
        debug_assert!(self.active_pipeline.is_some(), "buffers bound without a pipeline");
        if let Some(index) = index_buffer {
            if let Some(buffer) = index.buffer() {
                self.command_buffer.bind_index_buffer(IndexType::U16, buffer, 0);
                self.active_index_buffer = Some(index.clone());
            }
        }
        if let Some(slice) = vertex_buffer {
            if let Some(buffer) = slice.buffer.buffer() {
                self.command_buffer.bind_vertex_buffer(0, buffer, slice.offset);
                self.active_vertex_buffer = Some(slice.buffer.clone());
            }
        }
        if let Some(slice) = instance_buffer {
            if let Some(buffer) = slice.buffer.buffer() {
                self.command_buffer.bind_vertex_buffer(1, buffer, slice.offset);
                self.active_instance_buffer = Some(slice.buffer.clone());
            }
        }
    }

    /// Bind the uniform block at binding 0.
    ///
    /// Returns `false` if the block could not be bound; the caller must then
    /// skip its draws, as after a failed [`bind_pipeline`](Self::bind_pipeline).
    pub fn bind_uniforms(&mut self, uniforms: &BufferSlice) -> bool {
        let bound = uniforms.buffer.buffer().is_some_and(|buffer| {
            self.command_buffer
                .bind_uniform_buffer(0, buffer, uniforms.offset, uniforms.size)
        });
        if !bound {
            log::warn!("OpsRenderPass: failed to bind {} uniform bytes", uniforms.size);
            self.stats.failed_uniform_binds += 1;
        }
        bound
    }

    /// Clip draws to `rect`, given in surface coordinates.
    pub fn set_scissor(&mut self, rect: Rect2i) {
        let width = self.target.width() as i32;
        let height = self.target.height() as i32;
        let clipped = rect.intersect_bounds(width, height);
        let scissor = if super::flips_y(self.origin) {
            Rect2i::new(clipped.left, height - clipped.bottom, clipped.right, height - clipped.top)
        } else {
            clipped
        };
        self.command_buffer.set_scissor(scissor);
    }

    pub fn draw(&mut self, vertex_count: u32, base_vertex: u32) {
        debug_assert!(self.active_pipeline.is_some());
        self.command_buffer.draw(vertex_count, base_vertex);
        self.stats.draws += 1;
    }

    pub fn draw_indexed(&mut self, index_count: u32, base_index: u32, base_vertex: u32) {
        debug_assert!(self.active_index_buffer.is_some(), "indexed draw without an index buffer");
        self.command_buffer.draw_indexed(index_count, base_index, base_vertex);
        self.stats.indexed_draws += 1;
    }

    pub fn draw_instanced(
        &mut self,
        instance_count: u32,
        base_instance: u32,
        vertex_count: u32,
        base_vertex: u32,
    ) {
        debug_assert!(self.active_pipeline.is_some());
        self.command_buffer
            .draw_instanced(instance_count, base_instance, vertex_count, base_vertex);
        self.stats.instanced_draws += 1;
        self.stats.instances += u64::from(instance_count);
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        base_index: u32,
        instance_count: u32,
        base_instance: u32,
        base_vertex: u32,
    ) {
        debug_assert!(self.active_index_buffer.is_some(), "indexed draw without an index buffer");
        self.command_buffer.draw_indexed_instanced(
            index_count,
            base_index,
            instance_count,
            base_instance,
            base_vertex,
        );
        self.stats.indexed_instanced_draws += 1;
        self.stats.instances += u64::from(instance_count);
    }
}

impl Drop for OpsRenderPass<'_> {
    fn drop(&mut self) {
        self.end();
    }
}
