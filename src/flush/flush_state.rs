use std::sync::Arc;

use glam::Mat3;

use crate::backend::{CommandBuffer, GpuDevice, GpuTexture, RenderPassInfo};
use crate::caps::Caps;
use crate::error::GraphicsResult;
use crate::geom::{self, GeometryProcessor};
use crate::ops::{MeshDrawOp, MeshDrawTarget};
use crate::pipeline::{PipelineFlags, PipelineInfo, PipelineStateCache};
use crate::resource::{ResourceProvider, ResourceRef, SharedResourceCache};
use crate::types::{PrimitiveType, SurfaceOrigin, TextureFormat};
use crate::uniform::UniformDataGatherer;

use super::buffer_pool::{BufferPools, BufferSlice};
use super::render_pass::OpsRenderPass;
use super::stats::Stats;

/// The render target ops are being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetInfo {
    /// Backing width, which may exceed the logical width of a loose-fit proxy.
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub sample_count: u32,
    pub origin: SurfaceOrigin,
    /// Format of the stencil attachment, if the pass has one.
    pub stencil_format: Option<TextureFormat>,
}

/// Everything ops can reach while a context flushes.
///
/// Borrowed from a [`Context`](crate::Context) for the duration of one
/// flush. Prepare-time calls allocate buffer space and uniforms; execute-time
/// calls open render passes.
pub struct OpFlushState<'a> {
    device: &'a dyn GpuDevice,
    command_buffer: &'a mut dyn CommandBuffer,
    cache: &'a SharedResourceCache,
    pipeline_cache: &'a mut PipelineStateCache,
    pools: &'a mut BufferPools,
    gatherer: &'a mut UniformDataGatherer,
    stats: &'a mut Stats,
    target: Option<RenderTargetInfo>,
}

impl<'a> OpFlushState<'a> {
    pub(crate) fn new(
        device: &'a dyn GpuDevice,
        command_buffer: &'a mut dyn CommandBuffer,
        cache: &'a SharedResourceCache,
        pipeline_cache: &'a mut PipelineStateCache,
        pools: &'a mut BufferPools,
        gatherer: &'a mut UniformDataGatherer,
        stats: &'a mut Stats,
    ) -> Self {
        Self {
            device,
            command_buffer,
            cache,
            pipeline_cache,
            pools,
            gatherer,
            stats,
            target: None,
        }
    }

    pub fn device(&self) -> &'a dyn GpuDevice {
        self.device
    }

    pub fn caps(&self) -> &'a Caps {
        self.device.caps()
    }

    pub fn resource_provider(&self) -> ResourceProvider<'a> {
        ResourceProvider::new(self.device, self.cache)
    }

    pub fn stats(&self) -> &Stats {
        &*self.stats
    }

    pub fn pipeline_cache(&self) -> &PipelineStateCache {
        &*self.pipeline_cache
    }

    pub fn target(&self) -> Option<&RenderTargetInfo> {
        self.target.as_ref()
    }

    pub fn set_target(&mut self, target: Option<RenderTargetInfo>) {
        self.target = target;
    }

    /// Pipeline description for a draw into the current target, or `None`
    /// outside of a target.
    pub fn pipeline_info(
        &self,
        geom_proc: Arc<dyn GeometryProcessor>,
        primitive_type: PrimitiveType,
        flags: PipelineFlags,
    ) -> Option<PipelineInfo> {
        let target = self.target?;
        let info = PipelineInfo::new(
            geom_proc,
            primitive_type,
            target.format,
            target.sample_count,
            flags,
        );
        Some(info.with_stencil_format(target.stencil_format))
    }

    /// Gather `geom_proc`'s uniform block for the current target and copy it
    /// into the uniform pool.
    pub fn write_uniforms(&mut self, geom_proc: &dyn GeometryProcessor, view: &Mat3) -> Option<BufferSlice> {
        let target = self.target?;
        let projection = geom::projection(target.width, target.height, super::flips_y(target.origin));
        self.gatherer.reset_with_layout(geom_proc.uniform_layout());
        geom_proc.write_uniforms(self.gatherer, projection, view);
        let data = self.gatherer.finish();

        let provider = ResourceProvider::new(self.device, self.cache);
        let alignment = self.device.caps().min_uniform_buffer_offset_alignment as usize;
        let (slice, bytes) = self.pools.uniform.make_space(&provider, data.len(), alignment)?;
        bytes.copy_from_slice(data);
        Some(slice)
    }

    /// The shared quad index buffer.
    pub fn quad_index_buffer(&self) -> Option<ResourceRef> {
        match self.resource_provider().find_or_create_quad_index_buffer() {
            Ok(buffer) => Some(buffer),
            Err(err) => {
                log::error!("OpFlushState: no quad index buffer: {err}");
                None
            }
        }
    }

    /// Copy pooled data written during prepare to the GPU.
    pub fn upload(&mut self) -> GraphicsResult<()> {
        let uploads = self.pools.flush(self.device)?;
        self.stats.buffer_uploads += u64::from(uploads);
        Ok(())
    }

    /// Upload pending data and open a render pass on `target`, with
    /// `stencil` as its stencil attachment.
    pub fn begin_render_pass(
        &mut self,
        target: Arc<GpuTexture>,
        stencil: Option<Arc<GpuTexture>>,
        origin: SurfaceOrigin,
        info: RenderPassInfo,
    ) -> Option<OpsRenderPass<'_>> {
        if let Err(err) = self.upload() {
            log::error!("OpFlushState: buffer upload failed: {err}");
            return None;
        }
        if !self.command_buffer.is_recording() {
            if let Err(err) = self.command_buffer.begin() {
                log::error!("OpFlushState: cannot begin recording: {err}");
                return None;
            }
        }
        let mut pass = OpsRenderPass::new(
            &mut *self.command_buffer,
            ResourceProvider::new(self.device, self.cache),
            &mut *self.pipeline_cache,
            &mut *self.stats,
            target,
            stencil,
            origin,
            info,
        );
        pass.begin().then_some(pass)
    }
}

impl MeshDrawTarget for OpFlushState<'_> {
    fn make_vertex_space(&mut self, op: &mut dyn MeshDrawOp) -> Option<&mut [u8]> {
        let stride = op.vertex_size() as usize;
        let size = op.vertex_count() as usize * stride;
        if size == 0 {
            return None;
        }
        let provider = ResourceProvider::new(self.device, self.cache);
        let (slice, bytes) = self.pools.vertex.make_space(&provider, size, stride)?;
        op.set_vertex_buffer(slice);
        Some(bytes)
    }

    fn make_instance_space(&mut self, op: &mut dyn MeshDrawOp) -> Option<&mut [u8]> {
        let stride = op.instance_size() as usize;
        let size = op.instance_count() as usize * stride;
        if size == 0 {
            return None;
        }
        let provider = ResourceProvider::new(self.device, self.cache);
        let (slice, bytes) = self.pools.instance.make_space(&provider, size, stride)?;
        op.set_instance_buffer(slice);
        Some(bytes)
    }
}
