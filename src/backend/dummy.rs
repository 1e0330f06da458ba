//! Dummy GPU backend for testing and development.
//!
//! The device keeps buffer contents in host memory and counts what it
//! creates; the command buffer appends every call to a shared
//! [`CommandLog`] so tests can assert on the exact command stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::caps::Caps;
use crate::config::BackendType;
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{BufferDescriptor, IndexType, Rect2i, TextureDescriptor};

use super::command::{Bindable, CommandBuffer, Drawable, RenderPassInfo};
use super::{
    GpuBuffer, GpuDevice, GpuPipeline, GpuResource, GpuTexture, PipelineDescriptor, Recyclable,
};

/// Dummy GPU device.
#[derive(Debug)]
pub struct DummyDevice {
    caps: Caps,
    next_id: AtomicU64,
    created_buffers: AtomicU32,
    created_textures: AtomicU32,
    created_pipelines: AtomicU32,
    destroyed: AtomicU32,
    recycled: AtomicU32,
    fail_allocations: AtomicU32,
}

impl DummyDevice {
    pub fn new(caps: Caps) -> Self {
        Self {
            caps,
            next_id: AtomicU64::new(1),
            created_buffers: AtomicU32::new(0),
            created_textures: AtomicU32::new(0),
            created_pipelines: AtomicU32::new(0),
            destroyed: AtomicU32::new(0),
            recycled: AtomicU32::new(0),
            fail_allocations: AtomicU32::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Make the next `count` buffer or texture allocations fail with
    /// [`GraphicsError::OutOfMemory`].
    pub fn fail_next_allocations(&self, count: u32) {
        self.fail_allocations.store(count, Ordering::Relaxed);
    }

    fn take_allocation_failure(&self) -> bool {
        self.fail_allocations
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn created_buffers(&self) -> u32 {
        self.created_buffers.load(Ordering::Relaxed)
    }

    pub fn created_textures(&self) -> u32 {
        self.created_textures.load(Ordering::Relaxed)
    }

    pub fn created_pipelines(&self) -> u32 {
        self.created_pipelines.load(Ordering::Relaxed)
    }

    pub fn destroyed_resources(&self) -> u32 {
        self.destroyed.load(Ordering::Relaxed)
    }

    pub fn recycled_resources(&self) -> u32 {
        self.recycled.load(Ordering::Relaxed)
    }
}

impl Recyclable for DummyDevice {
    fn on_recycle(&self, resource: &GpuResource) {
        if let GpuResource::Texture(texture) = resource {
            match texture.as_ref() {
                GpuTexture::Dummy { recycled, .. } => {
                    recycled.fetch_add(1, Ordering::Relaxed);
                }
                #[allow(unreachable_patterns)]
                _ => {}
            }
        }
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }
}

impl GpuDevice for DummyDevice {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Dummy
    }

    fn caps(&self) -> &Caps {
        &self.caps
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> GraphicsResult<GpuBuffer> {
        if self.take_allocation_failure() {
            return Err(GraphicsError::OutOfMemory);
        }
        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        self.created_buffers.fetch_add(1, Ordering::Relaxed);
        Ok(GpuBuffer::Dummy {
            id: self.next_id(),
            size: desc.size,
            data: Mutex::new(vec![0; desc.size as usize]),
        })
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        match buffer {
            GpuBuffer::Dummy { data: contents, .. } => {
                let mut contents = contents.lock();
                let start = offset as usize;
                let end = start + data.len();
                if end > contents.len() {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "write of {} bytes at {} exceeds buffer size {}",
                        data.len(),
                        offset,
                        contents.len()
                    )));
                }
                contents[start..end].copy_from_slice(data);
                Ok(())
            }
            #[allow(unreachable_patterns)]
            _ => Err(GraphicsError::InvalidParameter(
                "buffer does not belong to the dummy backend".into(),
            )),
        }
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> GraphicsResult<GpuTexture> {
        if self.take_allocation_failure() {
            return Err(GraphicsError::OutOfMemory);
        }
        log::trace!(
            "DummyDevice: creating texture {:?} ({}x{}, {:?}, {} samples)",
            desc.label,
            desc.width,
            desc.height,
            desc.format,
            desc.sample_count
        );
        self.created_textures.fetch_add(1, Ordering::Relaxed);
        Ok(GpuTexture::Dummy {
            id: self.next_id(),
            desc: desc.clone(),
            recycled: AtomicU32::new(0),
        })
    }

    fn create_pipeline(&self, desc: &PipelineDescriptor<'_>) -> GraphicsResult<GpuPipeline> {
        for (stage, entry) in [
            (naga::ShaderStage::Vertex, desc.vertex_entry),
            (naga::ShaderStage::Fragment, desc.fragment_entry),
        ] {
            if !desc.shader.has_entry_point(stage, entry) {
                return Err(GraphicsError::ShaderCompilationFailed(format!(
                    "Entry point '{entry}' not found for stage {stage:?}"
                )));
            }
        }
        log::trace!("DummyDevice: creating pipeline '{}'", desc.label);
        self.created_pipelines.fetch_add(1, Ordering::Relaxed);
        Ok(GpuPipeline::Dummy {
            id: self.next_id(),
            label: desc.label.to_string(),
            primitive_type: desc.primitive_type,
        })
    }

    fn destroy_resource(&self, resource: GpuResource) {
        log::trace!("DummyDevice: destroying {}", resource.kind());
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Command recording
// ============================================================================

/// One recorded command. Resources are identified by their dummy ids.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Begin,
    End,
    Submit,
    BeginRenderPass {
        target: u64,
        stencil: Option<u64>,
        info: RenderPassInfo,
    },
    EndRenderPass {
        target: u64,
    },
    BindPipeline {
        pipeline: u64,
    },
    BindIndexBuffer {
        index_type: IndexType,
        buffer: u64,
        offset: u64,
    },
    BindVertexBuffer {
        binding: u32,
        buffer: u64,
        offset: u64,
    },
    BindUniformBuffer {
        binding: u32,
        buffer: u64,
        offset: u64,
        size: u64,
    },
    SetScissor(Rect2i),
    Draw {
        vertex_count: u32,
        base_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        base_index: u32,
        base_vertex: u32,
    },
    DrawInstanced {
        instance_count: u32,
        base_instance: u32,
        vertex_count: u32,
        base_vertex: u32,
    },
    DrawIndexedInstanced {
        index_count: u32,
        base_index: u32,
        instance_count: u32,
        base_instance: u32,
        base_vertex: u32,
    },
}

/// Shared view of the commands a [`DummyCommandBuffer`] recorded.
///
/// The log also carries failures to inject into the command buffer, so
/// tests holding only the log can steer a context-owned buffer.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Arc<Mutex<Vec<RecordedCommand>>>,
    uniform_bind_failures: Arc<AtomicU32>,
}

impl CommandLog {
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }

    /// Number of recorded commands matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&RecordedCommand) -> bool) -> usize {
        self.commands.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }

    /// Make the next `count` uniform binds fail without being recorded.
    pub fn fail_next_uniform_binds(&self, count: u32) {
        self.uniform_bind_failures.store(count, Ordering::Relaxed);
    }

    fn take_uniform_bind_failure(&self) -> bool {
        self.uniform_bind_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    fn push(&self, command: RecordedCommand) {
        self.commands.lock().push(command);
    }
}

fn buffer_id(buffer: &GpuBuffer) -> u64 {
    match buffer {
        GpuBuffer::Dummy { id, .. } => *id,
        #[allow(unreachable_patterns)]
        _ => 0,
    }
}

fn texture_id(texture: &GpuTexture) -> u64 {
    match texture {
        GpuTexture::Dummy { id, .. } => *id,
        #[allow(unreachable_patterns)]
        _ => 0,
    }
}

/// Command buffer that records into a [`CommandLog`].
#[derive(Debug, Default)]
pub struct DummyCommandBuffer {
    log: CommandLog,
    recording: bool,
    in_render_pass: bool,
}

impl DummyCommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CommandLog) -> Self {
        Self {
            log,
            recording: false,
            in_render_pass: false,
        }
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }
}

impl Bindable for DummyCommandBuffer {
    fn bind_pipeline(&mut self, pipeline: &GpuPipeline) -> bool {
        match pipeline {
            GpuPipeline::Dummy { id, .. } => {
                self.log.push(RecordedCommand::BindPipeline { pipeline: *id });
                true
            }
            #[allow(unreachable_patterns)]
            _ => false,
        }
    }

    fn bind_index_buffer(&mut self, index_type: IndexType, buffer: &GpuBuffer, offset: u64) {
        self.log.push(RecordedCommand::BindIndexBuffer {
            index_type,
            buffer: buffer_id(buffer),
            offset,
        });
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &GpuBuffer, offset: u64) {
        self.log.push(RecordedCommand::BindVertexBuffer {
            binding,
            buffer: buffer_id(buffer),
            offset,
        });
    }

    fn bind_uniform_buffer(&mut self, binding: u32, buffer: &GpuBuffer, offset: u64, size: u64) -> bool {
        if self.log.take_uniform_bind_failure() {
            log::warn!("DummyCommandBuffer: injected uniform bind failure");
            return false;
        }
        self.log.push(RecordedCommand::BindUniformBuffer {
            binding,
            buffer: buffer_id(buffer),
            offset,
            size,
        });
        true
    }

    fn set_scissor(&mut self, rect: Rect2i) {
        self.log.push(RecordedCommand::SetScissor(rect));
    }
}

impl Drawable for DummyCommandBuffer {
    fn draw(&mut self, vertex_count: u32, base_vertex: u32) {
        self.log.push(RecordedCommand::Draw {
            vertex_count,
            base_vertex,
        });
    }

    fn draw_indexed(&mut self, index_count: u32, base_index: u32, base_vertex: u32) {
        self.log.push(RecordedCommand::DrawIndexed {
            index_count,
            base_index,
            base_vertex,
        });
    }

    fn draw_instanced(
        &mut self,
        instance_count: u32,
        base_instance: u32,
        vertex_count: u32,
        base_vertex: u32,
    ) {
        self.log.push(RecordedCommand::DrawInstanced {
            instance_count,
            base_instance,
            vertex_count,
            base_vertex,
        });
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        base_index: u32,
        instance_count: u32,
        base_instance: u32,
        base_vertex: u32,
    ) {
        self.log.push(RecordedCommand::DrawIndexedInstanced {
            index_count,
            base_index,
            instance_count,
            base_instance,
            base_vertex,
        });
    }
}

impl CommandBuffer for DummyCommandBuffer {
    fn begin(&mut self) -> GraphicsResult<()> {
        if self.recording {
            return Err(GraphicsError::InvalidParameter(
                "command buffer is already recording".into(),
            ));
        }
        self.recording = true;
        self.log.push(RecordedCommand::Begin);
        Ok(())
    }

    fn end(&mut self) -> GraphicsResult<()> {
        if !self.recording {
            return Err(GraphicsError::InvalidParameter(
                "command buffer is not recording".into(),
            ));
        }
        self.recording = false;
        self.log.push(RecordedCommand::End);
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn begin_render_pass(
        &mut self,
        target: &GpuTexture,
        stencil: Option<&GpuTexture>,
        info: &RenderPassInfo,
    ) -> bool {
        debug_assert!(!self.in_render_pass, "render passes cannot nest");
        if info.uses_stencil() && !stencil.is_some_and(|s| s.format().has_stencil()) {
            log::warn!("DummyCommandBuffer: stencil ops without a stencil attachment");
            return false;
        }
        self.in_render_pass = true;
        self.log.push(RecordedCommand::BeginRenderPass {
            target: texture_id(target),
            stencil: stencil.map(texture_id),
            info: *info,
        });
        true
    }

    fn end_render_pass(&mut self, target: &GpuTexture, _stencil: Option<&GpuTexture>, _info: &RenderPassInfo) {
        self.in_render_pass = false;
        self.log.push(RecordedCommand::EndRenderPass {
            target: texture_id(target),
        });
    }

    fn submit(&mut self) -> GraphicsResult<()> {
        if self.recording {
            self.end()?;
        }
        self.log.push(RecordedCommand::Submit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, LoadOp, StoreOp, TextureFormat, TextureUsage};

    #[test]
    fn test_buffer_write_roundtrip() {
        let device = DummyDevice::new(Caps::default());
        let buffer = device
            .create_buffer(&BufferDescriptor::new(8, BufferUsage::VERTEX))
            .unwrap();
        device.write_buffer(&buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.dummy_contents().unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(device.write_buffer(&buffer, 6, &[0; 4]).is_err());
    }

    #[test]
    fn test_allocation_failures() {
        let device = DummyDevice::new(Caps::default());
        device.fail_next_allocations(1);
        let desc = TextureDescriptor::new_2d(4, 4, TextureFormat::R8Unorm, TextureUsage::empty());
        assert_eq!(device.create_texture(&desc).unwrap_err(), GraphicsError::OutOfMemory);
        assert!(device.create_texture(&desc).is_ok());
        assert_eq!(device.created_textures(), 1);
    }

    #[test]
    fn test_injected_uniform_bind_failure() {
        let device = DummyDevice::new(Caps::default());
        let buffer = device
            .create_buffer(&BufferDescriptor::new(256, BufferUsage::UNIFORM))
            .unwrap();
        let log = CommandLog::default();
        let mut cb = DummyCommandBuffer::with_log(log.clone());
        log.fail_next_uniform_binds(1);
        assert!(!cb.bind_uniform_buffer(0, &buffer, 0, 64));
        assert!(log.is_empty());
        assert!(cb.bind_uniform_buffer(0, &buffer, 0, 64));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_stencil_pass_requires_stencil_attachment() {
        let device = DummyDevice::new(Caps::default());
        let usage = TextureUsage::RENDER_ATTACHMENT;
        let color = device
            .create_texture(&TextureDescriptor::new_2d(8, 8, TextureFormat::Rgba8Unorm, usage))
            .unwrap();
        let stencil = device
            .create_texture(&TextureDescriptor::new_2d(8, 8, TextureFormat::Stencil8, usage))
            .unwrap();
        let info = RenderPassInfo::default().with_stencil(LoadOp::Clear, StoreOp::DontCare, 1);

        let log = CommandLog::default();
        let mut cb = DummyCommandBuffer::with_log(log.clone());
        cb.begin().unwrap();
        assert!(!cb.begin_render_pass(&color, None, &info));
        assert!(cb.begin_render_pass(&color, Some(&stencil), &info));
        cb.end_render_pass(&color, Some(&stencil), &info);
        assert_eq!(
            log.commands()[1],
            RecordedCommand::BeginRenderPass {
                target: texture_id(&color),
                stencil: Some(texture_id(&stencil)),
                info,
            }
        );
    }

    #[test]
    fn test_command_recording() {
        let log = CommandLog::default();
        let mut cb = DummyCommandBuffer::with_log(log.clone());
        assert!(cb.end().is_err());
        cb.begin().unwrap();
        assert!(cb.begin().is_err());
        cb.draw(3, 0);
        cb.draw_instanced(2, 0, 4, 0);
        cb.submit().unwrap();
        assert!(!cb.is_recording());
        assert_eq!(
            log.commands(),
            vec![
                RecordedCommand::Begin,
                RecordedCommand::Draw {
                    vertex_count: 3,
                    base_vertex: 0
                },
                RecordedCommand::DrawInstanced {
                    instance_count: 2,
                    base_instance: 0,
                    vertex_count: 4,
                    base_vertex: 0
                },
                RecordedCommand::End,
                RecordedCommand::Submit,
            ]
        );
    }
}
