//! Immediate-mode GL command issue.

use std::sync::Arc;

use glow::HasContext;

use crate::backend::command::{Bindable, CommandBuffer, Drawable, RenderPassInfo};
use crate::backend::{GpuBuffer, GpuPipeline, GpuTexture};
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{IndexType, LoadOp, Rect2i, StoreOp};

use super::conversion::{attachment_point, convert_index_type, convert_primitive_type};

/// Pipeline state needed while drawing.
#[derive(Debug, Clone, Copy)]
struct BoundPipeline {
    mode: u32,
    vertex_stride: i32,
    instance_stride: i32,
}

/// Issues GL calls as they are recorded.
///
/// GL has no command buffers; `submit` flushes and checks for a lost
/// context.
pub struct GlCommandBuffer {
    gl: Arc<glow::Context>,
    recording: bool,
    has_work: bool,
    pipeline: Option<BoundPipeline>,
    index: Option<(u32, u64, u64)>,
    target_size: (i32, i32),
}

impl std::fmt::Debug for GlCommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlCommandBuffer")
            .field("recording", &self.recording)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl GlCommandBuffer {
    pub(super) fn new(gl: Arc<glow::Context>) -> Self {
        Self {
            gl,
            recording: false,
            has_work: false,
            pipeline: None,
            index: None,
            target_size: (0, 0),
        }
    }

    fn invalidate(&self, target: &GpuTexture) {
        unsafe {
            self.gl
                .invalidate_framebuffer(glow::FRAMEBUFFER, &[attachment_point(target.format())]);
        }
    }

    /// Attach `stencil` to the bound framebuffer. Returns `false` if it is
    /// not a GL stencil texture.
    fn attach_stencil(&self, stencil: &GpuTexture) -> bool {
        let GpuTexture::Gl {
            texture,
            renderbuffer,
            desc,
            ..
        } = stencil
        else {
            return false;
        };
        if !desc.format.has_stencil() {
            return false;
        }
        let attachment = attachment_point(desc.format);
        let gl = &*self.gl;
        unsafe {
            match (renderbuffer, texture) {
                (Some(renderbuffer), _) => gl.framebuffer_renderbuffer(
                    glow::FRAMEBUFFER,
                    attachment,
                    glow::RENDERBUFFER,
                    Some(*renderbuffer),
                ),
                (None, Some(texture)) => gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    attachment,
                    glow::TEXTURE_2D,
                    Some(*texture),
                    0,
                ),
                (None, None) => return false,
            }
        }
        true
    }

    /// Detach whatever depth and stencil attachments the bound framebuffer has.
    fn detach_stencil(&self) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_STENCIL_ATTACHMENT,
                glow::RENDERBUFFER,
                None,
            );
        }
    }
}

impl Bindable for GlCommandBuffer {
    fn bind_pipeline(&mut self, pipeline: &GpuPipeline) -> bool {
        let GpuPipeline::Gl {
            program,
            vertex_array,
            primitive_type,
            vertex_stride,
            instance_stride,
            blend,
        } = pipeline
        else {
            return false;
        };
        let gl = &*self.gl;
        unsafe {
            gl.use_program(Some(*program));
            gl.bind_vertex_array(Some(*vertex_array));
            if *blend {
                gl.enable(glow::BLEND);
                gl.blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
            } else {
                gl.disable(glow::BLEND);
            }
            gl.scissor(0, 0, self.target_size.0, self.target_size.1);
        }
        self.pipeline = Some(BoundPipeline {
            mode: convert_primitive_type(*primitive_type),
            vertex_stride: *vertex_stride as i32,
            instance_stride: *instance_stride as i32,
        });
        self.index = None;
        true
    }

    fn bind_index_buffer(&mut self, index_type: IndexType, buffer: &GpuBuffer, offset: u64) {
        if let GpuBuffer::Gl { buffer, .. } = buffer {
            // Element binding is vertex array state
            unsafe {
                self.gl
                    .bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(*buffer));
            }
            let (element_type, element_size) = convert_index_type(index_type);
            self.index = Some((element_type, element_size, offset));
        }
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: &GpuBuffer, offset: u64) {
        let (GpuBuffer::Gl { buffer, .. }, Some(pipeline)) = (buffer, self.pipeline) else {
            return;
        };
        let stride = if binding == 0 {
            pipeline.vertex_stride
        } else {
            pipeline.instance_stride
        };
        unsafe {
            self.gl
                .bind_vertex_buffer(binding, Some(*buffer), offset as i32, stride);
        }
    }

    fn bind_uniform_buffer(&mut self, binding: u32, buffer: &GpuBuffer, offset: u64, size: u64) -> bool {
        let GpuBuffer::Gl { buffer, .. } = buffer else {
            return false;
        };
        unsafe {
            self.gl.bind_buffer_range(
                glow::UNIFORM_BUFFER,
                binding,
                Some(*buffer),
                offset as i32,
                size as i32,
            );
        }
        true
    }

    fn set_scissor(&mut self, rect: Rect2i) {
        // Window y counts from the first row in memory, same as the rect
        unsafe {
            self.gl.scissor(
                rect.left,
                rect.top,
                rect.width().max(0),
                rect.height().max(0),
            );
        }
    }
}

impl Drawable for GlCommandBuffer {
    fn draw_instanced(
        &mut self,
        instance_count: u32,
        base_instance: u32,
        vertex_count: u32,
        base_vertex: u32,
    ) {
        let Some(pipeline) = self.pipeline else {
            log::warn!("GlCommandBuffer: draw without a pipeline");
            return;
        };
        unsafe {
            self.gl.draw_arrays_instanced_base_instance(
                pipeline.mode,
                base_vertex as i32,
                vertex_count as i32,
                instance_count as i32,
                base_instance,
            );
        }
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        base_index: u32,
        instance_count: u32,
        base_instance: u32,
        base_vertex: u32,
    ) {
        let (Some(pipeline), Some((element_type, element_size, offset))) =
            (self.pipeline, self.index)
        else {
            log::warn!("GlCommandBuffer: indexed draw without a pipeline or index buffer");
            return;
        };
        unsafe {
            self.gl.draw_elements_instanced_base_vertex_base_instance(
                pipeline.mode,
                index_count as i32,
                element_type,
                (offset + base_index as u64 * element_size) as i32,
                instance_count as i32,
                base_vertex as i32,
                base_instance,
            );
        }
    }
}

impl CommandBuffer for GlCommandBuffer {
    fn begin(&mut self) -> GraphicsResult<()> {
        if self.recording {
            return Err(GraphicsError::Internal(
                "command buffer is already recording".to_string(),
            ));
        }
        self.recording = true;
        self.has_work = false;
        Ok(())
    }

    fn end(&mut self) -> GraphicsResult<()> {
        self.recording = false;
        self.pipeline = None;
        self.index = None;
        unsafe {
            self.gl.bind_vertex_array(None);
            self.gl.use_program(None);
        }
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
        let GpuTexture::Gl {
            framebuffer: Some(framebuffer),
            desc,
            ..
        } = target
        else {
            return false;
        };
        if !self.recording || desc.format.is_depth_stencil() {
            return false;
        }
        let gl = &*self.gl;
        let (width, height) = (desc.width as i32, desc.height as i32);
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(*framebuffer));
        }
        let stencil = stencil.filter(|_| info.uses_stencil());
        match stencil {
            Some(stencil) if !self.attach_stencil(stencil) => {
                log::warn!("GlCommandBuffer: stencil attachment is not a GL stencil texture");
                unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
                return false;
            }
            None if info.uses_stencil() => {
                log::warn!("GlCommandBuffer: stencil ops without a stencil attachment");
                unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
                return false;
            }
            _ => {}
        }
        unsafe {
            gl.viewport(0, 0, width, height);
            gl.enable(glow::SCISSOR_TEST);
            gl.scissor(0, 0, width, height);
            gl.color_mask(true, true, true, true);
        }
        match info.color_load {
            LoadOp::Clear => unsafe {
                let [r, g, b, a] = info.clear_color;
                gl.clear_color(r, g, b, a);
                gl.clear(glow::COLOR_BUFFER_BIT);
            },
            LoadOp::DontCare => self.invalidate(target),
            LoadOp::Load => {}
        }
        if let Some(stencil) = stencil {
            match info.stencil_load {
                LoadOp::Clear => unsafe {
                    gl.stencil_mask(0xff);
                    gl.clear_buffer_i32_slice(glow::STENCIL, 0, &[info.clear_stencil as i32]);
                },
                LoadOp::DontCare => self.invalidate(stencil),
                LoadOp::Load => {}
            }
        }
        self.target_size = (width, height);
        self.has_work = true;
        log::trace!(
            "GlCommandBuffer: render pass on {}x{} ({:?})",
            width,
            height,
            info.color_load
        );
        true
    }

    fn end_render_pass(&mut self, target: &GpuTexture, stencil: Option<&GpuTexture>, info: &RenderPassInfo) {
        if info.color_store == StoreOp::DontCare {
            self.invalidate(target);
        }
        if let Some(stencil) = stencil.filter(|_| info.uses_stencil()) {
            if info.stencil_store == StoreOp::DontCare {
                self.invalidate(stencil);
            }
            self.detach_stencil();
        }
        unsafe {
            self.gl.disable(glow::SCISSOR_TEST);
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        self.pipeline = None;
    }

    fn submit(&mut self) -> GraphicsResult<()> {
        self.end()?;
        if !self.has_work {
            return Ok(());
        }
        self.has_work = false;
        unsafe {
            self.gl.flush();
            match self.gl.get_error() {
                glow::NO_ERROR => Ok(()),
                glow::CONTEXT_LOST => Err(GraphicsError::DeviceLost),
                glow::OUT_OF_MEMORY => Err(GraphicsError::OutOfMemory),
                error => {
                    log::warn!("GlCommandBuffer: GL error {:#x} during submission", error);
                    Ok(())
                }
            }
        }
    }
}
