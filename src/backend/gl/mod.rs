//! OpenGL 4.3 backend on top of glow.
//!
//! The caller owns context creation and must keep the context current on the
//! render thread. Commands are issued immediately; the [`GlCommandBuffer`]
//! only tracks bound state and brackets work with flushes.
//!
//! Multisampled targets and formats that cannot be sampled are renderbuffers,
//! everything else is an immutable texture. Renderable color targets carry
//! their own framebuffer object; stencil attachments are attached to it for
//! the length of a render pass.

mod command;
mod conversion;
mod pipeline;

pub use command::GlCommandBuffer;

use std::sync::Arc;

use glow::HasContext;

use crate::caps::{Caps, FormatCaps};
use crate::config::BackendType;
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{BufferDescriptor, BufferUsage, TextureDescriptor, TextureFormat, TextureUsage};

use super::{
    GpuBuffer, GpuDevice, GpuPipeline, GpuResource, GpuTexture, PipelineDescriptor, Recyclable,
};
use conversion::{attachment_point, convert_texture_format, sample_count_mask};

/// Create the device and command buffer over a current `context`.
pub fn create_gl_backend(
    mut context: glow::Context,
    validation: bool,
) -> GraphicsResult<(GlDevice, GlCommandBuffer)> {
    let version = context.version();
    if version.is_embedded || (version.major, version.minor) < (4, 3) {
        return Err(GraphicsError::InitializationFailed(format!(
            "OpenGL 4.3 core is required, context reports {}.{}{}",
            version.major,
            version.minor,
            if version.is_embedded { " ES" } else { "" }
        )));
    }

    if validation {
        if context.supports_debug() {
            unsafe {
                context.enable(glow::DEBUG_OUTPUT);
                context.enable(glow::DEBUG_OUTPUT_SYNCHRONOUS);
                context.debug_message_callback(debug_callback);
            }
            log::info!("GL debug output enabled");
        } else {
            log::warn!("Validation requested but GL debug output is not available");
        }
    }

    let renderer = unsafe { context.get_parameter_string(glow::RENDERER) };
    log::info!(
        "OpenGL {}.{} on {}",
        version.major,
        version.minor,
        renderer
    );

    let caps = query_caps(&context);
    let gl = Arc::new(context);
    Ok((
        GlDevice {
            gl: Arc::clone(&gl),
            caps,
        },
        GlCommandBuffer::new(gl),
    ))
}

fn debug_callback(source: u32, kind: u32, id: u32, severity: u32, message: &str) {
    match severity {
        glow::DEBUG_SEVERITY_HIGH => {
            log::error!("[GL {:#x}/{:#x}] {}: {}", source, kind, id, message)
        }
        glow::DEBUG_SEVERITY_MEDIUM => {
            log::warn!("[GL {:#x}/{:#x}] {}: {}", source, kind, id, message)
        }
        glow::DEBUG_SEVERITY_LOW => {
            log::debug!("[GL {:#x}/{:#x}] {}: {}", source, kind, id, message)
        }
        _ => log::trace!("[GL {:#x}/{:#x}] {}: {}", source, kind, id, message),
    }
}

fn query_caps(gl: &glow::Context) -> Caps {
    let (max_texture_size, max_renderbuffer_size, max_samples, ubo_alignment) = unsafe {
        (
            gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE),
            gl.get_parameter_i32(glow::MAX_RENDERBUFFER_SIZE),
            gl.get_parameter_i32(glow::MAX_SAMPLES),
            gl.get_parameter_i32(glow::UNIFORM_BUFFER_OFFSET_ALIGNMENT),
        )
    };

    let mut caps = Caps::default();
    caps.max_texture_size = max_texture_size.max(1) as u32;
    caps.max_render_target_size = max_texture_size.min(max_renderbuffer_size).max(1) as u32;
    caps.max_sample_count = (max_samples.max(1) as u32).min(16);
    caps.min_uniform_buffer_offset_alignment = ubo_alignment.max(1) as u32;
    caps.protected_content = false;

    let samples = sample_count_mask(caps.max_sample_count);
    let s3tc = gl
        .supported_extensions()
        .contains("GL_EXT_texture_compression_s3tc");

    for format in TextureFormat::ALL {
        let format_caps = match format {
            TextureFormat::Etc2Rgb8Unorm => FormatCaps::texturable(),
            TextureFormat::Bc1RgbaUnorm if s3tc => FormatCaps::texturable(),
            TextureFormat::Bc1RgbaUnorm => FormatCaps::NONE,
            _ => FormatCaps {
                texturable: format != TextureFormat::Stencil8,
                renderable: true,
                sample_counts: samples,
            },
        };
        caps.set_format_caps(format, format_caps);
    }

    log::debug!(
        "GL caps: max texture {}, max samples {}, ubo alignment {}",
        caps.max_texture_size,
        caps.max_sample_count,
        caps.min_uniform_buffer_offset_alignment
    );
    caps
}

// ============================================================================
// Device
// ============================================================================

/// GL resource factory. Shares the context with [`GlCommandBuffer`].
pub struct GlDevice {
    gl: Arc<glow::Context>,
    caps: Caps,
}

impl std::fmt::Debug for GlDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlDevice")
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}

impl GlDevice {
    fn create_framebuffer(
        &self,
        attach: impl FnOnce(&glow::Context),
    ) -> GraphicsResult<glow::Framebuffer> {
        let gl = &*self.gl;
        unsafe {
            let framebuffer = gl.create_framebuffer().map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create framebuffer: {}",
                    e
                ))
            })?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            attach(gl);
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.delete_framebuffer(framebuffer);
                return Err(GraphicsError::ResourceCreationFailed(format!(
                    "Framebuffer incomplete: {:#x}",
                    status
                )));
            }
            Ok(framebuffer)
        }
    }

    fn create_renderbuffer_target(&self, desc: &TextureDescriptor) -> GraphicsResult<GpuTexture> {
        let gl = &*self.gl;
        let renderbuffer = unsafe {
            let renderbuffer = gl.create_renderbuffer().map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create renderbuffer: {}",
                    e
                ))
            })?;
            gl.bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            // zero samples allocates a single-sampled renderbuffer
            let samples = if desc.sample_count > 1 { desc.sample_count } else { 0 };
            gl.renderbuffer_storage_multisample(
                glow::RENDERBUFFER,
                samples as i32,
                convert_texture_format(desc.format),
                desc.width as i32,
                desc.height as i32,
            );
            gl.bind_renderbuffer(glow::RENDERBUFFER, None);
            renderbuffer
        };

        // Stencil attachments are attached to a color target's framebuffer
        let framebuffer = if desc.format.is_depth_stencil() {
            None
        } else {
            let attachment = attachment_point(desc.format);
            let framebuffer = self
                .create_framebuffer(|gl| unsafe {
                    gl.framebuffer_renderbuffer(
                        glow::FRAMEBUFFER,
                        attachment,
                        glow::RENDERBUFFER,
                        Some(renderbuffer),
                    );
                })
                .inspect_err(|_| unsafe { gl.delete_renderbuffer(renderbuffer) })?;
            Some(framebuffer)
        };

        Ok(GpuTexture::Gl {
            texture: None,
            renderbuffer: Some(renderbuffer),
            framebuffer,
            desc: desc.clone(),
        })
    }
}

impl Recyclable for GlDevice {
    fn on_recycle(&self, resource: &GpuResource) {
        // GL objects carry no per-use state that needs resetting
        log::trace!("GlDevice: recycled {}", resource.kind());
    }
}

impl GpuDevice for GlDevice {
    fn name(&self) -> &'static str {
        "OpenGL Backend (glow)"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::OpenGl
    }

    fn caps(&self) -> &Caps {
        &self.caps
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> GraphicsResult<GpuBuffer> {
        let gl = &*self.gl;
        let usage = if desc.usage.contains(BufferUsage::DYNAMIC) {
            glow::DYNAMIC_DRAW
        } else {
            glow::STATIC_DRAW
        };
        unsafe {
            let buffer = gl.create_buffer().map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!("Failed to create buffer: {}", e))
            })?;
            // The copy target leaves vertex array state alone
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(buffer));
            gl.buffer_data_size(glow::COPY_WRITE_BUFFER, desc.size as i32, usage);
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
            if gl.get_error() == glow::OUT_OF_MEMORY {
                gl.delete_buffer(buffer);
                return Err(GraphicsError::OutOfMemory);
            }
            log::trace!(
                "GlDevice: created buffer {:?} (size: {})",
                desc.label,
                desc.size
            );
            Ok(GpuBuffer::Gl {
                buffer,
                size: desc.size,
            })
        }
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let GpuBuffer::Gl { buffer, size } = buffer else {
            return Err(GraphicsError::InvalidParameter(
                "buffer does not belong to the GL backend".into(),
            ));
        };
        if offset + data.len() as u64 > *size {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at {} exceeds buffer size {}",
                data.len(),
                offset,
                size
            )));
        }
        let gl = &*self.gl;
        unsafe {
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(*buffer));
            gl.buffer_sub_data_u8_slice(glow::COPY_WRITE_BUFFER, offset as i32, data);
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> GraphicsResult<GpuTexture> {
        let renderable = desc.usage.contains(TextureUsage::RENDER_ATTACHMENT);
        if desc.sample_count > 1 || !self.caps.is_format_texturable(desc.format) {
            if !renderable {
                return Err(GraphicsError::InvalidParameter(format!(
                    "GL {:?} textures with {} samples must be render attachments",
                    desc.format, desc.sample_count
                )));
            }
            return self.create_renderbuffer_target(desc);
        }

        let gl = &*self.gl;
        let texture = unsafe {
            let texture = gl.create_texture().map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!("Failed to create texture: {}", e))
            })?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_storage_2d(
                glow::TEXTURE_2D,
                desc.mip_level_count.max(1) as i32,
                convert_texture_format(desc.format),
                desc.width as i32,
                desc.height as i32,
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
            if gl.get_error() == glow::OUT_OF_MEMORY {
                gl.delete_texture(texture);
                return Err(GraphicsError::OutOfMemory);
            }
            texture
        };

        let framebuffer = if renderable && !desc.format.is_depth_stencil() {
            let attachment = attachment_point(desc.format);
            let framebuffer = self
                .create_framebuffer(|gl| unsafe {
                    gl.framebuffer_texture_2d(
                        glow::FRAMEBUFFER,
                        attachment,
                        glow::TEXTURE_2D,
                        Some(texture),
                        0,
                    );
                })
                .inspect_err(|_| unsafe { gl.delete_texture(texture) })?;
            Some(framebuffer)
        } else {
            None
        };

        log::trace!(
            "GlDevice: created texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        Ok(GpuTexture::Gl {
            texture: Some(texture),
            renderbuffer: None,
            framebuffer,
            desc: desc.clone(),
        })
    }

    fn create_pipeline(&self, desc: &PipelineDescriptor<'_>) -> GraphicsResult<GpuPipeline> {
        pipeline::create_pipeline(&self.gl, desc)
    }

    fn destroy_resource(&self, resource: GpuResource) {
        let gl = &*self.gl;
        match resource {
            GpuResource::Buffer(buffer) => {
                if let GpuBuffer::Gl { buffer, .. } = buffer.as_ref() {
                    unsafe { gl.delete_buffer(*buffer) };
                }
            }
            GpuResource::Texture(texture) => {
                if let GpuTexture::Gl {
                    texture,
                    renderbuffer,
                    framebuffer,
                    ..
                } = texture.as_ref()
                {
                    unsafe {
                        if let Some(framebuffer) = framebuffer {
                            gl.delete_framebuffer(*framebuffer);
                        }
                        if let Some(texture) = texture {
                            gl.delete_texture(*texture);
                        }
                        if let Some(renderbuffer) = renderbuffer {
                            gl.delete_renderbuffer(*renderbuffer);
                        }
                    }
                }
            }
            GpuResource::Pipeline(pipeline) => {
                if let GpuPipeline::Gl {
                    program,
                    vertex_array,
                    ..
                } = pipeline.as_ref()
                {
                    unsafe {
                        gl.delete_vertex_array(*vertex_array);
                        gl.delete_program(*program);
                    }
                }
            }
        }
    }

    fn wait_idle(&self) {
        unsafe { self.gl.finish() };
    }
}
