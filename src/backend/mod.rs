//! GPU backend abstraction layer.
//!
//! Backends are split into two halves:
//!
//! - a [`GpuDevice`], which creates and destroys resources and can be shared
//!   immutably while commands are being recorded, and
//! - a [`CommandBuffer`], which binds state and issues draws inside render
//!   passes.
//!
//! Backend objects are tagged enums ([`GpuBuffer`], [`GpuTexture`],
//! [`GpuPipeline`]) with one variant per compiled-in backend.
//!
//! # Available Backends
//!
//! - `dummy` (always available): records commands, no GPU work
//! - `gl-backend`: OpenGL 4.3 via glow, immediate mode
//! - `vulkan-backend`: Vulkan 1.3 via ash with dynamic rendering

pub mod command;
pub mod dummy;

#[cfg(feature = "gl-backend")]
pub mod gl;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::sync::Arc;

#[cfg(feature = "vulkan-backend")]
use ash::vk;
#[cfg(feature = "vulkan-backend")]
use gpu_allocator::vulkan::Allocation;
use parking_lot::Mutex;

use crate::caps::Caps;
use crate::config::{BackendType, ContextOptions};
use crate::error::GraphicsResult;
use crate::pipeline::ShaderModule;
use crate::types::{
    BufferDescriptor, PrimitiveType, TextureDescriptor, TextureFormat, VertexAttribute,
};

pub use command::{Bindable, CommandBuffer, Drawable, RenderPassInfo};
pub use dummy::{CommandLog, DummyCommandBuffer, DummyDevice, RecordedCommand};

// ============================================================================
// Backend objects
// ============================================================================

/// Handle to a GPU buffer.
pub enum GpuBuffer {
    /// Dummy backend: host memory so uploads can be inspected.
    Dummy {
        id: u64,
        size: u64,
        data: Mutex<Vec<u8>>,
    },
    /// OpenGL buffer object.
    #[cfg(feature = "gl-backend")]
    Gl { buffer: glow::Buffer, size: u64 },
    /// Vulkan buffer in host-visible memory.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        buffer: vk::Buffer,
        allocation: Mutex<Option<Allocation>>,
        size: u64,
    },
}

impl GpuBuffer {
    /// Size of the buffer in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Dummy { size, .. } => *size,
            #[cfg(feature = "gl-backend")]
            Self::Gl { size, .. } => *size,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { size, .. } => *size,
        }
    }

    /// Copy of the buffer contents. Only the dummy backend keeps host data.
    pub fn dummy_contents(&self) -> Option<Vec<u8>> {
        match self {
            Self::Dummy { data, .. } => Some(data.lock().clone()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id, size, .. } => f
                .debug_struct("GpuBuffer::Dummy")
                .field("id", id)
                .field("size", size)
                .finish_non_exhaustive(),
            #[cfg(feature = "gl-backend")]
            Self::Gl { buffer, size } => f
                .debug_struct("GpuBuffer::Gl")
                .field("buffer", buffer)
                .field("size", size)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { buffer, size, .. } => f
                .debug_struct("GpuBuffer::Vulkan")
                .field("buffer", buffer)
                .field("size", size)
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a GPU texture, possibly renderable.
pub enum GpuTexture {
    /// Dummy backend (no GPU allocation).
    Dummy {
        id: u64,
        desc: TextureDescriptor,
        /// Number of times the texture went back to the scratch pool.
        recycled: std::sync::atomic::AtomicU32,
    },
    /// OpenGL texture, or a multisampled renderbuffer, plus its framebuffer.
    #[cfg(feature = "gl-backend")]
    Gl {
        texture: Option<glow::Texture>,
        renderbuffer: Option<glow::Renderbuffer>,
        framebuffer: Option<glow::Framebuffer>,
        desc: TextureDescriptor,
    },
    /// Vulkan image with a default view.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        image: vk::Image,
        view: vk::ImageView,
        allocation: Mutex<Option<Allocation>>,
        layout: Mutex<vk::ImageLayout>,
        desc: TextureDescriptor,
    },
}

impl GpuTexture {
    /// The descriptor the texture was created from.
    pub fn desc(&self) -> &TextureDescriptor {
        match self {
            Self::Dummy { desc, .. } => desc,
            #[cfg(feature = "gl-backend")]
            Self::Gl { desc, .. } => desc,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { desc, .. } => desc,
        }
    }

    pub fn width(&self) -> u32 {
        self.desc().width
    }

    pub fn height(&self) -> u32 {
        self.desc().height
    }

    pub fn format(&self) -> TextureFormat {
        self.desc().format
    }

    pub fn sample_count(&self) -> u32 {
        self.desc().sample_count
    }
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id, desc, .. } => f
                .debug_struct("GpuTexture::Dummy")
                .field("id", id)
                .field("desc", desc)
                .finish_non_exhaustive(),
            #[cfg(feature = "gl-backend")]
            Self::Gl {
                texture,
                renderbuffer,
                framebuffer,
                desc,
            } => f
                .debug_struct("GpuTexture::Gl")
                .field("texture", texture)
                .field("renderbuffer", renderbuffer)
                .field("framebuffer", framebuffer)
                .field("desc", desc)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan {
                image, view, desc, ..
            } => f
                .debug_struct("GpuTexture::Vulkan")
                .field("image", image)
                .field("view", view)
                .field("desc", desc)
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a compiled graphics pipeline.
pub enum GpuPipeline {
    /// Dummy backend pipeline.
    Dummy {
        id: u64,
        label: String,
        primitive_type: PrimitiveType,
    },
    /// Linked GL program with its vertex array object.
    #[cfg(feature = "gl-backend")]
    Gl {
        program: glow::Program,
        vertex_array: glow::VertexArray,
        primitive_type: PrimitiveType,
        vertex_stride: u32,
        instance_stride: u32,
        blend: bool,
    },
    /// Vulkan pipeline with its layouts.
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        set_layout: vk::DescriptorSetLayout,
        primitive_type: PrimitiveType,
    },
}

impl GpuPipeline {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Self::Dummy { primitive_type, .. } => *primitive_type,
            #[cfg(feature = "gl-backend")]
            Self::Gl { primitive_type, .. } => *primitive_type,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { primitive_type, .. } => *primitive_type,
        }
    }
}

impl std::fmt::Debug for GpuPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy {
                id,
                label,
                primitive_type,
            } => f
                .debug_struct("GpuPipeline::Dummy")
                .field("id", id)
                .field("label", label)
                .field("primitive_type", primitive_type)
                .finish(),
            #[cfg(feature = "gl-backend")]
            Self::Gl {
                program,
                vertex_array,
                primitive_type,
                ..
            } => f
                .debug_struct("GpuPipeline::Gl")
                .field("program", program)
                .field("vertex_array", vertex_array)
                .field("primitive_type", primitive_type)
                .finish_non_exhaustive(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan {
                pipeline,
                primitive_type,
                ..
            } => f
                .debug_struct("GpuPipeline::Vulkan")
                .field("pipeline", pipeline)
                .field("primitive_type", primitive_type)
                .finish_non_exhaustive(),
        }
    }
}

/// Any backend object owned by the resource cache.
#[derive(Debug, Clone)]
pub enum GpuResource {
    Texture(Arc<GpuTexture>),
    Buffer(Arc<GpuBuffer>),
    Pipeline(Arc<GpuPipeline>),
}

impl GpuResource {
    pub fn as_texture(&self) -> Option<&Arc<GpuTexture>> {
        match self {
            Self::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Arc<GpuBuffer>> {
        match self {
            Self::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn as_pipeline(&self) -> Option<&Arc<GpuPipeline>> {
        match self {
            Self::Pipeline(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Texture(_) => "texture",
            Self::Buffer(_) => "buffer",
            Self::Pipeline(_) => "pipeline",
        }
    }
}

// ============================================================================
// Device traits
// ============================================================================

/// Everything a backend needs to build a pipeline.
#[derive(Debug)]
pub struct PipelineDescriptor<'a> {
    pub label: &'a str,
    pub shader: &'a ShaderModule,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    /// Per-vertex attributes, bound at slot 0.
    pub vertex_attributes: &'a [VertexAttribute],
    pub vertex_stride: u32,
    /// Per-instance attributes, bound at slot 1.
    pub instance_attributes: &'a [VertexAttribute],
    pub instance_stride: u32,
    pub primitive_type: PrimitiveType,
    pub color_format: TextureFormat,
    /// Format of the render pass's stencil attachment, if it has one.
    pub stencil_format: Option<TextureFormat>,
    pub sample_count: u32,
    /// Premultiplied src-over blending.
    pub blend: bool,
}

/// Backend hook run when a resource returns to the scratch pool.
pub trait Recyclable {
    /// Called while the caller still holds the only reference.
    fn on_recycle(&self, resource: &GpuResource);
}

/// Resource creation half of a backend.
///
/// All methods take `&self` so resources can be created while a
/// [`CommandBuffer`] is recording.
pub trait GpuDevice: Recyclable {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    fn backend_type(&self) -> BackendType;

    fn caps(&self) -> &Caps;

    /// Create a host-writable buffer.
    fn create_buffer(&self, desc: &BufferDescriptor) -> GraphicsResult<GpuBuffer>;

    /// Write `data` at `offset`. Writes must not overlap regions read by
    /// commands recorded but not yet submitted.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> GraphicsResult<()>;

    fn create_texture(&self, desc: &TextureDescriptor) -> GraphicsResult<GpuTexture>;

    fn create_pipeline(&self, desc: &PipelineDescriptor<'_>) -> GraphicsResult<GpuPipeline>;

    /// Release the backend object. Called on the render thread only.
    fn destroy_resource(&self, resource: GpuResource);

    /// Block until the device is idle.
    fn wait_idle(&self) {}
}

/// A device paired with the command buffer that records against it.
pub struct Backend {
    pub device: Box<dyn GpuDevice>,
    pub command_buffer: Box<dyn CommandBuffer>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("device", &self.device.name())
            .field("recording", &self.command_buffer.is_recording())
            .finish()
    }
}

impl Backend {
    /// Create the backend selected by `options`.
    ///
    /// OpenGL needs a caller-provided context; see [`Backend::new_gl`].
    pub fn new(options: &ContextOptions) -> GraphicsResult<Self> {
        match options.backend {
            BackendType::Dummy => Ok(Self::dummy(options.caps.clone().unwrap_or_default())),
            BackendType::OpenGl => Err(crate::error::GraphicsError::InvalidParameter(
                "OpenGL backend requires an existing context, use Backend::new_gl".into(),
            )),
            #[cfg(feature = "vulkan-backend")]
            BackendType::Vulkan => {
                let (device, command_buffer) = vulkan::create_vulkan_backend(options.validation)?;
                log::info!("Using Vulkan backend (ash)");
                Ok(Self {
                    device: Box::new(device),
                    command_buffer: Box::new(command_buffer),
                })
            }
            #[cfg(not(feature = "vulkan-backend"))]
            BackendType::Vulkan => Err(crate::error::GraphicsError::FeatureNotSupported(
                "crate built without the vulkan-backend feature".into(),
            )),
        }
    }

    /// Dummy backend with the given caps.
    pub fn dummy(caps: Caps) -> Self {
        Self::dummy_with_log(caps).0
    }

    /// Dummy backend plus a handle to its recorded command stream.
    pub fn dummy_with_log(caps: Caps) -> (Self, CommandLog) {
        let log = CommandLog::default();
        let backend = Self {
            device: Box::new(DummyDevice::new(caps)),
            command_buffer: Box::new(DummyCommandBuffer::with_log(log.clone())),
        };
        (backend, log)
    }

    /// OpenGL backend over an already current context.
    #[cfg(feature = "gl-backend")]
    pub fn new_gl(context: glow::Context, options: &ContextOptions) -> GraphicsResult<Self> {
        let (device, command_buffer) = gl::create_gl_backend(context, options.validation)?;
        log::info!("Using OpenGL backend (glow)");
        Ok(Self {
            device: Box::new(device),
            command_buffer: Box::new(command_buffer),
        })
    }
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(any(feature = "vulkan-backend", feature = "gl-backend"))
}
