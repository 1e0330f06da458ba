//! Type conversions from crate types to GL enums.

use crate::types::{IndexType, PrimitiveType, TextureFormat, VertexFormat};

/// `GL_COMPRESSED_RGBA_S3TC_DXT1_EXT`, only present with the S3TC extension.
pub const COMPRESSED_RGBA_S3TC_DXT1: u32 = 0x83F1;

/// Sized internal format for storage allocation.
pub fn convert_texture_format(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::R8Unorm => glow::R8,
        TextureFormat::R16Float => glow::R16F,
        TextureFormat::Rg8Unorm => glow::RG8,
        // BGRA is a client-side ordering in GL; storage stays RGBA
        TextureFormat::Rgba8Unorm | TextureFormat::Bgra8Unorm => glow::RGBA8,
        TextureFormat::Rgba8UnormSrgb => glow::SRGB8_ALPHA8,
        TextureFormat::Rgb10A2Unorm => glow::RGB10_A2,
        TextureFormat::Rgba16Float => glow::RGBA16F,
        TextureFormat::Rgba32Float => glow::RGBA32F,
        TextureFormat::Stencil8 => glow::STENCIL_INDEX8,
        TextureFormat::Depth24PlusStencil8 => glow::DEPTH24_STENCIL8,
        TextureFormat::Depth32Float => glow::DEPTH_COMPONENT32F,
        TextureFormat::Etc2Rgb8Unorm => glow::COMPRESSED_RGB8_ETC2,
        TextureFormat::Bc1RgbaUnorm => COMPRESSED_RGBA_S3TC_DXT1,
    }
}

/// Framebuffer attachment point for a renderable format.
pub fn attachment_point(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Stencil8 => glow::STENCIL_ATTACHMENT,
        TextureFormat::Depth24PlusStencil8 => glow::DEPTH_STENCIL_ATTACHMENT,
        TextureFormat::Depth32Float => glow::DEPTH_ATTACHMENT,
        _ => glow::COLOR_ATTACHMENT0,
    }
}

/// Component count, component type and normalization of a vertex format.
pub fn convert_vertex_format(format: VertexFormat) -> (i32, u32, bool) {
    match format {
        VertexFormat::Float32 => (1, glow::FLOAT, false),
        VertexFormat::Float32x2 => (2, glow::FLOAT, false),
        VertexFormat::Float32x3 => (3, glow::FLOAT, false),
        VertexFormat::Float32x4 => (4, glow::FLOAT, false),
        VertexFormat::Unorm8x4 => (4, glow::UNSIGNED_BYTE, true),
    }
}

pub fn convert_primitive_type(primitive: PrimitiveType) -> u32 {
    match primitive {
        PrimitiveType::Points => glow::POINTS,
        PrimitiveType::Lines => glow::LINES,
        PrimitiveType::LineStrip => glow::LINE_STRIP,
        PrimitiveType::Triangles => glow::TRIANGLES,
        PrimitiveType::TriangleStrip => glow::TRIANGLE_STRIP,
    }
}

/// Element type and byte size of one index.
pub fn convert_index_type(index_type: IndexType) -> (u32, u64) {
    match index_type {
        IndexType::U16 => (glow::UNSIGNED_SHORT, 2),
        IndexType::U32 => (glow::UNSIGNED_INT, 4),
    }
}

/// Sample count bitmask (bit `n` set means `n` samples) for every power of
/// two up to `max_samples`.
pub fn sample_count_mask(max_samples: u32) -> u32 {
    let mut mask = 0;
    let mut count = 1;
    while count <= max_samples.min(16) {
        mask |= 1 << count;
        count *= 2;
    }
    mask
}
