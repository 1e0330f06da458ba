//! Buffer types and vertex layouts.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be the destination of host writes.
        const COPY_DST = 1 << 3;
        /// Buffer content is rewritten every flush.
        const DYNAMIC = 1 << 4;
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size of the buffer in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Index element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    /// 16-bit unsigned indices.
    #[default]
    U16,
    /// 32-bit unsigned indices.
    U32,
}

impl IndexType {
    /// Size of one index in bytes.
    pub fn size(&self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Vertex attribute format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// One 32-bit float.
    Float32,
    /// Two 32-bit floats.
    Float32x2,
    /// Three 32-bit floats.
    Float32x3,
    /// Four 32-bit floats.
    Float32x4,
    /// Four normalized unsigned bytes.
    Unorm8x4,
}

impl VertexFormat {
    /// Size of the attribute in bytes.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float32 | Self::Unorm8x4 => 4,
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
        }
    }

    /// Number of components.
    pub fn components(&self) -> u32 {
        match self {
            Self::Float32 => 1,
            Self::Float32x2 => 2,
            Self::Float32x3 => 3,
            Self::Float32x4 | Self::Unorm8x4 => 4,
        }
    }
}

/// One attribute of a vertex or instance stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Name used in diagnostics.
    pub name: &'static str,
    /// Shader input location.
    pub location: u32,
    /// Attribute format.
    pub format: VertexFormat,
    /// Byte offset within one element of the stream.
    pub offset: u32,
}

impl VertexAttribute {
    /// Create a new attribute.
    pub const fn new(name: &'static str, location: u32, format: VertexFormat, offset: u32) -> Self {
        Self {
            name,
            location,
            format,
            offset,
        }
    }
}

/// Stride of a packed attribute stream.
pub fn attribute_stride(attributes: &[VertexAttribute]) -> u32 {
    attributes
        .iter()
        .map(|a| a.offset + a.format.size())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_stride() {
        let attributes = [
            VertexAttribute::new("position", 0, VertexFormat::Float32x2, 0),
            VertexAttribute::new("color", 1, VertexFormat::Float32x4, 8),
        ];
        assert_eq!(attribute_stride(&attributes), 24);
        assert_eq!(attribute_stride(&[]), 0);
    }

    #[test]
    fn test_usage_flags() {
        let usage = BufferUsage::VERTEX | BufferUsage::DYNAMIC;
        assert!(usage.contains(BufferUsage::VERTEX));
        assert!(!usage.contains(BufferUsage::INDEX));
    }
}
