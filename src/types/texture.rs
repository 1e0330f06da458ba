//! Texture formats, surface flags and texture descriptors.

use bitflags::bitflags;

/// Backend-neutral texture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    // 8-bit formats
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,

    // 16-bit formats
    /// 16-bit red channel, float.
    R16Float,
    /// 8-bit RG channels, unsigned normalized.
    Rg8Unorm,

    // 32-bit formats
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 10-bit RGB with 2-bit alpha, unsigned normalized.
    Rgb10A2Unorm,

    // 64-bit formats
    /// 16-bit RGBA channels, float.
    Rgba16Float,

    // 128-bit formats
    /// 32-bit RGBA channels, float.
    Rgba32Float,

    // Depth/stencil formats
    /// 8-bit stencil only.
    Stencil8,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit depth, float.
    Depth32Float,

    // Compressed formats
    /// ETC2 RGB, 4x4 blocks.
    Etc2Rgb8Unorm,
    /// BC1 RGBA, 4x4 blocks.
    Bc1RgbaUnorm,
}

impl TextureFormat {
    /// All formats, in key order.
    pub const ALL: [TextureFormat; 14] = [
        Self::R8Unorm,
        Self::R16Float,
        Self::Rg8Unorm,
        Self::Rgba8Unorm,
        Self::Rgba8UnormSrgb,
        Self::Bgra8Unorm,
        Self::Rgb10A2Unorm,
        Self::Rgba16Float,
        Self::Rgba32Float,
        Self::Stencil8,
        Self::Depth24PlusStencil8,
        Self::Depth32Float,
        Self::Etc2Rgb8Unorm,
        Self::Bc1RgbaUnorm,
    ];

    /// Stable index used when packing the format into keys.
    pub fn index(&self) -> u32 {
        *self as u32
    }

    /// Returns true if this is a block-compressed format.
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Etc2Rgb8Unorm | Self::Bc1RgbaUnorm)
    }

    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(
            self,
            Self::Stencil8 | Self::Depth24PlusStencil8 | Self::Depth32Float
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Stencil8 | Self::Depth24PlusStencil8)
    }

    /// Returns the size in bytes per pixel, or per 4x4 block for compressed formats.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm | Self::Stencil8 => 1,
            Self::R16Float | Self::Rg8Unorm => 2,
            Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Rgb10A2Unorm
            | Self::Depth24PlusStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float | Self::Etc2Rgb8Unorm | Self::Bc1RgbaUnorm => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Approximate memory footprint of a `width` x `height` image with `samples` samples.
    pub fn compute_size(&self, width: u32, height: u32, samples: u32, mipmapped: bool) -> u64 {
        let (w, h) = if self.is_compressed() {
            (width.div_ceil(4) as u64, height.div_ceil(4) as u64)
        } else {
            (width as u64, height as u64)
        };
        let mut size = w * h * self.block_size() as u64 * samples.max(1) as u64;
        if mipmapped {
            size += size / 3;
        }
        size
    }
}

bitflags! {
    /// Creation and lifetime flags for surfaces (textures and render targets).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceFlags: u32 {
        /// Memory counts against the resource cache budget; the surface can be
        /// recycled through the scratch pool.
        const BUDGETED = 1 << 0;
        /// Backing dimensions may be rounded up to a power of two.
        const LOOSE_FIT = 1 << 1;
        /// Allocate a full mip chain.
        const MIPMAPPED = 1 << 2;
        /// Protected content.
        const PROTECTED = 1 << 3;
        /// Render target capable of being drawn to.
        const RENDERABLE = 1 << 4;
        /// Skip the resource allocator and always create a fresh texture.
        const SKIP_ALLOCATOR = 1 << 5;
        /// Created by a deferred (recording-only) proxy provider.
        const DEFERRED_PROVIDER = 1 << 6;
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 2;
        /// Texture can be used as a render attachment.
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

/// Descriptor for creating a 2D texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Sample count for multisampling.
    pub sample_count: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            width,
            height,
            mip_level_count: 1,
            sample_count: 1,
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Full mip chain length for the descriptor's dimensions.
    pub fn full_mip_count(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Memory footprint of the described texture.
    pub fn memory_size(&self) -> u64 {
        self.format.compute_size(
            self.width,
            self.height,
            self.sample_count,
            self.mip_level_count > 1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_formats() {
        assert!(TextureFormat::Etc2Rgb8Unorm.is_compressed());
        assert!(TextureFormat::Bc1RgbaUnorm.is_compressed());
        assert!(!TextureFormat::Rgba8Unorm.is_compressed());
    }

    #[test]
    fn test_format_index_matches_table() {
        for (i, format) in TextureFormat::ALL.iter().enumerate() {
            assert_eq!(format.index(), i as u32);
        }
    }

    #[test]
    fn test_compute_size() {
        assert_eq!(TextureFormat::Rgba8Unorm.compute_size(16, 16, 1, false), 1024);
        assert_eq!(TextureFormat::Rgba8Unorm.compute_size(16, 16, 4, false), 4096);
        // 4x4 blocks of 8 bytes
        assert_eq!(TextureFormat::Bc1RgbaUnorm.compute_size(8, 8, 1, false), 32);
    }

    #[test]
    fn test_full_mip_count() {
        let desc = TextureDescriptor::new_2d(256, 64, TextureFormat::R8Unorm, TextureUsage::empty());
        assert_eq!(desc.full_mip_count(), 9);
    }
}
