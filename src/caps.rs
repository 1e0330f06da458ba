//! Device capabilities and surface validation.
//!
//! [`Caps`] describes what a device can create: size limits, which formats are
//! texturable or renderable and at which sample counts, and how logical
//! [`ColorType`]s map onto backend formats and swizzles. Backends fill it in
//! at initialization; deferred contexts receive a copy.

use crate::types::{ColorType, SurfaceFlags, Swizzle, TextureFormat};

/// Per-format capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatCaps {
    /// Can be sampled.
    pub texturable: bool,
    /// Can be a color or depth/stencil attachment.
    pub renderable: bool,
    /// Bitmask of supported sample counts (bit `n` set means `n` samples).
    pub sample_counts: u32,
}

impl FormatCaps {
    pub const NONE: FormatCaps = FormatCaps {
        texturable: false,
        renderable: false,
        sample_counts: 0,
    };

    pub const fn texturable() -> Self {
        Self {
            texturable: true,
            renderable: false,
            sample_counts: 0,
        }
    }

    /// Texturable and renderable at 1, 2, 4 and 8 samples.
    pub const fn renderable() -> Self {
        Self {
            texturable: true,
            renderable: true,
            sample_counts: (1 << 1) | (1 << 2) | (1 << 4) | (1 << 8),
        }
    }

    fn supports_samples(&self, sample_count: u32) -> bool {
        sample_count < 32 && self.sample_counts & (1 << sample_count) != 0
    }
}

/// Device capabilities.
#[derive(Debug, Clone)]
pub struct Caps {
    /// Largest texture dimension.
    pub max_texture_size: u32,
    /// Largest render target dimension.
    pub max_render_target_size: u32,
    /// Largest supported MSAA sample count.
    pub max_sample_count: u32,
    /// Minimum offset alignment for uniform buffer bindings.
    pub min_uniform_buffer_offset_alignment: u32,
    /// Protected memory is available.
    pub protected_content: bool,
    /// Mipmapped textures are available.
    pub mipmap_support: bool,
    formats: [FormatCaps; TextureFormat::ALL.len()],
}

impl Default for Caps {
    fn default() -> Self {
        let mut caps = Self {
            max_texture_size: 16384,
            max_render_target_size: 16384,
            max_sample_count: 8,
            min_uniform_buffer_offset_alignment: 256,
            protected_content: false,
            mipmap_support: true,
            formats: [FormatCaps::NONE; TextureFormat::ALL.len()],
        };
        for format in TextureFormat::ALL {
            let format_caps = if format.is_compressed() {
                FormatCaps::texturable()
            } else {
                FormatCaps::renderable()
            };
            caps.set_format_caps(format, format_caps);
        }
        caps
    }
}

impl Caps {
    pub fn format_caps(&self, format: TextureFormat) -> &FormatCaps {
        &self.formats[format.index() as usize]
    }

    pub fn set_format_caps(&mut self, format: TextureFormat, caps: FormatCaps) {
        self.formats[format.index() as usize] = caps;
    }

    pub fn is_format_texturable(&self, format: TextureFormat) -> bool {
        self.format_caps(format).texturable
    }

    /// True if `format` can be rendered to with exactly `sample_count` samples.
    pub fn is_format_renderable(&self, format: TextureFormat, sample_count: u32) -> bool {
        let caps = self.format_caps(format);
        caps.renderable && sample_count <= self.max_sample_count && caps.supports_samples(sample_count)
    }

    /// Smallest supported sample count `>= requested` for `format`, or 0 if
    /// the format is not renderable at any such count.
    pub fn render_target_sample_count(&self, requested: u32, format: TextureFormat) -> u32 {
        let requested = requested.max(1);
        (requested..=self.max_sample_count)
            .find(|&count| self.is_format_renderable(format, count))
            .unwrap_or(0)
    }

    /// Check that a surface with these parameters can be created.
    pub fn validate_surface_params(
        &self,
        width: u32,
        height: u32,
        format: TextureFormat,
        sample_count: u32,
        flags: SurfaceFlags,
    ) -> bool {
        if width < 1 || height < 1 {
            return false;
        }
        let max_size = if sample_count > 1 || flags.contains(SurfaceFlags::RENDERABLE) {
            if !self.is_format_renderable(format, sample_count.max(1)) {
                return false;
            }
            self.max_render_target_size
        } else {
            if !self.is_format_texturable(format) {
                return false;
            }
            self.max_texture_size
        };
        if width > max_size || height > max_size {
            return false;
        }
        if flags.contains(SurfaceFlags::PROTECTED) && !self.protected_content {
            return false;
        }
        if flags.contains(SurfaceFlags::MIPMAPPED) && !self.mipmap_support {
            return false;
        }
        true
    }

    /// Format for stencil attachments of targets with `sample_count` samples.
    /// A packed depth-stencil format is used when plain stencil is missing.
    pub fn stencil_format(&self, sample_count: u32) -> Option<TextureFormat> {
        [TextureFormat::Stencil8, TextureFormat::Depth24PlusStencil8]
            .into_iter()
            .find(|&format| self.is_format_renderable(format, sample_count))
    }

    /// Backend format used for `color_type`, or `None` if unsupported.
    pub fn default_format(&self, color_type: ColorType, renderable: bool) -> Option<TextureFormat> {
        let format = match color_type {
            ColorType::Alpha8 | ColorType::Gray8 => TextureFormat::R8Unorm,
            ColorType::Rg88 => TextureFormat::Rg8Unorm,
            ColorType::Rgba8888 | ColorType::Rgb888x => TextureFormat::Rgba8Unorm,
            ColorType::Rgba8888Srgb => TextureFormat::Rgba8UnormSrgb,
            ColorType::Bgra8888 => TextureFormat::Bgra8Unorm,
            ColorType::Rgba1010102 => TextureFormat::Rgb10A2Unorm,
            ColorType::RgbaF16 => TextureFormat::Rgba16Float,
            ColorType::RgbaF32 => TextureFormat::Rgba32Float,
        };
        let supported = if renderable {
            self.is_format_renderable(format, 1)
        } else {
            self.is_format_texturable(format)
        };
        supported.then_some(format)
    }

    /// Swizzle applied when sampling a `format` texture holding `color_type`.
    pub fn read_swizzle(&self, format: TextureFormat, color_type: ColorType) -> Swizzle {
        match (format, color_type) {
            (TextureFormat::R8Unorm, ColorType::Alpha8) => Swizzle::ZZZR,
            (TextureFormat::R8Unorm, ColorType::Gray8) => Swizzle::RRR1,
            (_, ColorType::Rgb888x) => Swizzle::RGB1,
            _ => Swizzle::RGBA,
        }
    }

    /// Swizzle applied to draw colors when rendering `color_type` into
    /// `format`. Alpha-only surfaces replicate alpha so src-over blending
    /// into the red channel still sees the source alpha.
    pub fn write_swizzle(&self, format: TextureFormat, color_type: ColorType) -> Swizzle {
        match (format, color_type) {
            (TextureFormat::R8Unorm, ColorType::Alpha8) => Swizzle::AAAA,
            _ => Swizzle::RGBA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_and_oversized() {
        let caps = Caps::default();
        let f = TextureFormat::Rgba8Unorm;
        assert!(caps.validate_surface_params(64, 64, f, 1, SurfaceFlags::empty()));
        assert!(!caps.validate_surface_params(0, 64, f, 1, SurfaceFlags::empty()));
        assert!(!caps.validate_surface_params(64, 0, f, 1, SurfaceFlags::empty()));
        assert!(!caps.validate_surface_params(20000, 64, f, 1, SurfaceFlags::empty()));
    }

    #[test]
    fn test_compressed_formats_are_not_renderable() {
        let caps = Caps::default();
        let f = TextureFormat::Etc2Rgb8Unorm;
        assert!(caps.validate_surface_params(64, 64, f, 1, SurfaceFlags::empty()));
        assert!(!caps.validate_surface_params(64, 64, f, 1, SurfaceFlags::RENDERABLE));
        assert_eq!(caps.render_target_sample_count(1, f), 0);
    }

    #[test]
    fn test_sample_count_rounding() {
        let caps = Caps::default();
        let f = TextureFormat::Rgba8Unorm;
        assert_eq!(caps.render_target_sample_count(0, f), 1);
        assert_eq!(caps.render_target_sample_count(3, f), 4);
        assert_eq!(caps.render_target_sample_count(16, f), 0);
    }

    #[test]
    fn test_protected_requires_support() {
        let mut caps = Caps::default();
        let f = TextureFormat::Rgba8Unorm;
        assert!(!caps.validate_surface_params(8, 8, f, 1, SurfaceFlags::PROTECTED));
        caps.protected_content = true;
        assert!(caps.validate_surface_params(8, 8, f, 1, SurfaceFlags::PROTECTED));
    }

    #[test]
    fn test_stencil_format_falls_back_to_packed() {
        let mut caps = Caps::default();
        assert_eq!(caps.stencil_format(4), Some(TextureFormat::Stencil8));
        caps.set_format_caps(TextureFormat::Stencil8, FormatCaps::NONE);
        assert_eq!(caps.stencil_format(4), Some(TextureFormat::Depth24PlusStencil8));
        caps.set_format_caps(TextureFormat::Depth24PlusStencil8, FormatCaps::NONE);
        assert_eq!(caps.stencil_format(1), None);
    }

    #[test]
    fn test_default_format_and_swizzles() {
        let caps = Caps::default();
        let format = caps.default_format(ColorType::Alpha8, true).unwrap();
        assert_eq!(format, TextureFormat::R8Unorm);
        assert_eq!(caps.read_swizzle(format, ColorType::Alpha8), Swizzle::ZZZR);
        assert_eq!(caps.write_swizzle(format, ColorType::Alpha8), Swizzle::AAAA);
        assert_eq!(
            caps.read_swizzle(TextureFormat::Rgba8Unorm, ColorType::Rgb888x),
            Swizzle::RGB1
        );
    }
}
