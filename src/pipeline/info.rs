//! Pipeline descriptions and their packed keys.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::geom::GeometryProcessor;
use crate::key::{KeyBuilder, StorageKey};
use crate::types::{PrimitiveType, TextureFormat};

bitflags! {
    /// Fixed-function state that affects pipeline compilation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineFlags: u32 {
        /// Premultiplied src-over blending.
        const ALPHA_BLEND = 1 << 0;
        /// Draws are clipped by a scissor rectangle.
        const SCISSOR_TEST = 1 << 1;
    }
}

/// Everything needed to find or build a pipeline for one draw.
#[derive(Clone)]
pub struct PipelineInfo {
    pub geom_proc: Arc<dyn GeometryProcessor>,
    pub primitive_type: PrimitiveType,
    pub color_format: TextureFormat,
    /// Stencil attachment of the render pass the pipeline draws in.
    pub stencil_format: Option<TextureFormat>,
    pub sample_count: u32,
    pub flags: PipelineFlags,
}

impl PipelineInfo {
    pub fn new(
        geom_proc: Arc<dyn GeometryProcessor>,
        primitive_type: PrimitiveType,
        color_format: TextureFormat,
        sample_count: u32,
        flags: PipelineFlags,
    ) -> Self {
        Self {
            geom_proc,
            primitive_type,
            color_format,
            stencil_format: None,
            sample_count,
            flags,
        }
    }

    pub fn with_stencil_format(mut self, format: Option<TextureFormat>) -> Self {
        self.stencil_format = format;
        self
    }

    /// Append this pipeline's key fields to `b`.
    ///
    /// Word 0 holds the processor class; the geometry processor's own bits
    /// follow on a fresh word so processors cannot alias each other.
    pub fn key(&self, b: &mut KeyBuilder) {
        b.append_comment(self.geom_proc.name());
        b.add_bits(16, self.geom_proc.class_id(), "geomProcClassID");
        b.flush();
        self.geom_proc.add_to_key(b);
        b.flush();
        b.add_bits(3, self.primitive_type.index(), "primitiveType");
        b.add_bits(5, self.color_format.index(), "colorFormat");
        b.add_bits(5, self.sample_count, "sampleCount");
        b.add_bits(8, self.flags.bits(), "pipelineFlags");
        b.add_bool(self.stencil_format.is_some(), "hasStencil");
        b.add_bits(5, self.stencil_format.map_or(0, |f| f.index()), "stencilFormat");
    }

    /// Finished key for this pipeline.
    pub fn storage_key(&self) -> StorageKey {
        let mut b = KeyBuilder::new();
        self.key(&mut b);
        b.finish()
    }

    /// Human readable key dump, for debugging cache misses.
    pub fn describe(&self) -> String {
        let mut b = KeyBuilder::with_description();
        self.key(&mut b);
        b.description().unwrap_or_default().to_string()
    }
}

impl fmt::Debug for PipelineInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineInfo")
            .field("geom_proc", &self.geom_proc.name())
            .field("primitive_type", &self.primitive_type)
            .field("color_format", &self.color_format)
            .field("stencil_format", &self.stencil_format)
            .field("sample_count", &self.sample_count)
            .field("flags", &self.flags)
            .finish()
    }
}
