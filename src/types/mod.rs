//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage and surface flags, and the small
//! geometry and render pass value types used throughout the graphics core.

mod buffer;
mod common;
mod texture;

pub use buffer::{
    BufferDescriptor, BufferUsage, IndexType, VertexAttribute, VertexFormat, attribute_stride,
};
pub use common::{
    ColorType, LoadOp, PrimitiveType, Rect2f, Rect2i, StoreOp, SurfaceOrigin, Swizzle,
};
pub use texture::{SurfaceFlags, TextureDescriptor, TextureFormat, TextureUsage};
