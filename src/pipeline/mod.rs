//! Pipeline state: shader front end, packed pipeline keys and the cache of
//! compiled pipelines.
//!
//! # Overview
//!
//! - [`PipelineInfo`] describes a draw's pipeline and packs itself into a
//!   [`StorageKey`](crate::key::StorageKey) through a
//!   [`KeyBuilder`](crate::key::KeyBuilder).
//! - [`PipelineStateCache`] maps those keys to compiled pipelines, compiling
//!   on a miss.
//! - [`ShaderModule`] is the shared WGSL front end; backends lower it to
//!   SPIR-V or GLSL.
//! - Compile failures go to a [`ShaderErrorHandler`].
//!
//! # Example
//!
//! ```ignore
//! let info = PipelineInfo::new(geom, PrimitiveType::TriangleStrip, format, 1, PipelineFlags::ALPHA_BLEND);
//! let pipeline = cache.find_or_create_pipeline_state(&provider, &info);
//! ```

mod cache;
mod error_handler;
mod info;
mod shader;

pub use cache::{PipelineCacheStats, PipelineStateCache};
pub use error_handler::{
    DefaultShaderErrorHandler, LoggingShaderErrorHandler, ShaderErrorHandler, numbered_source,
};
pub use info::{PipelineFlags, PipelineInfo};
pub use shader::{ShaderError, ShaderModule};
