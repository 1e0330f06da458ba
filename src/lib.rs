//! Arc3D graphics core - GPU resource management and draw op execution.
//!
//! This crate supports three backends:
//! - **dummy**: records commands without touching a GPU (always compiled)
//! - **OpenGL**: OpenGL 4.3 via glow (`gl-backend`)
//! - **Vulkan**: Vulkan 1.3 via ash with dynamic rendering (`vulkan-backend`)
//!
//! # Features
//! - Reference-counted GPU resources with scratch recycling and unique keys
//! - Lazily instantiated texture proxies, usable from deferred contexts
//! - Batched draw ops replayed into render passes
//! - Pipeline state cache compiling WGSL through naga for every backend
//! - Uniform packing in std140/std430 layouts
//!
//! # Example
//!
//! ```ignore
//! use arc3d_graphics::{Context, ContextOptions, SurfaceDrawContext};
//! use arc3d_graphics::types::{ColorType, Rect2f, SurfaceFlags, SurfaceOrigin};
//!
//! let mut context = Context::new(ContextOptions::default())?;
//! let mut sdc = SurfaceDrawContext::make(
//!     &context,
//!     ColorType::Rgba8888,
//!     512,
//!     512,
//!     4,
//!     SurfaceOrigin::UpperLeft,
//!     SurfaceFlags::BUDGETED,
//! )
//! .unwrap();
//! sdc.clear([1.0, 1.0, 1.0, 1.0]);
//! sdc.fill_round_rect(Rect2f::from_xywh(32.0, 32.0, 256.0, 128.0), 16.0, [0.2, 0.4, 0.8, 1.0]);
//! context.flush(vec![sdc.take_ops_task()])?.wait();
//! ```

pub mod backend;
pub mod caps;
pub mod config;
pub mod context;
pub mod draw_context;
pub mod error;
pub mod flush;
pub mod geom;
pub mod key;
pub mod ops;
pub mod pipeline;
pub mod proxy;
pub mod resource;
pub mod sync;
pub mod task;
pub mod types;
pub mod uniform;

pub use caps::Caps;
pub use config::{BackendType, ContextOptions};
pub use context::{
    Context, ContextInfo, DeferredContext, RecordingContext, RenderQueue, RenderQueueSender,
};
pub use draw_context::SurfaceDrawContext;
pub use error::{GraphicsError, GraphicsResult};
pub use key::{KeyBuilder, StorageKey};
pub use sync::{Fence, FenceStatus};
pub use uniform::{UniformDataGatherer, UniformLayout};
