//! Flush-time state: buffer pools, the [`OpFlushState`] handed to ops, and
//! the [`OpsRenderPass`] they execute into.
//!
//! # Flush sequence
//!
//! ```text
//! prepare:  ops ──make_vertex_space / write_uniforms──> BufferPools (host)
//! execute:  begin_render_pass ──upload──> GPU buffers
//!           ops ──bind_pipeline / bind_buffers / draw──> CommandBuffer
//! submit:   CommandBuffer ──> queue, pools reset
//! ```

mod buffer_pool;
mod flush_state;
mod render_pass;
mod stats;

pub use buffer_pool::{BufferPool, BufferPools, BufferSlice};
pub use flush_state::{OpFlushState, RenderTargetInfo};
pub use render_pass::OpsRenderPass;
pub use stats::Stats;

use crate::types::SurfaceOrigin;

/// True if surface row zero is the last row in device memory, which both
/// the projection and the scissor must account for.
pub(crate) fn flips_y(origin: SurfaceOrigin) -> bool {
    origin == SurfaceOrigin::LowerLeft
}
