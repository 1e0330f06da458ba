//! Render tasks.
//!
//! An [`OpsTask`] gathers draw ops against one surface. Closing it produces
//! a [`RenderPassTask`] that replays the resulting [`DrawPass`] into a single
//! render pass.
//!
//! ```ignore
//! task.make_closed();
//! task.prepare(&mut state);
//! task.execute(&mut state);
//! ```

mod ops_task;
mod render_pass_task;

pub use ops_task::OpsTask;
pub use render_pass_task::{DrawPass, RenderPassTask};
