use crate::backend::RenderPassInfo;
use crate::flush::OpFlushState;
use crate::ops::DrawOp;
use crate::proxy::SurfaceProxyView;
use crate::types::{LoadOp, Rect2f, StoreOp};

use super::render_pass_task::{DrawPass, RenderPassTask};

/// Collects draw ops for one surface and turns them into a
/// [`RenderPassTask`] once closed.
///
/// Dropping a task, executed or not, releases its ops together with every
/// buffer slice and proxy reference they hold.
#[derive(Debug)]
pub struct OpsTask {
    target: SurfaceProxyView,
    ops: Vec<Box<dyn DrawOp>>,
    bounds: Rect2f,
    info: RenderPassInfo,
    render_pass_task: Option<RenderPassTask>,
    closed: bool,
    executed: bool,
}

impl OpsTask {
    pub fn new(target: SurfaceProxyView) -> Self {
        Self {
            target,
            ops: Vec::new(),
            bounds: Rect2f::default(),
            info: RenderPassInfo::default(),
            render_pass_task: None,
            closed: false,
            executed: false,
        }
    }

    pub fn target(&self) -> &SurfaceProxyView {
        &self.target
    }

    /// Ops recorded so far, after combining.
    pub fn op_count(&self) -> usize {
        self.render_pass_task
            .as_ref()
            .map_or(self.ops.len(), |task| task.draw_pass().len())
    }

    pub fn is_empty(&self) -> bool {
        self.op_count() == 0
            && self.info.color_load != LoadOp::Clear
            && self.info.stencil_load != LoadOp::Clear
    }

    pub fn bounds(&self) -> Rect2f {
        self.bounds
    }

    pub fn render_pass_info(&self) -> &RenderPassInfo {
        &self.info
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Queue `op`, merging it into the previous op when they are compatible.
    ///
    /// # Panics
    ///
    /// Panics if the task is closed.
    pub fn add_draw_op(&mut self, mut op: Box<dyn DrawOp>) {
        assert!(!self.closed, "draw op added to a closed task");
        self.bounds.join(&op.bounds());
        if let Some(last) = self.ops.last_mut() {
            if last.combine_if_possible(op.as_mut()) {
                log::trace!("OpsTask: combined {} into previous op", op.name());
                return;
            }
        }
        self.ops.push(op);
    }

    /// Clear the whole target to `color` before any op draws. Ops recorded
    /// earlier are discarded.
    pub fn set_clear(&mut self, color: [f32; 4]) {
        assert!(!self.closed, "clear added to a closed task");
        self.ops.clear();
        self.bounds = Rect2f::default();
        self.info.color_load = LoadOp::Clear;
        self.info.clear_color = color;
    }

    /// Set how the target's stencil buffer is loaded and stored. Any op other
    /// than [`LoadOp::DontCare`] with [`StoreOp::DontCare`] attaches a stencil
    /// buffer to the target.
    pub fn set_stencil(&mut self, load: LoadOp, store: StoreOp, clear_value: u32) {
        assert!(!self.closed, "stencil ops set on a closed task");
        self.info = self.info.with_stencil(load, store, clear_value);
    }

    /// Stop accepting ops and build the render pass task.
    pub fn make_closed(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let draw_pass = DrawPass::new(std::mem::take(&mut self.ops));
        self.render_pass_task = RenderPassTask::make(draw_pass, self.info, self.target.clone());
    }

    /// # Panics
    ///
    /// Panics if the task is not closed.
    pub fn prepare(&mut self, state: &mut OpFlushState<'_>) -> bool {
        assert!(self.closed, "tasks must be closed before prepare");
        match &mut self.render_pass_task {
            Some(task) => task.prepare(state),
            None => false,
        }
    }

    /// Execute the prepared ops. The ops are released afterwards.
    ///
    /// # Panics
    ///
    /// Panics if the task is not closed or was already executed.
    pub fn execute(&mut self, state: &mut OpFlushState<'_>) -> bool {
        assert!(self.closed, "tasks must be closed before execute");
        assert!(!self.executed, "ops task executed twice");
        self.executed = true;
        let executed = match &mut self.render_pass_task {
            Some(task) => task.execute(state),
            None => false,
        };
        self.render_pass_task = None;
        executed
    }
}

impl Drop for OpsTask {
    fn drop(&mut self) {
        if !self.executed && self.op_count() > 0 {
            log::debug!(
                "OpsTask: dropping {} unexecuted ops on proxy #{}",
                self.op_count(),
                self.target.proxy().id()
            );
        }
    }
}
