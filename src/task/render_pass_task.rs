use crate::backend::RenderPassInfo;
use crate::flush::{OpFlushState, RenderTargetInfo};
use crate::ops::DrawOp;
use crate::proxy::SurfaceProxyView;
use crate::types::Rect2f;

/// An ordered, closed list of draw ops for one render target.
#[derive(Debug, Default)]
pub struct DrawPass {
    ops: Vec<Box<dyn DrawOp>>,
    bounds: Rect2f,
}

impl DrawPass {
    pub fn new(ops: Vec<Box<dyn DrawOp>>) -> Self {
        let mut bounds = Rect2f::default();
        for op in &ops {
            bounds.join(&op.bounds());
        }
        Self { ops, bounds }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Union of the ops' bounds.
    pub fn bounds(&self) -> Rect2f {
        self.bounds
    }
}

/// Replays a [`DrawPass`] into one render pass on a target surface.
///
/// `prepare` resolves the target and lets every op allocate its data;
/// `execute` then opens the render pass and records the ops that prepared
/// successfully. A task executes at most once.
#[derive(Debug)]
pub struct RenderPassTask {
    draw_pass: DrawPass,
    info: RenderPassInfo,
    target: SurfaceProxyView,
    prepared: Vec<bool>,
    executed: bool,
}

impl RenderPassTask {
    /// Returns `None` if `target` cannot be rendered to.
    pub fn make(draw_pass: DrawPass, info: RenderPassInfo, target: SurfaceProxyView) -> Option<Self> {
        if !target.proxy().is_renderable() {
            log::warn!("RenderPassTask: target proxy #{} is not renderable", target.proxy().id());
            return None;
        }
        Some(Self {
            draw_pass,
            info,
            target,
            prepared: Vec::new(),
            executed: false,
        })
    }

    pub fn draw_pass(&self) -> &DrawPass {
        &self.draw_pass
    }

    pub fn info(&self) -> &RenderPassInfo {
        &self.info
    }

    pub fn target(&self) -> &SurfaceProxyView {
        &self.target
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Instantiate the target and prepare every op. Returns `false` if the
    /// target could not be instantiated.
    pub fn prepare(&mut self, state: &mut OpFlushState<'_>) -> bool {
        assert!(!self.executed, "render pass task prepared after execution");
        let proxy = self.target.proxy();
        if !proxy.instantiate(&state.resource_provider()) {
            log::warn!("RenderPassTask: failed to instantiate target #{}", proxy.id());
            return false;
        }
        let stencil_format = if self.info.uses_stencil() {
            let Some(stencil) = proxy.find_or_create_stencil_attachment(&state.resource_provider()) else {
                log::warn!("RenderPassTask: no stencil attachment for target #{}", proxy.id());
                return false;
            };
            Some(stencil.format())
        } else {
            None
        };

        state.set_target(Some(RenderTargetInfo {
            width: proxy.backing_width(),
            height: proxy.backing_height(),
            format: proxy.format(),
            sample_count: proxy.sample_count(),
            origin: self.target.origin(),
            stencil_format,
        }));
        self.prepared = self
            .draw_pass
            .ops
            .iter_mut()
            .map(|op| {
                let prepared = op.on_prepare(state);
                if !prepared {
                    log::warn!("RenderPassTask: {} failed to prepare and will be skipped", op.name());
                }
                prepared
            })
            .collect();
        state.set_target(None);
        true
    }

    /// Record the prepared ops into a render pass.
    ///
    /// # Panics
    ///
    /// Panics if the task was already executed.
    pub fn execute(&mut self, state: &mut OpFlushState<'_>) -> bool {
        assert!(!self.executed, "render pass task executed twice");
        self.executed = true;

        let proxy = self.target.proxy();
        let Some(texture) = proxy.texture() else {
            log::warn!("RenderPassTask: executed before its target was instantiated");
            return false;
        };
        let stencil = if self.info.uses_stencil() {
            proxy.stencil_attachment()
        } else {
            None
        };
        let origin = self.target.origin();
        let Some(mut pass) = state.begin_render_pass(texture, stencil, origin, self.info) else {
            return false;
        };
        let bounds = self.draw_pass.bounds;
        for (op, prepared) in self.draw_pass.ops.iter_mut().zip(&self.prepared) {
            if *prepared {
                op.on_execute(&mut pass, &bounds);
            }
        }
        pass.end();
        true
    }
}
