//! Drawing onto a single render-target surface.

use glam::Mat3;

use crate::context::RecordingContext;
use crate::ops::{RectOp, RoundRectOp, premultiply};
use crate::proxy::SurfaceProxyView;
use crate::types::{ColorType, LoadOp, Rect2f, Rect2i, StoreOp, SurfaceFlags, SurfaceOrigin};
use crate::task::OpsTask;

/// Records draws against a fresh render texture.
///
/// Colors passed to the clear, fill and stroke calls are unpremultiplied;
/// they are premultiplied and run through the write view's swizzle before
/// ops see them. Recorded ops accumulate in an
/// [`OpsTask`] that [`take_ops_task`](Self::take_ops_task) hands over for
/// flushing.
#[derive(Debug)]
pub struct SurfaceDrawContext {
    read_view: SurfaceProxyView,
    write_view: SurfaceProxyView,
    color_type: ColorType,
    ops_task: OpsTask,
    view: Mat3,
    clip: Option<Rect2i>,
}

impl SurfaceDrawContext {
    /// Create a render texture proxy for `color_type` and wrap it in read
    /// and write views. Returns `None` if the context is discarded, no
    /// renderable format backs the color type or the caps reject the size.
    pub fn make(
        context: &dyn RecordingContext,
        color_type: ColorType,
        width: u32,
        height: u32,
        sample_count: u32,
        origin: SurfaceOrigin,
        flags: SurfaceFlags,
    ) -> Option<Self> {
        if context.is_discarded() {
            return None;
        }
        let caps = context.caps();
        let format = caps.default_format(color_type, true)?;
        let proxy = context.proxy_provider().create_render_texture_proxy(
            format,
            width,
            height,
            sample_count,
            flags,
        )?;
        let read_view = SurfaceProxyView::new(
            proxy.clone(),
            origin,
            caps.read_swizzle(format, color_type),
        );
        let write_view = SurfaceProxyView::new(proxy, origin, caps.write_swizzle(format, color_type));
        log::trace!(
            "SurfaceDrawContext: {}x{} {:?} as {:?}, {} samples",
            width,
            height,
            color_type,
            format,
            write_view.proxy().sample_count()
        );
        Some(Self {
            ops_task: OpsTask::new(write_view.clone()),
            read_view,
            write_view,
            color_type,
            view: Mat3::IDENTITY,
            clip: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.write_view.width()
    }

    pub fn height(&self) -> u32 {
        self.write_view.height()
    }

    pub fn color_type(&self) -> ColorType {
        self.color_type
    }

    pub fn read_view(&self) -> &SurfaceProxyView {
        &self.read_view
    }

    pub fn write_view(&self) -> &SurfaceProxyView {
        &self.write_view
    }

    pub fn ops_task(&self) -> &OpsTask {
        &self.ops_task
    }

    /// Transform applied to geometry recorded from now on.
    pub fn set_view_matrix(&mut self, view: Mat3) {
        self.view = view;
    }

    pub fn view_matrix(&self) -> Mat3 {
        self.view
    }

    /// Restrict later draws to `clip`, in surface pixels.
    pub fn set_clip(&mut self, clip: Option<Rect2i>) {
        self.clip = clip;
    }

    /// Premultiplied color as written to the backing format.
    fn device_color(&self, color: [f32; 4]) -> [f32; 4] {
        self.write_view.swizzle().apply(premultiply(color))
    }

    /// Clear the whole surface, dropping draws recorded so far.
    pub fn clear(&mut self, color: [f32; 4]) {
        self.ops_task.set_clear(self.device_color(color));
    }

    /// Load and store ops for the surface's stencil buffer in the current
    /// task. A stencil buffer is attached at flush time when needed.
    pub fn set_stencil(&mut self, load: LoadOp, store: StoreOp, clear_value: u32) {
        self.ops_task.set_stencil(load, store, clear_value);
    }

    pub fn fill_rect(&mut self, rect: Rect2f, color: [f32; 4]) {
        if rect.is_empty() {
            return;
        }
        let op = RectOp::new(rect, self.device_color(color))
            .with_view(self.view)
            .with_scissor(self.clip);
        self.ops_task.add_draw_op(Box::new(op));
    }

    pub fn fill_round_rect(&mut self, rect: Rect2f, radius: f32, color: [f32; 4]) {
        if rect.is_empty() {
            return;
        }
        let op = RoundRectOp::new(rect, radius, self.device_color(color), None)
            .with_view(self.view)
            .with_scissor(self.clip);
        self.ops_task.add_draw_op(Box::new(op));
    }

    pub fn stroke_round_rect(&mut self, rect: Rect2f, radius: f32, stroke_width: f32, color: [f32; 4]) {
        if rect.is_empty() || stroke_width <= 0.0 {
            return;
        }
        let op = RoundRectOp::new(rect, radius, self.device_color(color), Some(stroke_width))
            .with_view(self.view)
            .with_scissor(self.clip);
        self.ops_task.add_draw_op(Box::new(op));
    }

    /// Close the current task and start a new one on the same surface. The
    /// next task loads what this one drew.
    pub fn take_ops_task(&mut self) -> OpsTask {
        let next = OpsTask::new(self.write_view.clone());
        let mut task = std::mem::replace(&mut self.ops_task, next);
        task.make_closed();
        task
    }
}
