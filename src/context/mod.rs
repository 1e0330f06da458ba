//! Contexts own the backend and every cache built on top of it.
//!
//! A [`Context`] lives on the render thread. It instantiates proxies, compiles
//! pipelines and submits command buffers. A [`DeferredContext`] records
//! against the same caps from other threads, and a [`RenderQueueSender`]
//! posts closures back to the render thread.
//!
//! # Example
//!
//! ```ignore
//! let mut context = Context::new(ContextOptions::default())?;
//! let mut sdc = SurfaceDrawContext::make(&context, ColorType::Rgba8888, 256, 256, 1,
//!     SurfaceOrigin::UpperLeft, SurfaceFlags::BUDGETED).unwrap();
//! sdc.fill_round_rect(Rect2f::from_xywh(16.0, 16.0, 128.0, 64.0), 8.0, [1.0, 0.0, 0.0, 1.0]);
//! let fence = context.flush(vec![sdc.take_ops_task()])?;
//! fence.wait();
//! ```

mod deferred;
mod info;
mod queue;

pub use deferred::DeferredContext;
pub use info::{ContextInfo, RecordingContext};
pub use queue::{RenderQueue, RenderQueueSender, RenderTask};

use std::sync::Arc;

use crate::backend::{Backend, GpuDevice};
use crate::config::ContextOptions;
use crate::error::{GraphicsError, GraphicsResult};
use crate::flush::{BufferPools, OpFlushState, Stats};
use crate::pipeline::PipelineStateCache;
use crate::proxy::ProxyProvider;
use crate::resource::{ResourceProvider, SharedResourceCache, new_shared_cache};
use crate::sync::Fence;
use crate::task::OpsTask;
use crate::uniform::{UniformDataGatherer, UniformLayout};

/// The direct context: owns the backend and executes work.
pub struct Context {
    info: Arc<ContextInfo>,
    backend: Backend,
    resource_cache: SharedResourceCache,
    proxy_provider: ProxyProvider,
    pipeline_cache: PipelineStateCache,
    pools: BufferPools,
    gatherer: UniformDataGatherer,
    stats: Stats,
    queue: RenderQueue,
}

impl Context {
    /// Create a context on the backend selected by `options`.
    pub fn new(options: ContextOptions) -> GraphicsResult<Self> {
        let backend = Backend::new(&options)?;
        Ok(Self::with_backend(backend, options))
    }

    /// Create an OpenGL context over a current `glow` context.
    #[cfg(feature = "gl-backend")]
    pub fn new_gl(context: glow::Context, options: ContextOptions) -> GraphicsResult<Self> {
        let backend = Backend::new_gl(context, &options)?;
        Ok(Self::with_backend(backend, options))
    }

    /// Create a context over an existing backend.
    pub fn with_backend(backend: Backend, options: ContextOptions) -> Self {
        let caps = backend.device.caps().clone();
        let info = Arc::new(ContextInfo::new(
            backend.device.backend_type(),
            caps,
            options.clone(),
        ));
        let resource_cache = new_shared_cache(options.max_resource_budget);
        let proxy_provider = ProxyProvider::new_direct(Arc::clone(&info), Arc::clone(&resource_cache));
        log::info!(
            "Context#{}: created on {} ({})",
            info.id(),
            backend.device.name(),
            info.backend()
        );
        Self {
            info,
            backend,
            resource_cache,
            proxy_provider,
            pipeline_cache: PipelineStateCache::new(Arc::clone(&options.shader_error_handler)),
            pools: BufferPools::new(options.vertex_block_size, options.uniform_block_size),
            gatherer: UniformDataGatherer::new(UniformLayout::Std140),
            stats: Stats::default(),
            queue: RenderQueue::new(),
        }
    }

    pub fn device(&self) -> &dyn GpuDevice {
        self.backend.device.as_ref()
    }

    /// The resource cache, shared with every live [`ResourceRef`](crate::resource::ResourceRef).
    pub fn resource_cache(&self) -> &SharedResourceCache {
        &self.resource_cache
    }

    pub fn pipeline_state_cache(&self) -> &PipelineStateCache {
        &self.pipeline_cache
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    pub fn resource_provider(&self) -> ResourceProvider<'_> {
        ResourceProvider::new(self.backend.device.as_ref(), &self.resource_cache)
    }

    /// A recording-only context sharing this context's caps.
    pub fn make_deferred(&self) -> DeferredContext {
        DeferredContext::new(Arc::clone(&self.info))
    }

    /// Mark the context as lost. Proxy creation and flushes fail afterwards.
    pub fn discard(&self) {
        self.info.discard();
    }

    pub fn set_resource_budget(&mut self, bytes: u64) {
        self.resource_cache.lock().set_max_budget(bytes);
        self.free_gpu_resources();
    }

    /// Borrow the state ops prepare and execute against.
    pub fn flush_state(&mut self) -> OpFlushState<'_> {
        OpFlushState::new(
            self.backend.device.as_ref(),
            self.backend.command_buffer.as_mut(),
            &self.resource_cache,
            &mut self.pipeline_cache,
            &mut self.pools,
            &mut self.gatherer,
            &mut self.stats,
        )
    }

    /// Close, prepare and execute `tasks`, then submit.
    ///
    /// Every task is prepared before any executes, so all vertex and uniform
    /// data is uploaded once at the start of execution.
    ///
    /// Submission is synchronous, see [`submit`](Self::submit): the returned
    /// fence is already signaled.
    pub fn flush(&mut self, mut tasks: Vec<OpsTask>) -> GraphicsResult<Fence> {
        if self.info.is_discarded() {
            return Err(GraphicsError::ContextDiscarded);
        }
        for task in &mut tasks {
            task.make_closed();
        }
        {
            let mut state = self.flush_state();
            let prepared: Vec<bool> = tasks.iter_mut().map(|task| task.prepare(&mut state)).collect();
            for (task, prepared) in tasks.iter_mut().zip(prepared) {
                if prepared {
                    task.execute(&mut state);
                }
            }
        }
        self.stats.flushes += 1;
        log::trace!("Context#{}: flushed {} tasks", self.info.id(), tasks.len());
        drop(tasks);
        self.submit()
    }

    /// Submit recorded commands and recycle per-flush buffers.
    ///
    /// Blocks until the device is idle. Pool blocks are recycled right after,
    /// so nothing the GPU may still read is handed out again, and the fence
    /// is signaled before it is returned.
    pub fn submit(&mut self) -> GraphicsResult<Fence> {
        let fence = Fence::new_unsignaled();
        if let Err(err) = self.backend.command_buffer.submit() {
            if err == GraphicsError::DeviceLost {
                self.info.discard();
            }
            return Err(err);
        }
        self.backend.device.wait_idle();
        fence.signal();
        let recycled = self.pools.reset(self.backend.device.as_ref());
        log::trace!("Context#{}: recycled {} pool blocks", self.info.id(), recycled);
        self.free_gpu_resources();
        Ok(fence)
    }

    /// Destroy backend objects the resource cache released.
    pub fn free_gpu_resources(&mut self) {
        self.resource_provider().free_pending();
    }

    /// Release every unreferenced cached resource.
    pub fn purge_resources(&mut self) {
        self.resource_cache.lock().purge_free_resources();
        self.free_gpu_resources();
    }

    pub fn queue_sender(&self) -> RenderQueueSender {
        self.queue.sender()
    }

    /// Run every task posted to the render queue. Returns how many ran.
    pub fn process_queue(&mut self) -> usize {
        let tasks = self.queue.drain();
        let count = tasks.len();
        for task in tasks {
            task(self);
        }
        count
    }
}

impl RecordingContext for Context {
    fn info(&self) -> &Arc<ContextInfo> {
        &self.info
    }

    fn proxy_provider(&self) -> &ProxyProvider {
        &self.proxy_provider
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.backend.device.wait_idle();
        self.pipeline_cache.release_all();
        self.pools.reset(self.backend.device.as_ref());
        self.resource_cache.lock().release_all();
        self.free_gpu_resources();
        log::debug!("Context#{}: destroyed", self.info.id());
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.info.id())
            .field("backend", &self.backend)
            .field("pipelines", &self.pipeline_cache.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Caps;
    use crate::ops::RoundRectOp;
    use crate::proxy::SurfaceProxyView;
    use crate::types::{Rect2f, SurfaceFlags, SurfaceOrigin, Swizzle, TextureFormat};

    fn context() -> Context {
        Context::new(ContextOptions::default().with_caps(Caps::default())).unwrap()
    }

    fn target(context: &Context) -> SurfaceProxyView {
        let proxy = context
            .proxy_provider()
            .create_render_texture_proxy(TextureFormat::Rgba8Unorm, 64, 64, 1, SurfaceFlags::BUDGETED)
            .unwrap();
        SurfaceProxyView::new(proxy, SurfaceOrigin::UpperLeft, Swizzle::RGBA)
    }

    #[test]
    fn test_flush_round_rect() {
        let mut context = context();
        let mut task = OpsTask::new(target(&context));
        task.add_draw_op(Box::new(RoundRectOp::new(
            Rect2f::from_xywh(4.0, 4.0, 32.0, 16.0),
            4.0,
            [1.0; 4],
            None,
        )));
        let fence = context.flush(vec![task]).unwrap();
        assert!(fence.is_signaled());
        assert_eq!(context.stats().instanced_draws, 1);
        assert_eq!(context.stats().render_passes, 1);
        assert_eq!(context.pipeline_state_cache().len(), 1);
    }

    #[test]
    fn test_discarded_context_refuses_to_flush() {
        let mut context = context();
        let task = OpsTask::new(target(&context));
        context.discard();
        assert_eq!(context.flush(vec![task]).unwrap_err(), GraphicsError::ContextDiscarded);
        assert!(context.is_discarded());
    }

    #[test]
    fn test_render_queue() {
        let mut context = context();
        let sender = context.queue_sender();
        let handle = std::thread::spawn(move || {
            assert!(sender.post(|ctx| ctx.reset_stats()));
            assert!(sender.post(|ctx| ctx.purge_resources()));
        });
        handle.join().unwrap();
        assert_eq!(context.process_queue(), 2);
        assert_eq!(context.process_queue(), 0);
    }

    #[test]
    fn test_deferred_context_shares_caps() {
        let context = context();
        let deferred = context.make_deferred();
        assert!(deferred.proxy_provider().is_deferred_provider());
        assert_eq!(deferred.info().id(), context.info().id());
        context.discard();
        assert!(deferred.is_discarded());
    }
}
