//! Context lifecycle and proxy creation tests.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rstest::rstest;
use static_assertions::{assert_impl_all, assert_not_impl_any};

use arc3d_graphics::ops::DrawOp;
use arc3d_graphics::task::OpsTask;
use arc3d_graphics::types::{ColorType, SurfaceFlags, SurfaceOrigin, TextureFormat};
use arc3d_graphics::{
    Context, DeferredContext, Fence, GraphicsError, RecordingContext, RenderQueueSender,
    SurfaceDrawContext,
};

use common::{Backend, TestContext};

assert_impl_all!(DeferredContext: Send, Sync);
assert_impl_all!(SurfaceDrawContext: Send);
assert_impl_all!(OpsTask: Send);
assert_impl_all!(RenderQueueSender: Send, Clone);
assert_impl_all!(Fence: Send, Sync);
assert_impl_all!(Box<dyn DrawOp>: Send);
assert_not_impl_any!(Context: Send);

// ============================================================================
// Proxy creation
// ============================================================================

#[rstest]
#[case::zero_width(0, 16)]
#[case::zero_height(16, 0)]
#[case::too_wide(1 << 20, 16)]
fn test_invalid_proxy_sizes_rejected(#[case] width: u32, #[case] height: u32) {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let proxy = ctx.context.proxy_provider().create_render_texture_proxy(
        TextureFormat::Rgba8Unorm,
        width,
        height,
        1,
        SurfaceFlags::BUDGETED,
    );
    assert!(proxy.is_none());
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_proxy_within_limits(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let max = ctx.context.caps().max_render_target_size;
    let proxy = ctx
        .context
        .proxy_provider()
        .create_render_texture_proxy(TextureFormat::Rgba8Unorm, max, 1, 1, SurfaceFlags::BUDGETED)
        .expect("largest render target");
    assert_eq!(proxy.width(), max);
    assert!(!proxy.is_instantiated());
    assert!(!proxy.is_deferred());
}

#[test]
fn test_surface_for_unsupported_sample_count_rejected() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let samples = ctx.context.caps().max_sample_count * 2;
    let sdc = SurfaceDrawContext::make(
        &ctx.context,
        ColorType::Rgba8888,
        16,
        16,
        samples,
        SurfaceOrigin::UpperLeft,
        SurfaceFlags::BUDGETED,
    );
    assert!(sdc.is_none());
}

// ============================================================================
// Discard
// ============================================================================

#[test]
fn test_discarded_context_refuses_work() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let mut sdc = ctx.draw_context(16, 16, 1);
    let deferred = ctx.context.make_deferred();

    ctx.context.discard();
    assert!(ctx.context.is_discarded());
    assert!(deferred.is_discarded());

    assert!(
        SurfaceDrawContext::make(
            &deferred,
            ColorType::Rgba8888,
            16,
            16,
            1,
            SurfaceOrigin::UpperLeft,
            SurfaceFlags::BUDGETED,
        )
        .is_none()
    );
    assert!(
        ctx.context
            .proxy_provider()
            .create_render_texture_proxy(TextureFormat::Rgba8Unorm, 8, 8, 1, SurfaceFlags::BUDGETED)
            .is_none()
    );

    sdc.clear([0.0; 4]);
    let result = ctx.context.flush(vec![sdc.take_ops_task()]);
    assert!(matches!(result, Err(GraphicsError::ContextDiscarded)));
    assert_eq!(ctx.context.stats().flushes, 0);
}

#[test]
fn test_deferred_context_shares_identity() {
    let ctx = TestContext::new(Backend::Dummy).unwrap();
    let deferred = ctx.context.make_deferred();
    assert_eq!(deferred.info().id(), ctx.context.info().id());
    assert_eq!(deferred.caps().max_texture_size, ctx.context.caps().max_texture_size);
}

// ============================================================================
// Render queue
// ============================================================================

#[test]
fn test_queue_runs_posted_work_on_owner() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let sender = ctx.context.queue_sender();
    let ran = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let sender = sender.clone();
            let ran = ran.clone();
            std::thread::spawn(move || {
                assert!(sender.post(move |context: &mut Context| {
                    assert!(!context.is_discarded());
                    ran.fetch_add(1, Ordering::SeqCst);
                }));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(ctx.context.process_queue(), 4);
    assert_eq!(ran.load(Ordering::SeqCst), 4);
    assert_eq!(ctx.context.process_queue(), 0);
}

#[test]
fn test_queue_flushes_deferred_surface() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let sender = ctx.context.queue_sender();
    let deferred = ctx.context.make_deferred();

    std::thread::spawn(move || {
        let mut sdc = SurfaceDrawContext::make(
            &deferred,
            ColorType::Rgba8888,
            32,
            32,
            1,
            SurfaceOrigin::UpperLeft,
            SurfaceFlags::BUDGETED,
        )
        .unwrap();
        sdc.clear([0.0, 0.0, 1.0, 1.0]);
        let task = sdc.take_ops_task();
        sender.post(move |context: &mut Context| {
            context.flush(vec![task]).unwrap().wait();
        });
    })
    .join()
    .unwrap();

    assert_eq!(ctx.context.process_queue(), 1);
    assert_eq!(ctx.context.stats().flushes, 1);
    assert_eq!(ctx.context.stats().render_passes, 1);
}

// ============================================================================
// Resource budget
// ============================================================================

#[test]
fn test_purge_keeps_referenced_targets() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let mut kept = ctx.draw_context(16, 16, 1);
    let mut dropped = ctx.draw_context(16, 16, 1);
    kept.clear([1.0; 4]);
    dropped.clear([1.0; 4]);
    let tasks = vec![kept.take_ops_task(), dropped.take_ops_task()];
    ctx.context.flush(tasks).unwrap().wait();

    assert_eq!(ctx.context.resource_cache().lock().len(), 2);
    drop(dropped);
    assert_eq!(ctx.context.resource_cache().lock().purgeable_count(), 1);

    ctx.context.purge_resources();
    let cache = ctx.context.resource_cache().lock();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.purgeable_count(), 0);
    assert!(kept.write_view().proxy().is_instantiated());
}

#[test]
fn test_dropped_scratch_target_is_reused() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let mut first = ctx.draw_context(24, 24, 1);
    first.clear([0.0; 4]);
    ctx.flush(&mut first);
    drop(first);

    let hits_before = ctx.context.resource_cache().lock().stats().scratch_hits;
    let mut second = ctx.draw_context(24, 24, 1);
    second.clear([0.0; 4]);
    ctx.flush(&mut second);

    let cache = ctx.context.resource_cache().lock();
    assert_eq!(cache.stats().scratch_hits, hits_before + 1);
    assert_eq!(cache.len(), 1);
}
