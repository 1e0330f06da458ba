//! Flush integration tests.
//!
//! These record draws through [`SurfaceDrawContext`] and [`OpsTask`], flush
//! them through a [`Context`](arc3d_graphics::Context) and check the
//! resulting stats, cache state and, on the dummy backend, the exact command
//! stream.
//!
//! ```bash
//! cargo test --test flush_tests
//! cargo test --test flush_tests --features vulkan-backend
//! ```

mod common;

use std::sync::Arc;

use rstest::rstest;

use arc3d_graphics::backend::RecordedCommand;
use arc3d_graphics::ops::{RectOp, RoundRectOp};
use arc3d_graphics::proxy::SurfaceProxyView;
use arc3d_graphics::task::OpsTask;
use arc3d_graphics::types::{
    ColorType, IndexType, LoadOp, Rect2f, Rect2i, StoreOp, SurfaceFlags, SurfaceOrigin,
    Swizzle, TextureFormat,
};
use arc3d_graphics::{RecordingContext, SurfaceDrawContext};

use common::{Backend, TestContext};

fn resource_count(ctx: &TestContext) -> usize {
    ctx.context.resource_cache().lock().len()
}

// ============================================================================
// Round rects
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_round_rect_end_to_end(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut sdc = ctx.draw_context(64, 64, 1);
    sdc.fill_round_rect(Rect2f::from_xywh(8.0, 8.0, 40.0, 24.0), 6.0, [0.2, 0.4, 0.8, 1.0]);
    let pipelines_before = ctx.context.pipeline_state_cache().len();
    ctx.flush(&mut sdc);

    let stats = *ctx.context.stats();
    assert_eq!(stats.flushes, 1);
    assert_eq!(stats.render_passes, 1);
    assert_eq!(stats.instanced_draws, 1);
    assert_eq!(stats.instances, 1);
    assert_eq!(stats.failed_pipeline_binds, 0);
    assert!(ctx.context.pipeline_state_cache().len() <= pipelines_before + 1);
    assert!(sdc.write_view().proxy().is_instantiated());

    if let Some(log) = &ctx.log {
        let commands = log.commands();
        assert_eq!(commands.first(), Some(&RecordedCommand::Begin));
        assert_eq!(commands.last(), Some(&RecordedCommand::Submit));
        assert!(matches!(commands[1], RecordedCommand::BeginRenderPass { .. }));
        assert!(matches!(commands[2], RecordedCommand::BindPipeline { .. }));
        assert!(commands.iter().any(|c| matches!(
            c,
            RecordedCommand::BindUniformBuffer { binding: 0, .. }
        )));
        assert!(commands.iter().any(|c| matches!(
            c,
            RecordedCommand::BindVertexBuffer { binding: 1, .. }
        )));
        assert!(commands.iter().any(|c| matches!(
            c,
            RecordedCommand::DrawInstanced {
                instance_count: 1,
                ..
            }
        )));
    }
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_pipeline_reused_across_flushes(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut sdc = ctx.draw_context(32, 32, 1);
    for _ in 0..3 {
        sdc.fill_round_rect(Rect2f::from_xywh(2.0, 2.0, 20.0, 20.0), 4.0, [1.0, 0.0, 0.0, 1.0]);
        ctx.flush(&mut sdc);
    }

    let pipeline_stats = ctx.context.pipeline_state_cache().stats();
    assert_eq!(ctx.context.pipeline_state_cache().len(), 1);
    assert_eq!(pipeline_stats.compilations, 1);
    assert_eq!(pipeline_stats.hits, 2);
    assert_eq!(ctx.context.stats().instanced_draws, 3);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_compatible_round_rects_draw_once(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut sdc = ctx.draw_context(64, 64, 1);
    for i in 0..5 {
        let x = i as f32 * 10.0;
        sdc.fill_round_rect(Rect2f::from_xywh(x, 0.0, 8.0, 8.0), 2.0, [0.0, 1.0, 0.0, 1.0]);
    }
    assert_eq!(sdc.ops_task().op_count(), 1);
    ctx.flush(&mut sdc);

    assert_eq!(ctx.context.stats().instanced_draws, 1);
    assert_eq!(ctx.context.stats().instances, 5);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_fill_and_stroke_use_separate_pipelines(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut sdc = ctx.draw_context(64, 64, 1);
    let rect = Rect2f::from_xywh(4.0, 4.0, 32.0, 32.0);
    sdc.fill_round_rect(rect, 6.0, [1.0, 1.0, 1.0, 1.0]);
    sdc.stroke_round_rect(rect, 6.0, 2.0, [0.0, 0.0, 0.0, 1.0]);
    ctx.flush(&mut sdc);

    assert_eq!(ctx.context.stats().instanced_draws, 2);
    assert_eq!(ctx.context.pipeline_state_cache().len(), 2);
}

// ============================================================================
// Clears and rects
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_clear_only_opens_a_render_pass(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut sdc = ctx.draw_context(16, 16, 1);
    sdc.clear([1.0, 0.0, 0.0, 0.5]);
    ctx.flush(&mut sdc);

    assert_eq!(ctx.context.stats().render_passes, 1);
    assert_eq!(ctx.context.stats().total_draws(), 0);

    if let Some(log) = &ctx.log {
        let clear = log.commands().into_iter().find_map(|c| match c {
            RecordedCommand::BeginRenderPass { info, .. } => Some(info),
            _ => None,
        });
        let info = clear.expect("render pass recorded");
        assert_eq!(info.color_load, LoadOp::Clear);
        assert_eq!(info.clear_color, [0.5, 0.0, 0.0, 0.5]);
    }
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_indexed_rects_use_shared_quad_indices(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let sdc = ctx.draw_context(32, 32, 1);
    let mut task = OpsTask::new(sdc.write_view().clone());
    task.add_draw_op(Box::new(
        RectOp::new(Rect2f::from_xywh(0.0, 0.0, 8.0, 8.0), [1.0; 4]).with_indexed(true),
    ));
    task.add_draw_op(Box::new(
        RectOp::new(Rect2f::from_xywh(8.0, 8.0, 8.0, 8.0), [1.0; 4]).with_indexed(true),
    ));
    assert_eq!(task.op_count(), 1);
    ctx.context.flush(vec![task]).unwrap().wait();

    assert_eq!(ctx.context.stats().indexed_draws, 1);
    assert_eq!(
        ctx.count_commands(|c| matches!(
            c,
            RecordedCommand::BindIndexBuffer {
                index_type: IndexType::U16,
                ..
            }
        ))
        .unwrap_or(1),
        1
    );
    assert_eq!(
        ctx.count_commands(|c| matches!(
            c,
            RecordedCommand::DrawIndexed {
                index_count: 12,
                ..
            }
        ))
        .unwrap_or(1),
        1
    );
}

#[test]
fn test_clip_is_flipped_for_lower_left_surfaces() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let mut sdc = SurfaceDrawContext::make(
        &ctx.context,
        ColorType::Rgba8888,
        64,
        32,
        1,
        SurfaceOrigin::LowerLeft,
        SurfaceFlags::BUDGETED,
    )
    .unwrap();
    sdc.set_clip(Some(Rect2i::new(0, 0, 16, 8)));
    sdc.fill_rect(Rect2f::from_xywh(0.0, 0.0, 64.0, 32.0), [1.0; 4]);
    ctx.flush(&mut sdc);

    assert_eq!(
        ctx.count_commands(|c| *c == RecordedCommand::SetScissor(Rect2i::new(0, 24, 16, 32))),
        Some(1)
    );
}

#[test]
fn test_clip_outside_surface_is_clamped() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let mut sdc = ctx.draw_context(32, 32, 1);
    sdc.set_clip(Some(Rect2i::new(-8, 16, 64, 64)));
    sdc.fill_rect(Rect2f::from_xywh(0.0, 0.0, 32.0, 32.0), [1.0; 4]);
    ctx.flush(&mut sdc);

    assert_eq!(
        ctx.count_commands(|c| *c == RecordedCommand::SetScissor(Rect2i::new(0, 16, 32, 32))),
        Some(1)
    );
}

// ============================================================================
// Stencil
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_stencil_clear_reaches_render_pass(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    if ctx.context.caps().stencil_format(1).is_none() {
        eprintln!("Backend {:?} has no stencil format, skipping", backend);
        return;
    }

    let mut sdc = ctx.draw_context(32, 32, 1);
    sdc.set_stencil(LoadOp::Clear, StoreOp::Store, 0x5a);
    sdc.fill_rect(Rect2f::from_xywh(0.0, 0.0, 8.0, 8.0), [1.0; 4]);
    ctx.flush(&mut sdc);

    assert_eq!(ctx.context.stats().render_passes, 1);
    assert_eq!(ctx.context.stats().total_draws(), 1);
    let stencil = sdc
        .write_view()
        .proxy()
        .stencil_attachment()
        .expect("stencil buffer attached");
    assert!(stencil.format().has_stencil());
    assert_eq!((stencil.width(), stencil.height()), (32, 32));

    if let Some(log) = &ctx.log {
        let (attachment, info) = log
            .commands()
            .into_iter()
            .find_map(|c| match c {
                RecordedCommand::BeginRenderPass { stencil, info, .. } => Some((stencil, info)),
                _ => None,
            })
            .expect("render pass recorded");
        assert!(attachment.is_some());
        assert_eq!(info.stencil_load, LoadOp::Clear);
        assert_eq!(info.stencil_store, StoreOp::Store);
        assert_eq!(info.clear_stencil, 0x5a);
    }
}

#[test]
fn test_stencil_attachment_kept_across_flushes() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let mut sdc = ctx.draw_context(16, 16, 1);
    let pipelines_before = ctx.context.pipeline_state_cache().len();

    sdc.set_stencil(LoadOp::Clear, StoreOp::Store, 1);
    sdc.fill_rect(Rect2f::from_xywh(0.0, 0.0, 8.0, 8.0), [1.0; 4]);
    ctx.flush(&mut sdc);
    let first = sdc.write_view().proxy().stencil_attachment().unwrap();

    sdc.set_stencil(LoadOp::Load, StoreOp::DontCare, 0);
    sdc.fill_rect(Rect2f::from_xywh(0.0, 0.0, 8.0, 8.0), [1.0; 4]);
    ctx.flush(&mut sdc);
    let second = sdc.write_view().proxy().stencil_attachment().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(ctx.context.pipeline_state_cache().len(), pipelines_before + 1);

    // a pass without stencil ops needs a pipeline built without a stencil format
    sdc.fill_rect(Rect2f::from_xywh(0.0, 0.0, 8.0, 8.0), [1.0; 4]);
    ctx.flush(&mut sdc);
    assert_eq!(ctx.context.pipeline_state_cache().len(), pipelines_before + 2);
    assert_eq!(
        ctx.count_commands(|c| matches!(c, RecordedCommand::BeginRenderPass { stencil: None, .. })),
        Some(1)
    );
}

// ============================================================================
// Uniform bind failures
// ============================================================================

#[test]
fn test_failed_uniform_bind_skips_draw() {
    let mut ctx = TestContext::new(Backend::Dummy).unwrap();
    let log = ctx.log.clone().unwrap();
    let mut sdc = ctx.draw_context(32, 32, 1);
    sdc.fill_round_rect(Rect2f::from_xywh(0.0, 0.0, 16.0, 16.0), 4.0, [1.0; 4]);
    sdc.fill_rect(Rect2f::from_xywh(16.0, 16.0, 8.0, 8.0), [1.0; 4]);

    log.fail_next_uniform_binds(1);
    ctx.flush(&mut sdc);

    let stats = *ctx.context.stats();
    assert_eq!(stats.pipeline_binds, 2);
    assert_eq!(stats.failed_uniform_binds, 1);
    assert_eq!(stats.instanced_draws, 0);
    assert_eq!(stats.total_draws(), 1);
    assert_eq!(log.count(|c| matches!(c, RecordedCommand::DrawInstanced { .. })), 0);
    assert_eq!(log.count(|c| matches!(c, RecordedCommand::BindUniformBuffer { .. })), 1);
    assert_eq!(log.count(|c| matches!(c, RecordedCommand::Draw { .. })), 1);
}

// ============================================================================
// Buffer recycling
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_pool_buffers_recycled_between_flushes(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut sdc = ctx.draw_context(32, 32, 1);
    sdc.fill_round_rect(Rect2f::from_xywh(0.0, 0.0, 16.0, 16.0), 4.0, [1.0; 4]);
    ctx.flush(&mut sdc);
    let after_first = ctx.context.resource_cache().lock().stats();
    assert!(ctx.context.resource_cache().lock().scratch_count() >= 3);

    sdc.fill_round_rect(Rect2f::from_xywh(0.0, 0.0, 16.0, 16.0), 4.0, [1.0; 4]);
    ctx.flush(&mut sdc);
    let after_second = ctx.context.resource_cache().lock().stats();

    // vertex, instance and uniform blocks all come back from the pool
    assert!(after_second.scratch_hits >= after_first.scratch_hits + 3);
    assert_eq!(after_second.created, after_first.created);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_render_pass_releases_buffers(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut sdc = ctx.draw_context(32, 32, 1);
    sdc.fill_round_rect(Rect2f::from_xywh(0.0, 0.0, 16.0, 16.0), 4.0, [1.0; 4]);
    ctx.flush(&mut sdc);
    ctx.context.purge_resources();

    // Only the target held by the draw context and the cached pipeline survive
    let pipelines = ctx.context.pipeline_state_cache().len();
    assert_eq!(resource_count(&ctx), pipelines + 1);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_dropped_task_returns_buffers(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut sdc = ctx.draw_context(32, 32, 1);
    sdc.fill_round_rect(Rect2f::from_xywh(0.0, 0.0, 16.0, 16.0), 4.0, [1.0; 4]);
    let mut task = sdc.take_ops_task();
    task.make_closed();
    {
        let mut state = ctx.context.flush_state();
        assert!(task.prepare(&mut state));
    }
    assert!(resource_count(&ctx) > 1);

    drop(task);
    drop(sdc);
    ctx.context.submit().unwrap();
    ctx.context.purge_resources();

    assert_eq!(resource_count(&ctx), ctx.context.pipeline_state_cache().len());
    assert_eq!(ctx.context.stats().render_passes, 0);
}

// ============================================================================
// Deferred recording
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_deferred_recording_flushes_on_direct_context(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let deferred = ctx.context.make_deferred();
    let recorder = std::thread::spawn(move || {
        let mut sdc = SurfaceDrawContext::make(
            &deferred,
            ColorType::Rgba8888,
            48,
            48,
            1,
            SurfaceOrigin::UpperLeft,
            SurfaceFlags::BUDGETED,
        )
        .expect("deferred surface");
        assert!(sdc.write_view().proxy().is_deferred());
        sdc.fill_round_rect(Rect2f::from_xywh(4.0, 4.0, 24.0, 24.0), 4.0, [0.5, 0.5, 0.5, 1.0]);
        sdc
    });
    let mut sdc = recorder.join().unwrap();
    assert!(!sdc.write_view().proxy().is_instantiated());

    ctx.flush(&mut sdc);
    assert!(sdc.write_view().proxy().is_instantiated());
    assert_eq!(ctx.context.stats().instanced_draws, 1);
}

// ============================================================================
// Unique keys
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_unique_keyed_target_outlives_its_proxy(#[case] backend: Backend) {
    use arc3d_graphics::resource::UniqueKey;

    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let key = UniqueKey::new(UniqueKey::generate_domain(), |b| b.add_bits(16, 42, "id"))
        .with_tag("atlas");
    let proxy = ctx
        .context
        .proxy_provider()
        .create_render_texture_proxy(TextureFormat::Rgba8Unorm, 32, 32, 1, SurfaceFlags::BUDGETED)
        .unwrap();
    assert!(ctx
        .context
        .proxy_provider()
        .assign_unique_key_to_proxy(key.clone(), Some(&proxy)));

    let mut task = OpsTask::new(SurfaceProxyView::new(
        proxy.clone(),
        SurfaceOrigin::UpperLeft,
        Swizzle::RGBA,
    ));
    task.add_draw_op(Box::new(RoundRectOp::new(
        Rect2f::from_xywh(0.0, 0.0, 16.0, 16.0),
        4.0,
        [1.0; 4],
        None,
    )));
    ctx.context.flush(vec![task]).unwrap().wait();

    let texture = proxy.texture().expect("instantiated");
    assert!(ctx.context.resource_cache().lock().has_unique_key(&key));
    drop(proxy);
    assert!(ctx.context.proxy_provider().find_proxy_by_unique_key(&key).is_none());

    let found = ctx
        .context
        .proxy_provider()
        .find_or_create_proxy_by_unique_key(&key)
        .expect("resource kept by its key");
    assert!(std::sync::Arc::ptr_eq(&found.texture().unwrap(), &texture));
}
