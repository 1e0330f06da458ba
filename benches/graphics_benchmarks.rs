use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::Mat3;

use arc3d_graphics::backend::Backend;
use arc3d_graphics::types::{ColorType, Rect2f, SurfaceFlags, SurfaceOrigin};
use arc3d_graphics::{
    BackendType, Caps, Context, ContextOptions, KeyBuilder, SurfaceDrawContext,
    UniformDataGatherer, UniformLayout,
};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

fn bench_key_builder_small(c: &mut Criterion) {
    c.bench_function("key_builder_3_fields", |b| {
        let mut builder = KeyBuilder::new();
        b.iter(|| {
            builder.clear();
            builder.add_bits(8, black_box(7), "format");
            builder.add_bool(black_box(true), "stroke");
            builder.add_i32(black_box(-42), "samples");
            black_box(builder.finish())
        });
    });
}

fn bench_key_builder_described(c: &mut Criterion) {
    c.bench_function("key_builder_with_description", |b| {
        b.iter(|| {
            let mut builder = KeyBuilder::with_description();
            for i in 0..16u32 {
                builder.add_bits(4, black_box(i), "nibble");
            }
            black_box(builder.finish())
        });
    });
}

fn bench_storage_key_hash(c: &mut Criterion) {
    let mut builder = KeyBuilder::new();
    for i in 0..32u32 {
        builder.add_bits(32, i.wrapping_mul(2654435761), "word");
    }
    let key = builder.finish();
    c.bench_function("storage_key_hash_32_words", |b| {
        b.iter(|| black_box(&key).hash_code());
    });
}

// ---------------------------------------------------------------------------
// Uniforms
// ---------------------------------------------------------------------------

fn bench_uniform_gatherer_std140(c: &mut Criterion) {
    let mut gatherer = UniformDataGatherer::new(UniformLayout::Std140);
    let matrix = Mat3::from_scale(glam::Vec2::new(2.0, -2.0));
    c.bench_function("uniform_gatherer_std140_block", |b| {
        b.iter(|| {
            gatherer.reset();
            gatherer.write_matrix3f(black_box(&matrix));
            gatherer.write4f(1.0, 0.5, 0.25, 1.0);
            gatherer.write2fv(black_box(&[0.0, 1.0, 2.0, 3.0]));
            gatherer.write1f(0.5);
            black_box(gatherer.finish().len())
        });
    });
}

// ---------------------------------------------------------------------------
// Flush
// ---------------------------------------------------------------------------

fn bench_flush_round_rects(c: &mut Criterion) {
    let mut context = Context::with_backend(
        Backend::dummy(Caps::default()),
        ContextOptions::default().with_backend(BackendType::Dummy),
    );
    let Some(mut sdc) = SurfaceDrawContext::make(
        &context,
        ColorType::Rgba8888,
        512,
        512,
        1,
        SurfaceOrigin::UpperLeft,
        SurfaceFlags::BUDGETED,
    ) else {
        return;
    };

    c.bench_function("flush_256_round_rects", |b| {
        b.iter(|| {
            for i in 0..256 {
                let x = (i % 16) as f32 * 32.0;
                let y = (i / 16) as f32 * 32.0;
                sdc.fill_round_rect(Rect2f::from_xywh(x, y, 28.0, 28.0), 6.0, [0.1, 0.2, 0.3, 1.0]);
            }
            let fence = context.flush(vec![sdc.take_ops_task()]);
            black_box(fence.is_ok())
        });
    });
}

criterion_group!(keys, bench_key_builder_small, bench_key_builder_described, bench_storage_key_hash);
criterion_group!(uniforms, bench_uniform_gatherer_std140);
criterion_group!(flush, bench_flush_round_rects);
criterion_main!(keys, uniforms, flush);
