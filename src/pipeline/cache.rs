//! Pipeline state cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::backend::{GpuPipeline, GpuResource, PipelineDescriptor};
use crate::error::GraphicsError;
use crate::key::{KeyBuilder, StorageKey};
use crate::resource::{ResourceDesc, ResourceProvider, ResourceRef};

use super::error_handler::ShaderErrorHandler;
use super::info::{PipelineFlags, PipelineInfo};
use super::shader::ShaderModule;

const VERTEX_ENTRY: &str = "vs_main";
const FRAGMENT_ENTRY: &str = "fs_main";

/// Pipeline cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub compilations: u64,
    pub failures: u64,
}

/// Compiled pipelines keyed by the packed [`PipelineInfo`] key.
///
/// Pipelines are cache resources: the state cache holds one reference per
/// entry, so they live until [`release_all`](Self::release_all) or the
/// cache is dropped.
pub struct PipelineStateCache {
    pipelines: HashMap<StorageKey, ResourceRef>,
    failed: HashSet<StorageKey>,
    key_builder: KeyBuilder,
    error_handler: Arc<dyn ShaderErrorHandler>,
    stats: PipelineCacheStats,
}

impl PipelineStateCache {
    pub fn new(error_handler: Arc<dyn ShaderErrorHandler>) -> Self {
        Self {
            pipelines: HashMap::new(),
            failed: HashSet::new(),
            key_builder: KeyBuilder::new(),
            error_handler,
            stats: PipelineCacheStats::default(),
        }
    }

    /// Number of compiled pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn stats(&self) -> PipelineCacheStats {
        self.stats
    }

    pub fn set_error_handler(&mut self, handler: Arc<dyn ShaderErrorHandler>) {
        self.error_handler = handler;
    }

    /// Find the pipeline for `info`, compiling it on a miss.
    ///
    /// Returns `None` if compilation fails; the failure is reported to the
    /// error handler once and later lookups of the same key fail fast.
    pub fn find_or_create_pipeline_state(
        &mut self,
        provider: &ResourceProvider<'_>,
        info: &PipelineInfo,
    ) -> Option<Arc<GpuPipeline>> {
        self.key_builder.clear();
        info.key(&mut self.key_builder);
        let key = self.key_builder.finish();

        if let Some(pipeline) = self.pipelines.get(&key) {
            self.stats.hits += 1;
            return pipeline.pipeline().cloned();
        }
        self.stats.misses += 1;
        if self.failed.contains(&key) {
            return None;
        }

        match self.create_pipeline(provider, info) {
            Some(pipeline) => {
                let result = pipeline.pipeline().cloned();
                self.pipelines.insert(key, pipeline);
                result
            }
            None => {
                self.stats.failures += 1;
                self.failed.insert(key);
                None
            }
        }
    }

    fn create_pipeline(&mut self, provider: &ResourceProvider<'_>, info: &PipelineInfo) -> Option<ResourceRef> {
        let geom = &info.geom_proc;
        let source = geom.shader_source();
        log::debug!(
            "PipelineStateCache: compiling {} ({:?}, {:?}, {} samples)",
            geom.name(),
            info.primitive_type,
            info.color_format,
            info.sample_count
        );

        let shader = match ShaderModule::from_wgsl(geom.name(), &source) {
            Ok(shader) => shader,
            Err(err) => {
                self.error_handler.handle_compile_error(&source, &err.message);
                return None;
            }
        };
        self.stats.compilations += 1;

        let desc = PipelineDescriptor {
            label: geom.name(),
            shader: &shader,
            vertex_entry: VERTEX_ENTRY,
            fragment_entry: FRAGMENT_ENTRY,
            vertex_attributes: geom.vertex_attributes(),
            vertex_stride: geom.vertex_stride(),
            instance_attributes: geom.instance_attributes(),
            instance_stride: geom.instance_stride(),
            primitive_type: info.primitive_type,
            color_format: info.color_format,
            stencil_format: info.stencil_format,
            sample_count: info.sample_count,
            blend: info.flags.contains(PipelineFlags::ALPHA_BLEND),
        };

        let pipeline = match provider.device().create_pipeline(&desc) {
            Ok(pipeline) => pipeline,
            Err(GraphicsError::ShaderCompilationFailed(errors)) => {
                self.error_handler.handle_compile_error(&source, &errors);
                return None;
            }
            Err(err) => {
                log::error!("PipelineStateCache: failed to create {}: {}", geom.name(), err);
                return None;
            }
        };

        let resource = provider.insert(
            GpuResource::Pipeline(Arc::new(pipeline)),
            ResourceDesc {
                label: geom.name().to_string(),
                budgeted: false,
                scratch_key: None,
                memory_size: 0,
            },
        );
        match resource {
            Ok(resource) => Some(resource),
            Err(err) => {
                log::error!("PipelineStateCache: {err}");
                None
            }
        }
    }

    /// Drop every cached pipeline and forget past failures.
    pub fn release_all(&mut self) {
        if !self.pipelines.is_empty() {
            log::debug!("PipelineStateCache: releasing {} pipelines", self.pipelines.len());
        }
        self.pipelines.clear();
        self.failed.clear();
    }
}

impl std::fmt::Debug for PipelineStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStateCache")
            .field("pipelines", &self.pipelines.len())
            .field("failed", &self.failed.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use crate::caps::Caps;
    use crate::geom::{GeometryProcessor, RectProcessor, RoundRectProcessor};
    use crate::pipeline::LoggingShaderErrorHandler;
    use crate::resource::new_shared_cache;
    use crate::types::{PrimitiveType, TextureFormat, VertexAttribute, VertexFormat};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct BrokenProcessor;

    const BROKEN_ATTRIBUTES: [VertexAttribute; 1] =
        [VertexAttribute::new("position", 0, VertexFormat::Float32x2, 0)];

    impl GeometryProcessor for BrokenProcessor {
        fn name(&self) -> &'static str {
            "BrokenProcessor"
        }

        fn class_id(&self) -> u32 {
            0xFF
        }

        fn vertex_attributes(&self) -> &[VertexAttribute] {
            &BROKEN_ATTRIBUTES
        }

        fn shader_source(&self) -> String {
            "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return undefined_name; }".into()
        }
    }

    fn info(geom: Arc<dyn GeometryProcessor>) -> PipelineInfo {
        PipelineInfo::new(
            geom,
            PrimitiveType::Triangles,
            TextureFormat::Rgba8Unorm,
            1,
            PipelineFlags::ALPHA_BLEND,
        )
    }

    #[test]
    fn test_hit_after_miss() {
        let device = DummyDevice::new(Caps::default());
        let cache = new_shared_cache(1 << 20);
        let provider = ResourceProvider::new(&device, &cache);
        let mut pipelines = PipelineStateCache::new(Arc::new(LoggingShaderErrorHandler));

        let a = pipelines
            .find_or_create_pipeline_state(&provider, &info(Arc::new(RoundRectProcessor::new(false))))
            .unwrap();
        let b = pipelines
            .find_or_create_pipeline_state(&provider, &info(Arc::new(RoundRectProcessor::new(false))))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pipelines.len(), 1);
        assert_eq!(
            pipelines.stats(),
            PipelineCacheStats {
                hits: 1,
                misses: 1,
                compilations: 1,
                failures: 0
            }
        );
        assert_eq!(device.created_pipelines(), 1);

        pipelines.find_or_create_pipeline_state(&provider, &info(Arc::new(RectProcessor::new())));
        assert_eq!(pipelines.len(), 2);
        assert_eq!(cache.lock().len(), 2);
    }

    #[test]
    fn test_compile_failure_reaches_handler_once() {
        let device = DummyDevice::new(Caps::default());
        let cache = new_shared_cache(1 << 20);
        let provider = ResourceProvider::new(&device, &cache);
        let calls = Arc::new(AtomicU32::new(0));
        let errors = Arc::new(Mutex::new(String::new()));
        let handler = {
            let calls = Arc::clone(&calls);
            let errors = Arc::clone(&errors);
            move |_source: &str, message: &str| {
                calls.fetch_add(1, Ordering::Relaxed);
                *errors.lock().unwrap() = message.to_string();
            }
        };
        let mut pipelines = PipelineStateCache::new(Arc::new(handler));

        let broken = info(Arc::new(BrokenProcessor));
        assert!(pipelines.find_or_create_pipeline_state(&provider, &broken).is_none());
        assert!(pipelines.find_or_create_pipeline_state(&provider, &broken).is_none());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(errors.lock().unwrap().contains("undefined_name"));
        assert_eq!(pipelines.stats().failures, 1);
        assert!(pipelines.is_empty());
    }

    #[test]
    fn test_release_all_frees_pipelines() {
        let device = DummyDevice::new(Caps::default());
        let cache = new_shared_cache(1 << 20);
        let provider = ResourceProvider::new(&device, &cache);
        let mut pipelines = PipelineStateCache::new(Arc::new(LoggingShaderErrorHandler));
        pipelines.find_or_create_pipeline_state(&provider, &info(Arc::new(RectProcessor::new())));

        pipelines.release_all();
        provider.free_pending();
        assert!(cache.lock().is_empty());
        assert_eq!(device.destroyed_resources(), 1);
    }
}
