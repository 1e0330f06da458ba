//! Common utilities for context integration tests.
//!
//! Tests are parameterized over [`Backend`] and skip backends that are not
//! compiled in or have no device on this machine.

use arc3d_graphics::backend::{Backend as GpuBackend, CommandLog, RecordedCommand};
use arc3d_graphics::types::{ColorType, SurfaceFlags, SurfaceOrigin};
use arc3d_graphics::{BackendType, Caps, Context, ContextOptions, SurfaceDrawContext};

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Backends the tests can run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Records commands, no GPU.
    Dummy,
    /// Vulkan through ash.
    Vulkan,
}

impl Backend {
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            Backend::Vulkan => cfg!(feature = "vulkan-backend"),
        }
    }

    #[allow(dead_code)]
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Dummy => "dummy",
            Backend::Vulkan => "vulkan",
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A context plus, on the dummy backend, the command stream it recorded.
pub struct TestContext {
    #[allow(dead_code)]
    pub backend: Backend,
    pub context: Context,
    /// Only the dummy backend records commands.
    pub log: Option<CommandLog>,
}

impl TestContext {
    /// Returns `None` if the backend is unavailable.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_options(backend, ContextOptions::default())
    }

    pub fn with_options(backend: Backend, options: ContextOptions) -> Option<Self> {
        init_logging();
        if !backend.is_available() {
            return None;
        }
        match backend {
            Backend::Dummy => {
                let caps = options.caps.clone().unwrap_or_else(Caps::default);
                let (gpu, log) = GpuBackend::dummy_with_log(caps);
                Some(Self {
                    backend,
                    context: Context::with_backend(gpu, options.with_backend(BackendType::Dummy)),
                    log: Some(log),
                })
            }
            Backend::Vulkan => {
                let context = Context::new(options.with_backend(BackendType::Vulkan)).ok()?;
                Some(Self {
                    backend,
                    context,
                    log: None,
                })
            }
        }
    }

    /// An RGBA surface with an upper-left origin.
    pub fn draw_context(&self, width: u32, height: u32, sample_count: u32) -> SurfaceDrawContext {
        SurfaceDrawContext::make(
            &self.context,
            ColorType::Rgba8888,
            width,
            height,
            sample_count,
            SurfaceOrigin::UpperLeft,
            SurfaceFlags::BUDGETED,
        )
        .expect("surface should be creatable")
    }

    /// Flush everything recorded on `sdc` and wait for it.
    pub fn flush(&mut self, sdc: &mut SurfaceDrawContext) {
        let fence = self
            .context
            .flush(vec![sdc.take_ops_task()])
            .expect("flush should succeed");
        fence.wait();
        assert!(fence.is_signaled());
    }

    /// Recorded commands matching `predicate`, or `None` off the dummy backend.
    #[allow(dead_code)]
    pub fn count_commands(&self, predicate: impl Fn(&RecordedCommand) -> bool) -> Option<usize> {
        self.log.as_ref().map(|log| log.count(predicate))
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
