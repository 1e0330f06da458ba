use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::caps::Caps;
use crate::config::{BackendType, ContextOptions};
use crate::proxy::ProxyProvider;

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

/// State shared between a direct context and the deferred contexts created
/// from it.
#[derive(Debug)]
pub struct ContextInfo {
    id: u32,
    backend: BackendType,
    caps: Caps,
    options: ContextOptions,
    discarded: AtomicBool,
}

impl ContextInfo {
    pub fn new(backend: BackendType, caps: Caps, options: ContextOptions) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            caps,
            options,
            discarded: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn backend(&self) -> BackendType {
        self.backend
    }

    pub fn caps(&self) -> &Caps {
        &self.caps
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// True once the device was lost or the context was abandoned. A
    /// discarded context refuses to create proxies or record work.
    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    pub fn discard(&self) {
        if !self.discarded.swap(true, Ordering::AcqRel) {
            log::warn!("Context#{}: discarded", self.id);
        }
    }
}

/// A context that can create proxies and record draws.
///
/// Implemented by [`Context`](crate::Context), which also executes work, and
/// by [`DeferredContext`](crate::DeferredContext), which only records it.
pub trait RecordingContext {
    fn info(&self) -> &Arc<ContextInfo>;

    fn proxy_provider(&self) -> &ProxyProvider;

    fn caps(&self) -> &Caps {
        self.info().caps()
    }

    fn is_discarded(&self) -> bool {
        self.info().is_discarded()
    }
}
