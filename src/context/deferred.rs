use std::sync::Arc;

use crate::proxy::ProxyProvider;

use super::info::{ContextInfo, RecordingContext};

/// A recording-only context, typically used off the render thread.
///
/// It shares caps and the discarded state with the [`Context`](super::Context)
/// it came from, but has no access to the resource cache: its proxies are
/// instantiated when the owning context flushes tasks that use them.
#[derive(Debug)]
pub struct DeferredContext {
    info: Arc<ContextInfo>,
    proxy_provider: ProxyProvider,
}

impl DeferredContext {
    pub(crate) fn new(info: Arc<ContextInfo>) -> Self {
        let proxy_provider = ProxyProvider::new_deferred(Arc::clone(&info));
        Self {
            info,
            proxy_provider,
        }
    }
}

impl RecordingContext for DeferredContext {
    fn info(&self) -> &Arc<ContextInfo> {
        &self.info
    }

    fn proxy_provider(&self) -> &ProxyProvider {
        &self.proxy_provider
    }
}
