use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::context::ContextInfo;
use crate::resource::{ResourceRef, SharedResourceCache, UniqueKey};
use crate::types::{SurfaceFlags, TextureFormat};

use super::TextureProxy;

/// Factory and unique key registry for texture proxies.
///
/// A direct provider belongs to a [`Context`](crate::Context) and can see its
/// resource cache. A deferred provider belongs to a
/// [`DeferredContext`](crate::DeferredContext); its proxies carry
/// [`SurfaceFlags::DEFERRED_PROVIDER`] and are instantiated later by the
/// direct context that replays them.
///
/// The provider holds only weak references to keyed proxies.
pub struct ProxyProvider {
    info: Arc<ContextInfo>,
    cache: Option<SharedResourceCache>,
    unique_proxies: Mutex<HashMap<UniqueKey, Weak<TextureProxy>>>,
}

impl ProxyProvider {
    pub(crate) fn new_direct(info: Arc<ContextInfo>, cache: SharedResourceCache) -> Self {
        Self {
            info,
            cache: Some(cache),
            unique_proxies: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn new_deferred(info: Arc<ContextInfo>) -> Self {
        Self {
            info,
            cache: None,
            unique_proxies: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_deferred_provider(&self) -> bool {
        self.cache.is_none()
    }

    fn prepare_flags(&self, mut flags: SurfaceFlags) -> SurfaceFlags {
        if self.is_deferred_provider() {
            flags |= SurfaceFlags::DEFERRED_PROVIDER;
        } else {
            assert!(
                !flags.contains(SurfaceFlags::DEFERRED_PROVIDER),
                "DEFERRED_PROVIDER is reserved for deferred providers"
            );
        }
        flags
    }

    /// Create a sampled texture proxy, or `None` if the context is discarded,
    /// the format is compressed or the caps reject the parameters.
    pub fn create_texture_proxy(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
        flags: SurfaceFlags,
    ) -> Option<Arc<TextureProxy>> {
        if self.info.is_discarded() {
            return None;
        }
        if format.is_compressed() {
            log::debug!("ProxyProvider: compressed formats cannot be deferred");
            return None;
        }
        let flags = self.prepare_flags(flags);
        if !self
            .info
            .caps()
            .validate_surface_params(width, height, format, 1, flags)
        {
            return None;
        }
        Some(Arc::new(TextureProxy::new(format, width, height, 1, flags)))
    }

    /// Create a renderable texture proxy. `sample_count` is rounded up to the
    /// nearest supported count.
    pub fn create_render_texture_proxy(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
        sample_count: u32,
        flags: SurfaceFlags,
    ) -> Option<Arc<TextureProxy>> {
        if self.info.is_discarded() {
            return None;
        }
        if format.is_compressed() {
            return None;
        }
        let flags = self.prepare_flags(flags) | SurfaceFlags::RENDERABLE;
        let caps = self.info.caps();
        let sample_count = caps.render_target_sample_count(sample_count, format);
        if sample_count == 0 {
            return None;
        }
        if !caps.validate_surface_params(width, height, format, sample_count, flags) {
            return None;
        }
        Some(Arc::new(TextureProxy::new(
            format,
            width,
            height,
            sample_count,
            flags,
        )))
    }

    /// Register `proxy` under `key` for [`find_proxy_by_unique_key`].
    ///
    /// Returns `false` if the context is discarded or no proxy is given.
    ///
    /// # Panics
    ///
    /// Panics if a live proxy already holds `key`, if the proxy came from a
    /// different kind of provider, or if a cached resource already carries
    /// `key`.
    ///
    /// [`find_proxy_by_unique_key`]: Self::find_proxy_by_unique_key
    pub fn assign_unique_key_to_proxy(&self, key: UniqueKey, proxy: Option<&Arc<TextureProxy>>) -> bool {
        if self.info.is_discarded() {
            return false;
        }
        let Some(proxy) = proxy else {
            return false;
        };
        assert_eq!(
            self.is_deferred_provider(),
            proxy.is_deferred(),
            "proxy was created by a different kind of provider"
        );

        let mut unique_proxies = self.unique_proxies.lock();
        if unique_proxies
            .get(&key)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            unique_proxies.remove(&key);
        }
        assert!(
            !unique_proxies.contains_key(&key),
            "unique key is already assigned to a live proxy"
        );

        if let Some(cache) = &self.cache {
            let resource = proxy.resource();
            let mut guard = cache.lock();
            assert!(
                !guard.has_unique_key(&key),
                "a cached resource already carries this unique key"
            );
            if let Some(resource) = &resource {
                guard.assign_unique_key(resource.handle(), key.clone());
            }
            // the cache lock must not be held while a reference drops
            drop(guard);
            drop(resource);
        }

        proxy.set_unique_key(Some(key.clone()));
        unique_proxies.insert(key, Arc::downgrade(proxy));
        true
    }

    /// The live proxy registered under `key`.
    pub fn find_proxy_by_unique_key(&self, key: &UniqueKey) -> Option<Arc<TextureProxy>> {
        let mut unique_proxies = self.unique_proxies.lock();
        let proxy = unique_proxies.get(key)?.upgrade();
        if proxy.is_none() {
            unique_proxies.remove(key);
        }
        proxy
    }

    /// The proxy registered under `key`, or a new instantiated proxy wrapping
    /// a cached resource carrying `key`.
    pub fn find_or_create_proxy_by_unique_key(&self, key: &UniqueKey) -> Option<Arc<TextureProxy>> {
        if self.info.is_discarded() {
            return None;
        }
        if let Some(proxy) = self.find_proxy_by_unique_key(key) {
            return Some(proxy);
        }
        let cache = self.cache.as_ref()?;
        let handle = cache.lock().find_and_ref_unique(key)?;
        let resource = ResourceRef::adopt(cache, handle)?;
        let flags = SurfaceFlags::BUDGETED;
        let proxy = Arc::new(TextureProxy::wrap(resource, flags)?);
        proxy.set_unique_key(Some(key.clone()));
        self.unique_proxies
            .lock()
            .insert(key.clone(), Arc::downgrade(&proxy));
        Some(proxy)
    }

    /// Remove the proxy's unique key and invalidate it on the cached resource.
    pub fn remove_unique_key_from_proxy(&self, proxy: &Arc<TextureProxy>) {
        if let Some(key) = proxy.unique_key() {
            self.process_invalid_unique_key(&key, Some(proxy), true);
        }
    }

    /// Forget `key`. The key is stripped from `proxy`, or from the registered
    /// proxy if none is given, and optionally from the cached resource.
    pub fn process_invalid_unique_key(
        &self,
        key: &UniqueKey,
        proxy: Option<&Arc<TextureProxy>>,
        invalidate_resource: bool,
    ) {
        let registered = self
            .unique_proxies
            .lock()
            .remove(key)
            .and_then(|weak| weak.upgrade());
        if let Some(proxy) = proxy.cloned().or(registered) {
            proxy.set_unique_key(None);
        }
        if invalidate_resource {
            if let Some(cache) = &self.cache {
                cache.lock().invalidate_unique_key(key);
            }
        }
    }

    /// Number of registered keys, including entries of dropped proxies not
    /// yet pruned.
    pub fn unique_key_count(&self) -> usize {
        self.unique_proxies.lock().len()
    }
}

impl std::fmt::Debug for ProxyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyProvider")
            .field("deferred", &self.is_deferred_provider())
            .field("unique_keys", &self.unique_key_count())
            .finish()
    }
}
