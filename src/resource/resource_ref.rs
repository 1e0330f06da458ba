use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{GpuBuffer, GpuPipeline, GpuResource, GpuTexture, Recyclable};

use super::cache::{ResourceCache, ResourceHandle};

/// The resource cache shared between the context, proxies and references.
pub type SharedResourceCache = Arc<Mutex<ResourceCache>>;

/// Owning reference to a cached resource.
///
/// Cloning adds a reference and dropping removes one; both lock the cache.
/// A reference must never be dropped while the cache lock is held.
pub struct ResourceRef {
    cache: SharedResourceCache,
    handle: ResourceHandle,
    resource: GpuResource,
    /// Cleared once the reference was given back through `recycle`.
    counted: bool,
}

impl ResourceRef {
    /// Adopt a reference the cache already counted for the caller.
    pub(crate) fn adopt(cache: &SharedResourceCache, handle: ResourceHandle) -> Option<Self> {
        let resource = cache.lock().resource(handle)?.clone();
        Some(Self {
            cache: Arc::clone(cache),
            handle,
            resource,
            counted: true,
        })
    }

    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }

    pub fn resource(&self) -> &GpuResource {
        &self.resource
    }

    pub fn texture(&self) -> Option<&Arc<GpuTexture>> {
        self.resource.as_texture()
    }

    pub fn buffer(&self) -> Option<&Arc<GpuBuffer>> {
        self.resource.as_buffer()
    }

    pub fn pipeline(&self) -> Option<&Arc<GpuPipeline>> {
        self.resource.as_pipeline()
    }

    /// Current reference count, including this one.
    pub fn ref_count(&self) -> u32 {
        self.cache.lock().ref_count(self.handle)
    }

    /// True if this is the only reference.
    pub fn is_unique(&self) -> bool {
        self.ref_count() == 1
    }

    /// Give the resource back. If this is the only reference the backend's
    /// recycle hook runs first, otherwise this is a plain unref. Returns
    /// `true` if the hook ran.
    ///
    /// The check and the hook run under one cache lock, so no other thread
    /// can take a reference in between.
    pub fn recycle<R: Recyclable + ?Sized>(mut self, recycler: &R) -> bool {
        self.counted = false;
        self.cache.lock().recycle(self.handle, recycler)
    }

    /// True if both references name the same cache entry.
    pub fn ptr_eq(&self, other: &ResourceRef) -> bool {
        self.handle == other.handle && Arc::ptr_eq(&self.cache, &other.cache)
    }
}

impl Clone for ResourceRef {
    fn clone(&self) -> Self {
        self.cache.lock().ref_resource(self.handle);
        Self {
            cache: Arc::clone(&self.cache),
            handle: self.handle,
            resource: self.resource.clone(),
            counted: true,
        }
    }
}

impl Drop for ResourceRef {
    fn drop(&mut self) {
        if self.counted {
            self.cache.lock().unref_resource(self.handle);
        }
    }
}

impl fmt::Debug for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRef")
            .field("handle", &self.handle)
            .field("kind", &self.resource.kind())
            .finish()
    }
}
