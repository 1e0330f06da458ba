use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::backend::GpuTexture;
use crate::resource::{ResourceProvider, ResourceRef, UniqueKey};
use crate::types::{SurfaceFlags, TextureDescriptor, TextureFormat, TextureUsage};

/// Minimum backing dimension of a loose-fit proxy.
const MIN_LOOSE_FIT_SIZE: u32 = 16;

/// Backing dimension for a requested dimension under `LOOSE_FIT`: the next
/// power of two, at least 16.
pub fn loose_fit_size(size: u32) -> u32 {
    size.max(MIN_LOOSE_FIT_SIZE).next_power_of_two()
}

/// Lifecycle of a proxy's backing texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStateKind {
    /// No backing texture yet.
    Virtual,
    /// Backed by a cache resource.
    Instantiated,
    /// Backing dropped; the proxy can no longer be used.
    Released,
}

enum ProxyState {
    Virtual,
    Instantiated(ResourceRef),
    Released,
}

static NEXT_PROXY_ID: AtomicU32 = AtomicU32::new(1);

/// Deferred handle to a texture that may not be allocated yet.
///
/// Created by a [`ProxyProvider`](super::ProxyProvider) and resolved to a
/// cache resource at flush time by [`instantiate`](Self::instantiate).
pub struct TextureProxy {
    id: u32,
    format: TextureFormat,
    width: u32,
    height: u32,
    sample_count: u32,
    flags: SurfaceFlags,
    unique_key: Mutex<Option<UniqueKey>>,
    state: Mutex<ProxyState>,
    /// Stencil buffer attached on the first render pass that needs one.
    stencil: Mutex<Option<ResourceRef>>,
}

impl TextureProxy {
    pub(crate) fn new(
        format: TextureFormat,
        width: u32,
        height: u32,
        sample_count: u32,
        flags: SurfaceFlags,
    ) -> Self {
        Self {
            id: NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed),
            format,
            width,
            height,
            sample_count,
            flags,
            unique_key: Mutex::new(None),
            state: Mutex::new(ProxyState::Virtual),
            stencil: Mutex::new(None),
        }
    }

    /// A proxy that is already backed by `texture`.
    pub(crate) fn wrap(texture: ResourceRef, flags: SurfaceFlags) -> Option<Self> {
        let desc = texture.texture()?.desc().clone();
        let mut flags = flags;
        if desc.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            flags |= SurfaceFlags::RENDERABLE;
        }
        let proxy = Self::new(desc.format, desc.width, desc.height, desc.sample_count, flags);
        *proxy.state.lock() = ProxyState::Instantiated(texture);
        Some(proxy)
    }

    /// Process-unique id, for logs.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width of the backing texture, which may exceed [`width`](Self::width)
    /// for loose-fit proxies.
    pub fn backing_width(&self) -> u32 {
        if self.flags.contains(SurfaceFlags::LOOSE_FIT) {
            loose_fit_size(self.width)
        } else {
            self.width
        }
    }

    pub fn backing_height(&self) -> u32 {
        if self.flags.contains(SurfaceFlags::LOOSE_FIT) {
            loose_fit_size(self.height)
        } else {
            self.height
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn flags(&self) -> SurfaceFlags {
        self.flags
    }

    pub fn is_renderable(&self) -> bool {
        self.flags.contains(SurfaceFlags::RENDERABLE)
    }

    pub fn is_budgeted(&self) -> bool {
        self.flags.contains(SurfaceFlags::BUDGETED)
    }

    /// True if the proxy was created by a deferred provider.
    pub fn is_deferred(&self) -> bool {
        self.flags.contains(SurfaceFlags::DEFERRED_PROVIDER)
    }

    pub fn unique_key(&self) -> Option<UniqueKey> {
        self.unique_key.lock().clone()
    }

    pub(crate) fn set_unique_key(&self, key: Option<UniqueKey>) {
        *self.unique_key.lock() = key;
    }

    pub fn state(&self) -> ProxyStateKind {
        match &*self.state.lock() {
            ProxyState::Virtual => ProxyStateKind::Virtual,
            ProxyState::Instantiated(_) => ProxyStateKind::Instantiated,
            ProxyState::Released => ProxyStateKind::Released,
        }
    }

    pub fn is_instantiated(&self) -> bool {
        self.state() == ProxyStateKind::Instantiated
    }

    /// Descriptor of the texture that backs this proxy.
    pub fn texture_descriptor(&self) -> TextureDescriptor {
        let mut usage = TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST;
        if self.is_renderable() {
            usage |= TextureUsage::RENDER_ATTACHMENT;
        }
        let mut desc = TextureDescriptor::new_2d(
            self.backing_width(),
            self.backing_height(),
            self.format,
            usage,
        )
        .with_sample_count(self.sample_count)
        .with_label(format!("TextureProxy#{}", self.id));
        if self.flags.contains(SurfaceFlags::MIPMAPPED) {
            desc.mip_level_count = desc.full_mip_count();
        }
        desc
    }

    /// Memory the backing texture uses, whether or not it exists yet.
    pub fn memory_size(&self) -> u64 {
        self.texture_descriptor().memory_size()
    }

    /// Resolve the proxy to a texture. Returns `false` if the proxy was
    /// released or the texture could not be created.
    pub fn instantiate(&self, provider: &ResourceProvider<'_>) -> bool {
        let mut state = self.state.lock();
        match &*state {
            ProxyState::Instantiated(_) => return true,
            ProxyState::Released => return false,
            ProxyState::Virtual => {}
        }

        let unique_key = self.unique_key();
        if let Some(key) = &unique_key {
            if let Some(existing) = provider.find_by_unique_key(key) {
                log::trace!("TextureProxy#{}: instantiated from unique key", self.id);
                *state = ProxyState::Instantiated(existing);
                return true;
            }
        }

        let desc = self.texture_descriptor();
        let use_scratch = !self.flags.contains(SurfaceFlags::SKIP_ALLOCATOR);
        match provider.find_or_create_texture(&desc, self.is_budgeted(), use_scratch) {
            Ok(texture) => {
                if let Some(key) = unique_key {
                    provider.assign_unique_key(&texture, key);
                }
                log::trace!(
                    "TextureProxy#{}: instantiated {}x{} {:?}",
                    self.id,
                    desc.width,
                    desc.height,
                    desc.format
                );
                *state = ProxyState::Instantiated(texture);
                true
            }
            Err(err) => {
                log::warn!("TextureProxy#{}: failed to instantiate: {}", self.id, err);
                false
            }
        }
    }

    /// The backing cache resource, if instantiated.
    pub fn resource(&self) -> Option<ResourceRef> {
        match &*self.state.lock() {
            ProxyState::Instantiated(resource) => Some(resource.clone()),
            _ => None,
        }
    }

    /// The backing texture, if instantiated.
    pub fn texture(&self) -> Option<Arc<GpuTexture>> {
        match &*self.state.lock() {
            ProxyState::Instantiated(resource) => resource.texture().cloned(),
            _ => None,
        }
    }

    /// Attach a stencil buffer matching the backing texture, or return the
    /// one attached earlier.
    ///
    /// Returns `None` if the proxy is not instantiated, no stencil format is
    /// renderable at its sample count, or the attachment cannot be created.
    pub fn find_or_create_stencil_attachment(&self, provider: &ResourceProvider<'_>) -> Option<Arc<GpuTexture>> {
        if !self.is_instantiated() {
            return None;
        }
        let mut stencil = self.stencil.lock();
        if let Some(attachment) = stencil.as_ref() {
            return attachment.texture().cloned();
        }

        let Some(format) = provider.device().caps().stencil_format(self.sample_count) else {
            log::warn!(
                "TextureProxy#{}: no stencil format at {} samples",
                self.id,
                self.sample_count
            );
            return None;
        };
        let desc = TextureDescriptor::new_2d(
            self.backing_width(),
            self.backing_height(),
            format,
            TextureUsage::RENDER_ATTACHMENT,
        )
        .with_sample_count(self.sample_count)
        .with_label(format!("TextureProxy#{}/stencil", self.id));
        match provider.find_or_create_texture(&desc, true, true) {
            Ok(attachment) => {
                log::trace!("TextureProxy#{}: attached {:?} stencil", self.id, format);
                let texture = attachment.texture().cloned();
                *stencil = Some(attachment);
                texture
            }
            Err(err) => {
                log::warn!("TextureProxy#{}: failed to create stencil: {}", self.id, err);
                None
            }
        }
    }

    /// The attached stencil buffer, if any.
    pub fn stencil_attachment(&self) -> Option<Arc<GpuTexture>> {
        self.stencil
            .lock()
            .as_ref()
            .and_then(|attachment| attachment.texture().cloned())
    }

    /// Drop the backing texture and stencil buffer for good.
    pub fn release(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), ProxyState::Released);
        let stencil = self.stencil.lock().take();
        drop(previous);
        drop(stencil);
    }
}

impl fmt::Debug for TextureProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureProxy")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sample_count", &self.sample_count)
            .field("flags", &self.flags)
            .field("state", &self.state())
            .finish()
    }
}
