//! Resource creation through the cache.

use std::sync::Arc;

use crate::backend::{GpuDevice, GpuResource};
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{BufferDescriptor, BufferUsage, TextureDescriptor};

use super::cache::ResourceDesc;
use super::key::{ScratchKey, UniqueKey};
use super::resource_ref::{ResourceRef, SharedResourceCache};

/// Quads covered by the shared quad index buffer.
pub const MAX_QUADS: u32 = 1 << 12;

/// Key domain of resources created by the provider itself.
const PROVIDER_DOMAIN: u32 = 0;

fn quad_index_key() -> UniqueKey {
    UniqueKey::new(PROVIDER_DOMAIN, |b| b.add_bits(8, 1, "quadIndexBuffer")).with_tag("QuadIndexBuffer")
}

/// Fill `indices` with two triangles per quad over vertices laid out
/// top-left, top-right, bottom-left, bottom-right.
pub fn write_quad_indices(indices: &mut [u16]) {
    for (quad, chunk) in indices.chunks_exact_mut(6).enumerate() {
        let base = (quad * 4) as u16;
        chunk.copy_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
    }
}

/// Finds pooled resources and creates new ones, registering them with the
/// cache.
pub struct ResourceProvider<'a> {
    device: &'a dyn GpuDevice,
    cache: &'a SharedResourceCache,
}

impl<'a> ResourceProvider<'a> {
    pub fn new(device: &'a dyn GpuDevice, cache: &'a SharedResourceCache) -> Self {
        Self { device, cache }
    }

    pub fn device(&self) -> &'a dyn GpuDevice {
        self.device
    }

    pub fn cache(&self) -> &'a SharedResourceCache {
        self.cache
    }

    /// Run `create`, and once more after purging free resources if the device
    /// ran out of memory.
    fn with_oom_retry<T>(&self, mut create: impl FnMut() -> GraphicsResult<T>) -> GraphicsResult<T> {
        match create() {
            Err(GraphicsError::OutOfMemory) => {
                log::warn!("ResourceProvider: out of memory, purging free resources and retrying");
                self.cache.lock().purge_free_resources();
                self.free_pending();
                create()
            }
            result => result,
        }
    }

    /// Register an externally created resource.
    pub fn insert(&self, resource: GpuResource, desc: ResourceDesc) -> GraphicsResult<ResourceRef> {
        let handle = self.cache.lock().insert(resource, desc);
        ResourceRef::adopt(self.cache, handle)
            .ok_or_else(|| GraphicsError::Internal("resource vanished after insert".into()))
    }

    /// Find a texture of matching shape in the scratch pool, or create one.
    ///
    /// Textures found or created with `use_scratch` unset are never taken
    /// from the pool.
    pub fn find_or_create_texture(
        &self,
        desc: &TextureDescriptor,
        budgeted: bool,
        use_scratch: bool,
    ) -> GraphicsResult<ResourceRef> {
        let scratch_key = ScratchKey::for_texture(desc);
        if use_scratch && budgeted {
            let found = self.cache.lock().find_and_ref_scratch(&scratch_key);
            if let Some(handle) = found {
                if let Some(texture) = ResourceRef::adopt(self.cache, handle) {
                    log::trace!("ResourceProvider: reusing scratch texture {}x{}", desc.width, desc.height);
                    return Ok(texture);
                }
            }
        }

        let texture = self.with_oom_retry(|| self.device.create_texture(desc))?;
        self.insert(
            GpuResource::Texture(Arc::new(texture)),
            ResourceDesc {
                label: desc.label.clone().unwrap_or_else(|| "texture".into()),
                budgeted,
                scratch_key: Some(scratch_key),
                memory_size: desc.memory_size(),
            },
        )
    }

    /// Find a buffer of matching size and usage in the scratch pool, or
    /// create one.
    pub fn find_or_create_buffer(
        &self,
        desc: &BufferDescriptor,
        budgeted: bool,
    ) -> GraphicsResult<ResourceRef> {
        let scratch_key = ScratchKey::for_buffer(desc);
        if budgeted {
            let found = self.cache.lock().find_and_ref_scratch(&scratch_key);
            if let Some(handle) = found {
                if let Some(buffer) = ResourceRef::adopt(self.cache, handle) {
                    return Ok(buffer);
                }
            }
        }

        let buffer = self.with_oom_retry(|| self.device.create_buffer(desc))?;
        self.insert(
            GpuResource::Buffer(Arc::new(buffer)),
            ResourceDesc {
                label: desc.label.clone().unwrap_or_else(|| "buffer".into()),
                budgeted,
                scratch_key: Some(scratch_key),
                memory_size: desc.size,
            },
        )
    }

    pub fn find_by_unique_key(&self, key: &UniqueKey) -> Option<ResourceRef> {
        let handle = self.cache.lock().find_and_ref_unique(key)?;
        ResourceRef::adopt(self.cache, handle)
    }

    pub fn assign_unique_key(&self, resource: &ResourceRef, key: UniqueKey) {
        self.cache.lock().assign_unique_key(resource.handle(), key);
    }

    /// The shared index buffer for drawing up to [`MAX_QUADS`] quads.
    pub fn find_or_create_quad_index_buffer(&self) -> GraphicsResult<ResourceRef> {
        let key = quad_index_key();
        if let Some(buffer) = self.find_by_unique_key(&key) {
            return Ok(buffer);
        }

        let mut indices = vec![0u16; MAX_QUADS as usize * 6];
        write_quad_indices(&mut indices);
        let desc = BufferDescriptor::new(
            (indices.len() * 2) as u64,
            BufferUsage::INDEX | BufferUsage::COPY_DST,
        )
        .with_label("QuadIndexBuffer");

        let buffer = self.with_oom_retry(|| self.device.create_buffer(&desc))?;
        self.device.write_buffer(&buffer, 0, bytemuck::cast_slice(&indices))?;
        let buffer = self.insert(
            GpuResource::Buffer(Arc::new(buffer)),
            ResourceDesc {
                label: "QuadIndexBuffer".into(),
                budgeted: true,
                scratch_key: None,
                memory_size: desc.size,
            },
        )?;
        self.assign_unique_key(&buffer, key);
        Ok(buffer)
    }

    /// Destroy backend objects released by the cache.
    pub fn free_pending(&self) {
        // the lock must be released before calling into the device
        let pending = self.cache.lock().take_pending_destroy();
        for resource in pending {
            self.device.destroy_resource(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use crate::caps::Caps;
    use crate::resource::ResourceCache;
    use crate::types::{TextureFormat, TextureUsage};
    use parking_lot::Mutex;

    fn setup() -> (DummyDevice, SharedResourceCache) {
        (
            DummyDevice::new(Caps::default()),
            Arc::new(Mutex::new(ResourceCache::new(1 << 24))),
        )
    }

    #[test]
    fn test_quad_indices() {
        let mut indices = [0u16; 12];
        write_quad_indices(&mut indices);
        assert_eq!(indices, [0, 1, 2, 2, 1, 3, 4, 5, 6, 6, 5, 7]);
    }

    #[test]
    fn test_texture_recycling() {
        let (device, cache) = setup();
        let provider = ResourceProvider::new(&device, &cache);
        let desc = TextureDescriptor::new_2d(
            32,
            32,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        );

        let first = provider.find_or_create_texture(&desc, true, true).unwrap();
        let handle = first.handle();
        drop(first);
        let second = provider.find_or_create_texture(&desc, true, true).unwrap();
        assert_eq!(second.handle(), handle);

        // SKIP_ALLOCATOR style lookups always create
        let third = provider.find_or_create_texture(&desc, true, false).unwrap();
        assert_ne!(third.handle(), handle);
        assert_eq!(device.created_textures(), 2);
    }

    #[test]
    fn test_unbudgeted_texture_is_destroyed() {
        let (device, cache) = setup();
        let provider = ResourceProvider::new(&device, &cache);
        let desc = TextureDescriptor::new_2d(8, 8, TextureFormat::R8Unorm, TextureUsage::TEXTURE_BINDING);
        drop(provider.find_or_create_texture(&desc, false, true).unwrap());
        provider.free_pending();
        assert_eq!(device.destroyed_resources(), 1);
        assert!(cache.lock().is_empty());
    }

    #[test]
    fn test_quad_index_buffer_is_shared() {
        let (device, cache) = setup();
        let provider = ResourceProvider::new(&device, &cache);
        let a = provider.find_or_create_quad_index_buffer().unwrap();
        let b = provider.find_or_create_quad_index_buffer().unwrap();
        assert!(a.ptr_eq(&b));
        drop((a, b));

        // still cached by its unique key
        let c = provider.find_or_create_quad_index_buffer().unwrap();
        let data = c.buffer().unwrap().dummy_contents().unwrap();
        assert_eq!(&data[..12], bytemuck::cast_slice::<u16, u8>(&[0, 1, 2, 2, 1, 3]));
        assert_eq!(device.created_buffers(), 1);
    }

    #[test]
    fn test_out_of_memory_retries_after_purge() {
        let (device, cache) = setup();
        let provider = ResourceProvider::new(&device, &cache);
        let desc = BufferDescriptor::new(64, BufferUsage::VERTEX);
        drop(provider.find_or_create_buffer(&desc, true).unwrap());
        assert_eq!(cache.lock().scratch_count(), 1);

        device.fail_next_allocations(1);
        let other = BufferDescriptor::new(128, BufferUsage::VERTEX);
        let created = provider.find_or_create_buffer(&other, true).unwrap();
        assert_eq!(created.buffer().unwrap().size(), 128);
        // the free buffer was purged to make room
        assert_eq!(cache.lock().scratch_count(), 0);
        assert_eq!(device.destroyed_resources(), 1);

        device.fail_next_allocations(2);
        assert_eq!(
            provider.find_or_create_buffer(&other, false).unwrap_err(),
            GraphicsError::OutOfMemory
        );
    }
}
