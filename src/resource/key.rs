//! Scratch and unique resource keys.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::key::{KeyBuilder, StorageKey};
use crate::types::{BufferDescriptor, TextureDescriptor};

const RESOURCE_TYPE_TEXTURE: u32 = 1;
const RESOURCE_TYPE_BUFFER: u32 = 2;

/// Shape key under which released resources are pooled for reuse.
///
/// Two resources with equal scratch keys are interchangeable. Budgeting is
/// not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScratchKey(StorageKey);

impl ScratchKey {
    pub fn for_texture(desc: &TextureDescriptor) -> Self {
        let mut b = KeyBuilder::new();
        b.add_bits(4, RESOURCE_TYPE_TEXTURE, "resourceType");
        b.add_bits(5, desc.format.index(), "format");
        b.add_bits(5, desc.sample_count, "sampleCount");
        b.add_bits(6, desc.mip_level_count, "mipLevelCount");
        b.add_bits(8, desc.usage.bits(), "usage");
        b.add_bits(32, desc.width, "width");
        b.add_bits(32, desc.height, "height");
        Self(b.finish())
    }

    pub fn for_buffer(desc: &BufferDescriptor) -> Self {
        let mut b = KeyBuilder::new();
        b.add_bits(4, RESOURCE_TYPE_BUFFER, "resourceType");
        b.add_bits(8, desc.usage.bits(), "usage");
        b.flush();
        b.add_bits(32, desc.size as u32, "sizeLo");
        b.add_bits(32, (desc.size >> 32) as u32, "sizeHi");
        Self(b.finish())
    }

    pub fn storage_key(&self) -> &StorageKey {
        &self.0
    }
}

/// Caller assigned identity of a resource or proxy.
///
/// Equality and hashing cover the domain and the key words; the tag is a
/// debugging aid only.
#[derive(Debug, Clone)]
pub struct UniqueKey {
    domain: u32,
    key: StorageKey,
    tag: Option<&'static str>,
}

static NEXT_DOMAIN: AtomicU32 = AtomicU32::new(1);

impl UniqueKey {
    /// Allocate a fresh key domain. Keys from different domains never match.
    pub fn generate_domain() -> u32 {
        NEXT_DOMAIN.fetch_add(1, Ordering::Relaxed)
    }

    /// Build a key in `domain` from the fields written by `build`.
    pub fn new(domain: u32, build: impl FnOnce(&mut KeyBuilder)) -> Self {
        let mut b = KeyBuilder::new();
        build(&mut b);
        Self {
            domain,
            key: b.finish(),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn domain(&self) -> u32 {
        self.domain
    }

    pub fn tag(&self) -> Option<&'static str> {
        self.tag
    }

    pub fn storage_key(&self) -> &StorageKey {
        &self.key
    }
}

impl PartialEq for UniqueKey {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain && self.key == other.key
    }
}

impl Eq for UniqueKey {}

impl Hash for UniqueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.domain.hash(state);
        self.key.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, TextureFormat, TextureUsage};

    #[test]
    fn test_texture_scratch_key_shape() {
        let usage = TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING;
        let a = TextureDescriptor::new_2d(64, 32, TextureFormat::Rgba8Unorm, usage);
        let labeled = a.clone().with_label("other");
        assert_eq!(ScratchKey::for_texture(&a), ScratchKey::for_texture(&labeled));

        let wider = TextureDescriptor::new_2d(65, 32, TextureFormat::Rgba8Unorm, usage);
        let msaa = a.clone().with_sample_count(4);
        assert_ne!(ScratchKey::for_texture(&a), ScratchKey::for_texture(&wider));
        assert_ne!(ScratchKey::for_texture(&a), ScratchKey::for_texture(&msaa));
    }

    #[test]
    fn test_buffer_and_texture_keys_differ() {
        let buffer = BufferDescriptor::new(64, BufferUsage::VERTEX);
        let texture = TextureDescriptor::new_2d(64, 0, TextureFormat::R8Unorm, TextureUsage::empty());
        assert_ne!(ScratchKey::for_buffer(&buffer), ScratchKey::for_texture(&texture));
    }

    #[test]
    fn test_unique_key_ignores_tag() {
        let domain = UniqueKey::generate_domain();
        let a = UniqueKey::new(domain, |b| b.add_i32(7, "id")).with_tag("first");
        let b = UniqueKey::new(domain, |b| b.add_i32(7, "id"));
        assert_eq!(a, b);

        let other_domain = UniqueKey::generate_domain();
        assert_ne!(a, UniqueKey::new(other_domain, |b| b.add_i32(7, "id")));
    }
}
