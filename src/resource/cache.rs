//! Resource arena with scratch recycling and unique key lookup.
//!
//! Every GPU object the core creates lives in a [`ResourceCache`] slot and is
//! addressed by a generational [`ResourceHandle`]. The cache owns the
//! reference count; owning references are [`ResourceRef`](super::ResourceRef)
//! values.
//!
//! When the last reference goes away the resource is, in order of priority:
//!
//! 1. kept as purgeable and findable by its unique key, if it has one and is
//!    budgeted,
//! 2. parked in the scratch pool under its scratch key, if it has one and is
//!    budgeted,
//! 3. queued for destruction on the render thread.
//!
//! Purgeable resources are released oldest first once budgeted memory
//! exceeds the budget.

use std::collections::HashMap;

use crate::backend::{GpuResource, Recyclable};

use super::key::{ScratchKey, UniqueKey};

/// Generational index into the cache arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    index: u32,
    generation: u32,
}

impl ResourceHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Bookkeeping attributes of a new resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceDesc {
    pub label: String,
    pub budgeted: bool,
    pub scratch_key: Option<ScratchKey>,
    pub memory_size: u64,
}

#[derive(Debug)]
struct ResourceEntry {
    resource: GpuResource,
    ref_count: u32,
    budgeted: bool,
    scratch_key: Option<ScratchKey>,
    unique_key: Option<UniqueKey>,
    memory_size: u64,
    label: String,
    /// Timestamp of the transition to zero references.
    purgeable_since: u64,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<ResourceEntry>,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceCacheStats {
    pub scratch_hits: u64,
    pub unique_hits: u64,
    pub created: u64,
    pub released: u64,
    pub purged: u64,
}

/// The resource arena.
#[derive(Debug)]
pub struct ResourceCache {
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    scratch_pool: HashMap<ScratchKey, Vec<ResourceHandle>>,
    unique_map: HashMap<UniqueKey, ResourceHandle>,
    pending_destroy: Vec<GpuResource>,
    max_budget: u64,
    budgeted_bytes: u64,
    resource_count: usize,
    timestamp: u64,
    stats: ResourceCacheStats,
}

impl ResourceCache {
    pub fn new(max_budget: u64) -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            scratch_pool: HashMap::new(),
            unique_map: HashMap::new(),
            pending_destroy: Vec::new(),
            max_budget,
            budgeted_bytes: 0,
            resource_count: 0,
            timestamp: 0,
            stats: ResourceCacheStats::default(),
        }
    }

    // ========================================================================
    // Entries
    // ========================================================================

    fn entry(&self, handle: ResourceHandle) -> Option<&ResourceEntry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, handle: ResourceHandle) -> Option<&mut ResourceEntry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Add a resource with a reference count of one.
    pub fn insert(&mut self, resource: GpuResource, desc: ResourceDesc) -> ResourceHandle {
        let entry = ResourceEntry {
            resource,
            ref_count: 1,
            budgeted: desc.budgeted,
            scratch_key: desc.scratch_key,
            unique_key: None,
            memory_size: desc.memory_size,
            label: desc.label,
            purgeable_since: 0,
        };
        if entry.budgeted {
            self.budgeted_bytes += entry.memory_size;
        }
        log::trace!(
            "ResourceCache: insert {} '{}' ({} bytes, budgeted: {})",
            entry.resource.kind(),
            entry.label,
            entry.memory_size,
            entry.budgeted
        );

        let index = match self.free_slots.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.entry = Some(entry);
        self.resource_count += 1;
        self.stats.created += 1;
        ResourceHandle {
            index,
            generation: slot.generation,
        }
    }

    /// The backend object behind `handle`, if it is still alive.
    pub fn resource(&self, handle: ResourceHandle) -> Option<&GpuResource> {
        self.entry(handle).map(|e| &e.resource)
    }

    pub fn contains(&self, handle: ResourceHandle) -> bool {
        self.entry(handle).is_some()
    }

    pub fn ref_count(&self, handle: ResourceHandle) -> u32 {
        self.entry(handle).map_or(0, |e| e.ref_count)
    }

    pub fn is_budgeted(&self, handle: ResourceHandle) -> bool {
        self.entry(handle).is_some_and(|e| e.budgeted)
    }

    pub fn label(&self, handle: ResourceHandle) -> Option<&str> {
        self.entry(handle).map(|e| e.label.as_str())
    }

    /// Number of live resources, referenced or purgeable.
    pub fn len(&self) -> usize {
        self.resource_count
    }

    pub fn is_empty(&self) -> bool {
        self.resource_count == 0
    }

    /// Resources waiting in the scratch pool.
    pub fn scratch_count(&self) -> usize {
        self.scratch_pool.values().map(Vec::len).sum()
    }

    /// Resources with no references that are still cached.
    pub fn purgeable_count(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .filter(|e| e.ref_count == 0)
            .count()
    }

    pub fn budgeted_bytes(&self) -> u64 {
        self.budgeted_bytes
    }

    pub fn max_budget(&self) -> u64 {
        self.max_budget
    }

    pub fn set_max_budget(&mut self, bytes: u64) {
        self.max_budget = bytes;
        self.purge_as_needed();
    }

    pub fn stats(&self) -> ResourceCacheStats {
        self.stats
    }

    // ========================================================================
    // Reference counting
    // ========================================================================

    /// Add a reference. Stale handles are ignored.
    pub fn ref_resource(&mut self, handle: ResourceHandle) {
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        let was_purgeable = entry.ref_count == 0;
        entry.ref_count += 1;
        if was_purgeable {
            self.remove_from_scratch_pool(handle);
        }
    }

    /// Drop a reference, recycling or releasing the resource at zero.
    pub fn unref_resource(&mut self, handle: ResourceHandle) {
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        debug_assert!(entry.ref_count > 0, "unref of a resource with no references");
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            self.became_purgeable(handle);
        }
    }

    /// Drop a reference, running `recycler`'s hook first if it is the last
    /// one. Returns `true` if the hook ran.
    pub fn recycle<R: Recyclable + ?Sized>(&mut self, handle: ResourceHandle, recycler: &R) -> bool {
        let Some(entry) = self.entry(handle) else {
            return false;
        };
        let last = entry.ref_count == 1;
        if last {
            recycler.on_recycle(&entry.resource);
        }
        self.unref_resource(handle);
        last
    }

    fn became_purgeable(&mut self, handle: ResourceHandle) {
        self.timestamp += 1;
        let timestamp = self.timestamp;
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        entry.purgeable_since = timestamp;

        if entry.budgeted && entry.unique_key.is_some() {
            log::trace!("ResourceCache: '{}' kept by unique key", entry.label);
        } else if let (true, Some(key)) = (entry.budgeted, entry.scratch_key.clone()) {
            log::trace!("ResourceCache: '{}' returned to scratch pool", entry.label);
            self.scratch_pool.entry(key).or_default().push(handle);
        } else {
            self.release(handle);
            return;
        }
        self.purge_as_needed();
    }

    fn remove_from_scratch_pool(&mut self, handle: ResourceHandle) {
        let Some(key) = self.entry(handle).and_then(|e| e.scratch_key.clone()) else {
            return;
        };
        if let Some(handles) = self.scratch_pool.get_mut(&key) {
            handles.retain(|h| *h != handle);
            if handles.is_empty() {
                self.scratch_pool.remove(&key);
            }
        }
    }

    /// Free the slot and queue the backend object for destruction.
    fn release(&mut self, handle: ResourceHandle) {
        self.remove_from_scratch_pool(handle);
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return;
        };
        if slot.generation != handle.generation {
            return;
        }
        let Some(entry) = slot.entry.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(handle.index);

        if let Some(key) = &entry.unique_key {
            if self.unique_map.get(key) == Some(&handle) {
                self.unique_map.remove(key);
            }
        }
        if entry.budgeted {
            self.budgeted_bytes -= entry.memory_size;
        }
        log::trace!(
            "ResourceCache: release {} '{}'",
            entry.resource.kind(),
            entry.label
        );
        self.resource_count -= 1;
        self.stats.released += 1;
        self.pending_destroy.push(entry.resource);
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Take a pooled resource matching `key`, with a reference count of one.
    pub fn find_and_ref_scratch(&mut self, key: &ScratchKey) -> Option<ResourceHandle> {
        let handles = self.scratch_pool.get_mut(key)?;
        let handle = handles.pop()?;
        if handles.is_empty() {
            self.scratch_pool.remove(key);
        }
        if let Some(entry) = self.entry_mut(handle) {
            entry.ref_count = 1;
        }
        self.stats.scratch_hits += 1;
        Some(handle)
    }

    /// Add a reference to the resource carrying `key`.
    pub fn find_and_ref_unique(&mut self, key: &UniqueKey) -> Option<ResourceHandle> {
        let handle = *self.unique_map.get(key)?;
        self.ref_resource(handle);
        self.stats.unique_hits += 1;
        Some(handle)
    }

    pub fn has_unique_key(&self, key: &UniqueKey) -> bool {
        self.unique_map.contains_key(key)
    }

    pub fn unique_key(&self, handle: ResourceHandle) -> Option<&UniqueKey> {
        self.entry(handle).and_then(|e| e.unique_key.as_ref())
    }

    /// Give `handle` the unique key `key`, taking it from any other resource.
    pub fn assign_unique_key(&mut self, handle: ResourceHandle, key: UniqueKey) {
        if !self.contains(handle) {
            return;
        }
        if let Some(previous) = self.unique_map.get(&key).copied() {
            if previous == handle {
                return;
            }
            self.remove_unique_key(previous);
        }
        self.remove_unique_key(handle);
        if let Some(entry) = self.entry_mut(handle) {
            entry.unique_key = Some(key.clone());
        }
        self.unique_map.insert(key, handle);
    }

    /// Strip the unique key from `handle`. An unreferenced resource then
    /// follows the normal zero-reference rules.
    pub fn remove_unique_key(&mut self, handle: ResourceHandle) {
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        let Some(key) = entry.unique_key.take() else {
            return;
        };
        let unreferenced = entry.ref_count == 0;
        self.unique_map.remove(&key);
        if unreferenced {
            self.became_purgeable(handle);
        }
    }

    /// Strip `key` from whichever resource carries it.
    pub fn invalidate_unique_key(&mut self, key: &UniqueKey) {
        if let Some(handle) = self.unique_map.get(key).copied() {
            log::debug!("ResourceCache: invalidating unique key {:?}", key.tag());
            self.remove_unique_key(handle);
        }
    }

    // ========================================================================
    // Purging
    // ========================================================================

    /// Release purgeable resources, oldest first, until within budget.
    pub fn purge_as_needed(&mut self) {
        while self.budgeted_bytes > self.max_budget {
            let oldest = self
                .slots
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| {
                    let entry = slot.entry.as_ref()?;
                    (entry.ref_count == 0).then_some((
                        entry.purgeable_since,
                        ResourceHandle {
                            index: index as u32,
                            generation: slot.generation,
                        },
                    ))
                })
                .min_by_key(|(since, _)| *since);
            let Some((_, handle)) = oldest else {
                break;
            };
            self.release(handle);
            self.stats.purged += 1;
        }
    }

    /// Release every resource without references.
    pub fn purge_free_resources(&mut self) {
        let purgeable: Vec<ResourceHandle> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let entry = slot.entry.as_ref()?;
                (entry.ref_count == 0).then_some(ResourceHandle {
                    index: index as u32,
                    generation: slot.generation,
                })
            })
            .collect();
        if !purgeable.is_empty() {
            log::debug!("ResourceCache: purging {} free resources", purgeable.len());
        }
        for handle in purgeable {
            self.release(handle);
            self.stats.purged += 1;
        }
    }

    /// Release every resource regardless of references. Outstanding
    /// references become stale and are ignored afterwards.
    pub fn release_all(&mut self) {
        let live: Vec<ResourceHandle> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entry.is_some())
            .map(|(index, slot)| ResourceHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect();
        for handle in live {
            self.release(handle);
        }
    }

    /// Take the backend objects queued for destruction.
    pub fn take_pending_destroy(&mut self) -> Vec<GpuResource> {
        std::mem::take(&mut self.pending_destroy)
    }

    pub fn pending_destroy_count(&self) -> usize {
        self.pending_destroy.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuBuffer;
    use crate::types::{BufferDescriptor, BufferUsage};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn buffer(size: u64) -> GpuResource {
        GpuResource::Buffer(Arc::new(GpuBuffer::Dummy {
            id: 0,
            size,
            data: Mutex::new(vec![0; size as usize]),
        }))
    }

    fn desc(size: u64, budgeted: bool) -> ResourceDesc {
        ResourceDesc {
            label: "test".into(),
            budgeted,
            scratch_key: Some(ScratchKey::for_buffer(&BufferDescriptor::new(
                size,
                BufferUsage::VERTEX,
            ))),
            memory_size: size,
        }
    }

    fn unique(id: i32) -> UniqueKey {
        UniqueKey::new(7, |b| b.add_i32(id, "id"))
    }

    #[test]
    fn test_budgeted_scratch_resource_is_reused() {
        let mut cache = ResourceCache::new(1 << 20);
        let d = desc(256, true);
        let key = d.scratch_key.clone().unwrap();
        let handle = cache.insert(buffer(256), d);

        assert!(cache.find_and_ref_scratch(&key).is_none());
        cache.unref_resource(handle);
        assert_eq!(cache.scratch_count(), 1);
        assert!(cache.take_pending_destroy().is_empty());

        let found = cache.find_and_ref_scratch(&key).unwrap();
        assert_eq!(found, handle);
        assert_eq!(cache.ref_count(found), 1);
        assert_eq!(cache.scratch_count(), 0);
    }

    #[test]
    fn test_unbudgeted_resource_is_released() {
        let mut cache = ResourceCache::new(1 << 20);
        let d = desc(256, false);
        let key = d.scratch_key.clone().unwrap();
        let handle = cache.insert(buffer(256), d);
        cache.unref_resource(handle);

        assert!(cache.find_and_ref_scratch(&key).is_none());
        assert!(!cache.contains(handle));
        assert_eq!(cache.take_pending_destroy().len(), 1);
    }

    #[test]
    fn test_stale_handle_is_ignored() {
        let mut cache = ResourceCache::new(1 << 20);
        let handle = cache.insert(buffer(16), desc(16, false));
        cache.unref_resource(handle);
        let reused = cache.insert(buffer(16), desc(16, false));
        assert_eq!(reused.index(), handle.index());
        assert_ne!(reused.generation(), handle.generation());

        cache.ref_resource(handle);
        cache.unref_resource(handle);
        assert_eq!(cache.ref_count(reused), 1);
    }

    #[test]
    fn test_unique_key_keeps_resource_findable() {
        let mut cache = ResourceCache::new(1 << 20);
        let handle = cache.insert(buffer(64), desc(64, true));
        cache.assign_unique_key(handle, unique(1));
        cache.unref_resource(handle);

        assert_eq!(cache.scratch_count(), 0);
        assert_eq!(cache.purgeable_count(), 1);
        assert_eq!(cache.find_and_ref_unique(&unique(1)), Some(handle));
        assert_eq!(cache.ref_count(handle), 1);
    }

    #[test]
    fn test_unique_key_moves_between_resources() {
        let mut cache = ResourceCache::new(1 << 20);
        let a = cache.insert(buffer(64), desc(64, true));
        let b = cache.insert(buffer(64), desc(64, true));
        cache.assign_unique_key(a, unique(1));
        cache.assign_unique_key(b, unique(1));
        assert!(cache.unique_key(a).is_none());
        assert_eq!(cache.find_and_ref_unique(&unique(1)), Some(b));
    }

    #[test]
    fn test_invalidate_unreferenced_unique_resource() {
        let mut cache = ResourceCache::new(1 << 20);
        let handle = cache.insert(buffer(64), desc(64, true));
        cache.assign_unique_key(handle, unique(2));
        cache.unref_resource(handle);
        cache.invalidate_unique_key(&unique(2));

        assert!(!cache.has_unique_key(&unique(2)));
        // falls back to the scratch pool
        assert_eq!(cache.scratch_count(), 1);
    }

    #[test]
    fn test_purge_oldest_first() {
        let mut cache = ResourceCache::new(1 << 20);
        let a = cache.insert(buffer(100), desc(100, true));
        let b = cache.insert(buffer(200), desc(200, true));
        cache.unref_resource(a);
        cache.unref_resource(b);
        assert_eq!(cache.budgeted_bytes(), 300);

        cache.set_max_budget(250);
        assert!(!cache.contains(a));
        assert!(cache.contains(b));
        assert_eq!(cache.budgeted_bytes(), 200);

        cache.purge_free_resources();
        assert!(cache.is_empty());
        assert_eq!(cache.take_pending_destroy().len(), 2);
    }

    #[test]
    fn test_referenced_resources_are_never_purged() {
        let mut cache = ResourceCache::new(0);
        let handle = cache.insert(buffer(100), desc(100, true));
        cache.purge_as_needed();
        assert!(cache.contains(handle));
        cache.unref_resource(handle);
        assert!(!cache.contains(handle));
    }

    #[test]
    fn test_release_all() {
        let mut cache = ResourceCache::new(1 << 20);
        let handle = cache.insert(buffer(8), desc(8, true));
        cache.release_all();
        assert!(cache.is_empty());
        cache.unref_resource(handle);
        assert_eq!(cache.take_pending_destroy().len(), 1);
    }

    #[derive(Default)]
    struct CountingRecycler(std::sync::atomic::AtomicU32);

    impl Recyclable for CountingRecycler {
        fn on_recycle(&self, _resource: &GpuResource) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    impl CountingRecycler {
        fn count(&self) -> u32 {
            self.0.load(std::sync::atomic::Ordering::Relaxed)
        }
    }

    #[test]
    fn test_recycle_hook_runs_for_last_reference_only() {
        let mut cache = ResourceCache::new(1 << 20);
        let recycler = CountingRecycler::default();
        let handle = cache.insert(buffer(128), desc(128, true));
        cache.ref_resource(handle);

        assert!(!cache.recycle(handle, &recycler));
        assert_eq!(recycler.count(), 0);
        assert_eq!(cache.ref_count(handle), 1);

        assert!(cache.recycle(handle, &recycler));
        assert_eq!(recycler.count(), 1);
        assert_eq!(cache.ref_count(handle), 0);
        assert_eq!(cache.scratch_count(), 1);

        assert!(!cache.recycle(handle, &recycler));
        assert_eq!(recycler.count(), 1);
    }

    #[test]
    fn test_recycle_through_shared_references() {
        let cache: crate::resource::SharedResourceCache =
            Arc::new(Mutex::new(ResourceCache::new(1 << 20)));
        let recycler = CountingRecycler::default();
        let handle = cache.lock().insert(buffer(64), desc(64, true));
        let first = crate::resource::ResourceRef::adopt(&cache, handle).unwrap();
        let second = first.clone();

        assert!(!first.recycle(&recycler));
        assert_eq!(cache.lock().ref_count(handle), 1);
        assert!(second.recycle(&recycler));
        assert_eq!(recycler.count(), 1);
        assert_eq!(cache.lock().scratch_count(), 1);
    }
}
