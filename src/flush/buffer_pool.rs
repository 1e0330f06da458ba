//! Per-flush sub-allocation of vertex, instance and uniform data.
//!
//! Ops write into host staging memory during prepare; the pool copies the
//! written ranges into the GPU buffers before the first render pass of the
//! flush executes.

use crate::backend::{GpuDevice, Recyclable};
use crate::error::GraphicsResult;
use crate::resource::{ResourceProvider, ResourceRef};
use crate::types::{BufferDescriptor, BufferUsage};

/// A range of a pooled GPU buffer.
///
/// Holding a slice keeps the whole buffer alive; the buffer goes back to the
/// scratch pool once the pool and every slice into it are dropped.
#[derive(Debug, Clone)]
pub struct BufferSlice {
    pub buffer: ResourceRef,
    pub offset: u64,
    pub size: u64,
}

struct PoolBlock {
    buffer: ResourceRef,
    staging: Vec<u8>,
    used: usize,
    flushed: usize,
}

/// Linear allocator over a chain of equally sized GPU buffers.
pub struct BufferPool {
    name: &'static str,
    usage: BufferUsage,
    block_size: u64,
    blocks: Vec<PoolBlock>,
}

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

impl BufferPool {
    pub fn new(name: &'static str, usage: BufferUsage, block_size: u64) -> Self {
        Self {
            name,
            usage: usage | BufferUsage::COPY_DST | BufferUsage::DYNAMIC,
            block_size: block_size.max(256),
            blocks: Vec::new(),
        }
    }

    /// Reserve `size` bytes aligned to `alignment`.
    ///
    /// Returns the GPU range and the staging bytes to fill, or `None` if a
    /// new block could not be allocated.
    pub fn make_space(
        &mut self,
        provider: &ResourceProvider<'_>,
        size: usize,
        alignment: usize,
    ) -> Option<(BufferSlice, &mut [u8])> {
        assert!(size > 0, "empty buffer request");
        let alignment = alignment.max(1);

        let fits = self.blocks.last().is_some_and(|block| {
            align_up(block.used, alignment) + size <= block.staging.len()
        });
        if !fits {
            let block_size = (self.block_size as usize).max(align_up(size, 256));
            let desc = BufferDescriptor::new(block_size as u64, self.usage)
                .with_label(format!("{}Block", self.name));
            let buffer = match provider.find_or_create_buffer(&desc, true) {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::error!("{}: failed to allocate a {} byte block: {}", self.name, block_size, err);
                    return None;
                }
            };
            log::trace!("{}: new {} byte block", self.name, block_size);
            self.blocks.push(PoolBlock {
                buffer,
                staging: vec![0; block_size],
                used: 0,
                flushed: 0,
            });
        }

        let block = self.blocks.last_mut()?;
        let offset = align_up(block.used, alignment);
        block.used = offset + size;
        let slice = BufferSlice {
            buffer: block.buffer.clone(),
            offset: offset as u64,
            size: size as u64,
        };
        Some((slice, &mut block.staging[offset..offset + size]))
    }

    /// Upload bytes written since the last flush. Returns the number of
    /// writes issued.
    pub fn flush(&mut self, device: &dyn GpuDevice) -> GraphicsResult<u32> {
        let mut uploads = 0;
        for block in &mut self.blocks {
            if block.used <= block.flushed {
                continue;
            }
            if let Some(buffer) = block.buffer.buffer() {
                device.write_buffer(buffer, block.flushed as u64, &block.staging[block.flushed..block.used])?;
                uploads += 1;
            }
            block.flushed = block.used;
        }
        Ok(uploads)
    }

    /// Give every block back. Blocks no slice refers to any more go through
    /// `recycler` before returning to the scratch pool; slices still held by
    /// ops keep their buffer alive. Returns the number of blocks recycled.
    pub fn reset<R: Recyclable + ?Sized>(&mut self, recycler: &R) -> usize {
        self.blocks
            .drain(..)
            .map(|block| block.buffer.recycle(recycler))
            .filter(|recycled| *recycled)
            .count()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes handed out since the last reset, including alignment padding.
    pub fn used_bytes(&self) -> u64 {
        self.blocks.iter().map(|block| block.used as u64).sum()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("name", &self.name)
            .field("block_size", &self.block_size)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

/// The three pools a flush draws from.
#[derive(Debug)]
pub struct BufferPools {
    pub vertex: BufferPool,
    pub instance: BufferPool,
    pub uniform: BufferPool,
}

impl BufferPools {
    pub fn new(vertex_block_size: u64, uniform_block_size: u64) -> Self {
        Self {
            vertex: BufferPool::new("VertexPool", BufferUsage::VERTEX, vertex_block_size),
            instance: BufferPool::new("InstancePool", BufferUsage::VERTEX, vertex_block_size),
            uniform: BufferPool::new("UniformPool", BufferUsage::UNIFORM, uniform_block_size),
        }
    }

    pub fn flush(&mut self, device: &dyn GpuDevice) -> GraphicsResult<u32> {
        Ok(self.vertex.flush(device)? + self.instance.flush(device)? + self.uniform.flush(device)?)
    }

    pub fn reset<R: Recyclable + ?Sized>(&mut self, recycler: &R) -> usize {
        self.vertex.reset(recycler) + self.instance.reset(recycler) + self.uniform.reset(recycler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyDevice;
    use crate::caps::Caps;
    use crate::resource::new_shared_cache;

    #[test]
    fn test_alignment_and_block_chaining() {
        let device = DummyDevice::new(Caps::default());
        let cache = new_shared_cache(1 << 24);
        let provider = ResourceProvider::new(&device, &cache);
        let mut pool = BufferPool::new("Test", BufferUsage::UNIFORM, 512);

        let (a, bytes) = pool.make_space(&provider, 64, 256).unwrap();
        bytes.fill(1);
        let (b, _) = pool.make_space(&provider, 64, 256).unwrap();
        assert_eq!((a.offset, b.offset), (0, 256));
        assert!(a.buffer.ptr_eq(&b.buffer));

        let (c, _) = pool.make_space(&provider, 64, 256).unwrap();
        assert_eq!(c.offset, 0);
        assert!(!c.buffer.ptr_eq(&a.buffer));
        assert_eq!(pool.block_count(), 2);

        let (big, _) = pool.make_space(&provider, 2000, 4).unwrap();
        assert_eq!(big.buffer.buffer().unwrap().size(), 2048);
    }

    #[test]
    fn test_flush_uploads_written_ranges() {
        let device = DummyDevice::new(Caps::default());
        let cache = new_shared_cache(1 << 24);
        let provider = ResourceProvider::new(&device, &cache);
        let mut pool = BufferPool::new("Test", BufferUsage::VERTEX, 256);

        let (slice, bytes) = pool.make_space(&provider, 4, 4).unwrap();
        bytes.copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(pool.flush(&device).unwrap(), 1);
        assert_eq!(pool.flush(&device).unwrap(), 0);

        let contents = slice.buffer.buffer().unwrap().dummy_contents().unwrap();
        assert_eq!(&contents[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_reset_returns_blocks_to_scratch() {
        let device = DummyDevice::new(Caps::default());
        let cache = new_shared_cache(1 << 24);
        let provider = ResourceProvider::new(&device, &cache);
        let mut pools = BufferPools::new(1024, 1024);

        let (slice, _) = pools.vertex.make_space(&provider, 16, 4).unwrap();
        assert_eq!(pools.reset(&device), 0);
        assert_eq!(cache.lock().scratch_count(), 0);
        drop(slice);
        assert_eq!(cache.lock().scratch_count(), 1);
        assert_eq!(device.recycled_resources(), 0);

        pools.vertex.make_space(&provider, 16, 4).unwrap();
        assert_eq!(device.created_buffers(), 1);
    }

    #[test]
    fn test_reset_recycles_unreferenced_blocks() {
        let device = DummyDevice::new(Caps::default());
        let cache = new_shared_cache(1 << 24);
        let provider = ResourceProvider::new(&device, &cache);
        let mut pools = BufferPools::new(1024, 1024);

        drop(pools.vertex.make_space(&provider, 16, 4).unwrap().0);
        drop(pools.uniform.make_space(&provider, 64, 256).unwrap().0);
        assert_eq!(pools.reset(&device), 2);
        assert_eq!(device.recycled_resources(), 2);
        assert_eq!(cache.lock().scratch_count(), 2);
        assert_eq!(pools.vertex.block_count(), 0);
    }
}
