//! GPU resource ownership.
//!
//! Resources live in a handle arena ([`ResourceCache`]) and are owned through
//! reference counted [`ResourceRef`]s. Released resources with a
//! [`ScratchKey`] are pooled and handed out again for requests of the same
//! shape; resources with a [`UniqueKey`] stay findable by identity.
//!
//! # Example
//!
//! ```ignore
//! let provider = ResourceProvider::new(device, &cache);
//! let texture = provider.find_or_create_texture(&desc, true, true)?;
//! drop(texture); // back to the scratch pool
//! let again = provider.find_or_create_texture(&desc, true, true)?; // same texture
//! ```

mod cache;
mod key;
mod provider;
mod resource_ref;

pub use cache::{ResourceCache, ResourceCacheStats, ResourceDesc, ResourceHandle};
pub use key::{ScratchKey, UniqueKey};
pub use provider::{MAX_QUADS, ResourceProvider, write_quad_indices};
pub use resource_ref::{ResourceRef, SharedResourceCache};

use std::sync::Arc;

use parking_lot::Mutex;

/// Create an empty shared cache with the given budget.
pub fn new_shared_cache(max_budget: u64) -> SharedResourceCache {
    Arc::new(Mutex::new(ResourceCache::new(max_budget)))
}
