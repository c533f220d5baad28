use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use xxhash_rust::xxh3::Xxh3;

use crate::{
    error::{PicturaError, PicturaResult},
    model::{ImageId, Rendition},
};

/// Fast lookaside cache for resolved renditions. Entries are whole
/// [`Rendition`] records keyed by [`composite_cache_key`]; writes are
/// last-writer-wins with no versioning.
pub trait RenditionCache: Send + Sync {
    fn get(&self, key: u64) -> Option<Rendition>;
    fn set(&self, key: u64, rendition: &Rendition);
}

/// Hands out the cache backend once per orchestrated call. A misconfigured
/// deployment fails here with [`PicturaError::CacheUnavailable`], which
/// disables caching for the whole call; it is never surfaced to callers.
impl std::fmt::Debug for dyn RenditionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RenditionCache")
    }
}

pub trait CacheProvider: Send + Sync {
    fn acquire(&self) -> PicturaResult<Arc<dyn RenditionCache>>;
}

/// Key for one `(image, focal-point key, filter spec)` triple. Parts are
/// length-prefixed so adjacent fields cannot alias each other.
pub fn composite_cache_key(image_id: ImageId, focal_point_key: &str, filter_spec: &str) -> u64 {
    let mut h = Xxh3::new();
    h.update(&image_id.0.to_le_bytes());
    for part in [focal_point_key, filter_spec] {
        h.update(&(part.len() as u64).to_le_bytes());
        h.update(part.as_bytes());
    }
    h.digest()
}

/// Process-local cache backend.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<u64, Rendition>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RenditionCache for InMemoryCache {
    fn get(&self, key: u64) -> Option<Rendition> {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .get(&key)
            .cloned()
    }

    fn set(&self, key: u64, rendition: &Rendition) {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .insert(key, rendition.clone());
    }
}

/// Provider over a shared in-memory backend.
#[derive(Clone)]
pub struct InMemoryCacheProvider {
    cache: Arc<InMemoryCache>,
}

impl InMemoryCacheProvider {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(InMemoryCache::new()),
        }
    }

    pub fn backend(&self) -> Arc<InMemoryCache> {
        Arc::clone(&self.cache)
    }
}

impl Default for InMemoryCacheProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheProvider for InMemoryCacheProvider {
    fn acquire(&self) -> PicturaResult<Arc<dyn RenditionCache>> {
        Ok(Arc::clone(&self.cache) as Arc<dyn RenditionCache>)
    }
}

/// Deployment without a renditions cache. Acquisition always fails, so the
/// pipeline resolves every call through durable storage.
pub struct UnconfiguredCacheProvider;

impl CacheProvider for UnconfiguredCacheProvider {
    fn acquire(&self) -> PicturaResult<Arc<dyn RenditionCache>> {
        Err(PicturaError::cache_unavailable(
            "no renditions cache backend configured",
        ))
    }
}
