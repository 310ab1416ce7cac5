//! Device-side cache of uniquely keyed resources.
//!
//! The cache keeps immutable static buffers and keyed textures alive across
//! flushes so that producers can find them again by content key instead of
//! re-uploading.

use super::gpu::{GpuBuffer, GpuTexture};
use super::unique_key::UniqueKey;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Cache of keyed device resources owned by a direct context.
#[derive(Debug, Default)]
pub struct ResourceCache {
    /// Keyed textures that outlive the proxies which produced them.
    textures: FxHashMap<UniqueKey, Arc<GpuTexture>>,
    /// Immutable buffers shared by content key.
    static_buffers: FxHashMap<UniqueKey, Arc<GpuBuffer>>,
    /// Total bytes held in `static_buffers`.
    static_bytes: usize,
    /// Number of lookups that found a resource.
    hits: usize,
    /// Number of lookups that found nothing.
    misses: usize,
}

impl ResourceCache {
    /// Create a new empty cache.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a static buffer by key.
    pub fn find_static_buffer(&mut self, key: &UniqueKey) -> Option<Arc<GpuBuffer>> {
        let found = self.static_buffers.get(key).map(Arc::clone);
        self.record_lookup(found.is_some());
        found
    }

    /// Register an immutable buffer under `key`.
    pub fn insert_static_buffer(&mut self, key: UniqueKey, buffer: Arc<GpuBuffer>) {
        self.static_bytes += buffer.size();
        if let Some(previous) = self.static_buffers.insert(key, buffer) {
            self.static_bytes -= previous.size();
        }
    }

    /// Look up a keyed texture.
    pub fn find_texture(&mut self, key: &UniqueKey) -> Option<Arc<GpuTexture>> {
        let found = self.textures.get(key).map(Arc::clone);
        self.record_lookup(found.is_some());
        found
    }

    /// Bind `key` to `texture`, replacing any texture that held it.
    pub fn assign_texture_key(&mut self, key: UniqueKey, texture: Arc<GpuTexture>) {
        self.textures.insert(key, texture);
    }

    /// Drop the texture bound to `key`. Returns whether one was bound.
    pub fn remove_texture_key(&mut self, key: &UniqueKey) -> bool {
        self.textures.remove(key).is_some()
    }

    /// Drop static buffers that only the cache still references until the
    /// total falls within `budget`. Returns the number of buffers dropped.
    pub fn purge_unreferenced(&mut self, budget: usize) -> usize {
        if self.static_bytes <= budget {
            return 0;
        }
        let mut candidates: Vec<(UniqueKey, usize)> = self
            .static_buffers
            .iter()
            .filter(|(_, buffer)| Arc::strong_count(buffer) == 1)
            .map(|(key, buffer)| (key.clone(), buffer.size()))
            .collect();
        // Largest first.
        candidates.sort_by(|left, right| right.1.cmp(&left.1));

        let mut purged = 0;
        for (key, size) in candidates {
            if self.static_bytes <= budget {
                break;
            }
            self.static_buffers.remove(&key);
            self.static_bytes -= size;
            purged += 1;
        }
        purged
    }

    /// Clear all resources from the cache.
    pub fn clear_all(&mut self) {
        self.textures.clear();
        self.static_buffers.clear();
        self.static_bytes = 0;
        self.hits = 0;
        self.misses = 0;
    }

    /// Bytes held by static buffers.
    #[inline]
    pub const fn static_buffer_bytes(&self) -> usize {
        self.static_bytes
    }

    /// Number of static buffers.
    #[inline]
    pub fn static_buffer_count(&self) -> usize {
        self.static_buffers.len()
    }

    /// Number of keyed textures.
    #[inline]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Get the number of cache hits.
    #[inline]
    pub const fn hits(&self) -> usize {
        self.hits
    }

    /// Get the number of cache misses.
    #[inline]
    pub const fn misses(&self) -> usize {
        self.misses
    }

    /// Get the cache hit rate as a percentage.
    #[inline]
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f32 / total as f32) * 100.0
        }
    }

    fn record_lookup(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::gpu::{AccessPattern, BufferDesc, BufferKind, GpuResourceId};
    use crate::resource::unique_key::{KeyDomain, KeyReuse};

    fn buffer(size: usize) -> Arc<GpuBuffer> {
        let desc = BufferDesc {
            size,
            kind: BufferKind::Vertex,
            access: AccessPattern::Static,
        };
        Arc::new(GpuBuffer::new(GpuResourceId::next(), desc, ()))
    }

    fn key(domain: KeyDomain, word: u32) -> UniqueKey {
        UniqueKey::builder(domain).push_u32(word).finish()
    }

    /// # Panics
    /// Panics if statistics are not tracked per lookup.
    #[test]
    fn lookup_statistics() {
        let domain = KeyDomain::generate(KeyReuse::InvalidateOnCollision);
        let mut cache = ResourceCache::new();
        assert!(cache.find_static_buffer(&key(domain, 1)).is_none());
        cache.insert_static_buffer(key(domain, 1), buffer(64));
        assert!(cache.find_static_buffer(&key(domain, 1)).is_some());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert!((cache.hit_rate() - 50.0).abs() < 0.01);
    }

    /// # Panics
    /// Panics if byte accounting drifts when a key is replaced.
    #[test]
    fn replacing_keeps_byte_count() {
        let domain = KeyDomain::generate(KeyReuse::InvalidateOnCollision);
        let mut cache = ResourceCache::new();
        cache.insert_static_buffer(key(domain, 1), buffer(64));
        cache.insert_static_buffer(key(domain, 1), buffer(32));
        assert_eq!(cache.static_buffer_bytes(), 32);
        assert_eq!(cache.static_buffer_count(), 1);
    }

    /// # Panics
    /// Panics if a referenced buffer is purged or the budget is not honored.
    #[test]
    fn purge_skips_referenced_buffers() {
        let domain = KeyDomain::generate(KeyReuse::InvalidateOnCollision);
        let mut cache = ResourceCache::new();
        let held = buffer(100);
        cache.insert_static_buffer(key(domain, 1), Arc::clone(&held));
        cache.insert_static_buffer(key(domain, 2), buffer(50));
        cache.insert_static_buffer(key(domain, 3), buffer(10));

        let purged = cache.purge_unreferenced(110);
        assert_eq!(purged, 1);
        assert_eq!(cache.static_buffer_bytes(), 110);
        assert!(cache.find_static_buffer(&key(domain, 1)).is_some());
        assert!(cache.find_static_buffer(&key(domain, 2)).is_none());
    }

    /// # Panics
    /// Panics if `clear_all` leaves anything behind.
    #[test]
    fn clear_all() {
        let domain = KeyDomain::generate(KeyReuse::InvalidateOnCollision);
        let mut cache = ResourceCache::new();
        cache.insert_static_buffer(key(domain, 1), buffer(8));
        cache.clear_all();
        assert_eq!(cache.static_buffer_count(), 0);
        assert_eq!(cache.static_buffer_bytes(), 0);
        assert_eq!(cache.texture_count(), 0);
    }
}
