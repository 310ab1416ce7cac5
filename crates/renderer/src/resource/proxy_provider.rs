//! Authoritative index from unique keys to texture proxies.
//!
//! The index holds weak references: it makes a proxy discoverable by key but
//! never keeps it alive. Once the last task or client drops a proxy, lookups
//! fall through to the device-side resource cache, which can rewrap the
//! texture in a fresh proxy.

use super::provider::ResourceProvider;
use super::proxy::{AllocatorPolicy, InstantiationState, ProxyRef, ResourceProxy};
use super::unique_key::{KeyReuse, UniqueKey};
use log::debug;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Weak};

/// Whether invalidating a key also drops the device-side cached texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateGpuResource {
    No,
    Yes,
}

/// Owner of the unique-key index for texture proxies.
#[derive(Debug, Default)]
pub struct ProxyProvider {
    /// Key to proxy; entries whose proxy is gone are pruned lazily.
    keyed: FxHashMap<UniqueKey, Weak<ResourceProxy>>,
}

impl ProxyProvider {
    /// Create a new empty index.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `proxy`.
    ///
    /// Fails if the key is invalid, the proxy is not a texture, the proxy has
    /// failed, the proxy already carries a different key, or the key's domain is
    /// exclusive and another live proxy holds it. Otherwise any previous proxy
    /// for the key loses it.
    pub fn assign_unique_key_to_proxy(
        &mut self,
        key: &UniqueKey,
        proxy: &ProxyRef,
        resources: Option<&ResourceProvider>,
    ) -> bool {
        if !key.is_valid() || !proxy.is_texture() || proxy.state() == InstantiationState::Failed {
            return false;
        }
        if proxy.unique_key().is_some_and(|existing| existing != *key) {
            return false;
        }
        if let Some(previous) = self.find_proxy_by_unique_key(key) {
            if Arc::ptr_eq(&previous, proxy) {
                return true;
            }
            if key.domain().reuse() == KeyReuse::Exclusive {
                return false;
            }
            debug!(target: "renderer", "{key:?} moves from '{}' to '{}'", previous.label(), proxy.label());
            previous.set_unique_key(None);
        }

        self.keyed.insert(key.clone(), Arc::downgrade(proxy));
        proxy.set_unique_key(Some(key.clone()));
        if let (Some(provider), Some(texture)) = (resources, proxy.peek_texture()) {
            provider.assign_unique_key_to_texture(key, &texture);
        }
        true
    }

    /// Remove `proxy`'s key from the index and from the device-side cache,
    /// so the key no longer finds a resource. The proxy keeps its backing.
    pub fn remove_unique_key_from_proxy(
        &mut self,
        proxy: &ProxyRef,
        resources: Option<&ResourceProvider>,
    ) {
        let Some(key) = proxy.unique_key() else {
            return;
        };
        if let Some(provider) = resources {
            provider.invalidate_unique_key(&key);
        }
        let points_here = self
            .keyed
            .get(&key)
            .and_then(Weak::upgrade)
            .is_none_or(|found| Arc::ptr_eq(&found, proxy));
        if points_here {
            self.keyed.remove(&key);
        }
        proxy.set_unique_key(None);
    }

    /// Live proxy bound to `key`.
    pub fn find_proxy_by_unique_key(&mut self, key: &UniqueKey) -> Option<ProxyRef> {
        let found = self.keyed.get(key).map(Weak::upgrade)?;
        if found.is_none() {
            self.keyed.remove(key);
        }
        found
    }

    /// Live proxy bound to `key`, or a new proxy wrapping the texture the
    /// device cache holds for it.
    pub fn find_or_create_proxy_by_unique_key(
        &mut self,
        key: &UniqueKey,
        allocator: AllocatorPolicy,
        resources: Option<&ResourceProvider>,
    ) -> Option<ProxyRef> {
        if let Some(proxy) = self.find_proxy_by_unique_key(key) {
            return Some(proxy);
        }
        let texture = resources?.find_texture_by_unique_key(key)?;
        let label = key.tag().unwrap_or("keyed-texture");
        let proxy = ResourceProxy::wrapped_texture(label, texture, allocator);
        self.keyed.insert(key.clone(), Arc::downgrade(&proxy));
        proxy.set_unique_key(Some(key.clone()));
        debug!(target: "renderer", "rewrapped cached texture for {key:?}");
        Some(proxy)
    }

    /// Treat the content under `key` as gone.
    ///
    /// The key leaves the index and its proxy. With
    /// [`InvalidateGpuResource::Yes`] the device-side texture is dropped from
    /// the cache too; in-flight tasks holding the proxy keep their backing.
    pub fn process_invalid_unique_key(
        &mut self,
        key: &UniqueKey,
        invalidate: InvalidateGpuResource,
        resources: Option<&ResourceProvider>,
    ) {
        if let Some(proxy) = self.keyed.remove(key).as_ref().and_then(Weak::upgrade) {
            proxy.set_unique_key(None);
        }
        if invalidate == InvalidateGpuResource::Yes
            && let Some(provider) = resources
        {
            provider.invalidate_unique_key(key);
        }
    }

    /// Number of keys bound to live proxies.
    pub fn keyed_proxy_count(&self) -> usize {
        self.keyed
            .values()
            .filter(|proxy| proxy.strong_count() > 0)
            .count()
    }

    /// Drop index entries whose proxy is gone.
    pub fn purge_dead(&mut self) {
        self.keyed.retain(|_, proxy| proxy.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::gpu::{GpuDevice, PixelFormat, TextureDesc};
    use crate::resource::unique_key::KeyDomain;
    use crate::testing::RecordingDevice;

    fn texture(label: &str) -> ProxyRef {
        ResourceProxy::texture(
            label,
            TextureDesc::new(PixelFormat::Rgba8Unorm, 32, 32, false),
            AllocatorPolicy::Participates,
        )
    }

    fn key(reuse: KeyReuse, word: u32) -> UniqueKey {
        UniqueKey::builder(KeyDomain::generate(reuse)).push_u32(word).finish()
    }

    fn resources() -> ResourceProvider {
        ResourceProvider::new(Arc::new(RecordingDevice::default()) as Arc<dyn GpuDevice>, 1 << 20)
    }

    /// # Panics
    /// Panics if a second assignment does not take the key over.
    #[test]
    fn second_assignment_wins() {
        let mut provider = ProxyProvider::new();
        let shared = key(KeyReuse::InvalidateOnCollision, 1);
        let first = texture("first");
        let second = texture("second");
        assert!(provider.assign_unique_key_to_proxy(&shared, &first, None));
        assert!(provider.assign_unique_key_to_proxy(&shared, &second, None));
        let found = provider.find_proxy_by_unique_key(&shared).expect("live proxy");
        assert!(Arc::ptr_eq(&found, &second));
        assert!(first.unique_key().is_none());
        assert_eq!(second.unique_key(), Some(shared));
    }

    /// # Panics
    /// Panics if an exclusive domain allows a collision.
    #[test]
    fn exclusive_domain_refuses_collision() {
        let mut provider = ProxyProvider::new();
        let exclusive = key(KeyReuse::Exclusive, 2);
        let first = texture("first");
        let second = texture("second");
        assert!(provider.assign_unique_key_to_proxy(&exclusive, &first, None));
        assert!(!provider.assign_unique_key_to_proxy(&exclusive, &second, None));
        drop(first);
        assert!(provider.assign_unique_key_to_proxy(&exclusive, &second, None));
    }

    /// # Panics
    /// Panics if structurally invalid assignments succeed.
    #[test]
    fn invalid_assignments_fail() {
        let mut provider = ProxyProvider::new();
        let proxy = texture("proxy");
        assert!(!provider.assign_unique_key_to_proxy(&UniqueKey::invalid(), &proxy, None));

        let first = key(KeyReuse::InvalidateOnCollision, 3);
        let other = key(KeyReuse::InvalidateOnCollision, 4);
        assert!(provider.assign_unique_key_to_proxy(&first, &proxy, None));
        assert!(!provider.assign_unique_key_to_proxy(&other, &proxy, None));
    }

    /// # Panics
    /// Panics if removal or invalidation leaves the key discoverable.
    #[test]
    fn remove_and_invalidate_evict() {
        let mut provider = ProxyProvider::new();
        let removed = key(KeyReuse::InvalidateOnCollision, 5);
        let proxy = texture("proxy");
        assert!(provider.assign_unique_key_to_proxy(&removed, &proxy, None));
        provider.remove_unique_key_from_proxy(&proxy, None);
        assert!(provider.find_proxy_by_unique_key(&removed).is_none());
        assert!(proxy.unique_key().is_none());

        let invalidated = key(KeyReuse::InvalidateOnCollision, 6);
        assert!(provider.assign_unique_key_to_proxy(&invalidated, &proxy, None));
        provider.process_invalid_unique_key(&invalidated, InvalidateGpuResource::No, None);
        assert!(provider.find_proxy_by_unique_key(&invalidated).is_none());
    }

    /// # Panics
    /// Panics if the index keeps proxies alive or loses cached textures.
    #[test]
    fn dead_proxy_is_rewrapped_from_cache() {
        let resources = resources();
        let mut provider = ProxyProvider::new();
        let cached = key(KeyReuse::InvalidateOnCollision, 7);
        let proxy = texture("atlas");
        assert!(provider.assign_unique_key_to_proxy(&cached, &proxy, Some(&resources)));
        proxy.instantiate(&resources).expect("instantiate");
        let texture_id = proxy.peek_texture().map(|backing| backing.id());
        drop(proxy);

        assert!(provider.find_proxy_by_unique_key(&cached).is_none());
        let rewrapped = provider
            .find_or_create_proxy_by_unique_key(&cached, AllocatorPolicy::Excluded, Some(&resources))
            .expect("cached texture");
        assert!(rewrapped.is_instantiated());
        assert_eq!(rewrapped.peek_texture().map(|backing| backing.id()), texture_id);
        assert_eq!(rewrapped.allocator_policy(), AllocatorPolicy::Excluded);
        assert_eq!(provider.keyed_proxy_count(), 1);
    }

    /// # Panics
    /// Panics if the cached texture still answers the key after removal.
    #[test]
    fn removal_drops_cached_texture() {
        let resources = resources();
        let mut provider = ProxyProvider::new();
        let removed = key(KeyReuse::InvalidateOnCollision, 9);
        let proxy = texture("mask");
        assert!(provider.assign_unique_key_to_proxy(&removed, &proxy, Some(&resources)));
        proxy.instantiate(&resources).expect("instantiate");
        assert!(resources.find_texture_by_unique_key(&removed).is_some());

        provider.remove_unique_key_from_proxy(&proxy, Some(&resources));
        assert!(resources.find_texture_by_unique_key(&removed).is_none());
        assert!(proxy.peek_texture().is_some());
        drop(proxy);
        assert!(
            provider
                .find_or_create_proxy_by_unique_key(&removed, AllocatorPolicy::Excluded, Some(&resources))
                .is_none()
        );
    }

    /// # Panics
    /// Panics if GPU-side invalidation keeps the cached texture.
    #[test]
    fn gpu_invalidation_drops_cached_texture() {
        let resources = resources();
        let mut provider = ProxyProvider::new();
        let cached = key(KeyReuse::InvalidateOnCollision, 8);
        let proxy = texture("atlas");
        proxy.instantiate(&resources).expect("instantiate");
        assert!(provider.assign_unique_key_to_proxy(&cached, &proxy, Some(&resources)));
        assert!(resources.find_texture_by_unique_key(&cached).is_some());

        provider.process_invalid_unique_key(&cached, InvalidateGpuResource::Yes, Some(&resources));
        assert!(resources.find_texture_by_unique_key(&cached).is_none());
        assert!(proxy.peek_texture().is_some());
        assert!(
            provider
                .find_or_create_proxy_by_unique_key(&cached, AllocatorPolicy::Participates, Some(&resources))
                .is_none()
        );
    }
}
