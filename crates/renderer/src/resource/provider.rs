//! Device resource provider for direct contexts.
//!
//! Wraps a [`GpuDevice`] with the validation every allocation entry point
//! shares and with the [`ResourceCache`] used for content-addressed reuse.

use super::cache::ResourceCache;
use super::gpu::{AccessPattern, BufferDesc, BufferKind, GpuBuffer, GpuDevice, GpuTexture, TextureDesc};
use super::unique_key::UniqueKey;
use crate::caps::Caps;
use anyhow::{Result as AnyResult, anyhow, bail};
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// Creates and caches device objects. Only reachable through a direct context.
#[derive(Debug)]
pub struct ResourceProvider {
    /// Backend that performs the actual allocations.
    device: Arc<dyn GpuDevice>,
    /// Keyed textures and static buffers.
    cache: Mutex<ResourceCache>,
    /// Bytes of static buffers kept before purging unreferenced ones.
    static_buffer_budget: usize,
    /// Number of buffer uploads issued to the device.
    uploads: AtomicUsize,
}

impl ResourceProvider {
    /// Create a provider over `device`.
    pub fn new(device: Arc<dyn GpuDevice>, static_buffer_budget: usize) -> Self {
        Self {
            device,
            cache: Mutex::new(ResourceCache::new()),
            static_buffer_budget,
            uploads: AtomicUsize::new(0),
        }
    }

    /// Capabilities of the backing device.
    #[inline]
    pub fn caps(&self) -> &Caps {
        self.device.caps()
    }

    /// Create a texture after checking it against the device limits.
    ///
    /// # Errors
    /// Returns an error if the descriptor exceeds the device limits, declares an
    /// unrenderable format as renderable, or the device allocation fails.
    pub fn create_texture(&self, desc: &TextureDesc, label: &str) -> AnyResult<Arc<GpuTexture>> {
        let caps = self.device.caps();
        if !caps.fits_dimensions(desc.width, desc.height) {
            bail!(
                "texture '{label}' is {}x{}, device limit is {}",
                desc.width,
                desc.height,
                caps.max_texture_size
            );
        }
        if desc.renderable && !caps.is_format_renderable(desc.format, desc.sample_count) {
            bail!(
                "texture '{label}' format {:?} with {} samples is not renderable",
                desc.format,
                desc.sample_count
            );
        }
        if desc.mipmapped && !caps.mipmap_support {
            bail!("texture '{label}' is mipmapped but the device has no mipmap support");
        }
        let texture = self.device.create_texture(desc, label)?;
        debug!(target: "renderer", "created texture '{label}' as {:?}", texture.id());
        Ok(Arc::new(texture))
    }

    /// Create a buffer, uploading `data` if given. Returns `None` on failure.
    pub fn create_buffer(
        &self,
        size: usize,
        kind: BufferKind,
        access: AccessPattern,
        data: Option<&[u8]>,
    ) -> Option<Arc<GpuBuffer>> {
        match self.try_create_buffer(size, kind, access, data) {
            Ok(buffer) => Some(buffer),
            Err(err) => {
                warn!(target: "renderer", "buffer creation failed: {err:#}");
                None
            }
        }
    }

    /// Return the immutable buffer registered under `key`, creating, uploading
    /// and registering it first if none exists.
    ///
    /// A cache hit performs no upload, whatever `data` holds.
    pub fn find_or_make_static_buffer(
        &self,
        kind: BufferKind,
        size: usize,
        data: &[u8],
        key: &UniqueKey,
    ) -> Option<Arc<GpuBuffer>> {
        if !key.is_valid() {
            warn!(target: "renderer", "static buffer requested with an invalid key");
            return None;
        }
        if let Some(buffer) = self.cache.lock().find_static_buffer(key) {
            debug!(target: "renderer", "static buffer hit for {key:?}");
            return Some(buffer);
        }
        let Some(contents) = data.get(..size) else {
            warn!(
                target: "renderer",
                "static buffer {key:?} declares {size} bytes but only {} were supplied",
                data.len()
            );
            return None;
        };
        let buffer = self.create_buffer(size, kind, AccessPattern::Static, Some(contents))?;
        let mut cache = self.cache.lock();
        cache.insert_static_buffer(key.clone(), Arc::clone(&buffer));
        let purged = cache.purge_unreferenced(self.static_buffer_budget);
        if purged > 0 {
            debug!(target: "renderer", "purged {purged} unreferenced static buffers");
        }
        Some(buffer)
    }

    /// Texture previously bound to `key`, if the cache still holds it.
    pub fn find_texture_by_unique_key(&self, key: &UniqueKey) -> Option<Arc<GpuTexture>> {
        self.cache.lock().find_texture(key)
    }

    /// Bind `key` to `texture` in the cache.
    pub fn assign_unique_key_to_texture(&self, key: &UniqueKey, texture: &Arc<GpuTexture>) {
        self.cache
            .lock()
            .assign_texture_key(key.clone(), Arc::clone(texture));
    }

    /// Forget the texture bound to `key`. Returns whether one was bound.
    pub fn invalidate_unique_key(&self, key: &UniqueKey) -> bool {
        self.cache.lock().remove_texture_key(key)
    }

    /// Number of buffer uploads issued so far.
    #[inline]
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Run `inspect` against the cache, e.g. to read statistics.
    pub fn with_cache<R>(&self, inspect: impl FnOnce(&ResourceCache) -> R) -> R {
        inspect(&self.cache.lock())
    }

    fn try_create_buffer(
        &self,
        size: usize,
        kind: BufferKind,
        access: AccessPattern,
        data: Option<&[u8]>,
    ) -> AnyResult<Arc<GpuBuffer>> {
        if size == 0 {
            bail!("zero-sized {kind:?} buffer");
        }
        if let Some(supplied) = data.map(<[u8]>::len).filter(|len| *len != size) {
            return Err(anyhow!(
                "{kind:?} buffer of {size} bytes given {supplied} bytes of data"
            ));
        }
        let desc = BufferDesc { size, kind, access };
        let label = format!("{kind:?}-{access:?}-buffer");
        let buffer = self.device.create_buffer(&desc, data, &label)?;
        if data.is_some() {
            self.uploads.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Arc::new(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Caps;
    use crate::resource::gpu::PixelFormat;
    use crate::resource::unique_key::{KeyDomain, KeyReuse};
    use crate::testing::RecordingDevice;

    fn provider() -> (ResourceProvider, Arc<RecordingDevice>) {
        let device = Arc::new(RecordingDevice::default());
        let provider = ResourceProvider::new(Arc::clone(&device) as Arc<dyn GpuDevice>, 1 << 20);
        (provider, device)
    }

    /// # Panics
    /// Panics if out-of-limit textures reach the device.
    #[test]
    fn oversized_texture_is_rejected_before_device() {
        let (provider, device) = provider();
        let desc = TextureDesc::new(PixelFormat::Rgba8Unorm, Caps::default().max_texture_size + 1, 4, true);
        assert!(provider.create_texture(&desc, "huge").is_err());
        assert_eq!(device.texture_count(), 0);
    }

    /// # Panics
    /// Panics if an unrenderable format is allocated as a render target.
    #[test]
    fn unrenderable_target_is_rejected() {
        let (provider, device) = provider();
        let desc = TextureDesc::new(PixelFormat::Etc2Rgb8, 16, 16, true);
        assert!(provider.create_texture(&desc, "compressed").is_err());
        assert_eq!(device.texture_count(), 0);
    }

    /// # Panics
    /// Panics if a static buffer is uploaded twice under one key.
    #[test]
    fn static_buffer_uploads_once() {
        let (provider, device) = provider();
        let key = UniqueKey::builder(KeyDomain::generate(KeyReuse::Exclusive)).push_u32(7).finish();
        let first = provider
            .find_or_make_static_buffer(BufferKind::Index, 8, &[1; 8], &key)
            .expect("first request creates the buffer");
        let second = provider
            .find_or_make_static_buffer(BufferKind::Index, 8, &[2; 8], &key)
            .expect("second request hits the cache");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(device.upload_count(), 1);
        assert_eq!(provider.upload_count(), 1);
        assert_eq!(provider.with_cache(ResourceCache::hits), 1);
    }

    /// # Panics
    /// Panics if malformed buffer requests reach the device.
    #[test]
    fn malformed_buffers_fail_cleanly() {
        let (provider, device) = provider();
        assert!(provider.create_buffer(0, BufferKind::Vertex, AccessPattern::Dynamic, None).is_none());
        assert!(
            provider
                .create_buffer(16, BufferKind::Vertex, AccessPattern::Dynamic, Some(&[0; 4]))
                .is_none()
        );
        let invalid = UniqueKey::invalid();
        assert!(provider.find_or_make_static_buffer(BufferKind::Index, 4, &[0; 4], &invalid).is_none());
        assert_eq!(device.buffer_count(), 0);
    }

    /// # Panics
    /// Panics if keyed textures cannot be found or invalidated.
    #[test]
    fn keyed_texture_round_trip() {
        let (provider, _device) = provider();
        let texture = provider
            .create_texture(&TextureDesc::new(PixelFormat::Rgba8Unorm, 8, 8, false), "atlas")
            .expect("texture");
        let key = UniqueKey::builder(KeyDomain::generate(KeyReuse::InvalidateOnCollision)).push_u32(1).finish();
        provider.assign_unique_key_to_texture(&key, &texture);
        assert!(provider.find_texture_by_unique_key(&key).is_some());
        assert!(provider.invalidate_unique_key(&key));
        assert!(provider.find_texture_by_unique_key(&key).is_none());
    }
}
