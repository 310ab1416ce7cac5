//! Deferred references to device textures and buffers.
//!
//! A proxy is shared by every task that reads or writes it and by the unique
//! key index. Its instantiation state only moves forward: once instantiated it
//! stays instantiated, and a failed proxy never retries. State is mutated only
//! from the owning context's flush thread; other threads may read it.

use super::gpu::{BufferDesc, GpuBuffer, GpuTexture, TextureDesc};
use super::provider::ResourceProvider;
use super::unique_key::UniqueKey;
use anyhow::{Result as AnyResult, anyhow, bail};
use bitflags::bitflags;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Next id handed out to a proxy.
static NEXT_PROXY_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a proxy, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(pub u32);

/// Shared handle to a proxy.
pub type ProxyRef = Arc<ResourceProxy>;

/// Factory run on first instantiation of a lazy proxy.
pub type LazyInstantiateCallback =
    Box<dyn FnOnce(&ResourceProvider) -> AnyResult<Arc<GpuTexture>> + Send>;

/// Whether a proxy is allocated by the per-flush allocator pre-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatorPolicy {
    /// Instantiated by the allocator pre-pass before execution.
    Participates,
    /// Skips the allocator; must be instantiated explicitly at flush time.
    Excluded,
}

/// Where a proxy is in its instantiation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstantiationState {
    Uninstantiated,
    /// Waiting for its factory callback.
    Lazy,
    Instantiated,
    /// Terminal.
    Failed,
}

bitflags! {
    /// Pending work that must run before a texture can be sampled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResolveFlags: u8 {
        /// Multisampled contents need resolving into the sampleable texture.
        const MSAA = 1;
        /// Mip levels below the base need regenerating.
        const MIPMAPS = 1 << 1;
    }
}

/// What a proxy stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Texture(TextureDesc),
    Buffer(BufferDesc),
}

#[derive(Debug)]
enum Backing {
    Texture(Arc<GpuTexture>),
    Buffer(Arc<GpuBuffer>),
}

#[derive(Debug)]
struct ProxyState {
    instantiation: InstantiationState,
    backing: Option<Backing>,
    unique_key: Option<UniqueKey>,
    dirty: ResolveFlags,
}

/// Deferred reference to a device resource.
pub struct ResourceProxy {
    id: ProxyId,
    label: String,
    kind: ProxyKind,
    allocator: AllocatorPolicy,
    state: RwLock<ProxyState>,
    lazy: Mutex<Option<LazyInstantiateCallback>>,
}

impl ResourceProxy {
    fn build(
        label: &str,
        kind: ProxyKind,
        allocator: AllocatorPolicy,
        instantiation: InstantiationState,
        backing: Option<Backing>,
        lazy: Option<LazyInstantiateCallback>,
    ) -> ProxyRef {
        Arc::new(Self {
            id: ProxyId(NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed)),
            label: label.to_owned(),
            kind,
            allocator,
            state: RwLock::new(ProxyState {
                instantiation,
                backing,
                unique_key: None,
                dirty: ResolveFlags::empty(),
            }),
            lazy: Mutex::new(lazy),
        })
    }

    /// A texture proxy allocated from `desc` on instantiation.
    pub fn texture(label: &str, desc: TextureDesc, allocator: AllocatorPolicy) -> ProxyRef {
        Self::build(
            label,
            ProxyKind::Texture(desc),
            allocator,
            InstantiationState::Uninstantiated,
            None,
            None,
        )
    }

    /// A texture proxy whose backing comes from `callback`.
    pub fn lazy_texture(
        label: &str,
        desc: TextureDesc,
        allocator: AllocatorPolicy,
        callback: LazyInstantiateCallback,
    ) -> ProxyRef {
        Self::build(
            label,
            ProxyKind::Texture(desc),
            allocator,
            InstantiationState::Lazy,
            None,
            Some(callback),
        )
    }

    /// A proxy over an existing texture. It starts instantiated.
    pub fn wrapped_texture(
        label: &str,
        texture: Arc<GpuTexture>,
        allocator: AllocatorPolicy,
    ) -> ProxyRef {
        let desc = *texture.desc();
        Self::build(
            label,
            ProxyKind::Texture(desc),
            allocator,
            InstantiationState::Instantiated,
            Some(Backing::Texture(texture)),
            None,
        )
    }

    /// A buffer proxy allocated from `desc` on instantiation.
    pub fn buffer(label: &str, desc: BufferDesc, allocator: AllocatorPolicy) -> ProxyRef {
        Self::build(
            label,
            ProxyKind::Buffer(desc),
            allocator,
            InstantiationState::Uninstantiated,
            None,
            None,
        )
    }

    #[inline]
    pub const fn id(&self) -> ProxyId {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub const fn kind(&self) -> &ProxyKind {
        &self.kind
    }

    /// Texture descriptor, or `None` for buffers.
    #[inline]
    pub const fn texture_desc(&self) -> Option<&TextureDesc> {
        match &self.kind {
            ProxyKind::Texture(desc) => Some(desc),
            ProxyKind::Buffer(_) => None,
        }
    }

    #[inline]
    pub const fn is_texture(&self) -> bool {
        matches!(self.kind, ProxyKind::Texture(_))
    }

    /// Whether the proxy was declared as something that can be rendered to.
    #[inline]
    pub const fn is_render_target(&self) -> bool {
        matches!(self.kind, ProxyKind::Texture(desc) if desc.renderable)
    }

    #[inline]
    pub const fn is_multisampled(&self) -> bool {
        matches!(self.kind, ProxyKind::Texture(desc) if desc.sample_count > 1)
    }

    #[inline]
    pub const fn is_mipmapped(&self) -> bool {
        matches!(self.kind, ProxyKind::Texture(desc) if desc.mipmapped)
    }

    #[inline]
    pub const fn allocator_policy(&self) -> AllocatorPolicy {
        self.allocator
    }

    /// Whether the proxy is excluded from the allocator pre-pass and may be
    /// instantiated directly at flush time.
    #[inline]
    pub fn can_skip_resource_allocator(&self) -> bool {
        self.allocator == AllocatorPolicy::Excluded
    }

    #[inline]
    pub fn state(&self) -> InstantiationState {
        self.state.read().instantiation
    }

    #[inline]
    pub fn is_instantiated(&self) -> bool {
        self.state() == InstantiationState::Instantiated
    }

    #[inline]
    pub fn is_lazy(&self) -> bool {
        self.state() == InstantiationState::Lazy
    }

    /// Backing texture, once instantiated.
    pub fn peek_texture(&self) -> Option<Arc<GpuTexture>> {
        match &self.state.read().backing {
            Some(Backing::Texture(texture)) => Some(Arc::clone(texture)),
            Some(Backing::Buffer(_)) | None => None,
        }
    }

    /// Backing buffer, once instantiated.
    pub fn peek_buffer(&self) -> Option<Arc<GpuBuffer>> {
        match &self.state.read().backing {
            Some(Backing::Buffer(buffer)) => Some(Arc::clone(buffer)),
            Some(Backing::Texture(_)) | None => None,
        }
    }

    /// Unique key currently assigned to this proxy.
    pub fn unique_key(&self) -> Option<UniqueKey> {
        self.state.read().unique_key.clone()
    }

    pub(crate) fn set_unique_key(&self, key: Option<UniqueKey>) {
        self.state.write().unique_key = key;
    }

    /// Resolve work pending on this proxy.
    pub fn dirty_flags(&self) -> ResolveFlags {
        self.state.read().dirty
    }

    pub(crate) fn mark_dirty(&self, flags: ResolveFlags) {
        self.state.write().dirty.insert(flags);
    }

    /// Clear `flags`, returning the subset that was actually pending.
    pub(crate) fn clear_dirty(&self, flags: ResolveFlags) -> ResolveFlags {
        let mut state = self.state.write();
        let cleared = state.dirty & flags;
        state.dirty.remove(flags);
        cleared
    }

    /// Back this proxy with a device object.
    ///
    /// Lazy proxies run their factory callback; others ask `provider` for an
    /// object matching the declared descriptor. Calling this again after
    /// success returns `Ok` without allocating.
    ///
    /// # Errors
    /// Returns an error if the proxy already failed, or if the device or the
    /// factory cannot produce a matching object. The proxy is then failed.
    pub fn instantiate(&self, provider: &ResourceProvider) -> AnyResult<()> {
        let current = self.state();
        match current {
            InstantiationState::Instantiated => return Ok(()),
            InstantiationState::Failed => {
                bail!("proxy '{}' already failed to instantiate", self.label)
            }
            InstantiationState::Uninstantiated | InstantiationState::Lazy => {}
        }

        let created = if current == InstantiationState::Lazy {
            self.run_lazy_callback(provider)
        } else {
            self.create_backing(provider)
        };

        let mut state = self.state.write();
        match created {
            Ok(backing) => {
                if let (Some(key), Backing::Texture(texture)) = (&state.unique_key, &backing) {
                    provider.assign_unique_key_to_texture(key, texture);
                }
                state.backing = Some(backing);
                state.instantiation = InstantiationState::Instantiated;
                debug!(target: "renderer", "instantiated proxy '{}' ({:?})", self.label, self.id);
                Ok(())
            }
            Err(err) => {
                state.instantiation = InstantiationState::Failed;
                Err(err.context(format!("instantiating proxy '{}'", self.label)))
            }
        }
    }

    fn run_lazy_callback(&self, provider: &ResourceProvider) -> AnyResult<Backing> {
        let callback = self
            .lazy
            .lock()
            .take()
            .ok_or_else(|| anyhow!("lazy proxy '{}' has no callback", self.label))?;
        let texture = callback(provider)?;
        let produced = texture.desc();
        let mismatched = self.texture_desc().is_some_and(|declared| {
            produced.format != declared.format
                || produced.width < declared.width
                || produced.height < declared.height
        });
        if mismatched {
            bail!(
                "lazy callback produced {produced:?}, proxy '{}' declared {:?}",
                self.label,
                self.kind
            );
        }
        Ok(Backing::Texture(texture))
    }

    fn create_backing(&self, provider: &ResourceProvider) -> AnyResult<Backing> {
        match &self.kind {
            ProxyKind::Texture(desc) => provider
                .create_texture(desc, &self.label)
                .map(Backing::Texture),
            ProxyKind::Buffer(desc) => provider
                .create_buffer(desc.size, desc.kind, desc.access, None)
                .map(Backing::Buffer)
                .ok_or_else(|| anyhow!("device refused buffer '{}'", self.label)),
        }
    }
}

impl fmt::Debug for ResourceProxy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ResourceProxy")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("allocator", &self.allocator)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
