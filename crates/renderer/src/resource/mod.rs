//! Resource handles, the device seam, and the unique-key caches.

pub mod cache;
pub mod gpu;
pub mod provider;
pub mod proxy;
pub mod proxy_provider;
pub mod unique_key;

pub use cache::ResourceCache;
pub use gpu::{
    AccessPattern, BufferDesc, BufferKind, GpuBuffer, GpuDevice, GpuResourceId, GpuTexture,
    PixelFormat, TextureDesc,
};
pub use provider::ResourceProvider;
pub use proxy::{
    AllocatorPolicy, InstantiationState, LazyInstantiateCallback, ProxyId, ProxyKind, ProxyRef,
    ResolveFlags, ResourceProxy,
};
pub use proxy_provider::{InvalidateGpuResource, ProxyProvider};
pub use unique_key::{KeyDomain, KeyReuse, UniqueKey, UniqueKeyBuilder};
