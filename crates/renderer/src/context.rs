//! Recording and direct contexts.
//!
//! Every context can record work. Only a direct context is backed by a device
//! and can allocate; a recording-only context answers every allocation request
//! with failure before touching any device.

use crate::caps::Caps;
use crate::config::RendererConfig;
use crate::resource::{GpuDevice, ProxyProvider, ResourceProvider};
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use log::warn;
use std::sync::Arc;

/// Next id handed out to a context.
static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

/// Context that records work and, when direct, owns the device.
#[derive(Debug)]
pub struct RecordingContext {
    id: ContextId,
    caps: Arc<Caps>,
    config: RendererConfig,
    proxy_provider: ProxyProvider,
    /// Present only for direct contexts.
    resource_provider: Option<ResourceProvider>,
    warnings: AtomicUsize,
}

impl RecordingContext {
    /// A direct context allocating through `device`.
    pub fn direct(device: Arc<dyn GpuDevice>, config: RendererConfig) -> Self {
        let caps = Arc::new(device.caps().clone());
        let resource_provider = ResourceProvider::new(device, config.static_buffer_budget);
        Self::build(caps, config, Some(resource_provider))
    }

    /// A context that can record but never allocate.
    pub fn recording_only(caps: Caps, config: RendererConfig) -> Self {
        Self::build(Arc::new(caps), config, None)
    }

    fn build(
        caps: Arc<Caps>,
        config: RendererConfig,
        resource_provider: Option<ResourceProvider>,
    ) -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            caps,
            config,
            proxy_provider: ProxyProvider::new(),
            resource_provider,
            warnings: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub const fn id(&self) -> ContextId {
        self.id
    }

    #[inline]
    pub fn caps(&self) -> &Caps {
        &self.caps
    }

    /// Shared handle to the caps, for ops that keep them.
    #[inline]
    pub fn caps_ref(&self) -> Arc<Caps> {
        Arc::clone(&self.caps)
    }

    #[inline]
    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The device resource provider, or `None` for a recording-only context.
    #[inline]
    pub const fn as_direct(&self) -> Option<&ResourceProvider> {
        self.resource_provider.as_ref()
    }

    #[inline]
    pub const fn is_direct(&self) -> bool {
        self.resource_provider.is_some()
    }

    #[inline]
    pub const fn proxy_provider(&self) -> &ProxyProvider {
        &self.proxy_provider
    }

    /// Split borrow of the key index and the device provider.
    #[inline]
    pub fn proxy_provider_mut(&mut self) -> (&mut ProxyProvider, Option<&ResourceProvider>) {
        (&mut self.proxy_provider, self.resource_provider.as_ref())
    }

    /// Log a non-fatal diagnostic.
    pub fn print_warning_message(&self, message: &str) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
        warn!(target: "renderer", "[context {}] {message}", self.id.0);
    }

    /// Number of warnings printed so far.
    #[inline]
    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }
}
