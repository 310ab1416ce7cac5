//! The facade tasks use at flush time to step outside the allocator.
//!
//! Everything here either instantiates immediately (surface contexts, proxies
//! excluded from the allocator) or inserts work into the task graph with the
//! ordering the graph needs (texture resolves). Device allocations are only
//! possible when a direct context backs the flush; a recording-only context
//! answers them with `None` before any device call.

use crate::caps::Caps;
use crate::color::ColorInfo;
use crate::context::ContextId;
use crate::render_task::{DrawingManager, FlushReport, TaskId};
use crate::resource::{
    AccessPattern, AllocatorPolicy, BufferKind, GpuBuffer, InvalidateGpuResource, ProxyRef,
    ResolveFlags, UniqueKey,
};
use crate::surface::{Origin, SurfaceDrawContext, SurfaceProps};
use anyhow::Result as AnyResult;
use log::{debug, warn};
use std::sync::Arc;

/// Work that runs at the start of every flush, after tasks are closed and
/// before they are ordered and executed.
pub trait OnFlushCallbackObject: Send {
    /// Record flush-time work through `provider`.
    ///
    /// # Errors
    /// A returned error is logged as a warning; the flush continues.
    fn pre_flush(&mut self, provider: &mut OnFlushResourceProvider<'_>) -> AnyResult<()>;

    /// Observe the finished flush.
    fn post_flush(&mut self, _report: &FlushReport) {}
}

/// Flush-time resource and task facade over a drawing manager.
#[derive(Debug)]
pub struct OnFlushResourceProvider<'manager> {
    manager: &'manager mut DrawingManager,
}

impl<'manager> OnFlushResourceProvider<'manager> {
    #[inline]
    pub const fn new(manager: &'manager mut DrawingManager) -> Self {
        Self { manager }
    }

    /// The drawing manager, for recording into surfaces made here.
    #[inline]
    pub fn drawing_manager(&mut self) -> &mut DrawingManager {
        &mut *self.manager
    }

    /// Instantiate `proxy` now, bypassing the allocator.
    ///
    /// Only proxies excluded from the allocator may be instantiated here.
    pub fn instantiate_proxy(&self, proxy: &ProxyRef) -> bool {
        debug_assert!(
            proxy.can_skip_resource_allocator(),
            "proxy '{}' must skip the allocator to be instantiated at flush time",
            proxy.label()
        );
        if !proxy.can_skip_resource_allocator() {
            warn!(target: "renderer", "refusing flush-time instantiation of allocator proxy '{}'", proxy.label());
            return false;
        }
        let Some(resources) = self.manager.context().as_direct() else {
            debug!(target: "renderer", "no direct context to instantiate '{}'", proxy.label());
            return false;
        };
        match proxy.instantiate(resources) {
            Ok(()) => true,
            Err(err) => {
                warn!(target: "renderer", "{err:#}");
                false
            }
        }
    }

    /// A surface context over `proxy`, instantiated now and with its
    /// contents marked discarded.
    ///
    /// Fails without allocating when the proxy cannot be rendered to or its
    /// format cannot hold `color_info`, and fails when instantiation fails.
    pub fn make_surface_context(
        &self,
        proxy: &ProxyRef,
        origin: Origin,
        color_info: ColorInfo,
        props: SurfaceProps,
    ) -> Option<SurfaceDrawContext> {
        let desc = proxy.texture_desc()?;
        let renderable = proxy.is_render_target()
            && self
                .manager
                .context()
                .caps()
                .is_format_renderable(desc.format, desc.sample_count);
        if !renderable {
            debug!(target: "renderer", "proxy '{}' is not renderable", proxy.label());
            return None;
        }
        if !color_info.color_type.is_compatible_with(desc.format) {
            debug!(
                target: "renderer",
                "{:?} cannot be drawn into proxy '{}' ({:?})",
                color_info.color_type,
                proxy.label(),
                desc.format
            );
            return None;
        }
        if !self.instantiate_proxy(proxy) {
            return None;
        }
        let mut surface = SurfaceDrawContext::new(ProxyRef::clone(proxy), origin, color_info, props)?;
        surface.discard();
        Some(surface)
    }

    /// Schedule a resolve of `proxy` after its last writer.
    ///
    /// The last writer is closed first. Returns the new, already closed task.
    pub fn add_texture_resolve_task(
        &mut self,
        proxy: &ProxyRef,
        flags: ResolveFlags,
    ) -> Option<TaskId> {
        self.manager.add_texture_resolve(proxy, flags)
    }

    /// Bind `key` to a texture proxy.
    pub fn assign_unique_key_to_proxy(&mut self, key: &UniqueKey, proxy: &ProxyRef) -> bool {
        let (proxies, resources) = self.manager.context_mut().proxy_provider_mut();
        proxies.assign_unique_key_to_proxy(key, proxy, resources)
    }

    /// Stop `proxy` from being found by its key, here and in the device cache.
    pub fn remove_unique_key_from_proxy(&mut self, proxy: &ProxyRef) {
        let (proxies, resources) = self.manager.context_mut().proxy_provider_mut();
        proxies.remove_unique_key_from_proxy(proxy, resources);
    }

    /// Forget `key` everywhere, including any device-side cached texture.
    pub fn process_invalid_unique_key(&mut self, key: &UniqueKey) {
        let (proxies, resources) = self.manager.context_mut().proxy_provider_mut();
        proxies.process_invalid_unique_key(key, InvalidateGpuResource::Yes, resources);
    }

    /// Proxy bound to `key`, rewrapping a cached texture when needed.
    pub fn find_or_create_proxy_by_unique_key(
        &mut self,
        key: &UniqueKey,
        allocator: AllocatorPolicy,
    ) -> Option<ProxyRef> {
        let (proxies, resources) = self.manager.context_mut().proxy_provider_mut();
        proxies.find_or_create_proxy_by_unique_key(key, allocator, resources)
    }

    /// A dynamic buffer, or `None` without a direct context.
    pub fn make_buffer(&self, kind: BufferKind, size: usize) -> Option<Arc<GpuBuffer>> {
        let Some(resources) = self.manager.context().as_direct() else {
            debug!(target: "renderer", "make_buffer needs a direct context");
            return None;
        };
        resources.create_buffer(size, kind, AccessPattern::Dynamic, None)
    }

    /// The static buffer registered under `key`, made and uploaded once.
    pub fn find_or_make_static_buffer(
        &self,
        kind: BufferKind,
        size: usize,
        data: &[u8],
        key: &UniqueKey,
    ) -> Option<Arc<GpuBuffer>> {
        let Some(resources) = self.manager.context().as_direct() else {
            debug!(target: "renderer", "find_or_make_static_buffer needs a direct context");
            return None;
        };
        resources.find_or_make_static_buffer(kind, size, data, key)
    }

    #[inline]
    pub fn context_id(&self) -> ContextId {
        self.manager.context().id()
    }

    #[inline]
    pub fn caps(&self) -> &Caps {
        self.manager.context().caps()
    }

    /// Forward a non-fatal diagnostic to the context.
    #[inline]
    pub fn print_warning_message(&self, message: &str) {
        self.manager.context().print_warning_message(message);
    }
}
