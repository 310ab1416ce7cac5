//! Texture resolves injected after writers, and the flush order they produce.

#[cfg(test)]
mod tests {
    use renderer::testing::direct_context;
    use renderer::{
        AaType, AllocatorPolicy, Color4f, ColorInfo, ColorType, DrawingManager, LoadOp, NoClip, Origin,
        PixelFormat, ProcessorSet, ProxyRef, Rect, RenderTaskKind, ResolveFlags, ResourceProxy,
        SurfaceDrawContext, SurfaceProps, TextureDesc,
    };

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn msaa_target(label: &str) -> ProxyRef {
        let mut desc = TextureDesc::new(PixelFormat::Rgba8Unorm, 256, 256, true);
        desc.sample_count = 4;
        ResourceProxy::texture(label, desc, AllocatorPolicy::Participates)
    }

    /// A resolve follows every writer of its proxy, closing the open one first.
    ///
    /// # Panics
    /// Panics if the first writer is left open or is not ordered before the resolve.
    #[test]
    fn resolve_after_two_writers() {
        init_logging();
        let (context, _device) = direct_context();
        let mut manager = DrawingManager::new(context);
        let target = msaa_target("H");

        let first = manager.new_ops_task(&target, LoadOp::Clear(Color4f::TRANSPARENT));
        assert!(!manager.task(first).expect("first task").is_closed());
        let second = manager.new_ops_task(&target, LoadOp::Load);
        assert!(manager.task(first).expect("first task").is_closed());
        assert!(!manager.task(second).expect("second task").is_closed());

        let resolve = manager
            .add_texture_resolve(&target, ResolveFlags::MSAA)
            .expect("resolve task");

        assert!(manager.task(second).expect("second task").is_closed());
        let resolve_task = manager.task(resolve).expect("resolve task");
        assert!(resolve_task.is_closed());
        assert!(resolve_task.depends_on(second));
        assert!(manager.is_ordered_before(first, resolve));
        assert!(manager.is_ordered_before(second, resolve));
        assert_eq!(manager.get_last_render_task(&target), Some(resolve));
        assert!(matches!(
            resolve_task.kind(),
            RenderTaskKind::TextureResolve(entries) if entries.len() == 1
        ));
    }

    /// The flush executes writers, then the resolve, then readers of the result.
    ///
    /// # Panics
    /// Panics if the executed order breaks a dependency.
    #[test]
    fn flush_runs_resolve_between_writer_and_reader() {
        init_logging();
        let (context, device) = direct_context();
        let mut manager = DrawingManager::new(context);
        let source = msaa_target("layer");
        let destination = ResourceProxy::texture(
            "screen",
            TextureDesc::new(PixelFormat::Bgra8Unorm, 256, 256, true),
            AllocatorPolicy::Participates,
        );
        let paint = ProcessorSet::solid(Color4f::new(0.0, 0.5, 0.0, 1.0));

        let mut layer = SurfaceDrawContext::new(
            ProxyRef::clone(&source),
            Origin::TopLeft,
            ColorInfo::default(),
            SurfaceProps::default(),
        )
        .expect("layer surface");
        layer.clear(Color4f::TRANSPARENT);
        layer
            .fill_rect(&mut manager, Rect::new(0.0, 0.0, 64.0, 64.0), paint.clone(), AaType::None, &NoClip)
            .expect("layer fill");
        let writer = layer.open_task(&manager).expect("open layer task");

        let resolve = manager
            .add_texture_resolve(&source, ResolveFlags::MSAA)
            .expect("resolve task");

        let screen_info = ColorInfo {
            color_type: ColorType::Bgra8888,
            ..ColorInfo::default()
        };
        let mut screen = SurfaceDrawContext::new(
            ProxyRef::clone(&destination),
            Origin::TopLeft,
            screen_info,
            SurfaceProps::default(),
        )
        .expect("screen surface");
        screen
            .fill_rect(&mut manager, Rect::new(0.0, 0.0, 256.0, 256.0), paint, AaType::None, &NoClip)
            .expect("screen fill");
        let reader = screen.open_task(&manager).expect("open screen task");
        assert!(manager.add_dependency(reader, &source));
        assert!(manager.task(reader).expect("reader").depends_on(resolve));

        let report = manager.flush().expect("flush");
        let writer_at = report.position(writer).expect("writer ran");
        let resolve_at = report.position(resolve).expect("resolve ran");
        let reader_at = report.position(reader).expect("reader ran");
        assert!(writer_at < resolve_at);
        assert!(resolve_at < reader_at);
        assert_eq!(report.failed, Vec::new());
        assert_eq!(report.instantiated, 2);
        assert_eq!(device.texture_count(), 2);
        assert_eq!(report.resolves.len(), 1);
        assert_eq!(report.resolves[0].proxy, source.id());
        assert_eq!(report.resolves[0].flags, ResolveFlags::MSAA);
        assert_eq!(source.dirty_flags(), ResolveFlags::empty());
        assert!(manager.tasks().is_empty());
    }

    /// Closing a writer of a multisampled target leaves an MSAA resolve pending.
    ///
    /// # Panics
    /// Panics if the dirty flags do not track closes and resolves.
    #[test]
    fn resolve_clears_pending_msaa() {
        init_logging();
        let (context, _device) = direct_context();
        let mut manager = DrawingManager::new(context);
        let target = msaa_target("dirty");

        let writer = manager.new_ops_task(&target, LoadOp::Discard);
        manager.make_closed(writer);
        assert_eq!(target.dirty_flags(), ResolveFlags::MSAA);

        manager
            .add_texture_resolve(&target, ResolveFlags::MSAA | ResolveFlags::MIPMAPS)
            .expect("resolve task");
        assert_eq!(target.dirty_flags(), ResolveFlags::empty());
    }

    /// A single-sampled, non-mipmapped texture has nothing to resolve.
    ///
    /// # Panics
    /// Panics if a resolve task is created.
    #[test]
    fn plain_texture_needs_no_resolve() {
        init_logging();
        let (context, _device) = direct_context();
        let mut manager = DrawingManager::new(context);
        let plain = ResourceProxy::texture(
            "plain",
            TextureDesc::new(PixelFormat::Rgba8Unorm, 32, 32, true),
            AllocatorPolicy::Participates,
        );
        manager.new_ops_task(&plain, LoadOp::Load);
        assert_eq!(manager.add_texture_resolve(&plain, ResolveFlags::MSAA), None);
        assert_eq!(manager.tasks().len(), 1);
        assert!(!manager.tasks()[0].is_closed());
    }
}
