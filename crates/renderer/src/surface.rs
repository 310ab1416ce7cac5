//! Surface draw contexts: the recording entry point for a render target.

use crate::color::{Color4f, ColorInfo};
use crate::draw_op::{AppliedClip, ClampType, Clip, ClipEffect, DrawOp, ProcessorSet, RecordedOp};
use crate::geometry::Rect;
use crate::ops::{AaType, FillRectOp};
use crate::render_task::{DrawingManager, LoadOp, RecordOutcome, TaskId};
use crate::resource::ProxyRef;
use anyhow::{Result as AnyResult, bail};
use core::mem;
use log::debug;

/// Which corner of the target holds pixel `(0, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Origin {
    #[default]
    TopLeft,
    BottomLeft,
}

/// Subpixel arrangement of the display, used for LCD coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelGeometry {
    #[default]
    Unknown,
    RgbHorizontal,
    BgrHorizontal,
    RgbVertical,
    BgrVertical,
}

/// Client-visible properties of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SurfaceProps {
    pub pixel_geometry: PixelGeometry,
    /// Draw antialiased ops with multisampling when the target allows it.
    pub dynamic_msaa: bool,
}

/// Records draw ops against one render-target proxy.
#[derive(Debug)]
pub struct SurfaceDrawContext {
    proxy: ProxyRef,
    origin: Origin,
    color_info: ColorInfo,
    props: SurfaceProps,
    /// Load op applied when the next ops task for this surface starts.
    pending_load: LoadOp,
}

impl SurfaceDrawContext {
    /// Wrap `proxy`. Returns `None` unless the proxy is a render target
    /// whose format can hold `color_info`.
    pub fn new(
        proxy: ProxyRef,
        origin: Origin,
        color_info: ColorInfo,
        props: SurfaceProps,
    ) -> Option<Self> {
        let desc = proxy.texture_desc()?;
        if !proxy.is_render_target() || !color_info.color_type.is_compatible_with(desc.format) {
            return None;
        }
        Some(Self {
            proxy,
            origin,
            color_info,
            props,
            pending_load: LoadOp::Load,
        })
    }

    #[inline]
    pub const fn proxy(&self) -> &ProxyRef {
        &self.proxy
    }

    #[inline]
    pub const fn origin(&self) -> Origin {
        self.origin
    }

    #[inline]
    pub const fn color_info(&self) -> &ColorInfo {
        &self.color_info
    }

    #[inline]
    pub const fn props(&self) -> &SurfaceProps {
        &self.props
    }

    /// Target bounds in device space.
    pub fn bounds(&self) -> Rect {
        self.proxy
            .texture_desc()
            .map_or_else(Rect::default, |desc| {
                Rect::new(0.0, 0.0, desc.width as f32, desc.height as f32)
            })
    }

    /// Declare the current contents undefined.
    #[inline]
    pub const fn discard(&mut self) {
        self.pending_load = LoadOp::Discard;
    }

    /// Clear the whole surface when the next task starts.
    #[inline]
    pub const fn clear(&mut self, color: Color4f) {
        self.pending_load = LoadOp::Clear(color);
    }

    /// Whether a discard is waiting for the next ops task.
    #[inline]
    pub fn is_discard_pending(&self) -> bool {
        self.pending_load == LoadOp::Discard
    }

    /// Load op the next ops task will start with.
    #[inline]
    pub const fn pending_load(&self) -> LoadOp {
        self.pending_load
    }

    /// Clip, finalize and record `op`.
    ///
    /// The clip is applied first with the op's hardware-AA decision, then the
    /// op is finalized exactly once, then merged into a recent op of the
    /// surface's ops task or appended to it.
    ///
    /// # Errors
    /// Returns an error if the op was already finalized or the target ops
    /// task cannot accept ops.
    pub fn add_draw_op(
        &mut self,
        manager: &mut DrawingManager,
        mut op: Box<dyn DrawOp>,
        clip: &dyn Clip,
    ) -> AnyResult<RecordOutcome> {
        if op.analysis().is_some() {
            bail!("op '{}' was finalized before recording", op.name());
        }
        let caps = manager.context().caps_ref();
        let hw_aa = op.uses_msaa() && self.proxy.is_multisampled() && caps.supports_hw_aa();
        let bounds = op.bounds();
        let applied = match clip.apply(&bounds, hw_aa, &caps) {
            ClipEffect::ClippedOut => {
                debug!(target: "renderer", "op '{}' clipped out", op.name());
                return Ok(RecordOutcome::ClippedOut);
            }
            ClipEffect::Unclipped => AppliedClip::unclipped(hw_aa),
            ClipEffect::Clipped(applied) => applied,
        };
        let clamp = if self.color_info.color_type.is_normalized() {
            ClampType::Auto
        } else {
            ClampType::None
        };
        op.finalize(&caps, &applied, clamp);

        let load_op = mem::replace(&mut self.pending_load, LoadOp::Load);
        let task = manager.ops_task_for(&self.proxy, load_op);
        manager.record_op(task, RecordedOp::new(op, applied))
    }

    /// Record a solid rectangle fill.
    ///
    /// # Errors
    /// See [`Self::add_draw_op`].
    pub fn fill_rect(
        &mut self,
        manager: &mut DrawingManager,
        rect: Rect,
        processors: ProcessorSet,
        aa: AaType,
        clip: &dyn Clip,
    ) -> AnyResult<RecordOutcome> {
        self.add_draw_op(manager, Box::new(FillRectOp::new(rect, processors, aa)), clip)
    }

    /// Task that would receive the next op without a new load op, if open.
    pub fn open_task(&self, manager: &DrawingManager) -> Option<TaskId> {
        manager.get_last_render_task(&self.proxy).filter(|task| {
            manager
                .task(*task)
                .is_some_and(|entry| entry.is_ops_task() && !entry.is_closed())
        })
    }
}
