//! Deferred draw operations and their finalization protocol.
//!
//! An op is recorded against a surface, has its clip applied, is finalized
//! exactly once, and only then is merged into an earlier op or appended to the
//! surface's ops task. Execution reads the analysis produced by finalize to
//! decide whether the destination must be made readable first.

pub mod clip;
pub mod processor;

pub use clip::{AppliedClip, Clip, ClipEffect, NoClip, RectClip};
pub use processor::{ClampType, CoverageType, ProcessorAnalysis, ProcessorSet};

use crate::caps::Caps;
use crate::geometry::Rect;
use crate::render_task::FlushState;
use anyhow::Result as AnyResult;
use bitflags::bitflags;
use core::any::Any;
use core::fmt::Debug;

bitflags! {
    /// Hardware state an op needs before clipping is decided.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FixedFunctionFlags: u8 {
        const USES_HW_AA = 1;
        const USES_STENCIL = 1 << 1;
    }
}

/// Outcome of asking one op to absorb another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineResult {
    /// The other op was absorbed and must be dropped.
    Merged,
    /// The ops stay separate.
    CannotCombine,
}

/// A deferred unit of drawing.
pub trait DrawOp: Debug + Send {
    /// Short name used in logs and execution records.
    fn name(&self) -> &'static str;

    /// Device-space bounds of everything the op may touch.
    fn bounds(&self) -> Rect;

    /// Whether the op wants multisample antialiasing.
    fn uses_msaa(&self) -> bool {
        false
    }

    /// Hardware requirements known before finalize.
    fn fixed_function_flags(&self) -> FixedFunctionFlags {
        if self.uses_msaa() {
            FixedFunctionFlags::USES_HW_AA
        } else {
            FixedFunctionFlags::empty()
        }
    }

    /// Decide hardware flags and destination-read needs.
    ///
    /// Runs once, after the clip is applied and before any merge.
    fn finalize(&mut self, caps: &Caps, clip: &AppliedClip, clamp: ClampType)
    -> ProcessorAnalysis;

    /// The analysis produced by finalize, or `None` before it ran.
    fn analysis(&self) -> Option<&ProcessorAnalysis>;

    /// Whether the op uses the stencil buffer. `None` until finalized.
    fn uses_stencil(&self) -> Option<bool> {
        self.analysis().map(|analysis| analysis.uses_stencil)
    }

    /// Try to absorb `other`, which was recorded after `self`.
    fn combine_if_possible(&mut self, _other: &mut dyn DrawOp, _caps: &Caps) -> CombineResult {
        CombineResult::CannotCombine
    }

    /// Issue the op's GPU work.
    ///
    /// # Errors
    /// Returns an error if a buffer or other resource the op needs cannot be
    /// created. Only the task holding the op fails.
    fn on_execute(&mut self, state: &mut FlushState<'_>) -> AnyResult<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A finalized op as stored in an ops task.
#[derive(Debug)]
pub struct RecordedOp {
    pub op: Box<dyn DrawOp>,
    pub clip: AppliedClip,
    /// Union of the bounds of every op merged into this one.
    pub bounds: Rect,
}

impl RecordedOp {
    #[inline]
    pub fn new(op: Box<dyn DrawOp>, clip: AppliedClip) -> Self {
        let bounds = op.bounds();
        Self { op, clip, bounds }
    }

    /// The finalize result, if the op was finalized.
    #[inline]
    pub fn analysis(&self) -> Option<&ProcessorAnalysis> {
        self.op.analysis()
    }
}
