//! Clip collaborators and the per-op result of applying them.

use crate::caps::Caps;
use crate::geometry::{IRect, Rect};
use core::fmt::Debug;

/// How a clip ended up being rasterized for one op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppliedClip {
    /// Hardware scissor rectangle.
    pub scissor: Option<IRect>,
    /// Clip written into the stencil buffer and tested by the op.
    pub stencil: bool,
    /// Clip coverage multiplied into the op's output.
    pub coverage: bool,
    /// The op and its clip are rasterized with hardware antialiasing.
    pub hw_aa: bool,
}

impl AppliedClip {
    /// An applied clip that clips nothing.
    #[inline]
    pub const fn unclipped(hw_aa: bool) -> Self {
        Self {
            scissor: None,
            stencil: false,
            coverage: false,
            hw_aa,
        }
    }

    /// Whether any component actually restricts the op.
    #[inline]
    pub const fn is_clipped(&self) -> bool {
        self.scissor.is_some() || self.stencil || self.coverage
    }
}

/// Result of applying a clip to an op's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipEffect {
    /// The op draws unchanged.
    Unclipped,
    /// The op draws through the applied clip.
    Clipped(AppliedClip),
    /// Nothing of the op survives; it is dropped.
    ClippedOut,
}

/// Something that restricts where ops may draw.
pub trait Clip: Debug {
    /// Bounds outside of which nothing draws, or `None` when unbounded.
    fn conservative_bounds(&self) -> Option<Rect>;

    /// Decide how this clip applies to an op covering `draw_bounds`.
    ///
    /// `hw_aa` tells whether the op is drawn with hardware antialiasing, which
    /// decides whether an antialiased edge can go through the stencil buffer.
    fn apply(&self, draw_bounds: &Rect, hw_aa: bool, caps: &Caps) -> ClipEffect;
}

/// The empty clip.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClip;

impl Clip for NoClip {
    #[inline]
    fn conservative_bounds(&self) -> Option<Rect> {
        None
    }

    #[inline]
    fn apply(&self, _draw_bounds: &Rect, _hw_aa: bool, _caps: &Caps) -> ClipEffect {
        ClipEffect::Unclipped
    }
}

/// Axis-aligned rectangular clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectClip {
    pub rect: Rect,
    pub anti_alias: bool,
}

impl RectClip {
    #[inline]
    pub const fn new(rect: Rect, anti_alias: bool) -> Self {
        Self { rect, anti_alias }
    }
}

impl Clip for RectClip {
    #[inline]
    fn conservative_bounds(&self) -> Option<Rect> {
        Some(self.rect)
    }

    fn apply(&self, draw_bounds: &Rect, hw_aa: bool, caps: &Caps) -> ClipEffect {
        if self.rect.is_empty() || !self.rect.intersects(draw_bounds) {
            return ClipEffect::ClippedOut;
        }
        if self.rect.contains(draw_bounds) {
            return ClipEffect::Unclipped;
        }
        let mut applied = AppliedClip::unclipped(hw_aa);
        applied.scissor = Some(self.rect.round_out());
        if self.anti_alias && !self.rect.is_pixel_aligned() {
            // Fractional edges: MSAA draws resolve them in the stencil buffer,
            // everything else multiplies analytic coverage.
            if hw_aa && caps.stencil_support {
                applied.stencil = true;
            } else {
                applied.coverage = true;
            }
        }
        ClipEffect::Clipped(applied)
    }
}
