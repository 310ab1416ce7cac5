//! Concrete draw ops.

pub mod fill_rect;
pub mod stroke_tessellate;

pub use fill_rect::{FillRectOp, MAX_QUADS_PER_DRAW, QuadVertex};
pub use stroke_tessellate::{StrokeInstance, StrokeTessellateOp};

/// How an op antialiases its edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AaType {
    #[default]
    None,
    /// Analytic coverage computed in the program.
    Coverage,
    /// Multisampling.
    Msaa,
}

/// Smallest `level` with `2^level >= value`.
#[inline]
pub const fn next_log2(value: u32) -> u32 {
    if value <= 1 {
        0
    } else {
        u32::BITS - (value - 1).leading_zeros()
    }
}
