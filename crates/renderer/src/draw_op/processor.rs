//! Fragment processing of an op and the analysis that drives its execution.

use crate::blend::{BlendCoeff, BlendMode, Blender, BlendClass};
use crate::caps::Caps;
use crate::color::Color4f;
use super::clip::AppliedClip;
use std::sync::Arc;

/// Per-pixel coverage an op produces on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverageType {
    /// Every covered pixel is fully covered.
    None,
    /// One coverage value per pixel.
    SingleChannel,
    /// Separate coverage per color channel (subpixel text).
    Lcd,
}

/// Whether and how the op's color output is clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClampType {
    /// The target format clamps on write.
    Auto,
    /// The op must clamp in its program.
    Manual,
    /// Values may leave `[0, 1]`.
    None,
}

/// What finalize decided for one op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessorAnalysis {
    /// The destination color must be made readable before the op runs.
    pub requires_dst_read: bool,
    /// The op is rasterized with hardware (multisample) antialiasing.
    pub uses_hw_aa: bool,
    /// The op tests or writes the stencil buffer.
    pub uses_stencil: bool,
    /// The op's program must clamp its output.
    pub requires_manual_clamp: bool,
    /// Coverage is emitted through a second blend input.
    pub uses_dual_source: bool,
}

/// Paint color plus blend of an op.
#[derive(Debug, Clone)]
pub struct ProcessorSet {
    color: Color4f,
    blender: Blender,
}

impl ProcessorSet {
    #[inline]
    pub const fn new(color: Color4f, blender: Blender) -> Self {
        Self { color, blender }
    }

    /// Source-over with a solid color.
    #[inline]
    pub fn solid(color: Color4f) -> Self {
        Self::new(color, Blender::mode(BlendMode::SrcOver))
    }

    #[inline]
    pub const fn color(&self) -> Color4f {
        self.color
    }

    #[inline]
    pub const fn blender(&self) -> &Blender {
        &self.blender
    }

    /// Whether two ops with these processors may share a draw.
    pub fn is_compatible(&self, other: &Self) -> bool {
        if self.color != other.color {
            return false;
        }
        match (self.blender.class(), other.blender.class()) {
            (BlendClass::Coefficient { mode, .. }, BlendClass::Coefficient { mode: other_mode, .. }) => {
                mode == other_mode
            }
            (
                BlendClass::Program { program, .. },
                BlendClass::Program {
                    program: other_program,
                    ..
                },
            ) => Arc::ptr_eq(program, other_program),
            (BlendClass::Coefficient { .. }, BlendClass::Program { .. })
            | (BlendClass::Program { .. }, BlendClass::Coefficient { .. }) => false,
        }
    }

    /// Decide destination-read and hardware requirements.
    ///
    /// Coefficient blends run on the blend unit unless coverage cannot be
    /// folded into the source term, in which case dual-source blending or a
    /// destination read takes over. Program blends read the destination unless
    /// the device implements the named mode as a blend equation.
    pub fn finalize(
        &self,
        coverage: CoverageType,
        clip: &AppliedClip,
        caps: &Caps,
        clamp: ClampType,
    ) -> ProcessorAnalysis {
        let has_coverage = coverage != CoverageType::None || clip.coverage;
        let mut analysis = ProcessorAnalysis {
            uses_hw_aa: clip.hw_aa,
            uses_stencil: clip.stencil,
            requires_manual_clamp: clamp == ClampType::Manual,
            ..ProcessorAnalysis::default()
        };
        match self.blender.class() {
            BlendClass::Coefficient { src, dst, .. } => {
                let foldable = coverage != CoverageType::Lcd && coverage_as_alpha_compatible(*src, *dst);
                if has_coverage && !foldable {
                    if caps.dual_source_blend_support {
                        analysis.uses_dual_source = true;
                    } else {
                        analysis.requires_dst_read = true;
                    }
                }
            }
            BlendClass::Program { mode, .. } => {
                let hardware_equation = caps.advanced_blend_equation_support
                    && mode.is_some()
                    && coverage != CoverageType::Lcd;
                analysis.requires_dst_read = !hardware_equation;
            }
        }
        analysis
    }
}

/// Whether scaling the source term by coverage gives the same result as
/// lerping between the blended color and the destination.
fn coverage_as_alpha_compatible(src: BlendCoeff, dst: BlendCoeff) -> bool {
    matches!(
        src,
        BlendCoeff::Zero | BlendCoeff::One | BlendCoeff::DstAlpha | BlendCoeff::InvDstAlpha
    ) && matches!(
        dst,
        BlendCoeff::One | BlendCoeff::InvSrcAlpha | BlendCoeff::InvSrcColor
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::ColorProgram;
    use crate::color::ColorInfo;

    #[derive(Debug)]
    struct Invert;

    impl ColorProgram for Invert {
        fn blend(&self, _src: Color4f, dst: Color4f, _info: &ColorInfo) -> Color4f {
            Color4f::new(dst.alpha - dst.red, dst.alpha - dst.green, dst.alpha - dst.blue, dst.alpha)
        }
    }

    fn white() -> Color4f {
        Color4f::new(1.0, 1.0, 1.0, 1.0)
    }

    /// # Panics
    /// Panics if src-over with coverage reads the destination.
    #[test]
    fn src_over_folds_coverage() {
        let set = ProcessorSet::solid(white());
        let analysis = set.finalize(
            CoverageType::SingleChannel,
            &AppliedClip::default(),
            &Caps::default(),
            ClampType::Auto,
        );
        assert!(!analysis.requires_dst_read);
        assert!(!analysis.uses_dual_source);
    }

    /// # Panics
    /// Panics if an incompatible coefficient blend skips the fallback.
    #[test]
    fn clear_with_coverage_falls_back() {
        let set = ProcessorSet::new(white(), Blender::mode(BlendMode::Clear));
        let without_dual = set.finalize(
            CoverageType::SingleChannel,
            &AppliedClip::default(),
            &Caps::default(),
            ClampType::Auto,
        );
        assert!(without_dual.requires_dst_read);

        let caps = Caps {
            dual_source_blend_support: true,
            ..Caps::default()
        };
        let with_dual = set.finalize(
            CoverageType::SingleChannel,
            &AppliedClip::default(),
            &caps,
            ClampType::Auto,
        );
        assert!(!with_dual.requires_dst_read);
        assert!(with_dual.uses_dual_source);

        let no_coverage = set.finalize(
            CoverageType::None,
            &AppliedClip::default(),
            &Caps::default(),
            ClampType::Auto,
        );
        assert!(!no_coverage.requires_dst_read);
    }

    /// # Panics
    /// Panics if program blends do not read the destination.
    #[test]
    fn programs_read_destination() {
        let custom = ProcessorSet::new(white(), Blender::custom(Arc::new(Invert)));
        let advanced = ProcessorSet::new(white(), Blender::mode(BlendMode::Multiply));
        let caps = Caps {
            advanced_blend_equation_support: true,
            ..Caps::default()
        };
        let clip = AppliedClip::default();
        assert!(
            custom
                .finalize(CoverageType::None, &clip, &caps, ClampType::Auto)
                .requires_dst_read
        );
        assert!(
            !advanced
                .finalize(CoverageType::None, &clip, &caps, ClampType::Auto)
                .requires_dst_read
        );
        assert!(
            advanced
                .finalize(CoverageType::None, &clip, &Caps::default(), ClampType::Auto)
                .requires_dst_read
        );
    }

    /// # Panics
    /// Panics if clip decisions are not carried into the analysis.
    #[test]
    fn clip_flags_reach_analysis() {
        let set = ProcessorSet::solid(white());
        let clip = AppliedClip {
            stencil: true,
            hw_aa: true,
            ..AppliedClip::default()
        };
        let analysis = set.finalize(CoverageType::None, &clip, &Caps::default(), ClampType::Manual);
        assert!(analysis.uses_stencil);
        assert!(analysis.uses_hw_aa);
        assert!(analysis.requires_manual_clamp);
    }

    /// # Panics
    /// Panics if processors with different blends are treated as compatible.
    #[test]
    fn compatibility() {
        let program: Arc<dyn ColorProgram> = Arc::new(Invert);
        let first = ProcessorSet::new(white(), Blender::custom(Arc::clone(&program)));
        let second = ProcessorSet::new(white(), Blender::custom(program));
        let third = ProcessorSet::new(white(), Blender::custom(Arc::new(Invert)));
        assert!(first.is_compatible(&second));
        assert!(!first.is_compatible(&third));
        assert!(ProcessorSet::solid(white()).is_compatible(&ProcessorSet::solid(white())));
        assert!(!ProcessorSet::solid(white()).is_compatible(&first));
    }
}
