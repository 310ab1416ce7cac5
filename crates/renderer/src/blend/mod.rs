//! Blend functions and their classification.
//!
//! A blend combines the source color (the paint) with the destination color
//! (the surface). Blends that reduce to a fixed pair of Porter-Duff factors run
//! on the hardware blend unit and never need to read the destination; every
//! other blend is a program over both colors. The classification is computed
//! once when the blender is built.

mod program;

pub use program::{AdvancedBlend, ColorProgram};

use crate::color::{Color4f, ColorInfo};
use core::fmt;
use std::sync::Arc;

/// Factor applied to the source or destination term of a coefficient blend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendCoeff {
    Zero,
    One,
    /// Source color.
    SrcColor,
    /// One minus source color.
    InvSrcColor,
    /// Destination color.
    DstColor,
    /// One minus destination color.
    InvDstColor,
    /// Source alpha.
    SrcAlpha,
    /// One minus source alpha.
    InvSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// One minus destination alpha.
    InvDstAlpha,
}

impl BlendCoeff {
    /// Factor value for one channel.
    #[inline]
    fn factor(self, src: f32, dst: f32, src_alpha: f32, dst_alpha: f32) -> f32 {
        match self {
            Self::Zero => 0.0,
            Self::One => 1.0,
            Self::SrcColor => src,
            Self::InvSrcColor => 1.0 - src,
            Self::DstColor => dst,
            Self::InvDstColor => 1.0 - dst,
            Self::SrcAlpha => src_alpha,
            Self::InvSrcAlpha => 1.0 - src_alpha,
            Self::DstAlpha => dst_alpha,
            Self::InvDstAlpha => 1.0 - dst_alpha,
        }
    }

    /// Whether the factor does not depend on the source term.
    #[inline]
    pub const fn is_source_independent(self) -> bool {
        matches!(
            self,
            Self::Zero | Self::One | Self::DstColor | Self::InvDstColor | Self::DstAlpha | Self::InvDstAlpha
        )
    }
}

/// Named blend modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Clear,
    Src,
    Dst,
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    SrcOut,
    DstOut,
    SrcATop,
    DstATop,
    Xor,
    Plus,
    Modulate,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Multiply,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    /// Every mode, coefficient modes first.
    pub const ALL: [Self; 29] = [
        Self::Clear,
        Self::Src,
        Self::Dst,
        Self::SrcOver,
        Self::DstOver,
        Self::SrcIn,
        Self::DstIn,
        Self::SrcOut,
        Self::DstOut,
        Self::SrcATop,
        Self::DstATop,
        Self::Xor,
        Self::Plus,
        Self::Modulate,
        Self::Screen,
        Self::Overlay,
        Self::Darken,
        Self::Lighten,
        Self::ColorDodge,
        Self::ColorBurn,
        Self::HardLight,
        Self::SoftLight,
        Self::Difference,
        Self::Exclusion,
        Self::Multiply,
        Self::Hue,
        Self::Saturation,
        Self::Color,
        Self::Luminosity,
    ];

    /// The `(src, dst)` factor pair, for modes the blend unit can run directly.
    pub const fn as_coeff(self) -> Option<(BlendCoeff, BlendCoeff)> {
        use BlendCoeff::{
            DstAlpha, InvDstAlpha, InvSrcAlpha, InvSrcColor, One, SrcAlpha, SrcColor, Zero,
        };
        let pair = match self {
            Self::Clear => (Zero, Zero),
            Self::Src => (One, Zero),
            Self::Dst => (Zero, One),
            Self::SrcOver => (One, InvSrcAlpha),
            Self::DstOver => (InvDstAlpha, One),
            Self::SrcIn => (DstAlpha, Zero),
            Self::DstIn => (Zero, SrcAlpha),
            Self::SrcOut => (InvDstAlpha, Zero),
            Self::DstOut => (Zero, InvSrcAlpha),
            Self::SrcATop => (DstAlpha, InvSrcAlpha),
            Self::DstATop => (InvDstAlpha, SrcAlpha),
            Self::Xor => (InvDstAlpha, InvSrcAlpha),
            Self::Plus => (One, One),
            Self::Modulate => (Zero, SrcColor),
            Self::Screen => (One, InvSrcColor),
            Self::Overlay
            | Self::Darken
            | Self::Lighten
            | Self::ColorDodge
            | Self::ColorBurn
            | Self::HardLight
            | Self::SoftLight
            | Self::Difference
            | Self::Exclusion
            | Self::Multiply
            | Self::Hue
            | Self::Saturation
            | Self::Color
            | Self::Luminosity => return None,
        };
        Some(pair)
    }

    /// Whether the mode needs a program rather than fixed factors.
    #[inline]
    pub const fn is_advanced(self) -> bool {
        self.as_coeff().is_none()
    }
}

/// Result of classifying a blend.
#[derive(Clone)]
pub enum BlendClass {
    /// Runs on the fixed-function blend unit.
    Coefficient {
        mode: BlendMode,
        src: BlendCoeff,
        dst: BlendCoeff,
    },
    /// Needs the destination color inside a program.
    Program {
        /// The named mode this program implements, if any.
        mode: Option<BlendMode>,
        program: Arc<dyn ColorProgram>,
    },
}

impl fmt::Debug for BlendClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coefficient { mode, src, dst } => formatter
                .debug_struct("Coefficient")
                .field("mode", mode)
                .field("src", src)
                .field("dst", dst)
                .finish(),
            Self::Program { mode, program } => formatter
                .debug_struct("Program")
                .field("mode", mode)
                .field("program", program)
                .finish(),
        }
    }
}

/// A classified blend function.
#[derive(Debug, Clone)]
pub struct Blender {
    class: BlendClass,
}

impl Blender {
    /// Blender for a named mode. Coefficient modes classify as coefficients.
    pub fn mode(mode: BlendMode) -> Self {
        let class = match mode.as_coeff() {
            Some((src, dst)) => BlendClass::Coefficient { mode, src, dst },
            None => BlendClass::Program {
                mode: Some(mode),
                program: Arc::new(AdvancedBlend::new(mode)),
            },
        };
        Self { class }
    }

    /// Blender running an arbitrary program. Always classifies as a program.
    pub fn custom(program: Arc<dyn ColorProgram>) -> Self {
        Self {
            class: BlendClass::Program {
                mode: None,
                program,
            },
        }
    }

    #[inline]
    pub const fn class(&self) -> &BlendClass {
        &self.class
    }

    /// The named mode this blender implements.
    #[inline]
    pub const fn as_blend_mode(&self) -> Option<BlendMode> {
        match &self.class {
            BlendClass::Coefficient { mode, .. } => Some(*mode),
            BlendClass::Program { mode, .. } => *mode,
        }
    }

    /// Whether this blender is equivalent to `expected`.
    #[inline]
    pub fn is_blend_mode(&self, expected: BlendMode) -> bool {
        self.as_blend_mode() == Some(expected)
    }

    /// Whether this blender implements no named mode.
    #[inline]
    pub const fn is_custom_blend(&self) -> bool {
        self.as_blend_mode().is_none()
    }

    #[inline]
    pub const fn is_coefficient(&self) -> bool {
        matches!(self.class, BlendClass::Coefficient { .. })
    }

    /// The fixed factor pair, for coefficient blends.
    #[inline]
    pub const fn as_coefficient(&self) -> Option<(BlendCoeff, BlendCoeff)> {
        match &self.class {
            BlendClass::Coefficient { src, dst, .. } => Some((*src, *dst)),
            BlendClass::Program { .. } => None,
        }
    }

    /// Blend one premultiplied pixel.
    pub fn program(&self, src: Color4f, dst: Color4f, info: &ColorInfo) -> Color4f {
        let blended = match &self.class {
            BlendClass::Coefficient {
                src: src_coeff,
                dst: dst_coeff,
                ..
            } => apply_coefficients(*src_coeff, *dst_coeff, src, dst),
            BlendClass::Program { program, .. } => program.blend(src, dst, info),
        };
        if info.color_type.is_normalized() {
            blended.clamp01()
        } else {
            blended
        }
    }
}

impl Default for Blender {
    #[inline]
    fn default() -> Self {
        Self::mode(BlendMode::SrcOver)
    }
}

fn apply_coefficients(
    src_coeff: BlendCoeff,
    dst_coeff: BlendCoeff,
    src: Color4f,
    dst: Color4f,
) -> Color4f {
    let channel = |src_value: f32, dst_value: f32| {
        src_value * src_coeff.factor(src_value, dst_value, src.alpha, dst.alpha)
            + dst_value * dst_coeff.factor(src_value, dst_value, src.alpha, dst.alpha)
    };
    Color4f::new(
        channel(src.red, dst.red),
        channel(src.green, dst.green),
        channel(src.blue, dst.blue),
        channel(src.alpha, dst.alpha),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Average;

    impl ColorProgram for Average {
        fn blend(&self, src: Color4f, dst: Color4f, _info: &ColorInfo) -> Color4f {
            Color4f::new(
                (src.red + dst.red) * 0.5,
                (src.green + dst.green) * 0.5,
                (src.blue + dst.blue) * 0.5,
                (src.alpha + dst.alpha) * 0.5,
            )
        }
    }

    /// # Panics
    /// Panics if a coefficient mode is not classified as its factor pair.
    #[test]
    fn coefficient_modes_classify_as_pairs() {
        for mode in BlendMode::ALL {
            let blender = Blender::mode(mode);
            assert!(blender.is_blend_mode(mode));
            assert_eq!(blender.as_coefficient(), mode.as_coeff(), "{mode:?}");
            assert_eq!(blender.is_coefficient(), !mode.is_advanced(), "{mode:?}");
        }
        let src_over = Blender::mode(BlendMode::SrcOver);
        assert_eq!(
            src_over.as_coefficient(),
            Some((BlendCoeff::One, BlendCoeff::InvSrcAlpha))
        );
    }

    /// # Panics
    /// Panics if a custom program is reported as a coefficient blend.
    #[test]
    fn custom_program_stays_a_program() {
        let blender = Blender::custom(Arc::new(Average));
        assert!(blender.is_custom_blend());
        assert!(!blender.is_coefficient());
        assert!(blender.as_coefficient().is_none());
        assert!(!blender.is_blend_mode(BlendMode::SrcOver));
        assert!(matches!(blender.class(), BlendClass::Program { mode: None, .. }));
    }

    /// # Panics
    /// Panics if src-over does not composite as expected.
    #[test]
    fn src_over_evaluates() {
        let info = ColorInfo::default();
        let src = Color4f::from_unpremul(1.0, 0.0, 0.0, 0.5);
        let dst = Color4f::new(0.0, 0.0, 1.0, 1.0);
        let out = Blender::mode(BlendMode::SrcOver).program(src, dst, &info);
        assert!(out.approx_eq(&Color4f::new(0.5, 0.0, 0.5, 1.0), 1e-6));
    }

    /// # Panics
    /// Panics if normalized outputs are not clamped.
    #[test]
    fn plus_clamps_for_normalized_targets() {
        let info = ColorInfo::default();
        let white = Color4f::new(1.0, 1.0, 1.0, 1.0);
        let out = Blender::mode(BlendMode::Plus).program(white, white, &info);
        assert!(out.approx_eq(&white, 1e-6));
    }

    /// # Panics
    /// Panics if the custom program is not invoked.
    #[test]
    fn custom_program_runs() {
        let info = ColorInfo::default();
        let blender = Blender::custom(Arc::new(Average));
        let out = blender.program(
            Color4f::new(1.0, 1.0, 1.0, 1.0),
            Color4f::TRANSPARENT,
            &info,
        );
        assert!(out.approx_eq(&Color4f::new(0.5, 0.5, 0.5, 0.5), 1e-6));
    }
}
