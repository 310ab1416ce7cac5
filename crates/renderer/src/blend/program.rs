//! Blend programs evaluated per pixel.

use super::BlendMode;
use crate::color::{Color4f, ColorInfo};
use core::fmt::Debug;

/// A blend expressed as a function of source and destination colors.
///
/// Both colors are premultiplied. The caller clamps the result when the
/// target color type is normalized.
pub trait ColorProgram: Debug + Send + Sync {
    fn blend(&self, src: Color4f, dst: Color4f, info: &ColorInfo) -> Color4f;
}

/// Built-in program for the advanced (non-coefficient) modes.
///
/// Coefficient modes handed to this program fall back to source-over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvancedBlend {
    mode: BlendMode,
}

impl AdvancedBlend {
    #[inline]
    pub const fn new(mode: BlendMode) -> Self {
        Self { mode }
    }

    #[inline]
    pub const fn mode(&self) -> BlendMode {
        self.mode
    }
}

impl ColorProgram for AdvancedBlend {
    fn blend(&self, src: Color4f, dst: Color4f, _info: &ColorInfo) -> Color4f {
        let src_color = unpremul(src);
        let dst_color = unpremul(dst);
        let mixed = match self.mode {
            BlendMode::Hue => set_lum(
                set_sat(src_color, saturation(dst_color)),
                luminance(dst_color),
            ),
            BlendMode::Saturation => set_lum(
                set_sat(dst_color, saturation(src_color)),
                luminance(dst_color),
            ),
            BlendMode::Color => set_lum(src_color, luminance(dst_color)),
            BlendMode::Luminosity => set_lum(dst_color, luminance(src_color)),
            BlendMode::Overlay
            | BlendMode::Darken
            | BlendMode::Lighten
            | BlendMode::ColorDodge
            | BlendMode::ColorBurn
            | BlendMode::HardLight
            | BlendMode::SoftLight
            | BlendMode::Difference
            | BlendMode::Exclusion
            | BlendMode::Multiply => {
                let mode = self.mode;
                [0, 1, 2].map(|index| separable(mode, src_color[index], dst_color[index]))
            }
            BlendMode::Clear
            | BlendMode::Src
            | BlendMode::Dst
            | BlendMode::SrcOver
            | BlendMode::DstOver
            | BlendMode::SrcIn
            | BlendMode::DstIn
            | BlendMode::SrcOut
            | BlendMode::DstOut
            | BlendMode::SrcATop
            | BlendMode::DstATop
            | BlendMode::Xor
            | BlendMode::Plus
            | BlendMode::Modulate
            | BlendMode::Screen => src_color,
        };
        composite(src, dst, mixed)
    }
}

/// Source-over composite of a mixed color, premultiplied.
fn composite(src: Color4f, dst: Color4f, mixed: [f32; 3]) -> Color4f {
    let both = src.alpha * dst.alpha;
    let channel = |src_value: f32, dst_value: f32, mixed_value: f32| {
        src_value * (1.0 - dst.alpha) + dst_value * (1.0 - src.alpha) + both * mixed_value
    };
    Color4f::new(
        channel(src.red, dst.red, mixed[0]),
        channel(src.green, dst.green, mixed[1]),
        channel(src.blue, dst.blue, mixed[2]),
        src.alpha + dst.alpha - both,
    )
}

fn unpremul(color: Color4f) -> [f32; 3] {
    if color.alpha <= 0.0 {
        return [0.0; 3];
    }
    color.rgb().map(|value| value / color.alpha)
}

fn separable(mode: BlendMode, src: f32, dst: f32) -> f32 {
    match mode {
        BlendMode::Multiply => src * dst,
        BlendMode::Overlay => hard_light(dst, src),
        BlendMode::Darken => src.min(dst),
        BlendMode::Lighten => src.max(dst),
        BlendMode::ColorDodge => {
            if dst <= 0.0 {
                0.0
            } else if src >= 1.0 {
                1.0
            } else {
                (dst / (1.0 - src)).min(1.0)
            }
        }
        BlendMode::ColorBurn => {
            if dst >= 1.0 {
                1.0
            } else if src <= 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - dst) / src).min(1.0)
            }
        }
        BlendMode::HardLight => hard_light(src, dst),
        BlendMode::SoftLight => soft_light(src, dst),
        BlendMode::Difference => (src - dst).abs(),
        BlendMode::Exclusion => src + dst - 2.0 * src * dst,
        _ => src,
    }
}

fn hard_light(src: f32, dst: f32) -> f32 {
    if src <= 0.5 {
        dst * 2.0 * src
    } else {
        let doubled = 2.0 * src - 1.0;
        dst + doubled - dst * doubled
    }
}

fn soft_light(src: f32, dst: f32) -> f32 {
    if src <= 0.5 {
        dst - (1.0 - 2.0 * src) * dst * (1.0 - dst)
    } else {
        let lifted = if dst <= 0.25 {
            ((16.0 * dst - 12.0) * dst + 4.0) * dst
        } else {
            dst.sqrt()
        };
        dst + (2.0 * src - 1.0) * (lifted - dst)
    }
}

fn luminance(color: [f32; 3]) -> f32 {
    0.3 * color[0] + 0.59 * color[1] + 0.11 * color[2]
}

fn saturation(color: [f32; 3]) -> f32 {
    color[0].max(color[1]).max(color[2]) - color[0].min(color[1]).min(color[2])
}

fn clip_color(color: [f32; 3]) -> [f32; 3] {
    let lum = luminance(color);
    let low = color[0].min(color[1]).min(color[2]);
    let high = color[0].max(color[1]).max(color[2]);
    let mut out = color;
    if low < 0.0 && lum - low > f32::EPSILON {
        out = out.map(|value| lum + (value - lum) * lum / (lum - low));
    }
    if high > 1.0 && high - lum > f32::EPSILON {
        out = out.map(|value| lum + (value - lum) * (1.0 - lum) / (high - lum));
    }
    out
}

fn set_lum(color: [f32; 3], lum: f32) -> [f32; 3] {
    let delta = lum - luminance(color);
    clip_color(color.map(|value| value + delta))
}

fn set_sat(color: [f32; 3], sat: f32) -> [f32; 3] {
    let mut order = [0usize, 1, 2];
    order.sort_by(|left, right| color[*left].total_cmp(&color[*right]));
    let [min_index, mid_index, max_index] = order;
    let mut out = [0.0; 3];
    let range = color[max_index] - color[min_index];
    if range > 0.0 {
        out[mid_index] = (color[mid_index] - color[min_index]) * sat / range;
        out[max_index] = sat;
    }
    out
}
