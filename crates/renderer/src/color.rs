//! Colors and the color description of a surface.

use crate::resource::PixelFormat;

/// Premultiplied RGBA color with float channels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color4f {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color4f {
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Create a premultiplied color.
    #[inline]
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Premultiply an unpremultiplied color.
    #[inline]
    pub fn from_unpremul(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self::new(red * alpha, green * alpha, blue * alpha, alpha)
    }

    /// Color channels as an array, without alpha.
    #[inline]
    pub const fn rgb(&self) -> [f32; 3] {
        [self.red, self.green, self.blue]
    }

    /// Build from color channels and alpha.
    #[inline]
    pub const fn from_rgb(rgb: [f32; 3], alpha: f32) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2], alpha)
    }

    /// Clamp every channel into `[0, 1]`.
    #[inline]
    pub const fn clamp01(self) -> Self {
        Self::new(
            self.red.clamp(0.0, 1.0),
            self.green.clamp(0.0, 1.0),
            self.blue.clamp(0.0, 1.0),
            self.alpha.clamp(0.0, 1.0),
        )
    }

    /// Whether two colors agree within `tolerance` on every channel.
    #[inline]
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        (self.red - other.red).abs() <= tolerance
            && (self.green - other.green).abs() <= tolerance
            && (self.blue - other.blue).abs() <= tolerance
            && (self.alpha - other.alpha).abs() <= tolerance
    }
}

/// Channel layout of surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorType {
    Rgba8888,
    Bgra8888,
    Alpha8,
    RgbaF16,
}

impl ColorType {
    /// Whether stored values are limited to `[0, 1]`.
    #[inline]
    pub const fn is_normalized(self) -> bool {
        !matches!(self, Self::RgbaF16)
    }

    /// Whether pixels of this type can live in `format`.
    #[inline]
    pub const fn is_compatible_with(self, format: PixelFormat) -> bool {
        matches!(
            (self, format),
            (
                Self::Rgba8888,
                PixelFormat::Rgba8Unorm | PixelFormat::Rgba8UnormSrgb
            ) | (Self::Bgra8888, PixelFormat::Bgra8Unorm)
                | (Self::Alpha8, PixelFormat::R8Unorm)
                | (Self::RgbaF16, PixelFormat::Rgba16Float)
        )
    }
}

/// How alpha relates to the color channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaType {
    Opaque,
    Premul,
    Unpremul,
}

/// Color space of surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    LinearSrgb,
    DisplayP3,
}

/// Per-pixel color description passed to blend programs and surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorInfo {
    pub color_type: ColorType,
    pub alpha_type: AlphaType,
    pub color_space: Option<ColorSpace>,
}

impl ColorInfo {
    #[inline]
    pub const fn new(
        color_type: ColorType,
        alpha_type: AlphaType,
        color_space: Option<ColorSpace>,
    ) -> Self {
        Self {
            color_type,
            alpha_type,
            color_space,
        }
    }
}

impl Default for ColorInfo {
    #[inline]
    fn default() -> Self {
        Self::new(ColorType::Rgba8888, AlphaType::Premul, Some(ColorSpace::Srgb))
    }
}
