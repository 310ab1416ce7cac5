//! Read-only description of device limits and features.
//!
//! `Caps` is consumed by op finalization (hardware AA, stencil, blend support),
//! by the flush provider (render-target capability checks) and by tessellator
//! sizing.

use crate::resource::PixelFormat;

/// Device capabilities the scheduling core consults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    /// Largest texture dimension the device can allocate.
    pub max_texture_size: u32,
    /// Largest sample count usable for a color render target. `1` means no MSAA.
    pub max_render_target_sample_count: u32,
    /// Maximum hardware tessellation segments. `0` means no hardware tessellation.
    pub max_tessellation_segments: u32,
    /// Whether stencil attachments are available.
    pub stencil_support: bool,
    /// Whether the blend unit accepts a secondary shader output.
    pub dual_source_blend_support: bool,
    /// Whether shaders may read the destination color directly.
    pub framebuffer_fetch_support: bool,
    /// Whether advanced blend equations are implemented in hardware.
    pub advanced_blend_equation_support: bool,
    /// Whether mipmapped textures can be allocated and regenerated.
    pub mipmap_support: bool,
}

impl Caps {
    /// Whether a proxy of `format` with `sample_count` samples can be rendered to.
    #[inline]
    pub fn is_format_renderable(&self, format: PixelFormat, sample_count: u32) -> bool {
        format.is_color_renderable()
            && sample_count >= 1
            && sample_count <= self.max_render_target_sample_count
    }

    /// Whether the device can antialias with multisampling.
    #[inline]
    pub const fn supports_hw_aa(&self) -> bool {
        self.max_render_target_sample_count > 1
    }

    /// Whether `width`x`height` fits within the device's texture limits.
    #[inline]
    pub const fn fits_dimensions(&self, width: u32, height: u32) -> bool {
        width > 0 && height > 0 && width <= self.max_texture_size && height <= self.max_texture_size
    }

    /// Whether hardware tessellation shaders are available.
    #[inline]
    pub const fn supports_hw_tessellation(&self) -> bool {
        self.max_tessellation_segments > 0
    }
}

impl Default for Caps {
    #[inline]
    fn default() -> Self {
        Self {
            max_texture_size: 8192,
            max_render_target_sample_count: 4,
            max_tessellation_segments: 64,
            stencil_support: true,
            dual_source_blend_support: false,
            framebuffer_fetch_support: false,
            advanced_blend_equation_support: false,
            mipmap_support: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if renderability ignores the format or the sample limit.
    #[test]
    fn renderability() {
        let caps = Caps::default();
        assert!(caps.is_format_renderable(PixelFormat::Rgba8Unorm, 1));
        assert!(caps.is_format_renderable(PixelFormat::Rgba8Unorm, 4));
        assert!(!caps.is_format_renderable(PixelFormat::Rgba8Unorm, 8));
        assert!(!caps.is_format_renderable(PixelFormat::Etc2Rgb8, 1));
    }

    /// # Panics
    /// Panics if dimension limits are not enforced.
    #[test]
    fn dimensions() {
        let caps = Caps::default();
        assert!(caps.fits_dimensions(8192, 1));
        assert!(!caps.fits_dimensions(8193, 1));
        assert!(!caps.fits_dimensions(0, 16));
    }
}
