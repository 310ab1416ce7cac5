//! Translation between renderer descriptors and wgpu descriptors.

use renderer::{AccessPattern, BufferKind, Caps, PixelFormat, TextureDesc};
use wgpu::{Adapter, BufferUsages, Features, TextureFormat, TextureUsages};

/// Sample counts probed for multisampled render targets, largest first.
const PROBED_SAMPLE_COUNTS: [u32; 3] = [8, 4, 2];

/// The wgpu format storing `format`.
#[inline]
pub const fn texture_format(format: PixelFormat) -> TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
        PixelFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
        PixelFormat::R8Unorm => TextureFormat::R8Unorm,
        PixelFormat::Rgba16Float => TextureFormat::Rgba16Float,
        PixelFormat::Depth24Stencil8 => TextureFormat::Depth24PlusStencil8,
        PixelFormat::Etc2Rgb8 => TextureFormat::Etc2Rgb8Unorm,
    }
}

/// Device feature a format needs, if any.
#[inline]
pub const fn required_feature(format: PixelFormat) -> Option<Features> {
    match format {
        PixelFormat::Etc2Rgb8 => Some(Features::TEXTURE_COMPRESSION_ETC2),
        PixelFormat::Rgba8Unorm
        | PixelFormat::Rgba8UnormSrgb
        | PixelFormat::Bgra8Unorm
        | PixelFormat::R8Unorm
        | PixelFormat::Rgba16Float
        | PixelFormat::Depth24Stencil8 => None,
    }
}

/// Usages for a texture created from `desc`.
///
/// Multisampled and depth-stencil textures cannot be copied, so they get no
/// copy usages.
pub fn texture_usages(desc: &TextureDesc) -> TextureUsages {
    let mut usages = TextureUsages::TEXTURE_BINDING;
    if desc.renderable {
        usages |= TextureUsages::RENDER_ATTACHMENT;
    }
    if desc.sample_count <= 1 && desc.format != PixelFormat::Depth24Stencil8 {
        usages |= TextureUsages::COPY_SRC | TextureUsages::COPY_DST;
    }
    usages
}

/// Usages for a buffer of `kind` written with `access`.
///
/// Static buffers are filled at creation and never written again; every other
/// GPU-side buffer is rewritten through the queue.
pub fn buffer_usages(kind: BufferKind, access: AccessPattern) -> BufferUsages {
    let base = match kind {
        BufferKind::Vertex => BufferUsages::VERTEX,
        BufferKind::Index => BufferUsages::INDEX,
        BufferKind::Uniform => BufferUsages::UNIFORM,
        BufferKind::DrawIndirect => BufferUsages::INDIRECT,
        BufferKind::XferCpuToGpu => return BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC,
        BufferKind::XferGpuToCpu => return BufferUsages::MAP_READ | BufferUsages::COPY_DST,
    };
    if access == AccessPattern::Static {
        base
    } else {
        base | BufferUsages::COPY_DST
    }
}

/// Capabilities of a device created on `adapter` with `features`.
pub fn caps_for_adapter(adapter: &Adapter, features: Features) -> Caps {
    let limits = adapter.limits();
    let color_flags = adapter
        .get_texture_format_features(TextureFormat::Rgba8Unorm)
        .flags;
    let max_render_target_sample_count = PROBED_SAMPLE_COUNTS
        .into_iter()
        .find(|count| color_flags.sample_count_supported(*count))
        .unwrap_or(1);
    Caps {
        max_texture_size: limits.max_texture_dimension_2d,
        max_render_target_sample_count,
        // wgpu exposes no tessellation stages.
        max_tessellation_segments: 0,
        stencil_support: true,
        dual_source_blend_support: features.contains(Features::DUAL_SOURCE_BLENDING),
        framebuffer_fetch_support: false,
        advanced_blend_equation_support: false,
        mipmap_support: true,
    }
}
