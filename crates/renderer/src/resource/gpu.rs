//! Device abstraction consumed by the resource provider.
//!
//! Defines the `GpuDevice` trait that lets different graphics APIs back the
//! scheduling core, plus the descriptors and backing objects exchanged across
//! that seam.

use crate::caps::Caps;
use anyhow::Result as AnyResult;
use core::any::Any;
use core::fmt;
use core::fmt::Debug;
use core::sync::atomic::{AtomicU64, Ordering};

/// Next id handed out by [`GpuResourceId::next`].
static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuResourceId(pub u64);

impl GpuResourceId {
    /// Allocate a process-unique id.
    #[inline]
    pub fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Pixel formats a texture proxy may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    R8Unorm,
    Rgba16Float,
    Depth24Stencil8,
    /// Block-compressed; sampleable only.
    Etc2Rgb8,
}

impl PixelFormat {
    /// Whether the format can be a color attachment at all.
    #[inline]
    pub const fn is_color_renderable(self) -> bool {
        !matches!(self, Self::Depth24Stencil8 | Self::Etc2Rgb8)
    }

    /// Bytes per 4x4 block for compressed formats, per pixel otherwise.
    #[inline]
    pub const fn block_bytes(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Bgra8Unorm | Self::Depth24Stencil8 => 4,
            Self::Rgba16Float | Self::Etc2Rgb8 => 8,
        }
    }

    /// Whether [`Self::block_bytes`] covers a 4x4 block.
    #[inline]
    pub const fn is_compressed(self) -> bool {
        matches!(self, Self::Etc2Rgb8)
    }
}

/// Shape of a texture to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub mipmapped: bool,
    pub renderable: bool,
}

impl TextureDesc {
    /// Single-sampled, non-mipmapped descriptor.
    #[inline]
    pub const fn new(format: PixelFormat, width: u32, height: u32, renderable: bool) -> Self {
        Self {
            format,
            width,
            height,
            sample_count: 1,
            mipmapped: false,
            renderable,
        }
    }

    /// Number of mip levels implied by the dimensions.
    #[inline]
    pub fn mip_level_count(&self) -> u32 {
        if self.mipmapped {
            32 - self.width.max(self.height).max(1).leading_zeros()
        } else {
            1
        }
    }

    /// Approximate size of the base level in bytes.
    #[inline]
    pub fn base_level_bytes(&self) -> u64 {
        let (width, height) = if self.format.is_compressed() {
            (self.width.div_ceil(4), self.height.div_ceil(4))
        } else {
            (self.width, self.height)
        };
        u64::from(width)
            * u64::from(height)
            * u64::from(self.format.block_bytes())
            * u64::from(self.sample_count)
    }
}

/// Intended use of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
    DrawIndirect,
    XferCpuToGpu,
    XferGpuToCpu,
}

/// How often a buffer's contents change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPattern {
    /// Rewritten every flush.
    Dynamic,
    /// Written once, read many times.
    Static,
    /// Written once, read once.
    Stream,
}

/// Shape of a buffer to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub size: usize,
    pub kind: BufferKind,
    pub access: AccessPattern,
}

/// A device texture backing a proxy.
pub struct GpuTexture {
    id: GpuResourceId,
    desc: TextureDesc,
    native: Box<dyn Any + Send + Sync>,
}

impl GpuTexture {
    /// Wrap a backend object.
    #[inline]
    pub fn new<T: Any + Send + Sync>(id: GpuResourceId, desc: TextureDesc, native: T) -> Self {
        Self {
            id,
            desc,
            native: Box::new(native),
        }
    }

    /// Device identity.
    #[inline]
    pub const fn id(&self) -> GpuResourceId {
        self.id
    }

    /// Descriptor the texture was created with.
    #[inline]
    pub const fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// The backend object, if it is a `T`.
    #[inline]
    pub fn native<T: Any>(&self) -> Option<&T> {
        self.native.downcast_ref::<T>()
    }
}

impl Debug for GpuTexture {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GpuTexture")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

/// A device buffer.
pub struct GpuBuffer {
    id: GpuResourceId,
    desc: BufferDesc,
    native: Box<dyn Any + Send + Sync>,
}

impl GpuBuffer {
    /// Wrap a backend object.
    #[inline]
    pub fn new<T: Any + Send + Sync>(id: GpuResourceId, desc: BufferDesc, native: T) -> Self {
        Self {
            id,
            desc,
            native: Box::new(native),
        }
    }

    /// Device identity.
    #[inline]
    pub const fn id(&self) -> GpuResourceId {
        self.id
    }

    /// Descriptor the buffer was created with.
    #[inline]
    pub const fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    /// Size in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        self.desc.size
    }

    /// The backend object, if it is a `T`.
    #[inline]
    pub fn native<T: Any>(&self) -> Option<&T> {
        self.native.downcast_ref::<T>()
    }
}

impl Debug for GpuBuffer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GpuBuffer")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

/// Backend-agnostic device interface.
///
/// Implementations create device objects for a specific graphics API. Calls
/// may block on the driver and are treated as slow, synchronous operations.
pub trait GpuDevice: Debug + Send + Sync {
    /// Create a texture matching `desc`.
    ///
    /// # Errors
    /// Returns an error if the device cannot satisfy the format or size.
    fn create_texture(&self, desc: &TextureDesc, label: &str) -> AnyResult<GpuTexture>;

    /// Create a buffer, uploading `data` when given.
    ///
    /// # Errors
    /// Returns an error if allocation or upload fails.
    fn create_buffer(&self, desc: &BufferDesc, data: Option<&[u8]>, label: &str)
    -> AnyResult<GpuBuffer>;

    /// Capabilities of this device.
    fn caps(&self) -> &Caps;
}
