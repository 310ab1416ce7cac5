//! Headless wgpu device backing renderer proxies.

use crate::error::{submit_with_validation, with_validation_scope};
use crate::format::{buffer_usages, caps_for_adapter, required_feature, texture_format, texture_usages};
use anyhow::{Result as AnyResult, anyhow, bail};
use log::{debug, info};
use pollster::block_on;
use renderer::{
    AccessPattern, BufferDesc, Caps, GpuBuffer, GpuDevice, GpuResourceId, GpuTexture, TextureDesc,
};
use tracing::info_span;
use wgpu::util::{BufferInitDescriptor, DeviceExt as _};
use wgpu::{
    Adapter, AdapterInfo, Buffer, BufferDescriptor, BufferUsages, COPY_BUFFER_ALIGNMENT, Device,
    DeviceDescriptor, Extent3d, Features, Instance, InstanceDescriptor, Limits, MemoryHints, Queue,
    RequestAdapterOptions, Texture, TextureDescriptor, TextureDimension, TextureView,
    TextureViewDescriptor, Trace,
};

/// Features requested when the adapter offers them.
const OPTIONAL_FEATURES: Features =
    Features::DUAL_SOURCE_BLENDING.union(Features::TEXTURE_COMPRESSION_ETC2);

/// Native payload of textures created by [`WgpuDevice`].
#[derive(Debug)]
pub struct WgpuTexture {
    pub texture: Texture,
    /// Default view over every mip level.
    pub view: TextureView,
}

/// Native payload of buffers created by [`WgpuDevice`].
#[derive(Debug)]
pub struct WgpuBuffer {
    pub buffer: Buffer,
}

/// A wgpu device and queue with the capabilities of their adapter.
#[derive(Debug)]
pub struct WgpuDevice {
    device: Device,
    queue: Queue,
    caps: Caps,
    info: AdapterInfo,
}

impl WgpuDevice {
    /// Create a device on the default adapter without a surface.
    ///
    /// # Errors
    /// Returns an error if no adapter is available or device creation fails.
    pub fn new_headless() -> AnyResult<Self> {
        let _span = info_span!("wgpu_renderer.new_headless").entered();
        let instance = Instance::new(&InstanceDescriptor::default());
        let adapter = block_on(instance.request_adapter(&RequestAdapterOptions::default()))
            .map_err(|err| anyhow!("wgpu adapter not found: {err}"))?;
        Self::from_adapter(&adapter)
    }

    /// Create a device on `adapter`, enabling the optional features it offers.
    ///
    /// # Errors
    /// Returns an error if the adapter refuses to create a device.
    pub fn from_adapter(adapter: &Adapter) -> AnyResult<Self> {
        let features = adapter.features() & OPTIONAL_FEATURES;
        let (device, queue) = block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("renderer-device"),
            required_features: features,
            required_limits: Limits::default().using_resolution(adapter.limits()),
            memory_hints: MemoryHints::default(),
            trace: Trace::default(),
        }))?;
        let caps = caps_for_adapter(adapter, features);
        let info = adapter.get_info();
        info!(
            target: "wgpu_renderer",
            "device on '{}' ({:?}): max texture {}, {}x MSAA",
            info.name,
            info.backend,
            caps.max_texture_size,
            caps.max_render_target_sample_count
        );
        Ok(Self {
            device,
            queue,
            caps,
            info,
        })
    }

    #[inline]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    #[inline]
    pub const fn queue(&self) -> &Queue {
        &self.queue
    }

    #[inline]
    pub const fn adapter_info(&self) -> &AdapterInfo {
        &self.info
    }

    /// Create a buffer and write `data` through the queue.
    fn create_written_buffer(
        &self,
        desc: &BufferDesc,
        usage: BufferUsages,
        data: &[u8],
        label: &str,
    ) -> AnyResult<Buffer> {
        let padded_len = aligned_len(data.len().max(desc.size));
        let buffer = with_validation_scope(&self.device, label, || {
            self.device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size: padded_len,
                usage,
                mapped_at_creation: false,
            })
        })?;
        // Queue writes must cover a whole number of copy units.
        let mut contents = data.to_vec();
        contents.resize(aligned_len(data.len()) as usize, 0);
        self.queue.write_buffer(&buffer, 0, &contents);
        submit_with_validation(&self.device, &self.queue, [])?;
        Ok(buffer)
    }
}

fn aligned_len(len: usize) -> u64 {
    (len as u64).div_ceil(COPY_BUFFER_ALIGNMENT) * COPY_BUFFER_ALIGNMENT
}

impl GpuDevice for WgpuDevice {
    fn create_texture(&self, desc: &TextureDesc, label: &str) -> AnyResult<GpuTexture> {
        if let Some(feature) = required_feature(desc.format)
            && !self.device.features().contains(feature)
        {
            bail!("texture '{label}' needs {feature:?}, which the device lacks");
        }
        let texture = with_validation_scope(&self.device, label, || {
            self.device.create_texture(&TextureDescriptor {
                label: Some(label),
                size: Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: desc.mip_level_count(),
                sample_count: desc.sample_count,
                dimension: TextureDimension::D2,
                format: texture_format(desc.format),
                usage: texture_usages(desc),
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&TextureViewDescriptor::default());
        debug!(target: "wgpu_renderer", "created texture '{label}' {}x{}", desc.width, desc.height);
        Ok(GpuTexture::new(
            GpuResourceId::next(),
            *desc,
            WgpuTexture { texture, view },
        ))
    }

    fn create_buffer(
        &self,
        desc: &BufferDesc,
        data: Option<&[u8]>,
        label: &str,
    ) -> AnyResult<GpuBuffer> {
        let usage = buffer_usages(desc.kind, desc.access);
        let buffer = match data {
            Some(contents)
                if desc.access != AccessPattern::Static && usage.contains(BufferUsages::COPY_DST) =>
            {
                self.create_written_buffer(desc, usage, contents, label)?
            }
            Some(contents) => with_validation_scope(&self.device, label, || {
                self.device.create_buffer_init(&BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage,
                })
            })?,
            None => with_validation_scope(&self.device, label, || {
                self.device.create_buffer(&BufferDescriptor {
                    label: Some(label),
                    size: aligned_len(desc.size),
                    usage,
                    mapped_at_creation: false,
                })
            })?,
        };
        Ok(GpuBuffer::new(
            GpuResourceId::next(),
            *desc,
            WgpuBuffer { buffer },
        ))
    }

    #[inline]
    fn caps(&self) -> &Caps {
        &self.caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if lengths are not rounded up to the copy alignment.
    #[test]
    fn lengths_align_to_copy_units() {
        assert_eq!(aligned_len(0), 0);
        assert_eq!(aligned_len(1), 4);
        assert_eq!(aligned_len(4), 4);
        assert_eq!(aligned_len(66), 68);
    }
}
