//! In-memory device for exercising the scheduling core without a GPU.

use crate::caps::Caps;
use crate::config::RendererConfig;
use crate::context::RecordingContext;
use crate::resource::{BufferDesc, GpuBuffer, GpuDevice, GpuResourceId, GpuTexture, TextureDesc};
use anyhow::{Result as AnyResult, bail};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;

/// Payload stored inside objects created by [`RecordingDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedObject {
    pub label: String,
    /// Bytes uploaded at creation, if any.
    pub contents: Option<Vec<u8>>,
}

/// Device that allocates nothing and counts every request.
#[derive(Debug)]
pub struct RecordingDevice {
    caps: Caps,
    textures: AtomicUsize,
    buffers: AtomicUsize,
    uploads: AtomicUsize,
    failing: AtomicBool,
    labels: Mutex<Vec<String>>,
}

impl RecordingDevice {
    pub fn new(caps: Caps) -> Self {
        Self {
            caps,
            textures: AtomicUsize::new(0),
            buffers: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            labels: Mutex::new(Vec::new()),
        }
    }

    /// Make every following allocation fail, or succeed again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn texture_count(&self) -> usize {
        self.textures.load(Ordering::Relaxed)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.load(Ordering::Relaxed)
    }

    /// Number of buffers created with initial data.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::Relaxed)
    }

    /// Labels of every object created, in order.
    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().clone()
    }
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new(Caps::default())
    }
}

impl GpuDevice for RecordingDevice {
    fn create_texture(&self, desc: &TextureDesc, label: &str) -> AnyResult<GpuTexture> {
        if self.failing.load(Ordering::Relaxed) {
            bail!("recording device refused texture '{label}'");
        }
        self.textures.fetch_add(1, Ordering::Relaxed);
        self.labels.lock().push(label.to_owned());
        let payload = RecordedObject {
            label: label.to_owned(),
            contents: None,
        };
        Ok(GpuTexture::new(GpuResourceId::next(), *desc, payload))
    }

    fn create_buffer(
        &self,
        desc: &BufferDesc,
        data: Option<&[u8]>,
        label: &str,
    ) -> AnyResult<GpuBuffer> {
        if self.failing.load(Ordering::Relaxed) {
            bail!("recording device refused buffer '{label}'");
        }
        self.buffers.fetch_add(1, Ordering::Relaxed);
        if data.is_some() {
            self.uploads.fetch_add(1, Ordering::Relaxed);
        }
        self.labels.lock().push(label.to_owned());
        let payload = RecordedObject {
            label: label.to_owned(),
            contents: data.map(<[u8]>::to_vec),
        };
        Ok(GpuBuffer::new(GpuResourceId::next(), *desc, payload))
    }

    fn caps(&self) -> &Caps {
        &self.caps
    }
}

/// A direct context over a fresh [`RecordingDevice`] with default caps.
pub fn direct_context() -> (RecordingContext, Arc<RecordingDevice>) {
    direct_context_with(Caps::default(), RendererConfig::default())
}

/// A direct context over a fresh [`RecordingDevice`].
pub fn direct_context_with(
    caps: Caps,
    config: RendererConfig,
) -> (RecordingContext, Arc<RecordingDevice>) {
    let device = Arc::new(RecordingDevice::new(caps));
    let context = RecordingContext::direct(Arc::clone(&device) as Arc<dyn GpuDevice>, config);
    (context, device)
}
