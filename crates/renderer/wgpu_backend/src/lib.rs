//! WGPU implementation of the renderer's device interface.
//!
//! [`WgpuDevice`] backs proxies with wgpu textures and buffers and derives the
//! renderer's `Caps` from the adapter it was created on.
#![allow(
    clippy::missing_docs_in_private_items,
    clippy::missing_inline_in_public_items,
    clippy::std_instead_of_core,
    clippy::default_trait_access,
    reason = "GPU backend glue follows wgpu's descriptor patterns"
)]

mod device;
mod error;
mod format;

pub use device::{WgpuBuffer, WgpuDevice, WgpuTexture};
pub use error::{submit_with_validation, with_validation_scope};
pub use format::{buffer_usages, caps_for_adapter, required_feature, texture_format, texture_usages};
