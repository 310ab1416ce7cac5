//! Flush-time resource provisioning and render-task scheduling.
//!
//! Draw ops are recorded against surfaces, finalized once their clip is
//! known, and collected into render tasks. At flush the drawing manager closes
//! the tasks, lets on-flush callbacks inject work through the flush resource
//! provider, orders the graph, instantiates proxies and executes.

pub mod blend;
pub mod caps;
pub mod color;
pub mod config;
pub mod context;
pub mod draw_op;
pub mod flush;
pub mod geometry;
pub mod ops;
pub mod render_task;
pub mod resource;
pub mod surface;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use blend::{AdvancedBlend, BlendClass, BlendCoeff, BlendMode, Blender, ColorProgram};
pub use caps::Caps;
pub use color::{AlphaType, Color4f, ColorInfo, ColorSpace, ColorType};
pub use config::RendererConfig;
pub use context::{ContextId, RecordingContext};
pub use draw_op::{
    AppliedClip, ClampType, Clip, ClipEffect, CombineResult, CoverageType, DrawOp,
    FixedFunctionFlags, NoClip, ProcessorAnalysis, ProcessorSet, RecordedOp, RectClip,
};
pub use flush::{OnFlushCallbackObject, OnFlushResourceProvider};
pub use geometry::{IRect, Rect};
pub use ops::{AaType, FillRectOp, StrokeTessellateOp};
pub use render_task::{
    DrawingManager, DstRead, FlushReport, FlushState, LoadOp, RecordOutcome, RenderTask,
    RenderTaskKind, TaskId, TaskStatus,
};
pub use resource::{
    AccessPattern, AllocatorPolicy, BufferDesc, BufferKind, GpuBuffer, GpuDevice, GpuResourceId,
    GpuTexture, InstantiationState, InvalidateGpuResource, KeyDomain, KeyReuse,
    LazyInstantiateCallback, PixelFormat, ProxyId, ProxyKind, ProxyProvider, ProxyRef,
    ResolveFlags, ResourceCache, ResourceProvider, ResourceProxy, TextureDesc, UniqueKey,
};
pub use surface::{Origin, PixelGeometry, SurfaceDrawContext, SurfaceProps};
