//! Execution-time state handed to ops and the record of what ran.

use super::{LoadOp, TaskId};
use crate::caps::Caps;
use crate::config::RendererConfig;
use crate::draw_op::ProcessorAnalysis;
use crate::geometry::{IRect, Rect};
use crate::resource::{AccessPattern, BufferKind, GpuBuffer, GpuResourceId, ProxyId, ResolveFlags, ResourceProvider};
use log::{debug, info};
use std::sync::Arc;

/// How the destination color is made readable for an op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstRead {
    /// The destination region is copied into a sampleable texture first.
    Copy { bounds: IRect },
    /// The program reads the attachment directly.
    FramebufferFetch,
}

/// One draw call issued by an op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub vertex_buffer: Option<GpuResourceId>,
    pub index_buffer: Option<GpuResourceId>,
    /// Indices, or vertices for non-indexed draws, per instance.
    pub element_count: u32,
    pub instance_count: u32,
}

/// Everything that happened for one executed op.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedOp {
    pub task: TaskId,
    pub target: ProxyId,
    pub name: &'static str,
    pub bounds: Rect,
    pub dst_read: Option<DstRead>,
    pub uses_stencil: bool,
    pub uses_hw_aa: bool,
    pub draws: Vec<DrawRecord>,
}

/// A texture resolve that ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutedResolve {
    pub task: TaskId,
    pub proxy: ProxyId,
    pub flags: ResolveFlags,
}

/// A render pass begun for an ops task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutedPass {
    pub task: TaskId,
    pub target: ProxyId,
    pub load_op: LoadOp,
}

/// State shared by every task executed in one flush.
#[derive(Debug)]
pub struct FlushState<'flush> {
    caps: &'flush Caps,
    resources: &'flush ResourceProvider,
    config: &'flush RendererConfig,
    current: Option<ExecutedOp>,
    passes: Vec<ExecutedPass>,
    ops: Vec<ExecutedOp>,
    resolves: Vec<ExecutedResolve>,
}

impl<'flush> FlushState<'flush> {
    pub const fn new(
        caps: &'flush Caps,
        resources: &'flush ResourceProvider,
        config: &'flush RendererConfig,
    ) -> Self {
        Self {
            caps,
            resources,
            config,
            current: None,
            passes: Vec::new(),
            ops: Vec::new(),
            resolves: Vec::new(),
        }
    }

    #[inline]
    pub const fn caps(&self) -> &'flush Caps {
        self.caps
    }

    #[inline]
    pub const fn resource_provider(&self) -> &'flush ResourceProvider {
        self.resources
    }

    /// Upload per-draw vertex data into a fresh stream buffer.
    pub fn make_vertex_buffer(&self, data: &[u8]) -> Option<Arc<GpuBuffer>> {
        self.resources.create_buffer(
            data.len(),
            BufferKind::Vertex,
            AccessPattern::Stream,
            Some(data),
        )
    }

    pub(crate) fn begin_pass(&mut self, task: TaskId, target: ProxyId, load_op: LoadOp) {
        self.passes.push(ExecutedPass {
            task,
            target,
            load_op,
        });
    }

    /// Start recording an op, choosing how its destination read is served.
    pub(crate) fn begin_op(
        &mut self,
        task: TaskId,
        target: ProxyId,
        name: &'static str,
        bounds: Rect,
        analysis: &ProcessorAnalysis,
    ) {
        let dst_read = analysis.requires_dst_read.then(|| {
            if self.caps.framebuffer_fetch_support {
                DstRead::FramebufferFetch
            } else {
                DstRead::Copy {
                    bounds: bounds.round_out(),
                }
            }
        });
        if let Some(read) = dst_read
            && self.config.log_dst_reads
        {
            info!(target: "renderer", "op '{name}' in {task:?} reads destination via {read:?}");
        }
        self.current = Some(ExecutedOp {
            task,
            target,
            name,
            bounds,
            dst_read,
            uses_stencil: analysis.uses_stencil,
            uses_hw_aa: analysis.uses_hw_aa,
            draws: Vec::new(),
        });
    }

    /// Record a draw call for the op being executed.
    pub fn record_draw(&mut self, draw: DrawRecord) {
        match self.current.as_mut() {
            Some(current) => current.draws.push(draw),
            None => debug!(target: "renderer", "draw recorded outside of an op: {draw:?}"),
        }
    }

    pub(crate) fn end_op(&mut self) {
        if let Some(finished) = self.current.take() {
            self.ops.push(finished);
        }
    }

    /// Drop the op being executed after it failed.
    pub(crate) fn abandon_op(&mut self) {
        self.current = None;
    }

    pub(crate) fn record_resolve(&mut self, task: TaskId, proxy: ProxyId, flags: ResolveFlags) {
        self.resolves.push(ExecutedResolve { task, proxy, flags });
    }

    pub(crate) fn finish(self) -> (Vec<ExecutedPass>, Vec<ExecutedOp>, Vec<ExecutedResolve>) {
        (self.passes, self.ops, self.resolves)
    }
}
