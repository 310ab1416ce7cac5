//! Render tasks and the graph that orders them.
//!
//! A task is created open, collects work while open, and is closed exactly
//! once. Edges are not declared up front: declaring a write or a read looks up
//! the proxy's last writer and records it as a predecessor.

pub mod flush_state;
pub mod graph;

pub use flush_state::{DrawRecord, DstRead, ExecutedOp, ExecutedPass, ExecutedResolve, FlushState};
pub use graph::{DrawingManager, FlushReport};

use crate::caps::Caps;
use crate::color::Color4f;
use crate::draw_op::{CombineResult, RecordedOp};
use crate::resource::{ProxyRef, ResolveFlags};
use anyhow::{Result as AnyResult, bail};
use core::mem;

/// Index of a task in the drawing manager's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u32);

impl TaskId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// What happens to the target's previous contents when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Load,
    Clear(Color4f),
    /// Contents are undefined; the task overwrites everything it needs.
    Discard,
}

/// Execution state of a task within one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Executed,
    Failed,
}

/// Result of recording an op into a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The op became a new entry of the task.
    Recorded(TaskId),
    /// The op was absorbed by an earlier op of the task.
    Merged(TaskId),
    /// The clip removed the op entirely.
    ClippedOut,
}

/// Draw ops recorded against one target.
#[derive(Debug)]
pub struct OpsTask {
    pub load_op: LoadOp,
    ops: Vec<RecordedOp>,
}

impl OpsTask {
    #[inline]
    pub const fn new(load_op: LoadOp) -> Self {
        Self {
            load_op,
            ops: Vec::new(),
        }
    }

    #[inline]
    pub fn ops(&self) -> &[RecordedOp] {
        &self.ops
    }

    /// Merge `incoming` into one of the last `lookback` ops or append it.
    ///
    /// The walk stops at the first op overlapping `incoming`, since drawing
    /// `incoming` earlier than that op would change the result. Ops reading
    /// the destination never merge with an op they overlap.
    pub(crate) fn record(
        &mut self,
        mut incoming: RecordedOp,
        lookback: usize,
        caps: &Caps,
    ) -> bool {
        let reads_dst = incoming
            .analysis()
            .is_some_and(|analysis| analysis.requires_dst_read);
        for candidate in self.ops.iter_mut().rev().take(lookback) {
            let overlaps = candidate.bounds.intersects(&incoming.bounds);
            if candidate.clip == incoming.clip
                && !(overlaps && reads_dst)
                && candidate.op.combine_if_possible(incoming.op.as_mut(), caps)
                    == CombineResult::Merged
            {
                candidate.bounds.union(incoming.bounds);
                return true;
            }
            if overlaps {
                break;
            }
        }
        self.ops.push(incoming);
        false
    }
}

/// What a task does when executed.
#[derive(Debug)]
pub enum RenderTaskKind {
    Ops(OpsTask),
    /// Multisample resolves and mipmap regeneration.
    TextureResolve(Vec<(ProxyRef, ResolveFlags)>),
}

/// A node of the render task graph.
#[derive(Debug)]
pub struct RenderTask {
    id: TaskId,
    label: String,
    kind: RenderTaskKind,
    targets: Vec<ProxyRef>,
    reads: Vec<ProxyRef>,
    dependencies: Vec<TaskId>,
    closed: bool,
    status: TaskStatus,
}

impl RenderTask {
    pub(crate) fn new(
        id: TaskId,
        label: &str,
        kind: RenderTaskKind,
        targets: Vec<ProxyRef>,
    ) -> Self {
        Self {
            id,
            label: label.to_owned(),
            kind,
            targets,
            reads: Vec::new(),
            dependencies: Vec::new(),
            closed: false,
            status: TaskStatus::Pending,
        }
    }

    #[inline]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub const fn kind(&self) -> &RenderTaskKind {
        &self.kind
    }

    #[inline]
    pub(crate) const fn kind_mut(&mut self) -> &mut RenderTaskKind {
        &mut self.kind
    }

    /// Proxies this task writes.
    #[inline]
    pub fn targets(&self) -> &[ProxyRef] {
        &self.targets
    }

    /// Proxies this task reads.
    #[inline]
    pub fn reads(&self) -> &[ProxyRef] {
        &self.reads
    }

    /// Tasks that must execute before this one.
    #[inline]
    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    #[inline]
    pub fn depends_on(&self, other: TaskId) -> bool {
        self.dependencies.contains(&other)
    }

    #[inline]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    #[inline]
    pub const fn is_ops_task(&self) -> bool {
        matches!(self.kind, RenderTaskKind::Ops(_))
    }

    /// The ops of an ops task.
    #[inline]
    pub fn ops(&self) -> Option<&[RecordedOp]> {
        match &self.kind {
            RenderTaskKind::Ops(ops_task) => Some(ops_task.ops()),
            RenderTaskKind::TextureResolve(_) => None,
        }
    }

    /// Every proxy the task touches, writes first.
    pub fn proxies(&self) -> impl Iterator<Item = &ProxyRef> {
        self.targets.iter().chain(self.reads.iter())
    }

    pub(crate) fn add_dependency(&mut self, dependency: TaskId) {
        if dependency != self.id && !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
    }

    pub(crate) fn add_read(&mut self, proxy: &ProxyRef) {
        if !self.reads.iter().any(|read| read.id() == proxy.id()) {
            self.reads.push(ProxyRef::clone(proxy));
        }
    }

    /// Mark closed. Returns whether the task was open.
    pub(crate) fn close(&mut self) -> bool {
        !mem::replace(&mut self.closed, true)
    }

    pub(crate) fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    /// Run the task's work against `state`.
    pub(crate) fn execute(&mut self, state: &mut FlushState<'_>) -> AnyResult<()> {
        let id = self.id;
        match &mut self.kind {
            RenderTaskKind::Ops(ops_task) => {
                let Some(target) = self.targets.first() else {
                    bail!("ops task '{}' has no target", self.label);
                };
                let target_id = target.id();
                state.begin_pass(id, target_id, ops_task.load_op);
                for recorded in &mut ops_task.ops {
                    let name = recorded.op.name();
                    debug_assert!(
                        recorded.analysis().is_some(),
                        "op '{name}' reached execution without being finalized"
                    );
                    let Some(analysis) = recorded.analysis().copied() else {
                        bail!("op '{name}' reached execution without being finalized");
                    };
                    state.begin_op(id, target_id, name, recorded.bounds, &analysis);
                    if let Err(err) = recorded.op.on_execute(state) {
                        state.abandon_op();
                        return Err(err.context(format!("executing op '{name}'")));
                    }
                    state.end_op();
                }
            }
            RenderTaskKind::TextureResolve(resolves) => {
                for (proxy, flags) in resolves.iter() {
                    state.record_resolve(id, proxy.id(), *flags);
                }
            }
        }
        Ok(())
    }
}
