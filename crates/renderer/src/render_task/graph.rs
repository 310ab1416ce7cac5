//! The drawing manager: task arena, last-writer index and flush.

use super::flush_state::{ExecutedOp, ExecutedPass, ExecutedResolve, FlushState};
use super::{LoadOp, OpsTask, RecordOutcome, RenderTask, RenderTaskKind, TaskId, TaskStatus};
use crate::context::RecordingContext;
use crate::draw_op::RecordedOp;
use crate::flush::{OnFlushCallbackObject, OnFlushResourceProvider};
use crate::resource::{AllocatorPolicy, InstantiationState, ProxyId, ProxyRef, ResolveFlags, ResourceProvider};
use anyhow::{Result as AnyResult, anyhow, bail};
use core::cmp::Reverse;
use core::fmt;
use core::mem;
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BinaryHeap;
use tracing::info_span;

/// What one flush did.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Execution order of every task in the flush.
    pub order: Vec<TaskId>,
    pub executed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
    /// Proxies instantiated by the allocator pre-pass.
    pub instantiated: usize,
    pub passes: Vec<ExecutedPass>,
    pub ops: Vec<ExecutedOp>,
    pub resolves: Vec<ExecutedResolve>,
}

impl FlushReport {
    /// Position of `task` in the execution order.
    pub fn position(&self, task: TaskId) -> Option<usize> {
        self.order.iter().position(|candidate| *candidate == task)
    }

    #[inline]
    pub fn is_executed(&self, task: TaskId) -> bool {
        self.executed.contains(&task)
    }

    #[inline]
    pub fn is_failed(&self, task: TaskId) -> bool {
        self.failed.contains(&task)
    }

    /// Ops executed for `task`, in execution order.
    pub fn ops_for(&self, task: TaskId) -> impl Iterator<Item = &ExecutedOp> {
        self.ops.iter().filter(move |op| op.task == task)
    }
}

/// Owns the render tasks recorded for one context and flushes them.
pub struct DrawingManager {
    context: RecordingContext,
    tasks: Vec<RenderTask>,
    /// Most recent task that declared a write to each proxy.
    last_writers: FxHashMap<ProxyId, TaskId>,
    on_flush_callbacks: Vec<Box<dyn OnFlushCallbackObject>>,
    flushes: u64,
}

impl DrawingManager {
    pub fn new(context: RecordingContext) -> Self {
        Self {
            context,
            tasks: Vec::new(),
            last_writers: FxHashMap::default(),
            on_flush_callbacks: Vec::new(),
            flushes: 0,
        }
    }

    #[inline]
    pub const fn context(&self) -> &RecordingContext {
        &self.context
    }

    #[inline]
    pub const fn context_mut(&mut self) -> &mut RecordingContext {
        &mut self.context
    }

    #[inline]
    pub fn task(&self, id: TaskId) -> Option<&RenderTask> {
        self.tasks.get(id.index())
    }

    /// Tasks recorded since the last flush, in creation order.
    #[inline]
    pub fn tasks(&self) -> &[RenderTask] {
        &self.tasks
    }

    /// Number of completed flushes.
    #[inline]
    pub const fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// The task that most recently declared a write to `proxy`.
    #[inline]
    pub fn get_last_render_task(&self, proxy: &ProxyRef) -> Option<TaskId> {
        self.last_writers.get(&proxy.id()).copied()
    }

    /// Register a callback run at the start of every flush.
    pub fn add_on_flush_callback_object(&mut self, callback: Box<dyn OnFlushCallbackObject>) {
        self.on_flush_callbacks.push(callback);
    }

    /// Append a task writing `targets`.
    ///
    /// Each target's previous writer is closed and becomes a predecessor, and
    /// the new task becomes the target's last writer.
    pub fn push_task(
        &mut self,
        label: &str,
        kind: RenderTaskKind,
        targets: Vec<ProxyRef>,
    ) -> TaskId {
        let id = TaskId(self.tasks.len() as u32);
        let mut task = RenderTask::new(id, label, kind, targets);
        let target_ids: Vec<ProxyId> = task.targets().iter().map(|proxy| proxy.id()).collect();
        for target in &target_ids {
            if let Some(previous) = self.last_writers.insert(*target, id) {
                self.make_closed(previous);
                task.add_dependency(previous);
            }
        }
        debug!(target: "renderer", "pushed task '{label}' as {id:?}");
        self.tasks.push(task);
        id
    }

    /// Open ops task writing `target`.
    pub fn new_ops_task(&mut self, target: &ProxyRef, load_op: LoadOp) -> TaskId {
        let label = format!("ops:{}", target.label());
        self.push_task(
            &label,
            RenderTaskKind::Ops(OpsTask::new(load_op)),
            vec![ProxyRef::clone(target)],
        )
    }

    /// The open ops task currently writing `target`, or a new one.
    ///
    /// A load op other than [`LoadOp::Load`] always starts a new task.
    pub fn ops_task_for(&mut self, target: &ProxyRef, load_op: LoadOp) -> TaskId {
        if load_op == LoadOp::Load
            && let Some(existing) = self.get_last_render_task(target)
            && self
                .task(existing)
                .is_some_and(|task| task.is_ops_task() && !task.is_closed())
        {
            return existing;
        }
        self.new_ops_task(target, load_op)
    }

    /// Append a finalized op to an open ops task.
    ///
    /// # Errors
    /// Returns an error if `task` is unknown, closed, or not an ops task.
    pub fn record_op(&mut self, task: TaskId, recorded: RecordedOp) -> AnyResult<RecordOutcome> {
        let lookback = self.context.config().op_lookback;
        let caps = self.context.caps_ref();
        let entry = self
            .tasks
            .get_mut(task.index())
            .ok_or_else(|| anyhow!("unknown task {task:?}"))?;
        if entry.is_closed() {
            bail!("task '{}' is closed", entry.label());
        }
        let RenderTaskKind::Ops(ops_task) = entry.kind_mut() else {
            bail!("task '{}' does not hold ops", entry.label());
        };
        if ops_task.record(recorded, lookback, &caps) {
            Ok(RecordOutcome::Merged(task))
        } else {
            Ok(RecordOutcome::Recorded(task))
        }
    }

    /// Declare that `task` reads `proxy`.
    ///
    /// The proxy's last writer is closed and recorded as a predecessor.
    /// Returns `false` if `task` is closed or unknown, or if the edge would
    /// make the graph cyclic.
    pub fn add_dependency(&mut self, task: TaskId, proxy: &ProxyRef) -> bool {
        let Some(entry) = self.tasks.get(task.index()) else {
            return false;
        };
        if entry.is_closed() {
            warn!(target: "renderer", "cannot add a read of '{}' to closed task '{}'", proxy.label(), entry.label());
            return false;
        }
        let writer = self.get_last_render_task(proxy).filter(|writer| *writer != task);
        if let Some(writer) = writer {
            if self.is_ordered_before(task, writer) {
                warn!(target: "renderer", "read of '{}' would order {task:?} both before and after {writer:?}", proxy.label());
                return false;
            }
            self.make_closed(writer);
        }
        if let Some(entry) = self.tasks.get_mut(task.index()) {
            if let Some(writer) = writer {
                entry.add_dependency(writer);
            }
            entry.add_read(proxy);
        }
        true
    }

    /// Close `task`, freezing its dependencies.
    ///
    /// Closing an ops task leaves its multisampled targets needing a resolve
    /// and its mipmapped targets needing regeneration. A second call does
    /// nothing.
    pub fn make_closed(&mut self, task: TaskId) {
        let Some(entry) = self.tasks.get_mut(task.index()) else {
            return;
        };
        if !entry.close() {
            return;
        }
        if entry.is_ops_task() {
            for target in entry.targets() {
                let mut dirty = ResolveFlags::empty();
                if target.is_multisampled() {
                    dirty |= ResolveFlags::MSAA;
                }
                if target.is_mipmapped() {
                    dirty |= ResolveFlags::MIPMAPS;
                }
                target.mark_dirty(dirty);
            }
        }
        debug!(
            target: "renderer",
            "closed task '{}' with {} dependencies",
            entry.label(),
            entry.dependencies().len()
        );
    }

    /// Schedule a resolve of `flags` on `proxy` after everything that wrote it.
    ///
    /// The proxy's last writer is force-closed before the resolve task is
    /// created, so the writer is a predecessor of the resolve. The new task is
    /// closed immediately. Returns `None` if the proxy is not a texture or
    /// supports none of the requested work.
    pub fn add_texture_resolve(&mut self, proxy: &ProxyRef, flags: ResolveFlags) -> Option<TaskId> {
        if !proxy.is_texture() {
            return None;
        }
        let mut supported = ResolveFlags::empty();
        if proxy.is_multisampled() {
            supported |= ResolveFlags::MSAA;
        }
        if proxy.is_mipmapped() && self.context.caps().mipmap_support {
            supported |= ResolveFlags::MIPMAPS;
        }
        let requested = flags & supported;
        if requested.is_empty() {
            debug!(target: "renderer", "nothing to resolve on '{}' for {flags:?}", proxy.label());
            return None;
        }

        if let Some(writer) = self.get_last_render_task(proxy) {
            self.make_closed(writer);
        }
        let label = format!("resolve:{}", proxy.label());
        let id = self.push_task(
            &label,
            RenderTaskKind::TextureResolve(vec![(ProxyRef::clone(proxy), requested)]),
            vec![ProxyRef::clone(proxy)],
        );
        let cleared = proxy.clear_dirty(requested);
        if cleared != requested {
            debug!(
                target: "renderer",
                "resolve of '{}' requested {requested:?} but only {cleared:?} was pending",
                proxy.label()
            );
        }
        self.make_closed(id);
        Some(id)
    }

    /// Whether `before` must execute before `after`, directly or transitively.
    pub fn is_ordered_before(&self, before: TaskId, after: TaskId) -> bool {
        if before == after {
            return false;
        }
        let mut visited = FxHashSet::default();
        let mut stack = vec![after];
        while let Some(current) = stack.pop() {
            let Some(task) = self.task(current) else {
                continue;
            };
            for dependency in task.dependencies() {
                if *dependency == before {
                    return true;
                }
                if visited.insert(*dependency) {
                    stack.push(*dependency);
                }
            }
        }
        false
    }

    fn close_all_tasks(&mut self) {
        for index in 0..self.tasks.len() {
            self.make_closed(TaskId(index as u32));
        }
    }

    fn run_on_flush_callbacks(&mut self) {
        if self.on_flush_callbacks.is_empty() {
            return;
        }
        let _span = info_span!("renderer.flush.on_flush_callbacks").entered();
        let mut callbacks = mem::take(&mut self.on_flush_callbacks);
        {
            let mut provider = OnFlushResourceProvider::new(self);
            for callback in &mut callbacks {
                if let Err(err) = callback.pre_flush(&mut provider) {
                    provider.print_warning_message(&format!("on-flush callback failed: {err:#}"));
                }
            }
        }
        callbacks.append(&mut self.on_flush_callbacks);
        self.on_flush_callbacks = callbacks;
    }

    /// Execution order: dependencies first, ties broken by creation order.
    fn topological_order(&self) -> AnyResult<Vec<TaskId>> {
        let count = self.tasks.len();
        let mut pending = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for task in &self.tasks {
            for dependency in task.dependencies() {
                if let (Some(slot), Some(list)) = (
                    pending.get_mut(task.id().index()),
                    dependents.get_mut(dependency.index()),
                ) {
                    *slot += 1;
                    list.push(task.id().index());
                }
            }
        }
        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|(_, waiting)| **waiting == 0)
            .map(|(index, _)| Reverse(index))
            .collect();
        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(index)) = ready.pop() {
            order.push(TaskId(index as u32));
            for next in dependents.get(index).map_or(&[][..], Vec::as_slice) {
                if let Some(slot) = pending.get_mut(*next) {
                    *slot -= 1;
                    if *slot == 0 {
                        ready.push(Reverse(*next));
                    }
                }
            }
        }
        if order.len() != count {
            bail!(
                "render task graph has a cycle: ordered {} of {count} tasks",
                order.len()
            );
        }
        Ok(order)
    }

    /// Instantiate every participating proxy. Returns the proxies that
    /// cannot back their tasks and the number instantiated.
    fn allocate(
        tasks: &[RenderTask],
        order: &[TaskId],
        resources: &ResourceProvider,
    ) -> (FxHashSet<ProxyId>, usize) {
        let mut seen = FxHashSet::default();
        let mut failed = FxHashSet::default();
        let mut instantiated = 0;
        for task in order.iter().filter_map(|id| tasks.get(id.index())) {
            for proxy in task.proxies() {
                if !seen.insert(proxy.id()) {
                    continue;
                }
                match (proxy.state(), proxy.allocator_policy()) {
                    (InstantiationState::Instantiated, _) => {}
                    (InstantiationState::Failed, _) => {
                        failed.insert(proxy.id());
                    }
                    (_, AllocatorPolicy::Excluded) => {
                        warn!(
                            target: "renderer",
                            "proxy '{}' skips the allocator but was never instantiated",
                            proxy.label()
                        );
                        failed.insert(proxy.id());
                    }
                    (_, AllocatorPolicy::Participates) => match proxy.instantiate(resources) {
                        Ok(()) => instantiated += 1,
                        Err(err) => {
                            warn!(target: "renderer", "{err:#}");
                            failed.insert(proxy.id());
                        }
                    },
                }
            }
        }
        (failed, instantiated)
    }

    /// Compile the recorded tasks into an ordered graph and execute it.
    ///
    /// Tasks whose proxies cannot be instantiated, or whose predecessors
    /// failed, are skipped and reported as failed; unrelated tasks still run.
    /// Recorded tasks are consumed whether or not the flush succeeds.
    ///
    /// # Errors
    /// Returns an error if the context cannot allocate (recording-only) or the
    /// task graph is cyclic.
    pub fn flush(&mut self) -> AnyResult<FlushReport> {
        let _span = info_span!("renderer.flush", tasks = self.tasks.len()).entered();
        if !self.context.is_direct() {
            self.reset();
            bail!("flush requires a direct context");
        }
        self.close_all_tasks();
        self.run_on_flush_callbacks();
        self.close_all_tasks();

        let order = match self.topological_order() {
            Ok(order) => order,
            Err(err) => {
                self.reset();
                return Err(err);
            }
        };
        let report = self.execute(order);
        self.reset();
        self.flushes += 1;
        if let Ok(report) = report.as_ref() {
            for callback in &mut self.on_flush_callbacks {
                callback.post_flush(report);
            }
        }
        report
    }

    fn execute(&mut self, order: Vec<TaskId>) -> AnyResult<FlushReport> {
        let resources = self
            .context
            .as_direct()
            .ok_or_else(|| anyhow!("flush requires a direct context"))?;
        let (failed_proxies, instantiated) = Self::allocate(&self.tasks, &order, resources);

        let _span = info_span!("renderer.flush.execute", tasks = order.len()).entered();
        let mut state = FlushState::new(self.context.caps(), resources, self.context.config());
        let mut report = FlushReport {
            instantiated,
            ..FlushReport::default()
        };
        for id in &order {
            let Some(task) = self.tasks.get_mut(id.index()) else {
                continue;
            };
            let failed_dependency = task
                .dependencies()
                .iter()
                .find(|dependency| report.failed.contains(dependency))
                .copied();
            let failed_proxy = task
                .proxies()
                .find(|proxy| failed_proxies.contains(&proxy.id()))
                .map(|proxy| proxy.label().to_owned());
            let outcome = if let Some(dependency) = failed_dependency {
                Err(anyhow!("predecessor {dependency:?} failed"))
            } else if let Some(label) = failed_proxy {
                Err(anyhow!("proxy '{label}' is not instantiated"))
            } else {
                task.execute(&mut state)
            };
            match outcome {
                Ok(()) => {
                    task.set_status(TaskStatus::Executed);
                    report.executed.push(*id);
                }
                Err(err) => {
                    warn!(target: "renderer", "task '{}' failed: {err:#}", task.label());
                    task.set_status(TaskStatus::Failed);
                    report.failed.push(*id);
                }
            }
        }
        let (passes, ops, resolves) = state.finish();
        report.order = order;
        report.passes = passes;
        report.ops = ops;
        report.resolves = resolves;
        Ok(report)
    }

    fn reset(&mut self) {
        self.tasks.clear();
        self.last_writers.clear();
        self.context.proxy_provider_mut().0.purge_dead();
    }
}

impl fmt::Debug for DrawingManager {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DrawingManager")
            .field("context", &self.context.id())
            .field("tasks", &self.tasks.len())
            .field("callbacks", &self.on_flush_callbacks.len())
            .field("flushes", &self.flushes)
            .finish()
    }
}
