//! Area task dispatch.
//!
//! [`Dispatcher::run`] plans the worker grid for a task, starts it, fans the
//! work items out to scoped OS threads, joins them, finishes the task and
//! reports the first worker failure, if any.
//!
//! ## Lifecycle
//!
//! ```text
//! Planning ─→ Started ─→ Dispatching ─→ Joining ─→ Finished ─→ Ok | Err(Worker)
//!                │
//!                └─ start() failed ─→ Err(Start)
//! ```
//!
//! `start` happens before every `process_on_thread`, and every
//! `process_on_thread` happens before `finish`. Workers are not ordered
//! relative to each other.
//!
//! ## Degradation
//!
//! Thread creation goes through the [`Spawn`] trait. When it returns an error
//! (the OS is out of threads, memory for stacks, ...) the work item runs on
//! the dispatching thread instead. This is logged and counted in the
//! [`RunSummary`] but is not an error.
//!
//! ## Failures
//!
//! Each worker runs behind `catch_unwind`, so both `Err` returns and panics
//! end up in a per-run [`FailureSlot`]. The first failure recorded wins; any
//! later ones are logged at debug level and dropped. Joining is best effort:
//! a join that reports a panic is logged and the run carries on.

use crate::config::DispatchSection;
use crate::geometry::Rect;
use crate::host::{AbortSignal, BufferAllocator, HeapAllocator};
use crate::plan::{GridPlan, HARD_CEILING, plan};
use crate::task::{AreaTask, TaskError, WorkItem};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::sync::mpsc::Sender;
use std::thread::{self, Scope, ScopedJoinHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("task failed to start: {0}")]
    Start(#[source] TaskError),
    #[error("worker {index} failed: {source}")]
    Worker { index: usize, source: TaskError },
}

impl DispatchError {
    /// The task error behind this failure.
    pub fn task_error(&self) -> &TaskError {
        match self {
            DispatchError::Start(err) => err,
            DispatchError::Worker { source, .. } => source,
        }
    }
}

/// Where work items execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One OS thread per work item, falling back to inline on spawn failure.
    #[default]
    Threads,
    /// Every work item runs on the dispatching thread.
    Inline,
}

/// Creates one execution unit per work item.
pub trait Spawn: Sync {
    /// Start `f` on a new thread inside `scope`. An `Err` means no thread was
    /// created and `f` has been dropped without running.
    fn spawn<'scope, 'env, F>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        thread_index: usize,
        f: F,
    ) -> io::Result<ScopedJoinHandle<'scope, ()>>
    where
        F: FnOnce() + Send + 'scope;
}

/// Named OS threads from [`std::thread::Builder`].
#[derive(Debug, Clone)]
pub struct ThreadSpawner {
    pub name_prefix: String,
    pub stack_size: Option<usize>,
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self {
            name_prefix: "tile-worker".to_string(),
            stack_size: None,
        }
    }
}

impl Spawn for ThreadSpawner {
    fn spawn<'scope, 'env, F>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        thread_index: usize,
        f: F,
    ) -> io::Result<ScopedJoinHandle<'scope, ()>>
    where
        F: FnOnce() + Send + 'scope,
    {
        let mut builder = thread::Builder::new().name(format!("{}-{}", self.name_prefix, thread_index));
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn_scoped(scope, f)
    }
}

/// Progress notifications sent while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    Planned {
        plan: GridPlan,
    },
    WorkerStarted {
        index: usize,
        area: Rect,
        inline: bool,
    },
    WorkerFinished {
        index: usize,
        ok: bool,
    },
    Finished {
        worker_count: usize,
        spawned: usize,
        inline: usize,
        failed: bool,
    },
}

/// What a successful run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub plan: GridPlan,
    /// Work items that ran on their own thread.
    pub spawned: usize,
    /// Work items that ran on the dispatching thread.
    pub inline: usize,
}

/// First-writer-wins store for worker failures, scoped to one run.
#[derive(Debug, Default)]
pub struct FailureSlot {
    first: OnceLock<(usize, TaskError)>,
}

impl FailureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure from worker `index`. Returns `false` when an earlier
    /// failure already holds the slot and this one was discarded.
    pub fn record(&self, index: usize, error: TaskError) -> bool {
        match self.first.set((index, error)) {
            Ok(()) => true,
            Err((index, error)) => {
                debug!("discarding failure from worker {index}: {error}");
                false
            }
        }
    }

    pub fn is_set(&self) -> bool {
        self.first.get().is_some()
    }

    pub fn into_inner(self) -> Option<(usize, TaskError)> {
        self.first.into_inner()
    }
}

/// Runs [`AreaTask`]s across a bounded number of threads.
pub struct Dispatcher<S = ThreadSpawner> {
    spawner: S,
    mode: ExecutionMode,
    ceiling: usize,
    allocator: Box<dyn BufferAllocator>,
    abort: AbortSignal,
    events: Option<Sender<DispatchEvent>>,
}

impl Dispatcher<ThreadSpawner> {
    pub fn new() -> Self {
        Self::with_spawner(ThreadSpawner::default())
    }

    /// Build a dispatcher from the `[dispatch]` config section.
    pub fn from_config(config: &DispatchSection) -> Self {
        let spawner = ThreadSpawner {
            name_prefix: config.thread_name_prefix.clone(),
            stack_size: config.stack_size,
        };
        Self::with_spawner(spawner)
            .with_mode(config.mode)
            .with_ceiling(config.effective_ceiling())
    }
}

impl Default for Dispatcher<ThreadSpawner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Spawn> Dispatcher<S> {
    pub fn with_spawner(spawner: S) -> Self {
        Self {
            spawner,
            mode: ExecutionMode::Threads,
            ceiling: HARD_CEILING,
            allocator: Box::new(HeapAllocator),
            abort: AbortSignal::new(),
            events: None,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Lower the worker ceiling. Values above [`HARD_CEILING`] are clamped
    /// down to it and zero is raised to one.
    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling.clamp(1, HARD_CEILING);
        self
    }

    pub fn with_allocator(mut self, allocator: impl BufferAllocator + 'static) -> Self {
        self.allocator = Box::new(allocator);
        self
    }

    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_events(mut self, events: Sender<DispatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Handle to the abort signal forwarded to tasks.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Plan `area` for `task` without running anything.
    pub fn plan_for<T: AreaTask>(&self, task: &T, area: Rect) -> GridPlan {
        let tile_size = task.preferred_tile_size(area);
        let declared = if area.area() < task.min_task_area() {
            1
        } else {
            task.max_workers()
        };
        plan(area, tile_size, declared, self.ceiling)
    }

    /// Run `task` over `area`.
    ///
    /// Taking `&mut T` keeps a task instance from being run twice at once.
    pub fn run<T: AreaTask>(&self, task: &mut T, area: Rect) -> Result<RunSummary, DispatchError> {
        let plan = self.plan_for(task, area);
        debug!(
            "planned {area}: {} workers, {}x{} tiles of {} per worker",
            plan.worker_count, plan.v_per_worker, plan.h_per_worker, plan.tile_size
        );
        self.emit(DispatchEvent::Planned { plan });

        task.start(
            plan.worker_count,
            area,
            plan.tile_size,
            self.allocator.as_ref(),
            &self.abort,
        )
        .map_err(DispatchError::Start)?;

        let slot = FailureSlot::new();
        let (spawned, inline) = self.dispatch(&*task, plan.work_items(), &slot);

        task.finish(plan.worker_count);

        let failure = slot.into_inner();
        self.emit(DispatchEvent::Finished {
            worker_count: plan.worker_count,
            spawned,
            inline,
            failed: failure.is_some(),
        });

        match failure {
            Some((index, source)) => Err(DispatchError::Worker { index, source }),
            None => Ok(RunSummary {
                plan,
                spawned,
                inline,
            }),
        }
    }

    /// Execute every item and wait for all of them. Returns how many ran on
    /// their own thread and how many ran inline.
    fn dispatch<T: AreaTask>(&self, task: &T, items: Vec<WorkItem>, slot: &FailureSlot) -> (usize, usize) {
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(items.len());
            let mut inline = 0;

            for item in items {
                if self.mode == ExecutionMode::Inline {
                    self.run_worker(task, item, slot, true);
                    inline += 1;
                    continue;
                }
                let spawned = self.spawner.spawn(scope, item.thread_index, move || {
                    self.run_worker(task, item, slot, false)
                });
                match spawned {
                    Ok(handle) => handles.push((item.thread_index, handle)),
                    Err(err) => {
                        warn!(
                            "could not spawn worker {}, running it inline: {err}",
                            item.thread_index
                        );
                        self.run_worker(task, item, slot, true);
                        inline += 1;
                    }
                }
            }

            let spawned = handles.len();
            for (index, handle) in handles {
                if handle.join().is_err() {
                    warn!("worker {index} did not join cleanly, continuing");
                }
            }
            (spawned, inline)
        })
    }

    fn run_worker<T: AreaTask>(&self, task: &T, item: WorkItem, slot: &FailureSlot, inline: bool) {
        self.emit(DispatchEvent::WorkerStarted {
            index: item.thread_index,
            area: item.area,
            inline,
        });

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            task.process_on_thread(&item, &self.abort)
        }))
        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))));

        let ok = outcome.is_ok();
        if let Err(err) = outcome {
            debug!("worker {} failed: {err}", item.thread_index);
            slot.record(item.thread_index, err);
        }
        self.emit(DispatchEvent::WorkerFinished {
            index: item.thread_index,
            ok,
        });
    }

    fn emit(&self, event: DispatchEvent) {
        if let Some(events) = &self.events {
            // Receiver gone just means nobody is listening any more.
            events.send(event).ok();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
