//! # Tile Dispatch
//!
//! Splits a large 2-D pixel-area job into a bounded number of disjoint,
//! tile-aligned sub-areas and runs each on its own OS thread.
//!
//! # Architecture: Plan, Start, Fan Out, Finish
//!
//! ```text
//! 1. Plan       area + tile size + limits  →  GridPlan (worker grid)
//! 2. Start      task.start(worker_count)      (scratch buffers, &mut task)
//! 3. Fan out    one scoped thread per WorkItem, task.process_on_thread(&task)
//! 4. Finish     join all → task.finish() → first failure, if any
//! ```
//!
//! The planner is a pure function, so the partitioning can be inspected and
//! tested without starting a single thread. The `plan` CLI command prints it.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`geometry`] | `Point` and half-open `Rect` in (vertical, horizontal) order |
//! | [`task`] | The [`AreaTask`] trait, [`WorkItem`], tile iteration and tile sizing |
//! | [`plan`] | Worker-grid planner and the hard thread ceiling |
//! | [`dispatch`] | [`Dispatcher`]: lifecycle, thread fan-out, degradation, failure collection |
//! | [`host`] | Abort signal and scratch-buffer allocators handed to tasks |
//! | [`config`] | `tile-dispatch.toml` loading, validation, and merging |
//! | [`imaging`] | Tile-parallel image filters built on the dispatcher |
//! | [`output`] | CLI output formatting for plans, progress events and batches |
//!
//! # Design Decisions
//!
//! ## Greedy Grid Merging
//!
//! Tiles are merged one row or column at a time along whichever dimension has
//! more tiles per worker, until the worker count fits the limit. This keeps
//! sub-areas close to square (good locality) and every sub-area a whole number
//! of tiles, so workers never split a tile. On a tie the horizontal dimension
//! grows first.
//!
//! ## Degradation, Not Failure
//!
//! If the OS refuses to create a thread, that work item runs on the
//! dispatching thread instead. Callers get the same result either way; only
//! the [`RunSummary`] counts differ.
//!
//! ## Borrowed Tasks, Scoped Threads
//!
//! Workers borrow the task through [`std::thread::scope`], so a task can hold
//! references to its input (an image, a buffer) without `Arc` or `'static`.
//! `start` and `finish` take `&mut self`; workers only ever see `&self`, and
//! the borrow checker enforces that start happens before and finish after
//! every worker.
//!
//! ## First Failure Wins
//!
//! Errors and panics from workers are collected into a per-run slot. The first
//! one recorded is returned after `finish` has run; later ones are logged at
//! debug level. Which of several concurrent failures is first is not
//! deterministic.

pub mod config;
pub mod dispatch;
pub mod geometry;
pub mod host;
pub mod imaging;
pub mod output;
pub mod plan;
pub mod task;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatch::{DispatchError, DispatchEvent, Dispatcher, ExecutionMode, RunSummary, Spawn, ThreadSpawner};
pub use geometry::{Point, Rect};
pub use host::{AbortSignal, BufferAllocator, HeapAllocator, LimitedAllocator};
pub use plan::{GridPlan, HARD_CEILING};
pub use task::{AreaTask, TaskError, WorkItem};
