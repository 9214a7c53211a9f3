//! Shared test utilities for the tile-dispatch test suite.
//!
//! - [`RecordingTask`]: an [`AreaTask`] that records every lifecycle call, the
//!   work items it was handed and the threads they ran on, and can be told to
//!   fail, panic, or allocate scratch memory.
//! - [`FailingSpawner`]: a [`Spawn`] that never creates a thread, forcing the
//!   dispatcher onto its inline fallback.
//! - [`assert_partition`]: checks that work items tile an area exactly.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mut task = RecordingTask::new(Point::new(16, 16), 8).failing_on(&[2]);
//! let err = Dispatcher::new().run(&mut task, area).unwrap_err();
//! assert_partition(area, &task.processed_items());
//! ```

use std::collections::HashSet;
use std::io;
use std::sync::Mutex;
use std::thread::{self, Scope, ScopedJoinHandle, ThreadId};

use crate::dispatch::Spawn;
use crate::geometry::{Point, Rect};
use crate::host::{AbortSignal, BufferAllocator};
use crate::task::{AreaTask, TaskError, WorkItem};

// =========================================================================
// Recording task
// =========================================================================

/// Lifecycle calls as seen by a [`RecordingTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start { worker_count: usize },
    Process { thread_index: usize },
    Finish { worker_count: usize },
}

/// Mock task that records what the dispatcher does with it.
/// Uses Mutex so it is Sync and can be shared by worker threads.
pub struct RecordingTask {
    tile_size: Point,
    max_workers: usize,
    min_task_area: i64,
    scratch_bytes: usize,
    fail_on: HashSet<usize>,
    panic_on: Option<usize>,
    calls: Mutex<Vec<Call>>,
    items: Mutex<Vec<WorkItem>>,
    threads: Mutex<Vec<(ThreadId, Option<String>)>>,
}

impl RecordingTask {
    pub fn new(tile_size: Point, max_workers: usize) -> Self {
        Self {
            tile_size,
            max_workers,
            min_task_area: 0,
            scratch_bytes: 0,
            fail_on: HashSet::new(),
            panic_on: None,
            calls: Mutex::new(Vec::new()),
            items: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Return `TaskError::Failed` from the given workers.
    pub fn failing_on(mut self, indices: &[usize]) -> Self {
        self.fail_on = indices.iter().copied().collect();
        self
    }

    pub fn panicking_on(mut self, index: usize) -> Self {
        self.panic_on = Some(index);
        self
    }

    pub fn with_min_task_area(mut self, pixels: i64) -> Self {
        self.min_task_area = pixels;
        self
    }

    /// Allocate this many scratch bytes in `start`.
    pub fn with_scratch_bytes(mut self, bytes: usize) -> Self {
        self.scratch_bytes = bytes;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn processed_items(&self) -> Vec<WorkItem> {
        self.items.lock().unwrap().clone()
    }

    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.threads.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    pub fn thread_names(&self) -> Vec<String> {
        self.threads
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name)| name.clone().unwrap_or_default())
            .collect()
    }
}

impl AreaTask for RecordingTask {
    fn max_workers(&self) -> usize {
        self.max_workers
    }

    fn min_task_area(&self) -> i64 {
        self.min_task_area
    }

    fn preferred_tile_size(&self, _area: Rect) -> Point {
        self.tile_size
    }

    fn start(
        &mut self,
        worker_count: usize,
        _area: Rect,
        _tile_size: Point,
        allocator: &dyn BufferAllocator,
        _abort: &AbortSignal,
    ) -> Result<(), TaskError> {
        self.calls.lock().unwrap().push(Call::Start { worker_count });
        if self.scratch_bytes > 0 {
            allocator.allocate(self.scratch_bytes)?;
        }
        Ok(())
    }

    fn process_on_thread(&self, item: &WorkItem, abort: &AbortSignal) -> Result<(), TaskError> {
        self.calls.lock().unwrap().push(Call::Process {
            thread_index: item.thread_index,
        });
        self.items.lock().unwrap().push(*item);
        let current = thread::current();
        self.threads
            .lock()
            .unwrap()
            .push((current.id(), current.name().map(str::to_string)));

        abort.check()?;
        if self.panic_on == Some(item.thread_index) {
            panic!("worker {} panicked", item.thread_index);
        }
        if self.fail_on.contains(&item.thread_index) {
            return Err(TaskError::Failed(format!(
                "worker {} failed",
                item.thread_index
            )));
        }
        Ok(())
    }

    fn process_tile(&self, _index: usize, _tile: Rect, _abort: &AbortSignal) -> Result<(), TaskError> {
        Ok(())
    }

    fn finish(&mut self, worker_count: usize) {
        self.calls.lock().unwrap().push(Call::Finish { worker_count });
    }
}

// =========================================================================
// Spawners
// =========================================================================

/// Spawner whose every attempt fails as if the OS were out of threads.
pub struct FailingSpawner;

impl Spawn for FailingSpawner {
    fn spawn<'scope, 'env, F>(
        &self,
        _scope: &'scope Scope<'scope, 'env>,
        _thread_index: usize,
        _f: F,
    ) -> io::Result<ScopedJoinHandle<'scope, ()>>
    where
        F: FnOnce() + Send + 'scope,
    {
        Err(io::Error::new(
            io::ErrorKind::OutOfMemory,
            "thread creation disabled",
        ))
    }
}

// =========================================================================
// Partition assertions
// =========================================================================

/// Assert that `items` cover `area` exactly, with no overlap and nothing
/// outside it.
pub fn assert_partition(area: Rect, items: &[WorkItem]) {
    for item in items {
        assert!(
            area.contains_rect(&item.area),
            "{} extends outside {}",
            item.area,
            area
        );
        assert!(!item.area.is_empty(), "worker {} got an empty area", item.thread_index);
    }
    for (i, a) in items.iter().enumerate() {
        for b in &items[i + 1..] {
            assert!(
                !a.area.overlaps(&b.area),
                "{} overlaps {}",
                a.area,
                b.area
            );
        }
    }
    let covered: i64 = items.iter().map(|i| i.area.area()).sum();
    assert_eq!(covered, area.area(), "work items do not cover {}", area);
}
