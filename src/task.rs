//! The tileable task capability.
//!
//! A task is anything that can process a rectangular region of pixels in
//! independent pieces. The [`Dispatcher`](crate::dispatch::Dispatcher) drives
//! it through a fixed lifecycle:
//!
//! ```text
//! preferred_tile_size → start → process_on_thread × N (concurrent) → finish
//! ```
//!
//! `start` and `finish` take `&mut self` and run on the dispatching thread;
//! `process_on_thread` takes `&self` and runs on worker threads, each with its
//! own disjoint [`WorkItem`]. Any buffer the workers write into is owned by
//! the task and must tolerate concurrent writes to disjoint regions.

use crate::geometry::{Point, Rect};
use crate::host::{AbortSignal, BufferAllocator};
use crate::plan::HARD_CEILING;
use serde::Serialize;
use thiserror::Error;

/// Failure raised by a task.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task aborted")]
    Aborted,
    #[error("task failed: {0}")]
    Failed(String),
    #[error("scratch allocation of {requested} bytes exceeds limit of {limit} bytes")]
    Allocation { requested: usize, limit: usize },
    #[error("worker panicked: {0}")]
    Panicked(String),
}

/// One worker's share of a run: a sub-area and the tile size to walk it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    /// Ordinal in `0..worker_count`, stable for the run.
    pub thread_index: usize,
    pub area: Rect,
    pub tile_size: Point,
}

impl WorkItem {
    /// Tiles of this item's area in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = Rect> + use<> {
        tiles_within(self.area, self.tile_size)
    }
}

/// A job that can be split across threads by area.
pub trait AreaTask: Sync {
    /// Upper bound on workers this task can use.
    fn max_workers(&self) -> usize {
        HARD_CEILING
    }

    /// Areas smaller than this many pixels run on a single worker.
    fn min_task_area(&self) -> i64 {
        0
    }

    /// Tile dimensions are rounded to multiples of this cell.
    fn unit_cell(&self) -> Point {
        Point::new(1, 1)
    }

    fn max_tile_size(&self) -> Point {
        Point::new(256, 256)
    }

    /// Tile size used to partition `area`.
    fn preferred_tile_size(&self, area: Rect) -> Point {
        find_tile_size(area, self.max_tile_size(), self.unit_cell())
    }

    /// Called once before any worker runs.
    fn start(
        &mut self,
        _worker_count: usize,
        _area: Rect,
        _tile_size: Point,
        _allocator: &dyn BufferAllocator,
        _abort: &AbortSignal,
    ) -> Result<(), TaskError> {
        Ok(())
    }

    /// Process one worker's sub-area. The default walks the item's tiles in
    /// row-major order, polling `abort` before each one.
    fn process_on_thread(&self, item: &WorkItem, abort: &AbortSignal) -> Result<(), TaskError> {
        for tile in item.tiles() {
            abort.check()?;
            self.process_tile(item.thread_index, tile, abort)?;
        }
        Ok(())
    }

    /// Process a single tile on behalf of worker `thread_index`.
    fn process_tile(
        &self,
        thread_index: usize,
        tile: Rect,
        abort: &AbortSignal,
    ) -> Result<(), TaskError>;

    /// Called once after every worker has returned, whether or not one failed.
    fn finish(&mut self, _worker_count: usize) {}
}

/// Row-major tiles of `tile_size` covering `area`, clipped at its far edges.
pub fn tiles_within(area: Rect, tile_size: Point) -> impl Iterator<Item = Rect> {
    let tile = tile_size.at_least_one();
    (area.top..area.bottom)
        .step_by(tile.v as usize)
        .flat_map(move |top| {
            (area.left..area.right)
                .step_by(tile.h as usize)
                .map(move |left| {
                    Rect::new(
                        top,
                        left,
                        top.saturating_add(tile.v).min(area.bottom),
                        left.saturating_add(tile.h).min(area.right),
                    )
                })
        })
}

/// Pick a tile size for `area` no larger than `max_tile`.
///
/// Per dimension: the number of tiles needed at `max_tile` is kept, but the
/// tile is shrunk so those tiles come out as equal as possible. The result is
/// then rounded up to a multiple of `unit_cell`, or down if rounding up would
/// pass `max_tile`.
pub fn find_tile_size(area: Rect, max_tile: Point, unit_cell: Point) -> Point {
    let max = max_tile.at_least_one();
    let unit = unit_cell.at_least_one();
    if area.is_empty() {
        return max;
    }
    Point::new(
        balanced_extent(area.height(), max.v, unit.v),
        balanced_extent(area.width(), max.h, unit.h),
    )
}

fn balanced_extent(extent: i32, max: i32, unit: i32) -> i32 {
    let (extent, max, unit) = (extent as i64, max as i64, unit as i64);
    let count = ceil_div(extent, max.min(extent));
    let mut tile = ceil_div(ceil_div(extent, count), unit) * unit;
    if tile > max {
        tile = (max / unit) * unit;
    }
    // A unit cell larger than the cap still has to be honored.
    if tile == 0 { unit as i32 } else { tile as i32 }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}
