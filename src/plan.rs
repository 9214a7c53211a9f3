//! Tile grid planning.
//!
//! The planner decides how many tiles each worker gets so that the number of
//! workers never exceeds the caller's limit. It starts with one tile per
//! worker and merges tiles, one row or column of tiles at a time, along the
//! dimension that currently has the most tiles per worker.
//!
//! ```text
//! 7×7 tiles, limit 8
//!   1×1 per worker → 49 workers
//!   1×2            → 28
//!   2×2            → 16
//!   2×3            → 12
//!   3×3            →  9
//!   3×4            →  6   ✓
//! ```
//!
//! The comparison uses whole tiles per worker (truncating division), so
//! `5 / 2` and `4 / 2` count as equal. When both dimensions have the same
//! number the horizontal dimension grows first, so wide and square images
//! get row-shaped sub-areas.
//!
//! Sub-area bounds are computed in `i64` and clipped to the area before
//! narrowing, so tile sizes near `i32::MAX` cannot overflow.

use crate::geometry::{Point, Rect};
use crate::task::WorkItem;
use serde::Serialize;

/// Maximum number of worker threads any single run may create.
#[cfg(target_pointer_width = "64")]
pub const HARD_CEILING: usize = 128;
#[cfg(not(target_pointer_width = "64"))]
pub const HARD_CEILING: usize = 8;

/// How an area is split into per-worker sub-areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridPlan {
    pub area: Rect,
    pub tile_size: Point,
    /// Tiles needed to cover the area vertically.
    pub v_tiles: usize,
    /// Tiles needed to cover the area horizontally.
    pub h_tiles: usize,
    pub v_per_worker: usize,
    pub h_per_worker: usize,
    pub worker_count: usize,
}

/// Plan the worker grid for `area`.
///
/// The effective limit is `min(declared_max, hard_ceiling)`, raised to 1 if
/// either is zero. An empty area yields a plan with zero workers.
pub fn plan(area: Rect, tile_size: Point, declared_max: usize, hard_ceiling: usize) -> GridPlan {
    let tile_size = tile_size.at_least_one();
    let limit = declared_max.min(hard_ceiling).max(1);

    // Public fields allow inverted rectangles; they plan as empty.
    let v_tiles = (area.height().max(0) as usize).div_ceil(tile_size.v as usize);
    let h_tiles = (area.width().max(0) as usize).div_ceil(tile_size.h as usize);

    let mut v_per = 1usize;
    let mut h_per = 1usize;
    while v_tiles
        .div_ceil(v_per)
        .saturating_mul(h_tiles.div_ceil(h_per))
        > limit
    {
        if v_tiles / v_per > h_tiles / h_per {
            v_per += 1;
        } else {
            h_per += 1;
        }
    }

    GridPlan {
        area,
        tile_size,
        v_tiles,
        h_tiles,
        v_per_worker: v_per,
        h_per_worker: h_per,
        worker_count: v_tiles.div_ceil(v_per).saturating_mul(h_tiles.div_ceil(h_per)),
    }
}

impl GridPlan {
    /// Worker rows and columns in the merged grid.
    pub fn grid_shape(&self) -> (usize, usize) {
        (
            self.v_tiles.div_ceil(self.v_per_worker),
            self.h_tiles.div_ceil(self.h_per_worker),
        )
    }

    /// Sub-area height and width before clipping at the far edges.
    pub fn worker_extent(&self) -> (i64, i64) {
        (
            self.tile_size.v as i64 * self.v_per_worker as i64,
            self.tile_size.h as i64 * self.h_per_worker as i64,
        )
    }

    /// One work item per grid cell in row-major order, indexed from zero.
    ///
    /// Sub-areas are clipped to the plan's area, so the last row and column
    /// of workers may be shorter or narrower than the rest.
    pub fn work_items(&self) -> Vec<WorkItem> {
        let (rows, cols) = self.grid_shape();
        let (extent_v, extent_h) = self.worker_extent();
        let area = self.area;

        let mut items = Vec::with_capacity(self.worker_count);
        for row in 0..rows as i64 {
            let top = area.top as i64 + row * extent_v;
            let bottom = (top + extent_v).min(area.bottom as i64);
            for col in 0..cols as i64 {
                let left = area.left as i64 + col * extent_h;
                let right = (left + extent_h).min(area.right as i64);
                // Every offset lies inside the area, so narrowing is lossless.
                items.push(WorkItem {
                    thread_index: items.len(),
                    area: Rect::new(top as i32, left as i32, bottom as i32, right as i32),
                    tile_size: self.tile_size,
                });
            }
        }
        items
    }
}
