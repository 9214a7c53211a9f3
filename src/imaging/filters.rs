//! Tile-parallel pixel filters.
//!
//! [`FilterTask`] reads an immutable source image and writes its result into a
//! [`TileCanvas`]. Every output pixel depends only on the source, so the
//! result is identical however the area is partitioned.
//!
//! | Filter | Per-pixel work |
//! |---|---|
//! | Invert | `255 - c` on RGB, alpha kept |
//! | Grayscale | Rec. 601 luma on RGB, alpha kept |
//! | BoxBlur | separable box, window clamped at image edges |
//!
//! The blur's horizontal pass goes into a per-worker scratch buffer that
//! [`start`](AreaTask::start) allocates once per worker from the dispatcher's
//! allocator.

use super::canvas::TileCanvas;
use crate::config::TilesSection;
use crate::geometry::{Point, Rect};
use crate::host::{AbortSignal, BufferAllocator};
use crate::task::{AreaTask, TaskError};
use image::RgbaImage;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Invert,
    Grayscale,
    BoxBlur { radius: u32 },
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Invert => "invert",
            Filter::Grayscale => "grayscale",
            Filter::BoxBlur { .. } => "blur",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::BoxBlur { radius } => write!(f, "blur(r={radius})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Applies a [`Filter`] to `source`, one tile at a time.
pub struct FilterTask<'a> {
    source: &'a RgbaImage,
    canvas: TileCanvas,
    filter: Filter,
    max_tile_size: Point,
    unit_cell: Point,
    min_task_area: i64,
    scratch: Vec<Mutex<Vec<u8>>>,
}

impl<'a> FilterTask<'a> {
    pub fn new(source: &'a RgbaImage, filter: Filter, tiles: &TilesSection) -> Self {
        Self {
            source,
            canvas: TileCanvas::new(source.width(), source.height()),
            filter,
            max_tile_size: tiles.max_tile_size(),
            unit_cell: tiles.unit_cell(),
            min_task_area: tiles.min_task_area,
            scratch: Vec::new(),
        }
    }

    /// The area this task covers.
    pub fn bounds(&self) -> Rect {
        self.canvas.bounds()
    }

    /// Consume the task and return the filtered image.
    pub fn into_image(self) -> RgbaImage {
        self.canvas.into_image()
    }

    fn map_pixels(&self, tile: Rect, f: impl Fn([u8; 4]) -> [u8; 4]) {
        for y in tile.top as u32..tile.bottom as u32 {
            for x in tile.left as u32..tile.right as u32 {
                self.canvas.store(x, y, f(self.source.get_pixel(x, y).0));
            }
        }
    }

    fn blur_tile(&self, thread_index: usize, tile: Rect, radius: u32) -> Result<(), TaskError> {
        let (width, height) = (self.source.width() as i64, self.source.height() as i64);
        let r = radius as i64;
        let row_top = (tile.top as i64 - r).max(0);
        let row_bottom = (tile.bottom as i64 + r).min(height);
        let cols = tile.width() as usize;
        let needed = (row_bottom - row_top) as usize * cols * 4;

        let slot = self
            .scratch
            .get(thread_index)
            .ok_or_else(|| TaskError::Failed(format!("no scratch buffer for worker {thread_index}")))?;
        let mut scratch = slot
            .lock()
            .map_err(|_| TaskError::Failed(format!("scratch buffer {thread_index} poisoned")))?;
        if scratch.len() < needed {
            scratch.resize(needed, 0);
        }

        // Horizontal pass: every row the vertical window can reach.
        for y in row_top..row_bottom {
            let row = (y - row_top) as usize;
            for (col, x) in (tile.left as i64..tile.right as i64).enumerate() {
                let from = (x - r).max(0);
                let to = (x + r).min(width - 1);
                let avg = average((from..=to).map(|sx| self.source.get_pixel(sx as u32, y as u32).0));
                let at = (row * cols + col) * 4;
                scratch[at..at + 4].copy_from_slice(&avg);
            }
        }

        // Vertical pass over the scratch rows.
        for y in tile.top as i64..tile.bottom as i64 {
            let from = (y - r).max(0);
            let to = (y + r).min(height - 1);
            for col in 0..cols {
                let avg = average((from..=to).map(|sy| {
                    let at = (((sy - row_top) as usize) * cols + col) * 4;
                    [scratch[at], scratch[at + 1], scratch[at + 2], scratch[at + 3]]
                }));
                self.canvas.store(tile.left as u32 + col as u32, y as u32, avg);
            }
        }
        Ok(())
    }
}

/// Rounded per-channel mean.
fn average(pixels: impl Iterator<Item = [u8; 4]>) -> [u8; 4] {
    let mut sum = [0u32; 4];
    let mut count = 0u32;
    for p in pixels {
        for c in 0..4 {
            sum[c] += p[c] as u32;
        }
        count += 1;
    }
    if count == 0 {
        return [0; 4];
    }
    sum.map(|s| ((s + count / 2) / count) as u8)
}

fn invert([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    [255 - r, 255 - g, 255 - b, a]
}

fn grayscale([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let luma = ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8;
    [luma, luma, luma, a]
}

impl AreaTask for FilterTask<'_> {
    fn min_task_area(&self) -> i64 {
        self.min_task_area
    }

    fn unit_cell(&self) -> Point {
        self.unit_cell
    }

    fn max_tile_size(&self) -> Point {
        self.max_tile_size
    }

    fn start(
        &mut self,
        worker_count: usize,
        _area: Rect,
        tile_size: Point,
        allocator: &dyn BufferAllocator,
        _abort: &AbortSignal,
    ) -> Result<(), TaskError> {
        self.scratch.clear();
        if let Filter::BoxBlur { radius } = self.filter {
            // The vertical window is clamped to the image, so no pass reads
            // more rows than the image has.
            let rows = (tile_size.v as usize)
                .saturating_add((radius as usize).saturating_mul(2))
                .min(self.source.height() as usize);
            let cols = (tile_size.h as usize).min(self.source.width() as usize);
            let bytes = rows * cols * 4;
            for _ in 0..worker_count {
                self.scratch.push(Mutex::new(allocator.allocate(bytes)?));
            }
        }
        Ok(())
    }

    fn process_tile(&self, thread_index: usize, tile: Rect, _abort: &AbortSignal) -> Result<(), TaskError> {
        match self.filter {
            Filter::Invert => self.map_pixels(tile, invert),
            Filter::Grayscale => self.map_pixels(tile, grayscale),
            Filter::BoxBlur { radius: 0 } => self.map_pixels(tile, |p| p),
            Filter::BoxBlur { radius } => self.blur_tile(thread_index, tile, radius)?,
        }
        Ok(())
    }

    fn finish(&mut self, _worker_count: usize) {
        self.scratch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatcher, ExecutionMode};
    use crate::host::LimitedAllocator;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 200])
        })
    }

    fn small_tiles() -> TilesSection {
        TilesSection {
            max_tile_size: [16, 16],
            unit_cell: [1, 1],
            min_task_area: 0,
        }
    }

    fn run(image: &RgbaImage, filter: Filter, tiles: &TilesSection, dispatcher: &Dispatcher) -> RgbaImage {
        let mut task = FilterTask::new(image, filter, tiles);
        let area = task.bounds();
        dispatcher.run(&mut task, area).unwrap();
        task.into_image()
    }

    // =========================================================================
    // Pixel functions
    // =========================================================================

    #[test]
    fn invert_keeps_alpha() {
        assert_eq!(invert([0, 100, 255, 7]), [255, 155, 0, 7]);
    }

    #[test]
    fn grayscale_of_white_is_white() {
        assert_eq!(grayscale([255, 255, 255, 255]), [255, 255, 255, 255]);
        assert_eq!(grayscale([0, 0, 0, 9]), [0, 0, 0, 9]);
    }

    #[test]
    fn average_rounds() {
        assert_eq!(average([[0, 0, 0, 0], [1, 1, 1, 1]].into_iter()), [1, 1, 1, 1]);
        assert_eq!(average([[10, 20, 30, 40]; 3].into_iter()), [10, 20, 30, 40]);
        assert_eq!(average(std::iter::empty()), [0, 0, 0, 0]);
    }

    #[test]
    fn filter_display() {
        assert_eq!(Filter::Invert.to_string(), "invert");
        assert_eq!(Filter::BoxBlur { radius: 3 }.to_string(), "blur(r=3)");
    }

    // =========================================================================
    // Tiled execution
    // =========================================================================

    #[test]
    fn invert_whole_image() {
        let image = gradient(40, 30);
        let out = run(&image, Filter::Invert, &small_tiles(), &Dispatcher::new());
        for (x, y, p) in out.enumerate_pixels() {
            assert_eq!(p.0, invert(image.get_pixel(x, y).0));
        }
    }

    #[test]
    fn blur_is_independent_of_partitioning() {
        let image = gradient(83, 57);
        let filter = Filter::BoxBlur { radius: 3 };

        let tiled = run(&image, filter, &small_tiles(), &Dispatcher::new());
        let whole = TilesSection {
            max_tile_size: [1024, 1024],
            ..small_tiles()
        };
        let single = run(&image, filter, &whole, &Dispatcher::new().with_ceiling(1));

        assert_eq!(tiled, single);
    }

    #[test]
    fn blur_of_flat_image_is_flat() {
        let image = RgbaImage::from_pixel(30, 30, Rgba([40, 80, 120, 255]));
        let out = run(&image, Filter::BoxBlur { radius: 5 }, &small_tiles(), &Dispatcher::new());
        assert!(out.pixels().all(|p| p.0 == [40, 80, 120, 255]));
    }

    #[test]
    fn zero_radius_blur_is_identity() {
        let image = gradient(20, 20);
        let out = run(&image, Filter::BoxBlur { radius: 0 }, &small_tiles(), &Dispatcher::new());
        assert_eq!(out, image);
    }

    #[test]
    fn inline_mode_gives_same_result() {
        let image = gradient(50, 50);
        let filter = Filter::BoxBlur { radius: 2 };
        let threaded = run(&image, filter, &small_tiles(), &Dispatcher::new());
        let inline = run(
            &image,
            filter,
            &small_tiles(),
            &Dispatcher::new().with_mode(ExecutionMode::Inline),
        );
        assert_eq!(threaded, inline);
    }

    #[test]
    fn blur_scratch_respects_allocator_limit() {
        let image = gradient(64, 64);
        let mut task = FilterTask::new(&image, Filter::BoxBlur { radius: 4 }, &small_tiles());
        let area = task.bounds();
        let result = Dispatcher::new()
            .with_allocator(LimitedAllocator::new(64))
            .run(&mut task, area);
        assert!(result.is_err());
    }

    #[test]
    fn huge_radius_scratch_is_bounded_by_image() {
        let image = gradient(8, 8);
        let mut task = FilterTask::new(&image, Filter::BoxBlur { radius: 1000 }, &small_tiles());
        let area = task.bounds();
        // One 8x8 tile needs 8 * 8 * 4 bytes of scratch at most.
        Dispatcher::new()
            .with_allocator(LimitedAllocator::new(256))
            .run(&mut task, area)
            .unwrap();

        // A window wider than the image averages everything.
        let out = task.into_image();
        let first = out.get_pixel(0, 0).0;
        assert!(out.pixels().all(|p| p.0 == first));
    }

    #[test]
    fn aborted_filter_fails() {
        let image = gradient(32, 32);
        let mut task = FilterTask::new(&image, Filter::Grayscale, &small_tiles());
        let area = task.bounds();
        let dispatcher = Dispatcher::new();
        dispatcher.abort_signal().abort();
        let err = dispatcher.run(&mut task, area).unwrap_err();
        assert!(matches!(err.task_error(), TaskError::Aborted));
    }
}
