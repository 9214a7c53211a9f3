//! Tile-parallel image filters built on the dispatcher.
//!
//! | Piece | Role |
//! |---|---|
//! | **Canvas** | [`TileCanvas`]: lock-free RGBA8 buffer for disjoint concurrent writes |
//! | **Filters** | [`Filter`] + [`FilterTask`], the [`AreaTask`](crate::task::AreaTask) implementation |
//! | **Operations** | in-memory, single-file and directory-batch entry points |
//!
//! Decoding and encoding are left to the `image` crate.

pub mod canvas;
pub mod filters;
pub mod operations;

pub use canvas::TileCanvas;
pub use filters::{Filter, FilterTask};
pub use operations::{
    BatchEntry, FilterError, apply_filter, apply_filter_image, batch_filter, find_images,
};
