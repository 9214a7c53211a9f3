//! High-level filter operations: one image in memory, one file, or a whole
//! directory tree.

use super::filters::{Filter, FilterTask};
use crate::config::TilesSection;
use crate::dispatch::{DispatchError, Dispatcher, RunSummary, Spawn};
use image::{DynamicImage, ImageFormat, RgbaImage};
use log::{debug, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Thread pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("Source image not found: {0}")]
    SourceNotFound(PathBuf),
}

/// Extensions `batch` picks up.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

/// Filter an image held in memory.
pub fn apply_filter_image<S: Spawn>(
    source: &RgbaImage,
    filter: Filter,
    tiles: &TilesSection,
    dispatcher: &Dispatcher<S>,
) -> Result<(RgbaImage, RunSummary), FilterError> {
    let mut task = FilterTask::new(source, filter, tiles);
    let area = task.bounds();
    let summary = dispatcher.run(&mut task, area)?;
    Ok((task.into_image(), summary))
}

/// Read `source`, filter it, and write the result to `output`.
///
/// The output format follows the output extension. Formats without an alpha
/// channel (JPEG) get the RGB channels only.
pub fn apply_filter<S: Spawn>(
    source: &Path,
    output: &Path,
    filter: Filter,
    tiles: &TilesSection,
    dispatcher: &Dispatcher<S>,
) -> Result<RunSummary, FilterError> {
    if !source.exists() {
        return Err(FilterError::SourceNotFound(source.to_path_buf()));
    }
    let image = image::open(source)?.to_rgba8();
    debug!(
        "filtering {} ({}x{}) with {filter}",
        source.display(),
        image.width(),
        image.height()
    );
    let (filtered, summary) = apply_filter_image(&image, filter, tiles, dispatcher)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let filtered = DynamicImage::ImageRgba8(filtered);
    match ImageFormat::from_path(output)? {
        ImageFormat::Jpeg => filtered.to_rgb8().save(output)?,
        _ => filtered.save(output)?,
    }
    Ok(summary)
}

/// One file handled by [`batch_filter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub source: PathBuf,
    pub output: PathBuf,
    pub worker_count: usize,
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
}

/// Supported images under `dir`, sorted by path.
pub fn find_images(dir: &Path) -> Result<Vec<PathBuf>, FilterError> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() && is_supported(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

/// Filter every supported image under `input_dir` into the same relative
/// path under `output_dir`, up to `max_files` files at once.
///
/// Each file still fans out over its own tiles; `max_files` only bounds how
/// many files are in flight.
pub fn batch_filter<S: Spawn>(
    input_dir: &Path,
    output_dir: &Path,
    filter: Filter,
    tiles: &TilesSection,
    dispatcher: &Dispatcher<S>,
    max_files: usize,
) -> Result<Vec<BatchEntry>, FilterError> {
    let sources = find_images(input_dir)?;
    info!(
        "batch: {} images under {} with {filter}",
        sources.len(),
        input_dir.display()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_files.max(1))
        .thread_name(|i| format!("tile-batch-{i}"))
        .build()?;

    pool.install(|| {
        sources
            .par_iter()
            .map(|source| -> Result<BatchEntry, FilterError> {
                let relative = source.strip_prefix(input_dir).unwrap_or(source);
                let output = output_dir.join(relative);
                let summary = apply_filter(source, &output, filter, tiles, dispatcher)?;
                Ok(BatchEntry {
                    source: source.clone(),
                    output,
                    worker_count: summary.plan.worker_count,
                })
            })
            .collect()
    })
}
