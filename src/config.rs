//! Configuration module.
//!
//! Handles loading, validating, and merging `tile-dispatch.toml`. Stock
//! defaults are overridden by whatever the user file specifies; everything
//! else keeps its default.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [dispatch]
//! # max_threads = 16              # Lower the worker ceiling (omit for the hard ceiling)
//! mode = "threads"                # "threads" or "inline"
//! thread_name_prefix = "tile-worker"
//! # stack_size = 2097152          # Worker stack size in bytes (omit for the OS default)
//!
//! [tiles]
//! max_tile_size = [256, 256]      # [rows, columns]
//! unit_cell = [1, 1]              # Tile sizes are multiples of this
//! min_task_area = 65536           # Smaller areas run on one worker
//!
//! [batch]
//! # max_files = 4                 # Files filtered at once (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::dispatch::ExecutionMode;
use crate::geometry::Point;
use crate::plan::HARD_CEILING;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up in the config directory.
pub const CONFIG_FILE: &str = "tile-dispatch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration.
///
/// All fields have defaults; a user file only needs the values it changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Thread fan-out settings.
    pub dispatch: DispatchSection,
    /// Tile sizing for the built-in filters.
    pub tiles: TilesSection,
    /// Directory batch settings.
    pub batch: BatchSection,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "dispatch.max_threads must be at least 1".into(),
            ));
        }
        if self.dispatch.thread_name_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "dispatch.thread_name_prefix must not be empty".into(),
            ));
        }
        if self.tiles.max_tile_size.iter().any(|&n| n <= 0) {
            return Err(ConfigError::Validation(
                "tiles.max_tile_size values must be positive".into(),
            ));
        }
        if self.tiles.unit_cell.iter().any(|&n| n <= 0) {
            return Err(ConfigError::Validation(
                "tiles.unit_cell values must be positive".into(),
            ));
        }
        if self.tiles.min_task_area < 0 {
            return Err(ConfigError::Validation(
                "tiles.min_task_area must not be negative".into(),
            ));
        }
        if self.batch.max_files == Some(0) {
            return Err(ConfigError::Validation(
                "batch.max_files must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Thread fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    /// Maximum workers per run. When absent, the hard ceiling applies.
    /// Values above the hard ceiling are clamped down.
    pub max_threads: Option<usize>,
    /// Whether work items get their own threads or run inline.
    pub mode: ExecutionMode,
    /// Worker threads are named `<prefix>-<index>`.
    pub thread_name_prefix: String,
    /// Worker stack size in bytes. When absent, the OS default is used.
    pub stack_size: Option<usize>,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_threads: None,
            mode: ExecutionMode::Threads,
            thread_name_prefix: "tile-worker".to_string(),
            stack_size: None,
        }
    }
}

impl DispatchSection {
    /// Resolve the worker ceiling.
    ///
    /// - `None` → the hard ceiling
    /// - `Some(n)` → `min(n, hard ceiling)` (config can constrain down, not up)
    pub fn effective_ceiling(&self) -> usize {
        self.max_threads
            .map(|n| n.min(HARD_CEILING))
            .unwrap_or(HARD_CEILING)
    }
}

/// Tile sizing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TilesSection {
    /// Largest tile as `[rows, columns]`.
    pub max_tile_size: [i32; 2],
    /// Tile dimensions are rounded to multiples of this `[rows, columns]` cell.
    pub unit_cell: [i32; 2],
    /// Areas with fewer pixels than this run on a single worker.
    pub min_task_area: i64,
}

impl Default for TilesSection {
    fn default() -> Self {
        Self {
            max_tile_size: [256, 256],
            unit_cell: [1, 1],
            min_task_area: 256 * 256,
        }
    }
}

impl TilesSection {
    pub fn max_tile_size(&self) -> Point {
        Point::new(self.max_tile_size[0], self.max_tile_size[1])
    }

    pub fn unit_cell(&self) -> Point {
        Point::new(self.unit_cell[0], self.unit_cell[1])
    }
}

/// Directory batch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSection {
    /// Maximum number of files filtered at the same time.
    /// When absent, defaults to the number of CPU cores.
    pub max_files: Option<usize>,
}

/// Resolve how many files `batch` processes at once.
///
/// - `None` → all available cores
/// - `Some(n)` → `min(n, cores)` (user can constrain down, not up)
pub fn effective_batch_threads(config: &BatchSection) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_files.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(Config::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `tile-dispatch.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no config file.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(base: toml::Value, overlay: Option<toml::Value>) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `tile-dispatch.toml` in the given directory, on top of
/// the stock defaults.
pub fn load_config(dir: &Path) -> Result<Config, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(dir)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `tile-dispatch.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# tile-dispatch configuration
# ===========================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Dispatch
# ---------------------------------------------------------------------------
[dispatch]
# Maximum worker threads per run. Omit to use the hard ceiling
# (128 on 64-bit builds, 8 otherwise). Larger values are clamped down.
# max_threads = 16

# "threads" gives every work item its own thread; "inline" runs them all on
# the calling thread with the same partitioning.
mode = "threads"

# Worker threads are named "<prefix>-<index>".
thread_name_prefix = "tile-worker"

# Worker stack size in bytes. Omit for the OS default.
# stack_size = 2097152

# ---------------------------------------------------------------------------
# Tiles
# ---------------------------------------------------------------------------
[tiles]
# Largest tile as [rows, columns]. Tiles are shrunk from here so each row
# and column of tiles comes out evenly sized.
max_tile_size = [256, 256]

# Tile sizes are rounded to multiples of this [rows, columns] cell.
unit_cell = [1, 1]

# Images with fewer pixels than this are filtered on a single worker.
min_task_area = 65536

# ---------------------------------------------------------------------------
# Batch
# ---------------------------------------------------------------------------
[batch]
# Files filtered at the same time by `batch`.
# Omit to auto-detect (= number of CPU cores).
# max_files = 4
"##
}
