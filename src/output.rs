//! CLI output formatting.
//!
//! Each view has a `format_*` function that returns `Vec<String>` for
//! testability, and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! Area [0, 0, 100, 100] (100x100)
//!     Tiles: 7x7 of 16x16
//!     Per worker: 3x4 tiles
//!     Workers: 6
//! 000 [0, 0, 48, 64]
//! 001 [0, 64, 48, 100]
//! ...
//! ```
//!
//! ## Dispatch events
//!
//! ```text
//! Planned 6 workers (3x4 tiles of 16x16 each)
//!     000 [0, 0, 48, 64] thread
//!     001 [0, 64, 48, 100] inline
//!     000 done
//!     001 failed
//! Finished: 6 workers, 5 threaded, 1 inline
//! ```

use crate::dispatch::{DispatchEvent, RunSummary};
use crate::imaging::BatchEntry;
use crate::plan::GridPlan;
use crate::task::WorkItem;
use std::path::Path;

/// Format a zero-based worker index as 3-digit zero-padded.
fn format_index(index: usize) -> String {
    format!("{:0>3}", index)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

// ============================================================================
// Plan
// ============================================================================

/// Format a plan header followed by one line per work item.
pub fn format_plan(plan: &GridPlan, items: &[WorkItem]) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Area {} ({}x{})",
            plan.area,
            plan.area.height(),
            plan.area.width()
        ),
        format!(
            "{}Tiles: {}x{} of {}",
            indent(1),
            plan.v_tiles,
            plan.h_tiles,
            plan.tile_size
        ),
        format!(
            "{}Per worker: {}x{} tiles",
            indent(1),
            plan.v_per_worker,
            plan.h_per_worker
        ),
        format!("{}Workers: {}", indent(1), plan.worker_count),
    ];
    for item in items {
        lines.push(format!("{} {}", format_index(item.thread_index), item.area));
    }
    lines
}

/// Print a plan to stdout.
pub fn print_plan(plan: &GridPlan, items: &[WorkItem]) {
    for line in format_plan(plan, items) {
        println!("{}", line);
    }
}

// ============================================================================
// Dispatch progress
// ============================================================================

/// Format a single dispatch event as display lines.
pub fn format_dispatch_event(event: &DispatchEvent) -> Vec<String> {
    match event {
        DispatchEvent::Planned { plan } => vec![format!(
            "Planned {} workers ({}x{} tiles of {} each)",
            plan.worker_count, plan.v_per_worker, plan.h_per_worker, plan.tile_size
        )],
        DispatchEvent::WorkerStarted {
            index,
            area,
            inline,
        } => {
            let placement = if *inline { "inline" } else { "thread" };
            vec![format!(
                "{}{} {} {}",
                indent(1),
                format_index(*index),
                area,
                placement
            )]
        }
        DispatchEvent::WorkerFinished { index, ok } => {
            let status = if *ok { "done" } else { "failed" };
            vec![format!("{}{} {}", indent(1), format_index(*index), status)]
        }
        DispatchEvent::Finished {
            worker_count,
            spawned,
            inline,
            failed,
        } => {
            let mut line = format!(
                "Finished: {} workers, {} threaded, {} inline",
                worker_count, spawned, inline
            );
            if *failed {
                line.push_str(" (failed)");
            }
            vec![line]
        }
    }
}

/// Format the outcome of a single-file filter run.
pub fn format_run_summary(source: &Path, output: &Path, summary: &RunSummary) -> Vec<String> {
    vec![
        format!("{} → {}", source.display(), output.display()),
        format!(
            "{}{} workers over {} ({} threaded, {} inline)",
            indent(1),
            summary.plan.worker_count,
            summary.plan.area,
            summary.spawned,
            summary.inline
        ),
    ]
}

// ============================================================================
// Batch
// ============================================================================

/// Format batch results, paths shown relative to the input directory.
pub fn format_batch_output(entries: &[BatchEntry], input_dir: &Path) -> Vec<String> {
    let mut lines = Vec::with_capacity(entries.len() + 1);
    for (i, entry) in entries.iter().enumerate() {
        let relative = entry.source.strip_prefix(input_dir).unwrap_or(&entry.source);
        lines.push(format!(
            "{} {} ({} workers)",
            format_index(i + 1),
            relative.display(),
            entry.worker_count
        ));
    }
    lines.push(format!("Filtered {} images", entries.len()));
    lines
}

/// Print batch results to stdout.
pub fn print_batch_output(entries: &[BatchEntry], input_dir: &Path) {
    for line in format_batch_output(entries, input_dir) {
        println!("{}", line);
    }
}
