//! CLI output formatting.
//!
//! Every command has a `format_*` function returning `Vec<String>` and, where
//! the CLI needs it, a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## Batch progress
//!
//! One header per finished job with the outcome as indented context:
//!
//! ```text
//! [001/003] beach.jpg
//!     Output: out/beach_resized.jpg
//! [002/003] missing.jpg
//!     Failed: unreadable image: cannot read missing.jpg: No such file or directory
//! ```
//!
//! ## Batch report
//!
//! ```text
//! Processed 3 images: 2 succeeded, 1 failed
//! Failures
//!     missing.jpg: unreadable image: cannot read missing.jpg: ...
//! ```
//!
//! ## Edit
//!
//! ```text
//! photo.jpg (1920x1080)
//!     001 Rotate left
//!     002 Crop 1080x1080 at (0, 420)
//! Saved photo_edited.jpg (1080x1080)
//! ```

use crate::cache::CacheStats;
use crate::history::HistoryEntry;
use crate::types::{BatchReport, JobStatus, ProgressEvent};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Zero-pad `n` to the width of `total`, minimum three digits.
fn format_counter(n: usize, total: usize) -> String {
    let width = total.to_string().len().max(3);
    format!("{:0>width$}", n)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Format one progress event.
pub fn format_progress_event(event: &ProgressEvent) -> Vec<String> {
    let counter = format!(
        "[{}/{}]",
        format_counter(event.completed_count, event.total_count),
        format_counter(event.total_count, event.total_count)
    );
    let mut lines = vec![format!("{counter} {}", file_name(&event.input_path))];
    match &event.status {
        JobStatus::Succeeded => {
            lines.push(format!("{}Output: {}", indent(1), event.output_path.display()));
        }
        JobStatus::Failed(reason) => {
            lines.push(format!("{}Failed: {reason}", indent(1)));
        }
        other => lines.push(format!("{}{other}", indent(1))),
    }
    lines
}

pub fn print_progress_event(event: &ProgressEvent) {
    for line in format_progress_event(event) {
        println!("{}", line);
    }
}

/// Summary line plus a list of failures.
pub fn format_report(report: &BatchReport) -> Vec<String> {
    let mut summary = format!(
        "Processed {}: {} succeeded",
        plural(report.total(), "image"),
        report.succeeded
    );
    if report.failed > 0 {
        summary.push_str(&format!(", {} failed", report.failed));
    }
    if report.cancelled > 0 {
        summary.push_str(&format!(", {} cancelled", report.cancelled));
    }

    let mut lines = vec![summary];
    if report.failed > 0 {
        lines.push("Failures".to_string());
        for (job, reason) in report.failures() {
            lines.push(format!("{}{}: {reason}", indent(1), file_name(&job.input_path)));
        }
    }
    lines
}

pub fn print_report(report: &BatchReport) {
    for line in format_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Edit
// ============================================================================

/// The source image, its size and every transform applied to it.
pub fn format_edit_summary(source: &Path, dimensions: (u32, u32), history: &[HistoryEntry]) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({}x{})",
        file_name(source),
        dimensions.0,
        dimensions.1
    )];
    if history.is_empty() {
        lines.push(format!("{}no changes", indent(1)));
    }
    for (i, entry) in history.iter().enumerate() {
        lines.push(format!(
            "{}{} {}",
            indent(1),
            format_counter(i + 1, history.len()),
            entry.op.description()
        ));
    }
    lines
}

pub fn format_saved(path: &Path, dimensions: (u32, u32)) -> String {
    format!("Saved {} ({}x{})", path.display(), dimensions.0, dimensions.1)
}

// ============================================================================
// Thumbnails
// ============================================================================

/// One generated preview.
///
/// ```text
/// 001 beach.jpg → thumbs/beach_thumb.png (120x80)
/// ```
pub fn format_thumbnail_line(index: usize, total: usize, source: &Path, output: &Path, dimensions: (u32, u32)) -> String {
    format!(
        "{} {} \u{2192} {} ({}x{})",
        format_counter(index, total),
        file_name(source),
        output.display(),
        dimensions.0,
        dimensions.1
    )
}

pub fn format_failed_line(index: usize, total: usize, source: &Path, reason: &str) -> String {
    format!("{} {}: failed: {reason}", format_counter(index, total), file_name(source))
}

// ============================================================================
// Base64
// ============================================================================

/// ```text
/// 001 logo.txt → out/logo.png (2048 bytes)
/// ```
pub fn format_decoded_line(index: usize, total: usize, source: &Path, output: &Path, len: usize) -> String {
    format!(
        "{} {} \u{2192} {} ({})",
        format_counter(index, total),
        file_name(source),
        output.display(),
        plural(len, "byte")
    )
}

pub fn format_cache_stats(stats: &CacheStats) -> String {
    format!("Cache: {}", stats)
}
