//! Output filenames and collision handling.
//!
//! Every operation derives its output name from the input stem:
//!
//! - `photo.jpg` resized → `photo_resized.jpg`
//! - `photo.jpg` recompressed → `photo_compressed.jpg`
//! - `photo.jpg` cropped → `photo_cropped.jpg`
//! - `photo.jpg` background removed (transparent) → `photo_nobg.png`
//! - `photo.heic` converted to JPEG → `photo.jpg`
//! - `photo.png` as base64 HTML → `photo.html`
//!
//! ## Collisions
//!
//! When a name is taken, a counter goes before the extension:
//! `photo_resized.jpg`, `photo_resized_1.jpg`, `photo_resized_2.jpg`, …
//! Collisions are resolved for a whole batch at once, in job-id order, so the
//! outcome never depends on which worker happens to finish first.

use crate::imaging::OutputFormat;
use crate::types::{BatchJob, OperationSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What to do when an output file already exists on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Pick the next free `_N` name.
    #[default]
    Suffix,
    /// Replace existing files. Two jobs of one batch still never share a path.
    Overwrite,
}

/// Image format an operation will write for `input`.
///
/// Falls back to the input's own format, then PNG when that cannot be written.
pub fn output_format(input: &Path, operation: &OperationSpec) -> OutputFormat {
    operation
        .requested_format()
        .or_else(|| OutputFormat::from_path(input))
        .unwrap_or(OutputFormat::Png)
}

/// Derive the output filename for `input` under `operation`.
pub fn output_file_name(input: &Path, operation: &OperationSpec) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let extension = match operation {
        OperationSpec::EncodeBase64 { wrapper } => wrapper.extension(),
        _ => output_format(input, operation).extension(),
    };
    match operation.filename_suffix() {
        Some(suffix) => format!("{stem}_{suffix}.{extension}"),
        None => format!("{stem}.{extension}"),
    }
}

/// `dir/base_N.ext` for the first `N >= 1` that `is_taken` rejects.
pub fn unique_path(path: &Path, is_taken: impl Fn(&Path) -> bool) -> PathBuf {
    if !is_taken(path) {
        return path.to_path_buf();
    }
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let base = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut counter = 1u32;
    loop {
        let candidate = dir.join(format!("{base}_{counter}{ext}"));
        if !is_taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Rewrite output paths so no two jobs collide, and, under
/// [`CollisionPolicy::Suffix`], so no existing file is replaced.
///
/// Jobs are visited in id order regardless of slice order.
pub fn resolve_collisions(jobs: &mut [BatchJob], policy: CollisionPolicy) {
    let mut order: Vec<usize> = (0..jobs.len()).collect();
    order.sort_by_key(|&i| jobs[i].id);

    let mut claimed: HashSet<PathBuf> = HashSet::new();
    for i in order {
        let wanted = &jobs[i].output_path;
        let resolved = unique_path(wanted, |p| {
            claimed.contains(p) || (policy == CollisionPolicy::Suffix && p.exists())
        });
        if &resolved != wanted {
            log::debug!(
                "job {}: {} taken, using {}",
                jobs[i].id,
                wanted.display(),
                resolved.display()
            );
        }
        claimed.insert(resolved.clone());
        jobs[i].output_path = resolved;
    }
}
