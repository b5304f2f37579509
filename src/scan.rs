//! Input discovery.
//!
//! Command-line inputs may be files or directories. Files are taken as given,
//! even if missing or oddly named, so that the batch reports them as failed
//! jobs instead of silently skipping them. Directories are walked with
//! `walkdir` and filtered to recognized image extensions.
//!
//! ```text
//! photos/
//! ├── a.jpg            ✓
//! ├── notes.txt        ✗ not an image
//! ├── .hidden.png      ✗ hidden
//! └── trip/
//!     └── b.png        ✓ only with recursive = true
//! ```

use crate::imaging::codec::is_recognized_image;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("cannot read directory: {0}")]
    Walk(#[from] walkdir::Error),
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Images inside `dir`, sorted by path.
pub fn scan_directory(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, ScanError> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut found = Vec::new();
    let walker = WalkDir::new(dir)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && is_recognized_image(entry.path()) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Expand files and directories into a de-duplicated list of input files.
///
/// Order follows the arguments; directory contents are sorted.
pub fn collect_inputs(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>, ScanError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for input in inputs {
        let expanded = if input.is_dir() {
            scan_directory(input, recursive)?
        } else {
            vec![input.clone()]
        };
        for path in expanded {
            if seen.insert(path.clone()) {
                out.push(path);
            }
        }
    }
    log::debug!("collected {} input files from {} arguments", out.len(), inputs.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_fixtures() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for name in ["b.jpg", "a.PNG", "notes.txt", ".hidden.png", "photo.heic"] {
            fs::write(root.join(name), b"x").unwrap();
        }
        fs::create_dir(root.join("trip")).unwrap();
        fs::write(root.join("trip/c.webp"), b"x").unwrap();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::write(root.join(".cache/d.png"), b"x").unwrap();
        tmp
    }

    fn names(paths: &[PathBuf], root: &Path) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn scan_directory_flat_filters_images() {
        let tmp = setup_fixtures();
        let found = scan_directory(tmp.path(), false).unwrap();
        assert_eq!(names(&found, tmp.path()), vec!["a.PNG", "b.jpg", "photo.heic"]);
    }

    #[test]
    fn scan_directory_recursive_skips_hidden_dirs() {
        let tmp = setup_fixtures();
        let found = scan_directory(tmp.path(), true).unwrap();
        assert_eq!(
            names(&found, tmp.path()),
            vec!["a.PNG", "b.jpg", "photo.heic", "trip/c.webp"]
        );
    }

    #[test]
    fn collect_inputs_keeps_explicit_files_even_if_missing() {
        let tmp = setup_fixtures();
        let missing = tmp.path().join("missing.jpg");
        let inputs = vec![missing.clone(), tmp.path().join("b.jpg")];
        let collected = collect_inputs(&inputs, false).unwrap();
        assert_eq!(collected, inputs);
    }

    #[test]
    fn collect_inputs_deduplicates() {
        let tmp = setup_fixtures();
        let inputs = vec![tmp.path().join("b.jpg"), tmp.path().to_path_buf()];
        let collected = collect_inputs(&inputs, false).unwrap();
        assert_eq!(names(&collected, tmp.path()), vec!["b.jpg", "a.PNG", "photo.heic"]);
    }

    #[test]
    fn scan_missing_directory_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_directory(&tmp.path().join("nope"), false).is_err());
    }
}
