//! Atomic file placement.
//!
//! Bytes are written to a temporary file in the destination directory and
//! renamed into place, so readers see either the old file or the complete new
//! one, never a partial write.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("failed to write {path}: {source}")]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

fn staged(path: &Path, bytes: &[u8]) -> Result<NamedTempFile, WriteError> {
    let wrap = |source: std::io::Error| WriteError {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(wrap)?;
    tmp.write_all(bytes).map_err(wrap)?;
    tmp.flush().map_err(wrap)?;
    Ok(tmp)
}

/// Write `bytes` to `path`, replacing any existing file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    staged(path, bytes)?
        .persist(path)
        .map_err(|e| WriteError {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

/// Write `bytes` to `path`, failing if something already exists there.
pub fn write_new(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    staged(path, bytes)?
        .persist_noclobber(path)
        .map_err(|e| WriteError {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}
