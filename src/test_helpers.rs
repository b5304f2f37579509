//! Shared test utilities.
//!
//! ```text
//! use crate::test_helpers::*;
//!
//! let img = gradient(40, 30, ColorMode::Rgb);
//! let path = write_test_image(tmp.path(), "in.png", 40, 30);
//! ```

use crate::imaging::{ColorMode, ImageBuffer, OutputFormat, Quality, encode};
use std::path::{Path, PathBuf};

// =========================================================================
// In-memory images
// =========================================================================

/// Deterministic image whose pixels differ along both axes, so flips and
/// rotations are observable in every channel layout.
pub fn gradient(width: u32, height: u32, mode: ColorMode) -> ImageBuffer {
    ImageBuffer::from_fn(width, height, mode, |x, y| {
        [
            ((x * 37 + y * 11) % 256) as u8,
            ((y * 53 + x * 7) % 256) as u8,
            ((x * y * 3) % 256) as u8,
            (255 - (x * 5 + y * 3) % 128) as u8,
        ]
    })
    .unwrap()
}

// =========================================================================
// Files on disk
// =========================================================================

/// Write an RGB gradient PNG to `dir/name` and return its path.
pub fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    let bytes = encode(&gradient(width, height, ColorMode::Rgb), OutputFormat::Png, Quality::default()).unwrap();
    std::fs::write(&path, bytes).unwrap();
    path
}
