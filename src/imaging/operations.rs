//! High-level image operations.
//!
//! These functions combine calculations with resampling. They take parameters,
//! compute output dimensions, and run the `image` crate's Lanczos3 filter.

use super::buffer::ImageBuffer;
use super::calculations::{calculate_cover_dimensions, calculate_resize_dimensions, calculate_thumbnail_dimensions};
use super::params::ResizeParams;
use super::transform::{CropRegion, TransformError, crop_region};
use image::imageops::FilterType;

/// Resample to exactly `width`×`height`. Returns a clone when nothing changes.
pub fn resize_exact(buffer: &ImageBuffer, width: u32, height: u32) -> ImageBuffer {
    if buffer.dimensions() == (width, height) {
        return buffer.clone();
    }
    let resized = buffer
        .to_dynamic()
        .resize_exact(width, height, FilterType::Lanczos3);
    // Normalizing an 8-bit image of the same layout cannot fail, but keep the
    // source rather than panic if it ever does.
    ImageBuffer::from_dynamic(resized).unwrap_or_else(|_| buffer.clone())
}

/// Resize according to `params`.
pub fn resize(buffer: &ImageBuffer, params: &ResizeParams) -> ImageBuffer {
    let (w, h) = calculate_resize_dimensions(buffer.dimensions(), params);
    resize_exact(buffer, w, h)
}

/// Scale so the longest side is at most `max_dimension`. Never upscales.
pub fn thumbnail(buffer: &ImageBuffer, max_dimension: u32) -> ImageBuffer {
    let (w, h) = calculate_thumbnail_dimensions(buffer.dimensions(), max_dimension);
    resize_exact(buffer, w, h)
}

/// Scale to cover `width`×`height`, then cut away the centered overflow.
pub fn cover(buffer: &ImageBuffer, width: u32, height: u32) -> Result<ImageBuffer, TransformError> {
    let (fill_w, fill_h) = calculate_cover_dimensions(buffer.dimensions(), (width, height));
    let filled = resize_exact(buffer, fill_w, fill_h);
    crop_region(
        &filled,
        CropRegion {
            x: (fill_w - width) / 2,
            y: (fill_h - height) / 2,
            width,
            height,
        },
    )
}
