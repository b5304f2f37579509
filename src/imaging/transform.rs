//! Lossless pixel transforms: quarter-turn rotations, mirror flips, crops.
//!
//! All of these move whole pixels and work for any [`ColorMode`] by copying
//! `bytes_per_pixel` bytes at a time. Each returns a new buffer.

use super::buffer::{ColorMode, ImageBuffer, ImageError};
use super::calculations::round_half_up;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("crop region is empty after rounding ({x}, {y}, {w}x{h})")]
    EmptyCrop { x: f64, y: f64, w: f64, h: f64 },
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// An integer pixel rectangle, already clamped to its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Turn a fractional rectangle into whole pixels inside `image_w`×`image_h`.
///
/// Each edge is rounded half-up independently, then clamped. `None` if the
/// result has no area.
pub fn pixel_region(x: f64, y: f64, w: f64, h: f64, image_w: u32, image_h: u32) -> Option<CropRegion> {
    let clamp = |v: i64, max: u32| v.clamp(0, max as i64) as u32;
    let left = clamp(round_half_up(x), image_w);
    let top = clamp(round_half_up(y), image_h);
    let right = clamp(round_half_up(x + w), image_w);
    let bottom = clamp(round_half_up(y + h), image_h);
    if right <= left || bottom <= top {
        return None;
    }
    Some(CropRegion {
        x: left,
        y: top,
        width: right - left,
        height: bottom - top,
    })
}

/// Crop a fractional rectangle (image coordinates) out of `buffer`.
pub fn crop(buffer: &ImageBuffer, x: f64, y: f64, w: f64, h: f64) -> Result<ImageBuffer, TransformError> {
    let region = pixel_region(x, y, w, h, buffer.width(), buffer.height())
        .ok_or(TransformError::EmptyCrop { x, y, w, h })?;
    crop_region(buffer, region)
}

/// Copy out an integer region row by row. The region is re-clamped to the buffer.
pub fn crop_region(buffer: &ImageBuffer, region: CropRegion) -> Result<ImageBuffer, TransformError> {
    let (iw, ih) = buffer.dimensions();
    let x = region.x.min(iw);
    let y = region.y.min(ih);
    let width = region.width.min(iw - x);
    let height = region.height.min(ih - y);
    if width == 0 || height == 0 {
        return Err(TransformError::EmptyCrop {
            x: region.x as f64,
            y: region.y as f64,
            w: region.width as f64,
            h: region.height as f64,
        });
    }

    let bpp = buffer.mode().bytes_per_pixel();
    let stride = iw as usize * bpp;
    let row_len = width as usize * bpp;
    let src = buffer.pixels();
    let mut out = Vec::with_capacity(row_len * height as usize);
    for row in y as usize..(y + height) as usize {
        let start = row * stride + x as usize * bpp;
        out.extend_from_slice(&src[start..start + row_len]);
    }
    Ok(ImageBuffer::new(width, height, buffer.mode(), out)?)
}

/// Build a buffer of size `out_w`×`out_h` where output `(x, y)` copies source
/// pixel `map(x, y)`.
fn remap(
    buffer: &ImageBuffer,
    out_w: u32,
    out_h: u32,
    map: impl Fn(u32, u32) -> (u32, u32),
) -> Result<ImageBuffer, ImageError> {
    let mode: ColorMode = buffer.mode();
    let bpp = mode.bytes_per_pixel();
    let mut out = Vec::with_capacity(buffer.byte_len());
    for y in 0..out_h {
        for x in 0..out_w {
            let (sx, sy) = map(x, y);
            out.extend_from_slice(buffer.pixel(sx, sy));
        }
    }
    debug_assert_eq!(out.len(), out_w as usize * out_h as usize * bpp);
    ImageBuffer::new(out_w, out_h, mode, out)
}

/// Rotate 90° counter-clockwise.
pub fn rotate_left(buffer: &ImageBuffer) -> Result<ImageBuffer, TransformError> {
    let (w, h) = buffer.dimensions();
    Ok(remap(buffer, h, w, |x, y| (w - 1 - y, x))?)
}

/// Rotate 90° clockwise.
pub fn rotate_right(buffer: &ImageBuffer) -> Result<ImageBuffer, TransformError> {
    let (w, h) = buffer.dimensions();
    Ok(remap(buffer, h, w, |x, y| (y, h - 1 - x))?)
}

/// Mirror left ↔ right.
pub fn flip_horizontal(buffer: &ImageBuffer) -> Result<ImageBuffer, TransformError> {
    let (w, h) = buffer.dimensions();
    Ok(remap(buffer, w, h, |x, y| (w - 1 - x, y))?)
}

/// Mirror top ↔ bottom.
pub fn flip_vertical(buffer: &ImageBuffer) -> Result<ImageBuffer, TransformError> {
    let (w, h) = buffer.dimensions();
    let bpp = buffer.mode().bytes_per_pixel();
    let stride = w as usize * bpp;
    let out: Vec<u8> = buffer
        .pixels()
        .chunks_exact(stride)
        .rev()
        .flatten()
        .copied()
        .collect();
    Ok(ImageBuffer::new(w, h, buffer.mode(), out)?)
}
