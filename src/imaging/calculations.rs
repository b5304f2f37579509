//! Output-size arithmetic for resizes, previews, backdrops and crop edges.
//!
//! No pixels are touched here; every function maps sizes to sizes.

use super::params::ResizeParams;

/// Round to the nearest integer, ties toward positive infinity.
///
/// Crop edges go through this so that `x = 10.5` always lands on pixel 11,
/// independent of the platform's `round` tie-breaking for negative values.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Calculate preview dimensions bounded by `max_dimension` on the longer side.
///
/// Never upscales: a source that already fits is returned unchanged. The
/// shorter side is scaled proportionally and rounded, never below 1px.
///
/// ```text
/// (1920, 1080), 120 → (120, 68)
/// (1080, 1920), 120 → (68, 120)
/// (100, 50),    120 → (100, 50)
/// ```
pub fn calculate_thumbnail_dimensions(source: (u32, u32), max_dimension: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let longer = src_w.max(src_h);
    if longer <= max_dimension {
        return source;
    }

    let ratio = max_dimension as f64 / longer as f64;
    if src_w >= src_h {
        let h = (src_h as f64 * ratio).round().max(1.0) as u32;
        (max_dimension, h)
    } else {
        let w = (src_w as f64 * ratio).round().max(1.0) as u32;
        (w, max_dimension)
    }
}

/// Calculate the output size of a resize.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `params` - Requested box and aspect/enlarge flags
///
/// # Returns
/// * `(width, height)` - Output dimensions, each at least 1px
///
/// With `keep_aspect`, the smaller of the two scale factors wins so the result
/// fits inside the box; dimensions are truncated, matching the behaviour users
/// of the resizer expect (`1000x750` into `300x300` is `300x225`).
pub fn calculate_resize_dimensions(source: (u32, u32), params: &ResizeParams) -> (u32, u32) {
    let (src_w, src_h) = source;
    let mut target_w = params.width;
    let mut target_h = params.height;

    if !params.allow_enlarge {
        target_w = target_w.map(|w| w.min(src_w));
        target_h = target_h.map(|h| h.min(src_h));
    }

    let (w, h) = if params.keep_aspect {
        let ratio = match (target_w, target_h) {
            (Some(w), Some(h)) => (w as f64 / src_w as f64).min(h as f64 / src_h as f64),
            (Some(w), None) => w as f64 / src_w as f64,
            (None, Some(h)) => h as f64 / src_h as f64,
            (None, None) => 1.0,
        };
        (
            (src_w as f64 * ratio) as u32,
            (src_h as f64 * ratio) as u32,
        )
    } else {
        (target_w.unwrap_or(src_w), target_h.unwrap_or(src_h))
    };

    (w.max(1), h.max(1))
}

/// Smallest size with the source's aspect ratio that covers `target`.
///
/// Neither side falls short of the target; rounding overshoot is kept so the
/// caller can center-crop the excess.
///
/// ```text
/// (800, 600) over (400, 500) → (667, 500)
/// (600, 800) over (500, 400) → (500, 667)
/// ```
pub fn calculate_cover_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let scale = (target.0 as f64 / src_w).max(target.1 as f64 / src_h);
    let w = ((src_w * scale).round() as u32).max(target.0);
    let h = ((src_h * scale).round() as u32).max(target.1);
    (w, h)
}
