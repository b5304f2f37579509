//! Selection rectangle geometry.
//!
//! Pure functions over [`SelectionRect`]: clamping into the image, aspect-ratio
//! locking, handle drags, keyboard nudges and presets. No function here keeps
//! state between calls; drag state lives in the caller-owned [`DragContext`].
//!
//! Every function returns a rect satisfying, for an `image_w`×`image_h` image:
//!
//! - `0 <= x`, `0 <= y`, `x + w <= image_w`, `y + h <= image_h`
//! - `w >= min(min_size, image_w)` and `h >= min(min_size, image_h)`
//! - `w / h == aspect_lock` when locked, unless the image is too small to
//!   satisfy bounds, minimum size and ratio at once. Bounds win, then minimum
//!   size, then ratio.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest selection edge in image pixels.
pub const DEFAULT_MIN_SIZE: f64 = 10.0;

/// Named aspect ratios offered to users, as `(label, width / height)`.
pub const ASPECT_PRESETS: &[(&str, f64)] = &[
    ("1:1", 1.0),
    ("4:3", 4.0 / 3.0),
    ("16:9", 16.0 / 9.0),
    ("3:2", 3.0 / 2.0),
    ("5:4", 5.0 / 4.0),
    ("2:3", 2.0 / 3.0),
    ("9:16", 9.0 / 16.0),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid aspect ratio '{0}' (expected free, W:H, or a positive number)")]
pub struct InvalidAspect(pub String);

/// Parse `free`, `W:H` (e.g. `16:9`), or a plain ratio (`1.5`).
///
/// `Ok(None)` means unconstrained.
pub fn parse_aspect(s: &str) -> Result<Option<f64>, InvalidAspect> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("free") || s.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let err = || InvalidAspect(s.to_string());
    let ratio = match s.split_once(':') {
        Some((w, h)) => {
            let w: f64 = w.trim().parse().map_err(|_| err())?;
            let h: f64 = h.trim().parse().map_err(|_| err())?;
            if h == 0.0 {
                return Err(err());
            }
            w / h
        }
        None => s.parse().map_err(|_| err())?,
    };
    if ratio.is_finite() && ratio > 0.0 {
        Ok(Some(ratio))
    } else {
        Err(err())
    }
}

/// A point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Crop selection in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    /// Locked `w / h`, if any.
    pub aspect_lock: Option<f64>,
    pub min_size: f64,
}

impl SelectionRect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            x,
            y,
            w,
            h,
            aspect_lock: None,
            min_size: DEFAULT_MIN_SIZE,
        }
    }

    /// The whole image.
    pub fn full(image_w: u32, image_h: u32) -> Self {
        Self::new(0.0, 0.0, image_w as f64, image_h as f64)
    }

    pub fn with_aspect(self, aspect_lock: Option<f64>) -> Self {
        Self { aspect_lock, ..self }
    }

    pub fn with_min_size(self, min_size: f64) -> Self {
        Self { min_size, ..self }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    fn locked_ratio(&self) -> Option<f64> {
        self.aspect_lock.filter(|r| r.is_finite() && *r > 0.0)
    }

    fn min_sizes(&self, image_w: f64, image_h: f64) -> (f64, f64) {
        let min = if self.min_size.is_finite() {
            self.min_size.max(0.0)
        } else {
            DEFAULT_MIN_SIZE
        };
        (min.min(image_w), min.min(image_h))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    fn from_direction(rightward: bool, downward: bool) -> Self {
        match (rightward, downward) {
            (false, false) => Corner::TopLeft,
            (true, false) => Corner::TopRight,
            (false, true) => Corner::BottomLeft,
            (true, true) => Corner::BottomRight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// The part of a selection a pointer grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Corner(Corner),
    Edge(Edge),
    Interior,
}

/// State captured when a drag begins. Owned by the caller for the drag's duration.
#[derive(Debug, Clone, PartialEq)]
pub struct DragContext {
    /// Handle currently being dragged. Changes when the pointer crosses the anchor.
    pub handle: Handle,
    /// The point that stays put: the opposite corner for corner drags, a corner
    /// of the opposite edge for edge drags, the origin for interior moves.
    pub anchor: Point,
    pub start_pointer: Point,
    pub start_rect: SelectionRect,
    pub image_w: u32,
    pub image_h: u32,
    pub affects_x: bool,
    pub affects_y: bool,
}

/// Shrink and translate `rect` so it satisfies every geometry invariant.
pub fn clamp_to_bounds(rect: &SelectionRect, image_w: u32, image_h: u32) -> SelectionRect {
    let (iw, ih) = (image_w as f64, image_h as f64);
    let (min_w, min_h) = rect.min_sizes(iw, ih);
    let finite_or = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };

    let mut w = finite_or(rect.w, min_w).clamp(min_w, iw);
    let mut h = finite_or(rect.h, min_h).clamp(min_h, ih);

    if let Some(r) = rect.locked_ratio() {
        // Ratio first, shrinking the longer side.
        if w / h > r {
            w = h * r;
        } else {
            h = w / r;
        }
        // Then minimum size, growing along the ratio.
        if w < min_w {
            w = min_w;
            h = w / r;
        }
        if h < min_h {
            h = min_h;
            w = h * r;
        }
        // Then bounds, shrinking along the ratio.
        if w > iw {
            w = iw;
            h = w / r;
        }
        if h > ih {
            h = ih;
            w = h * r;
        }
        // Whatever still conflicts is resolved in favour of bounds and min size.
        w = w.clamp(min_w, iw);
        h = h.clamp(min_h, ih);
    }

    let x = finite_or(rect.x, 0.0).clamp(0.0, iw - w);
    let y = finite_or(rect.y, 0.0).clamp(0.0, ih - h);

    SelectionRect { x, y, w, h, ..*rect }
}

/// Start dragging `handle` of `rect` from `pointer`.
pub fn begin_drag(rect: &SelectionRect, handle: Handle, pointer: Point, image_w: u32, image_h: u32) -> DragContext {
    let (left, top, right, bottom) = (rect.x, rect.y, rect.right(), rect.bottom());
    let (anchor, affects_x, affects_y) = match handle {
        Handle::Corner(Corner::TopLeft) => (Point::new(right, bottom), true, true),
        Handle::Corner(Corner::TopRight) => (Point::new(left, bottom), true, true),
        Handle::Corner(Corner::BottomLeft) => (Point::new(right, top), true, true),
        Handle::Corner(Corner::BottomRight) => (Point::new(left, top), true, true),
        Handle::Edge(Edge::Left) => (Point::new(right, top), true, false),
        Handle::Edge(Edge::Right) => (Point::new(left, top), true, false),
        Handle::Edge(Edge::Top) => (Point::new(left, bottom), false, true),
        Handle::Edge(Edge::Bottom) => (Point::new(left, top), false, true),
        Handle::Interior => (Point::new(left, top), true, true),
    };
    DragContext {
        handle,
        anchor,
        start_pointer: pointer,
        start_rect: *rect,
        image_w,
        image_h,
        affects_x,
        affects_y,
    }
}

/// Start a fresh selection at `pointer`: a bottom-right corner drag anchored there.
pub fn begin_new_selection(
    pointer: Point,
    aspect_lock: Option<f64>,
    min_size: f64,
    image_w: u32,
    image_h: u32,
) -> DragContext {
    let p = clamp_point(pointer, image_w, image_h);
    let seed = SelectionRect {
        x: p.x,
        y: p.y,
        w: 0.0,
        h: 0.0,
        aspect_lock,
        min_size,
    };
    begin_drag(&seed, Handle::Corner(Corner::BottomRight), p, image_w, image_h)
}

fn clamp_point(p: Point, image_w: u32, image_h: u32) -> Point {
    let clamp = |v: f64, max: u32| if v.is_finite() { v.clamp(0.0, max as f64) } else { 0.0 };
    Point::new(clamp(p.x, image_w), clamp(p.y, image_h))
}

/// Which dimension the pointer controls when the aspect is locked.
#[derive(Clone, Copy)]
enum Drive {
    Width,
    Height,
}

/// Size a rect growing away from an anchor with `avail_w`×`avail_h` space.
fn fit_from_anchor(w: f64, h: f64, avail: (f64, f64), rect: &SelectionRect, bounds: (f64, f64), drive: Drive) -> (f64, f64) {
    let (avail_w, avail_h) = avail;
    let (min_w, min_h) = rect.min_sizes(bounds.0, bounds.1);
    match rect.locked_ratio() {
        Some(r) => {
            let (mut w, mut h) = match drive {
                Drive::Width => {
                    let w = w.max(min_w).max(min_h * r);
                    (w, w / r)
                }
                Drive::Height => {
                    let h = h.max(min_h).max(min_w / r);
                    (h * r, h)
                }
            };
            if w > avail_w {
                w = avail_w;
                h = w / r;
            }
            if h > avail_h {
                h = avail_h;
                w = h * r;
            }
            (w, h)
        }
        None => (w.max(min_w).min(avail_w), h.max(min_h).min(avail_h)),
    }
}

/// Recompute the selection for the pointer's new position.
///
/// Corner and edge drags that cross the anchor flip to the mirrored handle;
/// `ctx.handle` is updated so later moves continue from the new role.
pub fn update_drag(ctx: &mut DragContext, pointer: Point) -> SelectionRect {
    let (iw, ih) = (ctx.image_w as f64, ctx.image_h as f64);
    let start = ctx.start_rect;
    let a = ctx.anchor;

    let rect = match ctx.handle {
        Handle::Interior => {
            let dx = finite(pointer.x - ctx.start_pointer.x);
            let dy = finite(pointer.y - ctx.start_pointer.y);
            SelectionRect {
                x: start.x + dx,
                y: start.y + dy,
                ..start
            }
        }
        Handle::Corner(_) => {
            let p = clamp_point(pointer, ctx.image_w, ctx.image_h);
            let rightward = p.x >= a.x;
            let downward = p.y >= a.y;
            ctx.handle = Handle::Corner(Corner::from_direction(rightward, downward));
            let avail_w = if rightward { iw - a.x } else { a.x };
            let avail_h = if downward { ih - a.y } else { a.y };
            let (w, h) = fit_from_anchor(
                (p.x - a.x).abs(),
                (p.y - a.y).abs(),
                (avail_w, avail_h),
                &start,
                (iw, ih),
                Drive::Width,
            );
            SelectionRect {
                x: if rightward { a.x } else { a.x - w },
                y: if downward { a.y } else { a.y - h },
                w,
                h,
                ..start
            }
        }
        Handle::Edge(Edge::Left | Edge::Right) => {
            let p = clamp_point(pointer, ctx.image_w, ctx.image_h);
            let rightward = p.x >= a.x;
            ctx.handle = Handle::Edge(if rightward { Edge::Right } else { Edge::Left });
            let avail_w = if rightward { iw - a.x } else { a.x };
            let (w, h) = fit_from_anchor(
                (p.x - a.x).abs(),
                start.h,
                (avail_w, ih - a.y),
                &start,
                (iw, ih),
                Drive::Width,
            );
            SelectionRect {
                x: if rightward { a.x } else { a.x - w },
                y: a.y,
                w,
                h,
                ..start
            }
        }
        Handle::Edge(Edge::Top | Edge::Bottom) => {
            let p = clamp_point(pointer, ctx.image_w, ctx.image_h);
            let downward = p.y >= a.y;
            ctx.handle = Handle::Edge(if downward { Edge::Bottom } else { Edge::Top });
            let avail_h = if downward { ih - a.y } else { a.y };
            let (w, h) = fit_from_anchor(
                start.w,
                (p.y - a.y).abs(),
                (iw - a.x, avail_h),
                &start,
                (iw, ih),
                Drive::Height,
            );
            SelectionRect {
                x: a.x,
                y: if downward { a.y } else { a.y - h },
                w,
                h,
                ..start
            }
        }
    };
    clamp_to_bounds(&rect, ctx.image_w, ctx.image_h)
}

fn finite(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Finalize a drag on release.
pub fn end_drag(ctx: &DragContext, rect: &SelectionRect) -> SelectionRect {
    clamp_to_bounds(rect, ctx.image_w, ctx.image_h)
}

/// Apply an aspect preset.
///
/// `Some(r)` gives the largest `r`-shaped rect centered on the current center
/// that fits the image. `None` clears the lock and keeps the size.
pub fn apply_aspect_preset(rect: &SelectionRect, ratio: Option<f64>, image_w: u32, image_h: u32) -> SelectionRect {
    let Some(r) = ratio.filter(|r| r.is_finite() && *r > 0.0) else {
        return clamp_to_bounds(&rect.with_aspect(None), image_w, image_h);
    };
    let (iw, ih) = (image_w as f64, image_h as f64);
    let c = clamp_point(rect.center(), image_w, image_h);
    let half_w = c.x.min(iw - c.x);
    let half_h = c.y.min(ih - c.y);
    let w = (2.0 * half_w).min(2.0 * half_h * r);
    let h = w / r;
    let centered = SelectionRect {
        x: c.x - w / 2.0,
        y: c.y - h / 2.0,
        w,
        h,
        aspect_lock: Some(r),
        min_size: rect.min_size,
    };
    clamp_to_bounds(&centered, image_w, image_h)
}

/// Find the handle under `pointer`, preferring corners, then edges, then the interior.
pub fn hit_test(rect: &SelectionRect, pointer: Point, tolerance: f64) -> Option<Handle> {
    let near = |a: f64, b: f64| (a - b).abs() <= tolerance;
    let (left, top, right, bottom) = (rect.x, rect.y, rect.right(), rect.bottom());
    let within_x = pointer.x >= left - tolerance && pointer.x <= right + tolerance;
    let within_y = pointer.y >= top - tolerance && pointer.y <= bottom + tolerance;
    if !within_x || !within_y {
        return None;
    }

    let corner = match (
        near(pointer.x, left),
        near(pointer.x, right),
        near(pointer.y, top),
        near(pointer.y, bottom),
    ) {
        (true, _, true, _) => Some(Corner::TopLeft),
        (_, true, true, _) => Some(Corner::TopRight),
        (true, _, _, true) => Some(Corner::BottomLeft),
        (_, true, _, true) => Some(Corner::BottomRight),
        _ => None,
    };
    if let Some(c) = corner {
        return Some(Handle::Corner(c));
    }

    if near(pointer.x, left) {
        Some(Handle::Edge(Edge::Left))
    } else if near(pointer.x, right) {
        Some(Handle::Edge(Edge::Right))
    } else if near(pointer.y, top) {
        Some(Handle::Edge(Edge::Top))
    } else if near(pointer.y, bottom) {
        Some(Handle::Edge(Edge::Bottom))
    } else {
        Some(Handle::Interior)
    }
}

/// Move the selection by `(dx, dy)`; it stops at the image edges.
pub fn nudge(rect: &SelectionRect, dx: f64, dy: f64, image_w: u32, image_h: u32) -> SelectionRect {
    let moved = SelectionRect {
        x: rect.x + finite(dx),
        y: rect.y + finite(dy),
        ..*rect
    };
    clamp_to_bounds(&moved, image_w, image_h)
}

/// Grow or shrink the selection from its top-left corner.
///
/// With an aspect lock, a width change drives the height; a height-only change
/// drives the width. Growth stops at the image edges instead of moving the rect.
pub fn resize_by(rect: &SelectionRect, dw: f64, dh: f64, image_w: u32, image_h: u32) -> SelectionRect {
    let (iw, ih) = (image_w as f64, image_h as f64);
    let avail_w = (iw - rect.x).max(0.0);
    let avail_h = (ih - rect.y).max(0.0);
    let (dw, dh) = (finite(dw), finite(dh));
    let (w, h) = match rect.locked_ratio() {
        Some(r) => {
            let w = if dw != 0.0 { rect.w + dw } else { (rect.h + dh) * r };
            let w = w.min(avail_w).min(avail_h * r);
            (w, w / r)
        }
        None => ((rect.w + dw).min(avail_w), (rect.h + dh).min(avail_h)),
    };
    clamp_to_bounds(&SelectionRect { w, h, ..*rect }, image_w, image_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_valid(rect: &SelectionRect, iw: u32, ih: u32) {
        let (iw, ih) = (iw as f64, ih as f64);
        assert!(rect.x >= -EPS && rect.y >= -EPS, "negative origin: {rect:?}");
        assert!(rect.right() <= iw + EPS, "past right edge: {rect:?}");
        assert!(rect.bottom() <= ih + EPS, "past bottom edge: {rect:?}");
        assert!(rect.w >= rect.min_size.min(iw) - EPS, "too narrow: {rect:?}");
        assert!(rect.h >= rect.min_size.min(ih) - EPS, "too short: {rect:?}");
    }

    fn assert_ratio(rect: &SelectionRect, r: f64) {
        let actual = rect.w / rect.h;
        assert!(((actual - r) / r).abs() < 1e-6, "ratio {actual} != {r}: {rect:?}");
    }

    // =========================================================================
    // clamp_to_bounds
    // =========================================================================

    #[test]
    fn clamp_leaves_valid_rect_alone() {
        let rect = SelectionRect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(clamp_to_bounds(&rect, 400, 300), rect);
    }

    #[test]
    fn clamp_translates_rect_back_inside() {
        let rect = SelectionRect::new(350.0, -20.0, 100.0, 50.0);
        let out = clamp_to_bounds(&rect, 400, 300);
        assert_eq!((out.x, out.y, out.w, out.h), (300.0, 0.0, 100.0, 50.0));
    }

    #[test]
    fn clamp_shrinks_oversized_rect() {
        let rect = SelectionRect::new(0.0, 0.0, 1000.0, 1000.0);
        let out = clamp_to_bounds(&rect, 400, 300);
        assert_eq!((out.w, out.h), (400.0, 300.0));
    }

    #[test]
    fn clamp_raises_to_min_size() {
        let rect = SelectionRect::new(5.0, 5.0, 2.0, 0.0);
        let out = clamp_to_bounds(&rect, 400, 300);
        assert_eq!((out.w, out.h), (10.0, 10.0));
    }

    #[test]
    fn clamp_min_size_capped_by_tiny_image() {
        let rect = SelectionRect::new(0.0, 0.0, 1.0, 1.0);
        let out = clamp_to_bounds(&rect, 4, 6);
        assert_eq!((out.x, out.y, out.w, out.h), (0.0, 0.0, 4.0, 6.0));
    }

    #[test]
    fn clamp_with_lock_shrinks_longer_side() {
        let rect = SelectionRect::new(0.0, 0.0, 300.0, 100.0).with_aspect(Some(1.0));
        let out = clamp_to_bounds(&rect, 400, 300);
        assert_eq!((out.w, out.h), (100.0, 100.0));
    }

    #[test]
    fn clamp_lock_yields_to_bounds_on_small_images() {
        // 16:9 with a 10px minimum height cannot fit a 12px-wide image.
        let rect = SelectionRect::new(0.0, 0.0, 5.0, 5.0).with_aspect(Some(16.0 / 9.0));
        let out = clamp_to_bounds(&rect, 12, 40);
        assert_valid(&out, 12, 40);
    }

    #[test]
    fn clamp_invariants_hold_for_many_rects() {
        // Deterministic walk over awkward inputs: negatives, huge, tiny, locked.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % 4000) as f64 - 1500.0
        };
        for i in 0..500 {
            let lock = match i % 4 {
                0 => None,
                1 => Some(1.0),
                2 => Some(16.0 / 9.0),
                _ => Some(2.0 / 3.0),
            };
            let rect = SelectionRect::new(next(), next(), next(), next()).with_aspect(lock);
            let out = clamp_to_bounds(&rect, 1920, 1080);
            assert_valid(&out, 1920, 1080);
            if let Some(r) = lock {
                assert_ratio(&out, r);
            }
        }
    }

    #[test]
    fn clamp_handles_non_finite_input() {
        let rect = SelectionRect::new(f64::NAN, f64::INFINITY, f64::NAN, 50.0);
        let out = clamp_to_bounds(&rect, 100, 100);
        assert_valid(&out, 100, 100);
    }

    // =========================================================================
    // Drags
    // =========================================================================

    #[test]
    fn interior_drag_moves_without_resizing() {
        let rect = SelectionRect::new(100.0, 100.0, 50.0, 40.0);
        let mut ctx = begin_drag(&rect, Handle::Interior, Point::new(120.0, 120.0), 400, 300);
        let out = update_drag(&mut ctx, Point::new(170.0, 90.0));
        assert_eq!((out.x, out.y, out.w, out.h), (150.0, 70.0, 50.0, 40.0));
    }

    #[test]
    fn interior_drag_stops_at_edges() {
        let rect = SelectionRect::new(100.0, 100.0, 50.0, 40.0);
        let mut ctx = begin_drag(&rect, Handle::Interior, Point::new(120.0, 120.0), 400, 300);
        let out = update_drag(&mut ctx, Point::new(2000.0, -2000.0));
        assert_eq!((out.x, out.y, out.w, out.h), (350.0, 0.0, 50.0, 40.0));
    }

    #[test]
    fn free_corner_drag_resizes_from_anchor() {
        let rect = SelectionRect::new(100.0, 100.0, 50.0, 40.0);
        let mut ctx = begin_drag(&rect, Handle::Corner(Corner::BottomRight), Point::new(150.0, 140.0), 400, 300);
        let out = update_drag(&mut ctx, Point::new(200.0, 250.0));
        assert_eq!((out.x, out.y, out.w, out.h), (100.0, 100.0, 100.0, 150.0));
    }

    #[test]
    fn locked_corner_drag_width_drives_height() {
        let rect = SelectionRect::new(0.0, 0.0, 160.0, 90.0).with_aspect(Some(16.0 / 9.0));
        let mut ctx = begin_drag(&rect, Handle::Corner(Corner::BottomRight), Point::new(160.0, 90.0), 1920, 1080);
        let out = update_drag(&mut ctx, Point::new(320.0, 10.0));
        assert!((out.w - 320.0).abs() < EPS);
        assert!((out.h - 180.0).abs() < EPS);
        assert_ratio(&out, 16.0 / 9.0);
    }

    #[test]
    fn locked_corner_drag_limited_by_space_from_anchor() {
        let rect = SelectionRect::new(0.0, 900.0, 100.0, 100.0).with_aspect(Some(1.0));
        let mut ctx = begin_drag(&rect, Handle::Corner(Corner::BottomRight), Point::new(100.0, 1000.0), 1920, 1080);
        let out = update_drag(&mut ctx, Point::new(1900.0, 1080.0));
        // Only 180px below the anchor, so the square stops there.
        assert_eq!((out.x, out.y, out.w, out.h), (0.0, 900.0, 180.0, 180.0));
    }

    #[test]
    fn crossing_the_anchor_swaps_handle() {
        let rect = SelectionRect::new(100.0, 100.0, 50.0, 50.0);
        let mut ctx = begin_drag(&rect, Handle::Corner(Corner::BottomRight), Point::new(150.0, 150.0), 400, 300);
        let out = update_drag(&mut ctx, Point::new(60.0, 40.0));
        assert_eq!(ctx.handle, Handle::Corner(Corner::TopLeft));
        assert_eq!((out.x, out.y, out.w, out.h), (60.0, 40.0, 40.0, 60.0));
        assert!(out.w > 0.0 && out.h > 0.0);
    }

    #[test]
    fn edge_drag_crossing_swaps_edge() {
        let rect = SelectionRect::new(100.0, 100.0, 50.0, 50.0);
        let mut ctx = begin_drag(&rect, Handle::Edge(Edge::Left), Point::new(100.0, 120.0), 400, 300);
        assert!(ctx.affects_x && !ctx.affects_y);
        let out = update_drag(&mut ctx, Point::new(200.0, 0.0));
        assert_eq!(ctx.handle, Handle::Edge(Edge::Right));
        assert_eq!((out.x, out.y, out.w, out.h), (150.0, 100.0, 50.0, 50.0));
    }

    #[test]
    fn locked_bottom_edge_drag_height_drives_width() {
        let rect = SelectionRect::new(0.0, 0.0, 100.0, 50.0).with_aspect(Some(2.0));
        let mut ctx = begin_drag(&rect, Handle::Edge(Edge::Bottom), Point::new(50.0, 50.0), 400, 300);
        let out = update_drag(&mut ctx, Point::new(50.0, 100.0));
        assert_eq!((out.w, out.h), (200.0, 100.0));
    }

    #[test]
    fn tiny_drag_respects_min_size() {
        let rect = SelectionRect::new(100.0, 100.0, 50.0, 50.0);
        let mut ctx = begin_drag(&rect, Handle::Corner(Corner::BottomRight), Point::new(150.0, 150.0), 400, 300);
        let out = update_drag(&mut ctx, Point::new(101.0, 102.0));
        assert_eq!((out.w, out.h), (10.0, 10.0));
    }

    #[test]
    fn drag_sequence_keeps_invariants() {
        let lock = Some(4.0 / 3.0);
        let mut ctx = begin_new_selection(Point::new(500.0, 400.0), lock, DEFAULT_MIN_SIZE, 800, 600);
        let path = [(900.0, 700.0), (-50.0, 420.0), (510.0, 405.0), (799.0, -1.0), (0.0, 0.0)];
        for (x, y) in path {
            let out = update_drag(&mut ctx, Point::new(x, y));
            assert_valid(&out, 800, 600);
            assert_ratio(&out, 4.0 / 3.0);
        }
    }

    #[test]
    fn new_selection_grows_from_pointer() {
        let mut ctx = begin_new_selection(Point::new(10.0, 20.0), None, DEFAULT_MIN_SIZE, 400, 300);
        let out = update_drag(&mut ctx, Point::new(110.0, 70.0));
        let out = end_drag(&ctx, &out);
        assert_eq!((out.x, out.y, out.w, out.h), (10.0, 20.0, 100.0, 50.0));
    }

    // =========================================================================
    // Presets, hit testing, keyboard
    // =========================================================================

    #[test]
    fn square_preset_on_full_hd() {
        let out = apply_aspect_preset(&SelectionRect::full(1920, 1080), Some(1.0), 1920, 1080);
        assert_eq!((out.x, out.y, out.w, out.h), (420.0, 0.0, 1080.0, 1080.0));
        assert_eq!(out.aspect_lock, Some(1.0));
    }

    #[test]
    fn free_preset_clears_lock_and_keeps_size() {
        let rect = SelectionRect::new(10.0, 10.0, 160.0, 90.0).with_aspect(Some(16.0 / 9.0));
        let out = apply_aspect_preset(&rect, None, 1920, 1080);
        assert_eq!(out.aspect_lock, None);
        assert_eq!((out.w, out.h), (160.0, 90.0));
    }

    #[test]
    fn every_preset_fits_and_matches_ratio() {
        for &(label, r) in ASPECT_PRESETS {
            let out = apply_aspect_preset(&SelectionRect::full(1920, 1080), Some(r), 1920, 1080);
            assert_valid(&out, 1920, 1080);
            assert_ratio(&out, r);
            assert_eq!(parse_aspect(label).unwrap(), Some(r));
        }
    }

    #[test]
    fn parse_aspect_forms() {
        assert_eq!(parse_aspect("free"), Ok(None));
        assert_eq!(parse_aspect("1.5"), Ok(Some(1.5)));
        assert_eq!(parse_aspect(" 3 : 2 "), Ok(Some(1.5)));
        assert!(parse_aspect("4:0").is_err());
        assert!(parse_aspect("-1").is_err());
        assert!(parse_aspect("wide").is_err());
    }

    #[test]
    fn hit_test_prefers_corners() {
        let rect = SelectionRect::new(100.0, 100.0, 200.0, 100.0);
        assert_eq!(
            hit_test(&rect, Point::new(102.0, 98.0), 5.0),
            Some(Handle::Corner(Corner::TopLeft))
        );
        assert_eq!(
            hit_test(&rect, Point::new(300.0, 200.0), 5.0),
            Some(Handle::Corner(Corner::BottomRight))
        );
        assert_eq!(hit_test(&rect, Point::new(200.0, 101.0), 5.0), Some(Handle::Edge(Edge::Top)));
        assert_eq!(hit_test(&rect, Point::new(298.0, 150.0), 5.0), Some(Handle::Edge(Edge::Right)));
        assert_eq!(hit_test(&rect, Point::new(200.0, 150.0), 5.0), Some(Handle::Interior));
        assert_eq!(hit_test(&rect, Point::new(50.0, 150.0), 5.0), None);
    }

    #[test]
    fn nudge_moves_and_stops_at_edge() {
        let rect = SelectionRect::new(10.0, 10.0, 50.0, 50.0);
        let out = nudge(&rect, 5.0, -1.0, 100, 100);
        assert_eq!((out.x, out.y), (15.0, 9.0));
        let out = nudge(&rect, 500.0, 0.0, 100, 100);
        assert_eq!(out.x, 50.0);
    }

    #[test]
    fn resize_by_grows_and_stops_at_edge() {
        let rect = SelectionRect::new(10.0, 10.0, 50.0, 50.0);
        let out = resize_by(&rect, 10.0, 0.0, 100, 100);
        assert_eq!((out.x, out.w, out.h), (10.0, 60.0, 50.0));
        let out = resize_by(&rect, 500.0, 500.0, 100, 100);
        assert_eq!((out.x, out.y, out.w, out.h), (10.0, 10.0, 90.0, 90.0));
    }

    #[test]
    fn resize_by_keeps_lock() {
        let rect = SelectionRect::new(0.0, 0.0, 40.0, 20.0).with_aspect(Some(2.0));
        let out = resize_by(&rect, 0.0, 10.0, 100, 100);
        assert_eq!((out.w, out.h), (60.0, 30.0));
    }
}
