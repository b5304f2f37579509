//! Interactive crop session.
//!
//! A [`CropSession`] owns one working image, its [`TransformStack`], and the
//! current selection. Pointer events drive the selection through
//! [`geometry`](crate::geometry); rotate, flip and crop go through the history.
//!
//! ```text
//!          load
//!  Empty ─────────► Loaded ◄──────────────────────┐ rotate / flip / undo
//!                     │ pointer_down / set_aspect │
//!                     ▼                           │
//!                 Selecting ── pointer_up ──► Selected ── commit_crop ──► Cropped
//! ```
//!
//! `Cropped` accepts everything `Loaded` does. A failing call never changes state.

use crate::geometry::{
    self, DEFAULT_MIN_SIZE, DragContext, Handle, Point, SelectionRect, apply_aspect_preset,
    begin_drag, begin_new_selection, end_drag, hit_test, update_drag,
};
use crate::history::{HistoryEntry, TransformOp, TransformStack};
use crate::imaging::{
    CodecError, ImageBuffer, InvalidQuality, OutputFormat, Quality, TransformError, encode, read_image,
};
use crate::persist::{WriteError, write_atomic};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pointer distance (image pixels) within which a handle is grabbed.
pub const DEFAULT_HANDLE_TOLERANCE: f64 = 8.0;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no image loaded")]
    NotLoaded,
    #[error("nothing selected")]
    NoSelection,
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("cannot open {path}: {reason}")]
    UnreadableImage { path: PathBuf, reason: String },
    #[error(transparent)]
    InvalidQuality(#[from] InvalidQuality),
    #[error(transparent)]
    Encode(#[from] CodecError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Loaded,
    Selecting,
    Selected,
    Cropped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Empty => "empty",
            SessionState::Loaded => "loaded",
            SessionState::Selecting => "selecting",
            SessionState::Selected => "selected",
            SessionState::Cropped => "cropped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateDirection {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

/// Result of [`CropSession::undo_last`]. An empty history is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Reverted,
    NothingToUndo,
}

#[derive(Debug)]
struct Loaded {
    source: Option<PathBuf>,
    history: TransformStack,
}

/// Single-owner editing session over one image.
#[derive(Debug)]
pub struct CropSession {
    state: SessionState,
    image: Option<Loaded>,
    selection: Option<SelectionRect>,
    drag: Option<DragContext>,
    aspect: Option<f64>,
    min_size: f64,
    handle_tolerance: f64,
}

impl Default for CropSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CropSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Empty,
            image: None,
            selection: None,
            drag: None,
            aspect: None,
            min_size: DEFAULT_MIN_SIZE,
            handle_tolerance: DEFAULT_HANDLE_TOLERANCE,
        }
    }

    pub fn with_min_size(mut self, min_size: f64) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_handle_tolerance(mut self, tolerance: f64) -> Self {
        self.handle_tolerance = tolerance;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn selection(&self) -> Option<&SelectionRect> {
        self.selection.as_ref()
    }

    /// The working image: the loaded image with every recorded transform applied.
    pub fn current_image(&self) -> Option<&ImageBuffer> {
        self.image.as_ref().map(|l| l.history.current())
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.image.as_ref().and_then(|l| l.source.as_deref())
    }

    pub fn history_len(&self) -> usize {
        self.image.as_ref().map_or(0, |l| l.history.len())
    }

    pub fn can_redo(&self) -> bool {
        self.image.as_ref().is_some_and(|l| l.history.can_redo())
    }

    /// Applied transforms, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        self.image.as_ref().map_or(&[], |l| l.history.entries())
    }

    pub fn aspect(&self) -> Option<f64> {
        self.aspect
    }

    fn loaded(&self) -> Result<&Loaded, SessionError> {
        self.image.as_ref().ok_or(SessionError::NotLoaded)
    }

    fn bounds(&self) -> Result<(u32, u32), SessionError> {
        Ok(self.loaded()?.history.current().dimensions())
    }

    fn reject_while_selecting(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.state == SessionState::Selecting {
            return Err(SessionError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn reset_selection(&mut self, state: SessionState) {
        self.selection = None;
        self.drag = None;
        self.state = state;
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Open an image file. Replaces any previous image and clears history.
    pub fn load(&mut self, path: &Path) -> Result<(), SessionError> {
        let buffer = read_image(path).map_err(|e| SessionError::UnreadableImage {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        log::debug!("session loaded {} ({}x{})", path.display(), buffer.width(), buffer.height());
        self.install(Some(path.to_path_buf()), buffer);
        Ok(())
    }

    /// Start a session over an in-memory image.
    pub fn load_buffer(&mut self, buffer: ImageBuffer) {
        self.install(None, buffer);
    }

    fn install(&mut self, source: Option<PathBuf>, buffer: ImageBuffer) {
        self.image = Some(Loaded {
            source,
            history: TransformStack::new(buffer),
        });
        self.reset_selection(SessionState::Loaded);
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Press at `pointer`: grab a handle of the current selection, or start a new one.
    pub fn pointer_down(&mut self, pointer: Point) -> Result<Handle, SessionError> {
        let (iw, ih) = self.bounds()?;
        self.reject_while_selecting("start a selection")?;

        let grabbed = self
            .selection
            .as_ref()
            .and_then(|rect| hit_test(rect, pointer, self.handle_tolerance).map(|h| (rect, h)));
        let ctx = match grabbed {
            Some((rect, handle)) => begin_drag(rect, handle, pointer, iw, ih),
            None => begin_new_selection(pointer, self.aspect, self.min_size, iw, ih),
        };
        let handle = ctx.handle;
        self.selection = Some(geometry::clamp_to_bounds(&ctx.start_rect, iw, ih));
        self.drag = Some(ctx);
        self.state = SessionState::Selecting;
        Ok(handle)
    }

    /// Drag to `pointer`. Only valid between `pointer_down` and `pointer_up`.
    pub fn pointer_move(&mut self, pointer: Point) -> Result<SelectionRect, SessionError> {
        self.loaded()?;
        let Some(ctx) = self.drag.as_mut() else {
            return Err(SessionError::InvalidState {
                operation: "drag",
                state: self.state,
            });
        };
        let rect = update_drag(ctx, pointer);
        self.selection = Some(rect);
        Ok(rect)
    }

    /// Release the pointer and finalize the selection.
    pub fn pointer_up(&mut self) -> Result<SelectionRect, SessionError> {
        self.loaded()?;
        let (Some(ctx), Some(rect)) = (self.drag.as_ref(), self.selection.as_ref()) else {
            return Err(SessionError::InvalidState {
                operation: "release",
                state: self.state,
            });
        };
        let rect = end_drag(ctx, rect);
        self.selection = Some(rect);
        self.drag = None;
        self.state = SessionState::Selected;
        Ok(rect)
    }

    /// Lock (or with `None`, unlock) the selection's aspect ratio.
    ///
    /// With nothing selected the preset is applied to the whole image.
    pub fn set_aspect(&mut self, ratio: Option<f64>) -> Result<SelectionRect, SessionError> {
        let (iw, ih) = self.bounds()?;
        self.reject_while_selecting("change aspect")?;
        let base = self
            .selection
            .unwrap_or_else(|| SelectionRect::full(iw, ih).with_min_size(self.min_size));
        let rect = apply_aspect_preset(&base, ratio, iw, ih);
        self.aspect = ratio;
        self.selection = Some(rect);
        self.state = SessionState::Selected;
        Ok(rect)
    }

    /// Move the selection by whole steps (keyboard arrows).
    pub fn nudge_selection(&mut self, dx: f64, dy: f64) -> Result<SelectionRect, SessionError> {
        let (iw, ih) = self.bounds()?;
        let rect = self.settled_selection("move the selection")?;
        let rect = geometry::nudge(&rect, dx, dy, iw, ih);
        self.selection = Some(rect);
        Ok(rect)
    }

    /// Grow or shrink the selection from its top-left corner (keyboard).
    pub fn resize_selection(&mut self, dw: f64, dh: f64) -> Result<SelectionRect, SessionError> {
        let (iw, ih) = self.bounds()?;
        let rect = self.settled_selection("resize the selection")?;
        let rect = geometry::resize_by(&rect, dw, dh, iw, ih);
        self.selection = Some(rect);
        Ok(rect)
    }

    fn settled_selection(&self, operation: &'static str) -> Result<SelectionRect, SessionError> {
        self.reject_while_selecting(operation)?;
        self.selection.ok_or(SessionError::NoSelection)
    }

    // ------------------------------------------------------------------
    // Transforms
    // ------------------------------------------------------------------

    fn apply(&mut self, op: TransformOp, next: SessionState) -> Result<ImageBuffer, SessionError> {
        self.reject_while_selecting("transform")?;
        let loaded = self.image.as_mut().ok_or(SessionError::NotLoaded)?;
        let out = loaded.history.apply(op)?;
        self.reset_selection(next);
        Ok(out)
    }

    pub fn rotate(&mut self, direction: RotateDirection) -> Result<ImageBuffer, SessionError> {
        let op = match direction {
            RotateDirection::Left => TransformOp::RotateLeft,
            RotateDirection::Right => TransformOp::RotateRight,
        };
        self.apply(op, SessionState::Loaded)
    }

    pub fn flip(&mut self, axis: FlipAxis) -> Result<ImageBuffer, SessionError> {
        let op = match axis {
            FlipAxis::Horizontal => TransformOp::FlipHorizontal,
            FlipAxis::Vertical => TransformOp::FlipVertical,
        };
        self.apply(op, SessionState::Loaded)
    }

    /// Crop the working image to the current selection.
    pub fn commit_crop(&mut self) -> Result<ImageBuffer, SessionError> {
        self.loaded()?;
        self.reject_while_selecting("crop")?;
        let rect = self.selection.ok_or(SessionError::NoSelection)?;
        self.apply(TransformOp::Crop(rect), SessionState::Cropped)
    }

    /// Revert the latest transform. Any selection is dropped.
    pub fn undo_last(&mut self) -> Result<UndoOutcome, SessionError> {
        let loaded = self.image.as_mut().ok_or(SessionError::NotLoaded)?;
        match loaded.history.undo() {
            Ok(_) => {
                self.reset_selection(SessionState::Loaded);
                Ok(UndoOutcome::Reverted)
            }
            Err(_) => Ok(UndoOutcome::NothingToUndo),
        }
    }

    /// Re-apply the latest undone transform. Returns whether anything changed.
    pub fn redo_last(&mut self) -> Result<bool, SessionError> {
        let loaded = self.image.as_mut().ok_or(SessionError::NotLoaded)?;
        if loaded.history.redo().is_none() {
            return Ok(false);
        }
        self.reset_selection(SessionState::Loaded);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Encode the working image and write it atomically. Does not change state.
    pub fn save(&self, path: &Path, format: OutputFormat, quality: u32) -> Result<(), SessionError> {
        let image = self.loaded()?.history.current();
        let quality = Quality::new(quality)?;
        let bytes = encode(image, format, quality)?;
        write_atomic(path, &bytes)?;
        log::info!(
            "saved {}x{} {format} to {}",
            image.width(),
            image.height(),
            path.display()
        );
        Ok(())
    }
}
