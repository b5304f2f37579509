//! Transform history with undo and redo.
//!
//! Each applied [`TransformOp`] is recorded together with the buffer it
//! produced, so undo never recomputes anything: it drops the last entry and
//! hands back the buffer of the one before it (or the original image).
//! Buffers share pixel storage, which keeps retained history cheap to clone.

use crate::geometry::SelectionRect;
use crate::imaging::transform;
use crate::imaging::{ImageBuffer, TransformError};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("nothing to undo")]
pub struct EmptyHistory;

/// A recorded pre-crop transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformOp {
    RotateLeft,
    RotateRight,
    FlipHorizontal,
    FlipVertical,
    Crop(SelectionRect),
}

impl TransformOp {
    /// Run the transform against `buffer`.
    pub fn execute(&self, buffer: &ImageBuffer) -> Result<ImageBuffer, TransformError> {
        match self {
            TransformOp::RotateLeft => transform::rotate_left(buffer),
            TransformOp::RotateRight => transform::rotate_right(buffer),
            TransformOp::FlipHorizontal => transform::flip_horizontal(buffer),
            TransformOp::FlipVertical => transform::flip_vertical(buffer),
            TransformOp::Crop(rect) => transform::crop(buffer, rect.x, rect.y, rect.w, rect.h),
        }
    }

    /// Short label for logs and status lines.
    pub fn description(&self) -> String {
        match self {
            TransformOp::RotateLeft => "Rotate left".to_string(),
            TransformOp::RotateRight => "Rotate right".to_string(),
            TransformOp::FlipHorizontal => "Flip horizontal".to_string(),
            TransformOp::FlipVertical => "Flip vertical".to_string(),
            TransformOp::Crop(r) => format!("Crop {:.0}x{:.0} at ({:.0}, {:.0})", r.w, r.h, r.x, r.y),
        }
    }
}

/// One applied transform and the image it produced.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub op: TransformOp,
    pub result: ImageBuffer,
}

/// Ordered transform history over one loaded image.
///
/// `len()` is always the number of transforms applied since load minus the
/// number undone. Applying a new transform discards anything that could be redone.
#[derive(Debug, Clone)]
pub struct TransformStack {
    original: ImageBuffer,
    entries: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

impl TransformStack {
    pub fn new(original: ImageBuffer) -> Self {
        Self {
            original,
            entries: Vec::new(),
            redo: Vec::new(),
        }
    }

    pub fn original(&self) -> &ImageBuffer {
        &self.original
    }

    /// The image after every recorded transform.
    pub fn current(&self) -> &ImageBuffer {
        self.entries.last().map(|e| &e.result).unwrap_or(&self.original)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Apply `op` to the current image and record it.
    ///
    /// On error nothing is recorded and the redo list is left untouched.
    pub fn apply(&mut self, op: TransformOp) -> Result<ImageBuffer, TransformError> {
        let result = op.execute(self.current())?;
        log::debug!(
            "history push: {} -> {}x{} ({} entries)",
            op.description(),
            result.width(),
            result.height(),
            self.entries.len() + 1
        );
        self.entries.push(HistoryEntry {
            op,
            result: result.clone(),
        });
        self.redo.clear();
        Ok(result)
    }

    /// Drop the most recent transform, returning the image before it.
    pub fn undo(&mut self) -> Result<ImageBuffer, EmptyHistory> {
        let entry = self.entries.pop().ok_or(EmptyHistory)?;
        log::debug!("history undo: {}", entry.op.description());
        self.redo.push(entry);
        Ok(self.current().clone())
    }

    /// Re-apply the most recently undone transform, if any.
    pub fn redo(&mut self) -> Option<ImageBuffer> {
        let entry = self.redo.pop()?;
        log::debug!("history redo: {}", entry.op.description());
        let result = entry.result.clone();
        self.entries.push(entry);
        Some(result)
    }
}
