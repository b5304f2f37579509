//! Scripted edit steps.
//!
//! The `edit` command drives a [`CropSession`] from a list of steps given on
//! the command line, in order:
//!
//! ```text
//! rotate-left | rotate-right       rotate 90°
//! flip-h | flip-v                  mirror horizontally / vertically
//! aspect=16:9 | aspect=free        apply an aspect preset to the selection
//! drag=X1,Y1,X2,Y2                 press at (X1,Y1), drag to (X2,Y2), release
//! nudge=DX,DY                      move the selection
//! grow=DW,DH                       resize the selection from its top-left corner
//! crop                             crop to the selection
//! undo | redo
//! ```
//!
//! A drag goes through the same hit-testing as a pointer would: starting on a
//! handle of the current selection moves or resizes it, starting elsewhere
//! draws a new one.

use crate::geometry::{Point, parse_aspect};
use crate::session::{CropSession, FlipAxis, RotateDirection, SessionError, UndoOutcome};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid edit step '{step}': {reason}")]
pub struct InvalidEditStep {
    pub step: String,
    pub reason: String,
}

#[derive(Error, Debug)]
#[error("step {index} ({step}): {source}")]
pub struct EditError {
    pub index: usize,
    pub step: EditStep,
    #[source]
    pub source: SessionError,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditStep {
    Rotate(RotateDirection),
    Flip(FlipAxis),
    Aspect(Option<f64>),
    Drag { from: Point, to: Point },
    Nudge { dx: f64, dy: f64 },
    Grow { dw: f64, dh: f64 },
    Crop,
    Undo,
    Redo,
}

fn numbers<const N: usize>(step: &str, args: &str) -> Result<[f64; N], InvalidEditStep> {
    let invalid = |reason: String| InvalidEditStep {
        step: step.to_string(),
        reason,
    };
    let parsed = args
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid(format!("'{}' is not a number", part.trim())))
        })
        .collect::<Result<Vec<f64>, _>>()?;
    parsed
        .try_into()
        .map_err(|v: Vec<f64>| invalid(format!("expected {N} numbers, got {}", v.len())))
}

impl FromStr for EditStep {
    type Err = InvalidEditStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, args) = match s.split_once('=') {
            Some((name, args)) => (name.trim(), Some(args)),
            None => (s, None),
        };
        let invalid = |reason: &str| InvalidEditStep {
            step: s.to_string(),
            reason: reason.to_string(),
        };

        let name = name.to_ascii_lowercase();
        let step = match (name.as_str(), args) {
            ("rotate-left", None) => EditStep::Rotate(RotateDirection::Left),
            ("rotate-right", None) => EditStep::Rotate(RotateDirection::Right),
            ("flip-h" | "flip-horizontal", None) => EditStep::Flip(FlipAxis::Horizontal),
            ("flip-v" | "flip-vertical", None) => EditStep::Flip(FlipAxis::Vertical),
            ("crop", None) => EditStep::Crop,
            ("undo", None) => EditStep::Undo,
            ("redo", None) => EditStep::Redo,
            ("aspect", Some(ratio)) => {
                EditStep::Aspect(parse_aspect(ratio).map_err(|e| invalid(&e.to_string()))?)
            }
            ("drag", Some(args)) => {
                let [x1, y1, x2, y2] = numbers::<4>(s, args)?;
                EditStep::Drag {
                    from: Point::new(x1, y1),
                    to: Point::new(x2, y2),
                }
            }
            ("nudge", Some(args)) => {
                let [dx, dy] = numbers::<2>(s, args)?;
                EditStep::Nudge { dx, dy }
            }
            ("grow", Some(args)) => {
                let [dw, dh] = numbers::<2>(s, args)?;
                EditStep::Grow { dw, dh }
            }
            ("aspect" | "drag" | "nudge" | "grow", None) => {
                return Err(invalid("missing '=' arguments"));
            }
            (
                "rotate-left" | "rotate-right" | "flip-h" | "flip-horizontal" | "flip-v" | "flip-vertical"
                | "crop" | "undo" | "redo",
                Some(_),
            ) => {
                return Err(invalid("takes no arguments"));
            }
            _ => return Err(invalid("unknown step")),
        };
        Ok(step)
    }
}

impl fmt::Display for EditStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditStep::Rotate(RotateDirection::Left) => write!(f, "rotate-left"),
            EditStep::Rotate(RotateDirection::Right) => write!(f, "rotate-right"),
            EditStep::Flip(FlipAxis::Horizontal) => write!(f, "flip-h"),
            EditStep::Flip(FlipAxis::Vertical) => write!(f, "flip-v"),
            EditStep::Aspect(None) => write!(f, "aspect=free"),
            EditStep::Aspect(Some(r)) => write!(f, "aspect={r}"),
            EditStep::Drag { from, to } => write!(f, "drag={},{},{},{}", from.x, from.y, to.x, to.y),
            EditStep::Nudge { dx, dy } => write!(f, "nudge={dx},{dy}"),
            EditStep::Grow { dw, dh } => write!(f, "grow={dw},{dh}"),
            EditStep::Crop => write!(f, "crop"),
            EditStep::Undo => write!(f, "undo"),
            EditStep::Redo => write!(f, "redo"),
        }
    }
}

impl EditStep {
    /// Perform this step on `session`.
    pub fn apply(&self, session: &mut CropSession) -> Result<(), SessionError> {
        match *self {
            EditStep::Rotate(direction) => {
                session.rotate(direction)?;
            }
            EditStep::Flip(axis) => {
                session.flip(axis)?;
            }
            EditStep::Aspect(ratio) => {
                session.set_aspect(ratio)?;
            }
            EditStep::Drag { from, to } => {
                session.pointer_down(from)?;
                session.pointer_move(to)?;
                session.pointer_up()?;
            }
            EditStep::Nudge { dx, dy } => {
                session.nudge_selection(dx, dy)?;
            }
            EditStep::Grow { dw, dh } => {
                session.resize_selection(dw, dh)?;
            }
            EditStep::Crop => {
                session.commit_crop()?;
            }
            EditStep::Undo => {
                if session.undo_last()? == UndoOutcome::NothingToUndo {
                    log::debug!("undo: history is empty");
                }
            }
            EditStep::Redo => {
                if !session.redo_last()? {
                    log::debug!("redo: nothing to redo");
                }
            }
        }
        Ok(())
    }
}

/// Apply `steps` in order, stopping at the first failure.
pub fn run_steps(session: &mut CropSession, steps: &[EditStep]) -> Result<(), EditError> {
    for (i, step) in steps.iter().enumerate() {
        log::debug!("edit step {}: {step}", i + 1);
        step.apply(session).map_err(|source| EditError {
            index: i + 1,
            step: *step,
            source,
        })?;
    }
    Ok(())
}
