//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between callers that decide which images to produce (the batch
//! pipeline, the crop session, the CLI) and the pixel work in
//! [`operations`](super::operations) and [`codec`](super::codec).
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 90). Out-of-range
//!   values are rejected, never clamped.
//! - [`ResizeParams`]: target box for a resize: optional width/height, aspect
//!   handling, and whether enlarging is permitted.
//! - [`ResizePreset`]: named boxes for common screens, social posts and paper
//!   sizes, listed in [`RESIZE_PRESETS`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("quality must be an integer between 1 and 100 (got {0})")]
pub struct InvalidQuality(pub u32);

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quality(u32);

impl Quality {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 100;

    pub fn new(value: u32) -> Result<Self, InvalidQuality> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidQuality(value))
        }
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

impl TryFrom<u32> for Quality {
    type Error = InvalidQuality;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quality> for u32 {
    fn from(q: Quality) -> u32 {
        q.0
    }
}

/// Parameters for a resize operation.
///
/// With `keep_aspect`, the image is scaled to fit inside the box given by
/// whichever of `width`/`height` are set. Without it, missing sides keep the
/// source dimension. Unless `allow_enlarge` is set, targets larger than the
/// source are capped at the source size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub keep_aspect: bool,
    pub allow_enlarge: bool,
}

impl Default for ResizeParams {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            keep_aspect: true,
            allow_enlarge: false,
        }
    }
}

/// A named target box for [`ResizeParams`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePreset {
    pub name: &'static str,
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
}

const fn preset(name: &'static str, label: &'static str, width: u32, height: u32) -> ResizePreset {
    ResizePreset {
        name,
        label,
        width,
        height,
    }
}

pub const RESIZE_PRESETS: &[ResizePreset] = &[
    preset("hd", "HD", 1280, 720),
    preset("full-hd", "Full HD", 1920, 1080),
    preset("4k", "4K UHD", 3840, 2160),
    preset("instagram-post", "Instagram post", 1080, 1080),
    preset("instagram-story", "Instagram story", 1080, 1920),
    preset("facebook", "Facebook post", 1200, 630),
    preset("twitter", "Twitter post", 1200, 675),
    preset("linkedin", "LinkedIn post", 1200, 627),
    preset("pinterest", "Pinterest pin", 1000, 1500),
    preset("a4", "A4 at 300 dpi", 2480, 3508),
    preset("letter", "Letter at 300 dpi", 2550, 3300),
];

impl ResizePreset {
    /// Look a preset up by name. Case, spaces and underscores are ignored,
    /// so `Full HD`, `full_hd` and `full-hd` all match.
    pub fn find(name: &str) -> Option<&'static ResizePreset> {
        let wanted: String = name
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '_' { '-' } else { c.to_ascii_lowercase() })
            .collect();
        RESIZE_PRESETS.iter().find(|p| p.name == wanted)
    }

    /// Resize parameters fitting the image inside this preset's box.
    pub fn params(&self) -> ResizeParams {
        ResizeParams {
            width: Some(self.width),
            height: Some(self.height),
            ..ResizeParams::default()
        }
    }
}

impl fmt::Display for ResizePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.label, self.width, self.height)
    }
}

impl FromStr for ResizePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::find(s).copied().ok_or_else(|| {
            let names: Vec<&str> = RESIZE_PRESETS.iter().map(|p| p.name).collect();
            format!("unknown preset '{s}' (expected one of: {})", names.join(", "))
        })
    }
}
